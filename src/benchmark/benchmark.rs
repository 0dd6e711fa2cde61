use std::time::Instant;

use crate::simulation::clock::Profiler;
use crate::simulation::density::Density;
use crate::simulation::drape::{drape, DrapeAnchors, DrapeDirection, DrapeParameters};
use crate::simulation::forces::{ConstantForce, Force, ForceSet, Spring};
use crate::simulation::integrator::step;
use crate::simulation::states::ParticleSystem;
use crate::SimResult;

const DT: f64 = 0.002;

/// Helper to build a draped system of `n * n` particles
fn make_system(n: usize) -> SimResult<ParticleSystem> {
    let mut particles = Vec::with_capacity(n * n);
    let mut links = Vec::new();
    drape(
        &mut particles,
        &mut links,
        &DrapeParameters {
            n,
            mass: 1.0,
            knot: 1.0,
            anchors: DrapeAnchors::Corners,
            direction: DrapeDirection::Xz,
        },
    )?;
    ParticleSystem::new(particles, links)
}

fn make_spring() -> Spring {
    Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    }
}

/// Time one repulsion pass over every particle, for growing grids
pub fn bench_density() -> SimResult<()> {
    let ns = [16, 32, 64, 128, 256];

    for n in ns {
        let system = make_system(n)?;
        let mut density = Density::new(500.0, 2.0, 1.0)?;
        density.set_particles(&system.particles);

        // Warm up
        let mut sink = 0.0;
        for i in 0..system.len() {
            sink += density.force_on(i, &system.particles).charge();
        }

        let t0 = Instant::now();
        for i in 0..system.len() {
            sink += density.force_on(i, &system.particles).charge();
        }
        let dt_density = t0.elapsed().as_secs_f64();

        println!(
            "N = {:6}, density pass = {:8.6} s  ({} cells, checksum {:.3e})",
            n * n,
            dt_density,
            density.grid().occupied_cells().count(),
            sink
        );
    }
    Ok(())
}

/// Time full ticks with gravity only and with gravity plus density
pub fn bench_step() -> SimResult<()> {
    let ns = [16, 32, 64, 128];
    let steps = 10;
    let spring = make_spring();

    for n in ns {
        let template = make_system(n)?;

        // Gravity only
        let mut sys_plain = template.clone();
        let mut forces_plain = ForceSet::new().with(Force::Constant(ConstantForce::gravity(5.0)));
        let mut profiler = Profiler::new();

        step(&mut sys_plain, &mut forces_plain, &spring, DT, &mut profiler);

        let t0 = Instant::now();
        for _ in 0..steps {
            step(&mut sys_plain, &mut forces_plain, &spring, DT, &mut profiler);
        }
        let plain_per_step = t0.elapsed().as_secs_f64() / steps as f64;

        // Gravity and density
        let mut sys_dense = template.clone();
        let mut forces_dense = ForceSet::new()
            .with(Force::Constant(ConstantForce::gravity(5.0)))
            .with(Force::Density(Density::new(500.0, 2.0, 1.0)?));
        forces_dense.set_particles(&sys_dense.particles);

        step(&mut sys_dense, &mut forces_dense, &spring, DT, &mut profiler);

        let t1 = Instant::now();
        for _ in 0..steps {
            step(&mut sys_dense, &mut forces_dense, &spring, DT, &mut profiler);
        }
        let dense_per_step = t1.elapsed().as_secs_f64() / steps as f64;

        let phases: Vec<String> = profiler
            .laps()
            .iter()
            .map(|(name, d)| format!("{name} {:.3} ms", d.as_secs_f64() * 1000.0))
            .collect();

        println!(
            "N = {:6}, plain step = {:8.6} s,   density step = {:8.6} s   [{}]",
            n * n,
            plain_per_step,
            dense_per_step,
            phases.join(", ")
        );
    }
    Ok(())
}

/// Density step time for a range of grid sides
/// Paste output directly into a spreadsheet to graph
pub fn bench_step_curve() -> SimResult<()> {
    println!("particles,step_ms");

    let spring = make_spring();
    for n in (8..=128).step_by(8) {
        // Small grids: average over more steps to smooth noise
        let steps = if n <= 48 { 20 } else { 3 };

        let mut system = make_system(n)?;
        let mut forces = ForceSet::new()
            .with(Force::Constant(ConstantForce::gravity(5.0)))
            .with(Force::Density(Density::new(500.0, 2.0, 1.0)?));
        forces.set_particles(&system.particles);
        let mut profiler = Profiler::new();

        let t0 = Instant::now();
        for _ in 0..steps {
            step(&mut system, &mut forces, &spring, DT, &mut profiler);
        }
        let ms = t0.elapsed().as_secs_f64() * 1000.0 / steps as f64;

        println!("{},{:.6}", n * n, ms);
    }
    Ok(())
}
