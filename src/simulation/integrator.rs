//! One physics tick of the mass-spring system
//!
//! A tick runs as sequential phases, each one parallel across elements:
//! 1. link forces: every spring contributes to both of its ends
//! 2. particle forces: every single-particle force contributes to every particle
//! 3. integration: `update_force(dt)` then `update(dt)` on every particle
//! 4. index maintenance: density grids catch up with the moves of phase 3
//!
//! Phases 1 and 2 compute contributions against a read-only view of the
//! particles first and then accumulate them per particle, so each particle's
//! force accumulator is only ever written by one worker.

use rayon::prelude::*;

use crate::error::SimResult;
use crate::simulation::algebra::Translator;
use crate::simulation::clock::Profiler;
use crate::simulation::forces::{ForceSet, Spring};
use crate::simulation::states::{Moved, ParticleSystem};

/// Summary of one tick
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepReport {
    pub dt: f64,
    pub t: f64,               // simulated time after the tick
    pub changed_cells: usize, // particles that moved to another density cell
}

/// Phase 1: accumulate spring forces into every linked particle
///
/// Each link's force is computed once, then every particle gathers the
/// contributions of its own links (negated on the `b` end) divided by its
/// mass.
pub fn prepare_link_forces(system: &mut ParticleSystem, spring: &Spring) {
    let (particles, links, incidence) = system.parts_mut();

    let link_forces: Vec<Translator> = {
        let particles = &*particles;
        links
            .par_iter()
            .map(|l| spring.force(l.length(), &particles[l.a()], &particles[l.b()]))
            .collect()
    };

    particles.par_iter_mut().enumerate().for_each(|(i, p)| {
        for &(k, is_a) in incidence.of(i) {
            let f = if is_a { link_forces[k] } else { -link_forces[k] };
            p.prepare_force(f / p.mass);
        }
    });
}

/// Phase 1, one link at a time through [`Spring::prepare_link`]
pub fn prepare_link_forces_serial(system: &mut ParticleSystem, spring: &Spring) -> SimResult<()> {
    let links = system.links().to_vec();
    for link in &links {
        spring.prepare_link(link, system)?;
    }
    Ok(())
}

/// Phase 2: accumulate every single-particle force into every particle
pub fn prepare_particle_forces(system: &mut ParticleSystem, forces: &ForceSet) {
    if forces.is_empty() {
        return;
    }
    let contributions: Vec<Translator> = {
        let particles = &system.particles;
        (0..particles.len())
            .into_par_iter()
            .map(|i| forces.force_on(i, particles))
            .collect()
    };

    system
        .particles
        .par_iter_mut()
        .zip(contributions)
        .for_each(|(p, f)| p.prepare_force(f));
}

/// Phase 3: turn forces into velocity, velocity into motion
///
/// Returns every particle's move, in particle order.
pub fn integrate(system: &mut ParticleSystem, dt: f64) -> Vec<Moved> {
    system
        .particles
        .par_iter_mut()
        .map(|p| {
            p.update_force(dt);
            p.update(dt)
        })
        .collect()
}

/// Advance the system by one tick of `dt`
///
/// Time-dependent forces advance once, after integration, so tick `k` sees
/// the wind at time `k * dt`.
pub fn step(
    system: &mut ParticleSystem,
    forces: &mut ForceSet,
    spring: &Spring,
    dt: f64,
    profiler: &mut Profiler,
) -> StepReport {
    profiler.begin();

    prepare_link_forces(system, spring);
    profiler.lap("links");

    prepare_particle_forces(system, forces);
    profiler.lap("particles");

    let moves = integrate(system, dt);
    profiler.lap("integrate");

    let changed_cells = forces.refresh_indices(&moves, &system.particles);
    profiler.lap("index");

    forces.advance(dt);
    system.t += dt;

    StepReport {
        dt,
        t: system.t,
        changed_cells,
    }
}
