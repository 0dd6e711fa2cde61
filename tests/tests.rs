use std::time::{Duration, Instant};

use drapesim::configuration::config::{ForceConfig, ScenarioConfig};
use drapesim::runtime::controller::SimulationThread;
use drapesim::runtime::snapshot::{Snapshot, SnapshotBuffer};
use drapesim::simulation::algebra::{inverse_lerp, smoothstep, NPoint3, NVec3, Plane, Translator};
use drapesim::simulation::clock::{Clock, Profiler};
use drapesim::simulation::density::{Density, DensityGrid};
use drapesim::simulation::drape::{drape, DrapeAnchors, DrapeDirection, DrapeParameters};
use drapesim::simulation::edits::ParameterEdit;
use drapesim::simulation::engine::{Engine, ThreadMode};
use drapesim::simulation::forces::{ConstantForce, Force, ForceSet, Spring, Viscosity, Wall, Wind};
use drapesim::simulation::integrator::{integrate, prepare_link_forces, prepare_link_forces_serial, step};
use drapesim::simulation::scenario::Scenario;
use drapesim::simulation::states::{Moved, Particle, ParticleSystem, SpringLink};
use drapesim::visualization::shapes::{aabb_edges, sphere_rings};
use drapesim::visualization::{draw_scene, Overlay, Renderer, Rgb};
use drapesim::SimError;

const DT: f64 = 0.01;

/// Particle at rest at `(x, y, z)` with unit mass
pub fn particle_at(x: f64, y: f64, z: f64) -> Particle {
    Particle::new(NPoint3::new(x, y, z), 1.0)
}

/// Drape parameters for an `n × n` sheet in the XZ plane
pub fn sheet(n: usize, anchors: DrapeAnchors) -> DrapeParameters {
    DrapeParameters {
        n,
        mass: 1.0,
        knot: 1.0,
        anchors,
        direction: DrapeDirection::Xz,
    }
}

/// Build a draped ParticleSystem
pub fn draped_system(n: usize, anchors: DrapeAnchors) -> ParticleSystem {
    let mut particles = Vec::new();
    let mut links = Vec::new();
    drape(&mut particles, &mut links, &sheet(n, anchors)).unwrap();
    ParticleSystem::new(particles, links).unwrap()
}

/// Two free particles `dist` apart along x, linked by one spring of rest length `length`
pub fn two_particle_system(dist: f64, length: f64) -> ParticleSystem {
    let particles = vec![particle_at(-dist / 2.0, 0.0, 0.0), particle_at(dist / 2.0, 0.0, 0.0)];
    let links = vec![SpringLink::new(0, 1, length).unwrap()];
    ParticleSystem::new(particles, links).unwrap()
}

/// Scenario config with a fixed step and the given forces
pub fn test_config(n: usize, forces: Vec<ForceConfig>) -> ScenarioConfig {
    let mut cfg = ScenarioConfig::default();
    cfg.engine.thread_mode = ThreadMode::Inline;
    cfg.engine.fixed_dt = Some(DT);
    cfg.drape.n = n;
    cfg.forces = forces;
    cfg
}

fn close(a: f64, b: f64, tol: f64) -> bool {
    (a - b).abs() <= tol
}

// ==================================================================================
// Algebra tests
// ==================================================================================

#[test]
fn translator_composition_adds_displacements() {
    let a = Translator::new(2.0, 1.0, 0.0, 0.0);
    let b = Translator::new(3.0, 0.0, 1.0, 0.0);

    let ab = a * b;
    assert_eq!(ab.displacement, NVec3::new(2.0, 3.0, 0.0));
    assert_eq!(ab, a + b, "Composition and accumulation should agree");
    assert!((a * Translator::identity()) == a, "Identity is not neutral");
}

#[test]
fn translator_new_normalizes_direction() {
    let t = Translator::new(2.0, 3.0, 0.0, 4.0);
    assert!(close(t.charge(), 2.0, 1e-12), "Charge was {}", t.charge());
    assert!(close(t.displacement.x, 1.2, 1e-12) && close(t.displacement.z, 1.6, 1e-12));

    assert!(Translator::new(5.0, 0.0, 0.0, 0.0).is_identity(), "Zero direction must give identity");
}

#[test]
fn translator_moves_points() {
    let t = Translator::new(1.0, 0.0, 0.0, 1.0);
    let p = t.apply(&NPoint3::new(1.0, 2.0, 3.0));
    assert_eq!(p, NPoint3::new(1.0, 2.0, 4.0));
}

#[test]
fn plane_signed_distance_is_normalized() {
    let plane = Plane::new(0.0, 2.0, 0.0, 4.0); // y = -2
    assert!(close(plane.signed_distance(&NPoint3::new(5.0, 0.0, 1.0)), 2.0, 1e-12));
    assert!(close(plane.signed_distance(&NPoint3::new(0.0, -3.0, 0.0)), -1.0, 1e-12));
    assert_eq!(plane.coefficients(), [0.0, 1.0, 0.0, 2.0]);
    assert!(close(plane.signed_distance(&plane.anchor()), 0.0, 1e-12));
}

#[test]
fn inverse_lerp_and_smoothstep_edges() {
    assert_eq!(inverse_lerp(1.0, 1.0, 5.0), 0.0, "Degenerate range must give 0");
    assert_eq!(inverse_lerp(0.0, 2.0, 1.0), 0.5);
    assert_eq!(inverse_lerp(0.0, 2.0, 9.0), 1.0);

    assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
    assert_eq!(smoothstep(1.0, 0.0, 0.0), 1.0, "Reversed edges should run downhill");
    assert_eq!(smoothstep(1.0, 0.0, 1.0), 0.0);
}

// ==================================================================================
// Particle and spring tests
// ==================================================================================

#[test]
fn update_force_resets_accumulator() {
    let mut p = particle_at(0.0, 0.0, 0.0);
    p.prepare_force(Translator::new(3.0, 1.0, 0.0, 0.0));
    p.prepare_force(Translator::new(1.0, 1.0, 0.0, 0.0));

    p.update_force(0.5);

    assert!(p.force.is_identity(), "Force not reset: {:?}", p.force);
    assert!(close(p.velocity.displacement.x, 2.0, 1e-12), "Velocity was {:?}", p.velocity);
}

#[test]
fn locked_particle_does_not_move() {
    let mut p = particle_at(1.0, 2.0, 3.0);
    p.locked = true;
    p.prepare_force(Translator::new(100.0, 0.0, -1.0, 0.0));
    p.update_force(DT);
    let moved = p.update(DT);

    assert_eq!(moved.old, moved.new, "Locked particle moved");
    assert!(p.velocity.is_identity(), "Locked particle kept a velocity");
}

#[test]
fn apply_force_changes_velocity_immediately() {
    let mut p = particle_at(0.0, 0.0, 0.0);
    p.apply_force(Translator::new(10.0, 0.0, 1.0, 0.0), 0.1);

    assert!(close(p.velocity.displacement.y, 1.0, 1e-12), "Velocity was {:?}", p.velocity);
    assert!(p.force.is_identity(), "Immediate force leaked into the accumulator");
}

#[test]
fn spring_forces_are_equal_and_opposite() {
    let mut sys = two_particle_system(2.0, 1.0);
    sys.particles[0].velocity = Translator::new(1.0, 0.0, 1.0, 0.0);
    let spring = Spring {
        stiffness: 10.0,
        viscosity: 0.5,
    };

    prepare_link_forces(&mut sys, &spring);

    let net = sys.particles[0].force + sys.particles[1].force;
    assert!(net.charge() < 1e-12, "Net spring force not zero: {:?}", net);
    assert!(sys.particles[0].force.displacement.x > 0.0, "Stretched spring should pull p0 toward p1");
}

#[test]
fn spring_at_rest_length_exerts_nothing() {
    let sys = two_particle_system(1.0, 1.0);
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let f = spring.force(1.0, &sys.particles[0], &sys.particles[1]);
    assert!(f.charge() < 1e-12, "Force at rest length: {:?}", f);
}

#[test]
fn spring_on_coincident_particles_is_identity() {
    let p1 = particle_at(1.0, 1.0, 1.0);
    let p2 = particle_at(1.0, 1.0, 1.0);
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let f = spring.force(1.0, &p1, &p2);
    assert!(f.is_identity(), "Coincident endpoints gave {:?}", f);
    assert!(f.displacement.iter().all(|c| c.is_finite()));
}

#[test]
fn spring_forces_divide_by_mass() {
    let mut sys = two_particle_system(2.0, 1.0);
    sys.particles[1].mass = 4.0;
    let spring = Spring {
        stiffness: 10.0,
        viscosity: 0.0,
    };

    prepare_link_forces(&mut sys, &spring);

    let a0 = sys.particles[0].force.charge();
    let a1 = sys.particles[1].force.charge();
    assert!(close(a0, 4.0 * a1, 1e-9), "Expected 4x acceleration ratio, got {} / {}", a0, a1);
}

#[test]
fn self_link_is_rejected() {
    assert_eq!(SpringLink::new(3, 3, 1.0), Err(SimError::SelfLink(3)));

    let mut sys = two_particle_system(1.0, 1.0);
    assert!(matches!(sys.pair_mut(1, 1), Err(SimError::SelfLink(1))));
}

#[test]
fn out_of_range_link_is_rejected() {
    let particles = vec![particle_at(0.0, 0.0, 0.0), particle_at(1.0, 0.0, 0.0)];
    let links = vec![SpringLink::new(0, 2, 1.0).unwrap()];
    let err = ParticleSystem::new(particles, links).unwrap_err();
    assert_eq!(err, SimError::LinkOutOfBounds { a: 0, b: 2, len: 2 });
}

#[test]
fn pair_mut_returns_requested_order() {
    let mut sys = two_particle_system(2.0, 1.0);
    let (b, a) = sys.pair_mut(1, 0).unwrap();
    assert!(b.position.x > 0.0 && a.position.x < 0.0, "pair_mut swapped its results");
}

// ==================================================================================
// Single-particle force tests
// ==================================================================================

#[test]
fn wall_force_scales_with_depth() {
    let wall = Wall {
        plane: Plane::new(0.0, 1.0, 0.0, 0.0),
        force: 100.0,
    };

    let above = wall.force_on(&particle_at(0.0, 1.0, 0.0));
    let shallow = wall.force_on(&particle_at(0.0, -1.0, 0.0));
    let deep = wall.force_on(&particle_at(0.0, -2.0, 0.0));

    assert!(above.is_identity(), "Wall pushed a particle in front of it");
    assert!(shallow.displacement.y > 0.0, "Wall should push along its normal");
    assert!(close(deep.charge(), 2.0 * shallow.charge(), 1e-9), "Penalty is not depth-scaled");
    assert!(close(shallow.charge(), 100.0, 1e-9));
}

#[test]
fn wind_follows_cosine_and_advances_with_update() {
    let mut wind = Wind::new(NVec3::new(0.0, 1.0, 0.5), NVec3::new(0.0, 10.0, 4.0));
    let f0 = wind.force();
    assert!(close(f0.displacement.y, 10.0, 1e-12) && close(f0.displacement.z, 4.0, 1e-12));

    wind.update(0.5);
    let f1 = wind.force();
    assert!(close(f1.displacement.y, -10.0, 1e-9), "cos(π) expected, got {:?}", f1);
    assert!(close(f1.displacement.z, 0.0, 1e-9), "cos(π/2) expected, got {:?}", f1);
    assert!(close(wind.time(), 0.5, 1e-12));
}

#[test]
fn viscosity_opposes_velocity() {
    let drag = Viscosity { coefficient: 0.5 };
    let mut p = particle_at(0.0, 0.0, 0.0);
    p.mass = 2.0;
    p.velocity = Translator::new(4.0, 1.0, 0.0, 0.0);

    let f = drag.force_on(&p);
    assert!(close(f.displacement.x, -1.0, 1e-12), "Drag was {:?}", f);
}

#[test]
fn force_set_sums_terms() {
    let particles = vec![particle_at(0.0, -1.0, 0.0)];
    let forces = ForceSet::new()
        .with(Force::Constant(ConstantForce::gravity(5.0)))
        .with(Force::Wall(Wall {
            plane: Plane::new(0.0, 1.0, 0.0, 0.0),
            force: 5.0,
        }));

    let f = forces.force_on(0, &particles);
    assert!(f.charge() < 1e-12, "Gravity and wall should cancel, got {:?}", f);
    assert_eq!(forces.len(), 2);
}

// ==================================================================================
// Density tests
// ==================================================================================

/// Deterministic cloud of particles, no rand needed
fn particle_cloud(n: usize, spread: f64) -> Vec<Particle> {
    (0..n)
        .map(|i| {
            let i_f = i as f64;
            particle_at(
                (i_f * 0.37).sin() * spread,
                (i_f * 0.13).cos() * spread,
                (i_f * 0.07).sin() * spread,
            )
        })
        .collect()
}

fn assert_index_consistent(grid: &DensityGrid, particles: &[Particle]) {
    assert_eq!(grid.len(), particles.len());
    for (i, p) in particles.iter().enumerate() {
        let cell = grid.cell_of(&p.position);
        assert_eq!(grid.recorded_cell(i), Some(cell), "Particle {} filed under a stale cell", i);
        let hits = grid.particles_in(&cell).iter().filter(|&&j| j == i).count();
        assert_eq!(hits, 1, "Particle {} appears {} times in its cell", i, hits);
    }
    let filed: usize = grid.occupied_cells().map(|(_, v)| v.len()).sum();
    assert_eq!(filed, particles.len(), "Index holds extra entries");
}

#[test]
fn grid_cells_round_to_nearest_center() {
    let grid = DensityGrid::new(2.0).unwrap();
    assert_eq!(grid.cell_of(&NPoint3::new(0.9, -1.1, 3.2)), [0, -1, 2]);
    assert_eq!(grid.cell_in_space(&[1, -1, 0]), NPoint3::new(2.0, -2.0, 0.0));
    assert_eq!(grid.reach(3.0), 2);
}

#[test]
fn grid_rejects_bad_cell_size() {
    assert!(matches!(DensityGrid::new(0.0), Err(SimError::InvalidCellSize(_))));
    assert!(matches!(Density::new(1.0, 1.0, -1.0), Err(SimError::InvalidCellSize(_))));
}

#[test]
fn grid_stays_consistent_after_moves() {
    let mut particles = particle_cloud(200, 5.0);
    let mut grid = DensityGrid::new(1.0).unwrap();
    grid.rebuild(&particles);
    assert_index_consistent(&grid, &particles);

    for round in 0..5 {
        for (i, p) in particles.iter_mut().enumerate() {
            let shift = NVec3::new(0.3 * round as f64, -0.7, (i as f64 * 0.11).sin());
            p.position += shift;
        }
        let moved = grid.refresh(&particles);
        assert!(moved <= particles.len());
        assert_index_consistent(&grid, &particles);
    }
}

#[test]
fn relocate_reports_cell_changes() {
    let particles = vec![particle_at(0.0, 0.0, 0.0)];
    let mut grid = DensityGrid::new(1.0).unwrap();
    grid.rebuild(&particles);

    assert!(!grid.relocate(0, &NPoint3::new(0.2, 0.0, 0.0)), "Same cell reported as a move");
    assert!(grid.relocate(0, &NPoint3::new(1.2, 0.0, 0.0)), "Cell change not reported");
    assert!(grid.particles_in(&[0, 0, 0]).is_empty(), "Old cell still holds the particle");
    assert_eq!(grid.particles_in(&[1, 0, 0]), &[0]);
}

#[test]
fn nearby_particles_is_a_superset() {
    let particles = particle_cloud(300, 4.0);
    let mut grid = DensityGrid::new(0.7).unwrap();
    grid.rebuild(&particles);
    let radius = 1.3;

    let mut candidates = Vec::new();
    for origin in particles.iter().step_by(17) {
        grid.nearby_particles(&origin.position, radius, &mut candidates);
        for (j, q) in particles.iter().enumerate() {
            if (q.position - origin.position).norm() <= radius {
                assert!(candidates.contains(&j), "Neighbor {} missing from candidates", j);
            }
        }
    }
}

#[test]
fn nearby_cells_cover_the_ball() {
    let grid = DensityGrid::new(1.0).unwrap();
    let mut cells = Vec::new();
    let center = NPoint3::new(0.45, 0.0, 0.0);
    grid.nearby_cells(&center, 1.0, &mut cells);

    // the point at distance 1 along +x lies in cell [1, 0, 0]
    assert!(cells.contains(&[1, 0, 0]));
    assert!(cells.contains(&[-1, 0, 0]));
    let limit = 1.0 + 0.5 * 3f64.sqrt();
    for cell in &cells {
        let d = (grid.cell_in_space(cell) - center).norm();
        assert!(d <= limit, "Cell {:?} at {} cannot touch the ball", cell, d);
    }
}

#[test]
fn falloff_decreases_to_zero_at_radius() {
    let density = Density::new(500.0, 2.0, 1.0).unwrap();

    assert!(close(density.falloff(0.0), 500.0, 1e-12), "Falloff at 0 was {}", density.falloff(0.0));
    assert_eq!(density.falloff(2.0), 0.0);
    assert_eq!(density.falloff(3.0), 0.0);

    let mut last = f64::INFINITY;
    for k in 0..=40 {
        let f = density.falloff(k as f64 * 0.05);
        assert!(f <= last, "Falloff increased at d = {}", k as f64 * 0.05);
        last = f;
    }
}

#[test]
fn density_repulsion_pushes_apart_symmetrically() {
    let particles = vec![particle_at(0.0, 0.0, 0.0), particle_at(1.0, 0.0, 0.0), particle_at(9.0, 0.0, 0.0)];
    let mut density = Density::new(500.0, 2.0, 1.0).unwrap();
    density.set_particles(&particles);

    let f0 = density.force_on(0, &particles);
    let f1 = density.force_on(1, &particles);
    let f2 = density.force_on(2, &particles);

    assert!(f0.displacement.x < 0.0 && f1.displacement.x > 0.0, "Repulsion direction wrong");
    assert!((f0 + f1).charge() < 1e-9, "Repulsion not symmetric");
    assert!(close(f0.charge(), density.falloff(1.0), 1e-9));
    assert!(f2.is_identity(), "Isolated particle felt repulsion");
}

#[test]
fn density_skips_coincident_neighbors() {
    let particles = vec![particle_at(0.5, 0.5, 0.5), particle_at(0.5, 0.5, 0.5)];
    let mut density = Density::new(500.0, 2.0, 1.0).unwrap();
    density.set_particles(&particles);

    let f = density.force_on(0, &particles);
    assert!(f.is_identity(), "Coincident neighbor produced {:?}", f);
}

#[test]
fn far_flung_particles_do_not_overflow_the_cell_walk() {
    // keys saturate at the edge of the i32 range this far out
    let particles = vec![
        particle_at(3e9, 0.0, 0.0),
        particle_at(0.0, 0.0, 0.0),
        particle_at(3e9 + 0.5, 0.0, 0.0),
        particle_at(-3e9, -3e9, -3e9),
    ];
    let mut density = Density::new(500.0, 2.0, 1.0).unwrap();
    density.set_particles(&particles);
    assert_eq!(density.grid().cell_of(&particles[0].position)[0], i32::MAX);

    let far = density.force_on(0, &particles);
    assert!(far.displacement.x < 0.0, "Far pair sharing the edge cell did not repel: {:?}", far);
    assert!(density.force_on(1, &particles).is_identity(), "Origin felt a far particle");
    assert!(density.force_on(3, &particles).is_identity());

    let mut cells = Vec::new();
    density.grid().nearby_cells(&particles[3].position, 2.0, &mut cells);
    assert!(cells.iter().all(|c| c.iter().all(|&k| k <= 0)), "Walk wrapped around: {:?}", cells);
    let mut candidates = Vec::new();
    density.grid().nearby_particles(&particles[0].position, 2.0, &mut candidates);
    assert!(!candidates.contains(&1), "Walk wrapped around to the origin");
}

#[test]
fn apply_moves_only_looks_at_changed_positions() {
    let mut particles = vec![particle_at(0.0, 0.0, 0.0), particle_at(5.0, 0.0, 0.0)];
    let mut grid = DensityGrid::new(1.0).unwrap();
    grid.rebuild(&particles);

    let old = particles[0].position;
    particles[0].position = NPoint3::new(2.2, 0.0, 0.0);
    let moves = vec![
        Moved {
            old,
            new: particles[0].position,
        },
        Moved {
            old: particles[1].position,
            new: particles[1].position,
        },
    ];

    assert_eq!(grid.apply_moves(&moves, &particles), 1);
    assert_index_consistent(&grid, &particles);

    // an unchanged position is trusted, even against a stale record
    particles[1].position = NPoint3::new(-4.0, 0.0, 0.0);
    let still = vec![
        Moved {
            old: particles[0].position,
            new: particles[0].position,
        },
        Moved {
            old: particles[1].position,
            new: particles[1].position,
        },
    ];
    assert_eq!(grid.apply_moves(&still, &particles), 0);
    assert_eq!(grid.recorded_cell(1), Some([5, 0, 0]));
}

// ==================================================================================
// Drape tests
// ==================================================================================

#[test]
fn drape_builds_expected_topology() {
    let sys = draped_system(4, DrapeAnchors::Corners);

    assert_eq!(sys.len(), 16);
    let locked: Vec<usize> = (0..sys.len()).filter(|&i| sys.particles[i].locked).collect();
    assert_eq!(locked, vec![0, 3, 12, 15]);

    let structural = sys.links().iter().filter(|l| close(l.length(), 1.0, 1e-12)).count();
    let shear = sys
        .links()
        .iter()
        .filter(|l| close(l.length(), std::f64::consts::SQRT_2, 1e-12))
        .count();
    assert_eq!(structural, 24, "Structural link count");
    assert_eq!(shear, 18, "Shear link count");

    let degree: usize = (0..sys.len()).map(|i| sys.incidence().of(i).len()).sum();
    assert_eq!(degree, 2 * sys.links().len(), "Incidence table incomplete");
}

#[test]
fn drape_links_join_neighbors_at_rest_length() {
    let sys = draped_system(5, DrapeAnchors::None);
    for link in sys.links() {
        let d = (sys.particles[link.a()].position - sys.particles[link.b()].position).norm();
        assert!(close(d, link.length(), 1e-12), "Link {:?} not at rest", link);
    }
}

#[test]
fn drape_direction_picks_the_plane() {
    let mut particles = Vec::new();
    let mut links = Vec::new();
    let mut params = sheet(3, DrapeAnchors::None);

    params.direction = DrapeDirection::Xy;
    drape(&mut particles, &mut links, &params).unwrap();
    assert!(particles.iter().all(|p| p.position.z == 0.0), "Xy drape left the plane");

    params.direction = DrapeDirection::Zy;
    drape(&mut particles, &mut links, &params).unwrap();
    assert!(particles.iter().all(|p| p.position.x == 0.0), "Zy drape left the plane");
    assert_eq!(particles.len(), 9, "Drape did not clear the containers");
}

#[test]
fn drape_anchor_patterns() {
    let locked = |anchors: DrapeAnchors| -> Vec<usize> {
        let sys = draped_system(4, anchors);
        (0..sys.len()).filter(|&k| sys.particles[k].locked).collect()
    };

    assert_eq!(locked(DrapeAnchors::None), Vec::<usize>::new());
    assert_eq!(locked(DrapeAnchors::Corners), vec![0, 3, 12, 15]);
    assert_eq!(locked(DrapeAnchors::Edges), vec![0, 1, 2, 3, 4, 7, 8, 11, 12, 13, 14, 15]);
    assert_eq!(locked(DrapeAnchors::Center), vec![10]);
    assert_eq!(locked(DrapeAnchors::TwoCorners), vec![0, 3]);
    assert_eq!(locked(DrapeAnchors::TwoCorners2), vec![3, 15]);
    assert_eq!(locked(DrapeAnchors::OneEdge), vec![0, 1, 2, 3]);
    assert_eq!(locked(DrapeAnchors::OneEdge2), vec![3, 7, 11, 15]);
    assert_eq!(DrapeAnchors::OneEdge2.next(), DrapeAnchors::None);
}

#[test]
fn drape_rejects_empty_grid() {
    let mut particles = Vec::new();
    let mut links = Vec::new();
    let err = drape(&mut particles, &mut links, &sheet(0, DrapeAnchors::Corners));
    assert_eq!(err, Err(SimError::EmptyGrid(0)));
}

// ==================================================================================
// Integrator tests
// ==================================================================================

#[test]
fn parallel_link_forces_match_serial() {
    let mut sys = draped_system(8, DrapeAnchors::Corners);
    for (i, p) in sys.particles.iter_mut().enumerate() {
        let i_f = i as f64;
        p.position += NVec3::new((i_f * 0.3).sin() * 0.2, (i_f * 0.7).cos() * 0.2, 0.0);
        p.velocity = Translator::from_vector(NVec3::new(0.0, (i_f * 0.5).sin(), 0.1));
    }
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };

    let mut parallel = sys.clone();
    let mut serial = sys;
    prepare_link_forces(&mut parallel, &spring);
    prepare_link_forces_serial(&mut serial, &spring).unwrap();

    for (a, b) in parallel.particles.iter().zip(&serial.particles) {
        assert!((a.force - b.force).charge() < 1e-9, "Parallel {:?} vs serial {:?}", a.force, b.force);
    }
}

#[test]
fn step_resets_every_accumulator() {
    let mut sys = draped_system(6, DrapeAnchors::Corners);
    let mut forces = ForceSet::new().with(Force::Constant(ConstantForce::gravity(5.0)));
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let mut profiler = Profiler::new();

    for _ in 0..5 {
        step(&mut sys, &mut forces, &spring, DT, &mut profiler);
    }

    assert!(sys.particles.iter().all(|p| p.force.is_identity()), "A force accumulator survived the tick");
    let names: Vec<&str> = profiler.laps().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["links", "particles", "integrate", "index"]);
    assert!(profiler.get("links").is_some());
    assert!(profiler.get("projection").is_none(), "Unknown phase reported");
    assert!(profiler.total() >= profiler.get("integrate").unwrap());
}

#[test]
fn step_keeps_locked_particles_in_place() {
    let mut sys = draped_system(5, DrapeAnchors::Corners);
    let before: Vec<NPoint3> = sys.points();
    let mut forces = ForceSet::new().with(Force::Constant(ConstantForce::gravity(5.0)));
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let mut profiler = Profiler::new();

    for _ in 0..50 {
        step(&mut sys, &mut forces, &spring, DT, &mut profiler);
    }

    let mut free_height = 0.0;
    let mut free = 0;
    for (i, p) in sys.particles.iter().enumerate() {
        if p.locked {
            assert_eq!(p.position, before[i], "Locked particle {} moved", i);
        } else {
            free_height += p.position.y;
            free += 1;
        }
    }
    assert!(free_height / (free as f64) < 0.0, "Free particles did not sag");
}

#[test]
fn gravity_integrates_semi_implicitly() {
    let mut sys = ParticleSystem::new(vec![particle_at(0.0, 0.0, 0.0)], Vec::new()).unwrap();
    let g = 5.0;
    let mut forces = ForceSet::new().with(Force::Constant(ConstantForce::gravity(g)));
    let spring = Spring {
        stiffness: 0.0,
        viscosity: 0.0,
    };
    let mut profiler = Profiler::new();
    let k = 10;

    for _ in 0..k {
        step(&mut sys, &mut forces, &spring, DT, &mut profiler);
    }

    let p = &sys.particles[0];
    let speed = p.velocity.charge();
    let expected_y = -g * DT * DT * (k * (k + 1)) as f64 / 2.0;
    assert!(close(speed, g * k as f64 * DT, 1e-12), "Speed was {}", speed);
    assert!(close(p.position.y, expected_y, 1e-12), "Height was {}, expected {}", p.position.y, expected_y);
    assert!(close(sys.t, k as f64 * DT, 1e-12));
}

#[test]
fn two_particle_spring_one_tick() {
    let mut sys = two_particle_system(2.0, 1.0);
    let mut forces = ForceSet::new();
    let spring = Spring {
        stiffness: 10.0,
        viscosity: 0.0,
    };
    let mut profiler = Profiler::new();

    step(&mut sys, &mut forces, &spring, DT, &mut profiler);

    // f = -k (1 - L/d) (p0 - p1) = 10 along +x on p0
    let p0 = &sys.particles[0];
    let p1 = &sys.particles[1];
    assert!(close(p0.velocity.displacement.x, 10.0 * DT, 1e-12));
    assert!(close(p0.position.x, -1.0 + 10.0 * DT * DT, 1e-12), "p0 at {}", p0.position.x);
    assert!(close(p1.position.x, 1.0 - 10.0 * DT * DT, 1e-12), "p1 at {}", p1.position.x);
}

#[test]
fn wind_advances_once_per_tick() {
    let mut sys = draped_system(6, DrapeAnchors::Corners);
    let mut forces = ForceSet::new().with(Force::Wind(Wind::new(
        NVec3::new(0.0, 5.0, 0.5),
        NVec3::new(0.0, 10.0, 10.0),
    )));
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let mut profiler = Profiler::new();

    for _ in 0..7 {
        step(&mut sys, &mut forces, &spring, DT, &mut profiler);
    }

    let time = forces.wind_mut().map(|w| w.time()).unwrap();
    assert!(close(time, 7.0 * DT, 1e-12), "Wind time {} after 7 ticks of 36 particles", time);
}

#[test]
fn step_keeps_density_index_current() {
    let mut sys = draped_system(8, DrapeAnchors::None);
    let mut forces = ForceSet::new()
        .with(Force::Constant(ConstantForce::gravity(50.0)))
        .with(Force::Density(Density::new(500.0, 0.8, 0.5).unwrap()));
    forces.set_particles(&sys.particles);
    let spring = Spring {
        stiffness: 3000.0,
        viscosity: 2.5,
    };
    let mut profiler = Profiler::new();

    let mut changed = 0;
    for _ in 0..30 {
        changed += step(&mut sys, &mut forces, &spring, DT, &mut profiler).changed_cells;
    }

    assert!(changed > 0, "Falling sheet never changed cell");
    assert_index_consistent(forces.density().unwrap().grid(), &sys.particles);
}

#[test]
fn clock_measures_monotonic_time() {
    let mut clock = Clock::new();
    std::thread::sleep(Duration::from_millis(2));
    clock.tick();
    let first = clock.delta();
    clock.tick();

    assert!(first >= 0.002, "Delta {} shorter than the sleep", first);
    assert!(clock.elapsed() >= first, "Elapsed behind the first delta");
}

#[test]
fn force_prepare_accumulates_into_one_particle() {
    let mut particles = vec![particle_at(0.0, 0.0, 0.0), particle_at(0.5, 0.0, 0.0)];
    let gravity = Force::Constant(ConstantForce::gravity(2.0));
    gravity.prepare_force(1, &mut particles);
    gravity.prepare_force(1, &mut particles);

    assert!(particles[0].force.is_identity(), "Force leaked to another particle");
    assert!(close(particles[1].force.displacement.y, -4.0, 1e-12));

    let mut density = Density::new(500.0, 2.0, 1.0).unwrap();
    density.set_particles(&particles);
    density.prepare_force(0, &mut particles);
    assert!(particles[0].force.displacement.x < 0.0, "Repulsion not accumulated");
}

#[test]
fn engine_step_policy() {
    let mut engine = Engine {
        thread_mode: ThreadMode::Inline,
        fixed_dt: None,
        max_dt: 0.01,
        tick_rate: None,
    };
    assert_eq!(engine.step_dt(0.004), 0.004);
    assert_eq!(engine.step_dt(0.5), 0.01, "Measured delta not clamped");

    engine.fixed_dt = Some(0.002);
    assert_eq!(engine.step_dt(0.5), 0.002, "Fixed step not honored");

    engine.fixed_dt = None;
    assert_eq!(engine.step_dt(-0.3), 0.0);
    assert_eq!(engine.step_dt(f64::NAN), 0.0, "NaN delta should not step");
}

#[test]
fn integrate_reports_every_move() {
    let mut sys = draped_system(4, DrapeAnchors::Corners);
    for p in sys.particles.iter_mut() {
        p.velocity = Translator::new(1.0, 0.0, -1.0, 0.0);
    }

    let moves = integrate(&mut sys, DT);

    assert_eq!(moves.len(), sys.len());
    for (p, m) in sys.particles.iter().zip(&moves) {
        assert_eq!(m.new, p.position);
        assert_eq!(m.old == m.new, p.locked, "Move reported for {:?}", m);
    }
}

// ==================================================================================
// Scenario tests
// ==================================================================================

#[test]
fn scenario_builds_from_config() {
    let cfg = test_config(
        6,
        vec![
            ForceConfig::Gravity { magnitude: 5.0 },
            ForceConfig::Wall {
                plane: [0.0, 1.0, 0.0, 10.0],
                force: 1000.0,
            },
            ForceConfig::Density {
                repulsion: 500.0,
                lookup_radius: 0.5,
                cell_size: 1.0,
            },
        ],
    );
    let scenario = Scenario::build_scenario(cfg).unwrap();

    assert_eq!(scenario.system.len(), 36);
    assert_eq!(scenario.forces.len(), 3);
    assert_eq!(scenario.forces.density().unwrap().grid().len(), 36, "Density not indexed at build");
    assert_eq!(scenario.ticks(), 0);
}

#[test]
fn scenario_reset_is_idempotent() {
    let cfg = test_config(5, vec![ForceConfig::Gravity { magnitude: 5.0 }]);
    let fresh = Scenario::build_scenario(cfg.clone()).unwrap();
    let mut used = Scenario::build_scenario(cfg).unwrap();

    for _ in 0..40 {
        used.tick(DT);
    }
    used.reset().unwrap();
    used.reset().unwrap();

    assert_eq!(used.system.particles, fresh.system.particles, "Reset did not restore the drape");
    assert_eq!(used.system.links(), fresh.system.links());
    assert_eq!(used.ticks(), 0);
}

#[test]
fn scenario_edits_apply_between_ticks() {
    let cfg = test_config(4, vec![ForceConfig::Gravity { magnitude: 5.0 }]);
    let mut scenario = Scenario::build_scenario(cfg).unwrap();

    scenario.apply_edit(ParameterEdit::Stiffness(1234.0)).unwrap();
    assert_eq!(scenario.parameters.spring().stiffness, 1234.0);

    scenario.apply_edit(ParameterEdit::Anchors(DrapeAnchors::None)).unwrap();
    assert!(scenario.system.particles.iter().all(|p| !p.locked), "Anchors edit did not relock");

    scenario.apply_edit(ParameterEdit::Mass(2.0)).unwrap();
    assert!(scenario.system.particles.iter().all(|p| p.mass == 2.0));

    scenario.apply_edit(ParameterEdit::AirDrag(0.3)).unwrap();
    assert!(scenario.forces.iter().any(|f| matches!(f, Force::Viscosity(v) if v.coefficient == 0.3)));

    scenario.apply_edit(ParameterEdit::GridSize(3)).unwrap();
    assert_eq!(scenario.system.len(), 16, "Grid size must wait for a reset");
    scenario.apply_edit(ParameterEdit::Reset).unwrap();
    assert_eq!(scenario.system.len(), 9);
}

#[test]
fn scenario_rejects_invalid_edits() {
    let cfg = test_config(4, vec![ForceConfig::Gravity { magnitude: 5.0 }]);
    let mut scenario = Scenario::build_scenario(cfg).unwrap();

    assert_eq!(scenario.apply_edit(ParameterEdit::GridSize(0)), Err(SimError::EmptyGrid(0)));
    assert_eq!(
        scenario.apply_edit(ParameterEdit::ParticleOfInterest(99)),
        Err(SimError::ParticleOutOfBounds { index: 99, len: 16 })
    );
    // edits aimed at absent forces are ignored
    assert!(scenario.apply_edit(ParameterEdit::Repulsion(10.0)).is_ok());
    assert!(scenario.apply_edit(ParameterEdit::GroundPlane([0.0, 1.0, 0.0, 1.0])).is_ok());
}

#[test]
fn pinch_kicks_the_particle_of_interest() {
    let cfg = test_config(4, Vec::new());
    let mut scenario = Scenario::build_scenario(cfg).unwrap();

    scenario.apply_edit(ParameterEdit::ParticleOfInterest(5)).unwrap();
    scenario.apply_edit(ParameterEdit::PinchDirection(NVec3::new(0.0, 2.0, 0.0))).unwrap();
    scenario.apply_edit(ParameterEdit::PinchForce(100.0)).unwrap();
    scenario.apply_edit(ParameterEdit::Pinch).unwrap();

    let v = scenario.system.particles[5].velocity.displacement;
    assert!(close(v.y, 100.0 * DT, 1e-12), "Pinch velocity was {:?}", v);
    assert!(scenario.system.particles[6].velocity.is_identity(), "Pinch hit another particle");
}

#[test]
fn gravity_edit_adds_missing_term() {
    let cfg = test_config(3, Vec::new());
    let mut scenario = Scenario::build_scenario(cfg).unwrap();
    assert!(scenario.forces.is_empty());

    scenario.apply_edit(ParameterEdit::Gravity(9.0)).unwrap();
    assert_eq!(scenario.forces.len(), 1);
    scenario.apply_edit(ParameterEdit::Gravity(1.0)).unwrap();
    assert_eq!(scenario.forces.len(), 1, "Second gravity edit added another term");
}

#[test]
fn cell_size_edit_reindexes() {
    let cfg = test_config(
        4,
        vec![ForceConfig::Density {
            repulsion: 500.0,
            lookup_radius: 0.5,
            cell_size: 1.0,
        }],
    );
    let mut scenario = Scenario::build_scenario(cfg).unwrap();

    scenario.apply_edit(ParameterEdit::CellSize(3.0)).unwrap();
    let grid = scenario.forces.density().unwrap().grid();
    assert_eq!(grid.cell_size(), 3.0);
    assert_index_consistent(grid, &scenario.system.particles);

    assert!(matches!(
        scenario.apply_edit(ParameterEdit::CellSize(0.0)),
        Err(SimError::InvalidCellSize(_))
    ));
}

#[test]
fn scenario_rejects_bad_time_steps() {
    let bad_max = |max_dt: f64| {
        let mut cfg = test_config(3, Vec::new());
        cfg.engine.fixed_dt = None;
        cfg.engine.max_dt = max_dt;
        Scenario::build_scenario(cfg).err()
    };
    assert_eq!(
        bad_max(-0.01),
        Some(SimError::InvalidTimeStep {
            name: "max_dt",
            value: -0.01
        })
    );
    assert!(matches!(bad_max(0.0), Some(SimError::InvalidTimeStep { name: "max_dt", .. })));
    assert!(matches!(bad_max(f64::NAN), Some(SimError::InvalidTimeStep { name: "max_dt", .. })));
    assert!(bad_max(0.01).is_none());

    let mut cfg = test_config(3, Vec::new());
    cfg.engine.fixed_dt = Some(0.0);
    assert!(matches!(
        Scenario::build_scenario(cfg),
        Err(SimError::InvalidTimeStep { name: "fixed_dt", .. })
    ));

    let mut cfg = test_config(3, Vec::new());
    cfg.engine.tick_rate = Some(-60.0);
    assert!(matches!(
        Scenario::build_scenario(cfg),
        Err(SimError::InvalidTimeStep { name: "tick_rate", .. })
    ));
}

// ==================================================================================
// Snapshot and threading tests
// ==================================================================================

#[test]
fn snapshot_projects_points_and_lines() {
    let cfg = test_config(
        4,
        vec![
            ForceConfig::Gravity { magnitude: 5.0 },
            ForceConfig::Density {
                repulsion: 500.0,
                lookup_radius: 1.5,
                cell_size: 1.0,
            },
        ],
    );
    let mut scenario = Scenario::build_scenario(cfg).unwrap();
    scenario.tick(DT);

    let snap = scenario.snapshot();
    assert_eq!(snap.points.len(), 16);
    assert_eq!(snap.lines.len(), scenario.system.links().len());
    assert_eq!(snap.lines, scenario.system.lines());
    assert_eq!(snap.points, scenario.system.points());
    assert_eq!(snap.locked, vec![0, 3, 12, 15]);
    assert_eq!(snap.ticks, 1);
    assert!(snap.density.is_some(), "Density index not copied");

    let mut near = Vec::new();
    snap.neighbors_of_interest(&mut near);
    assert!(near.contains(&1) && near.contains(&4), "Grid neighbors of particle 0 missing: {:?}", near);
    assert!(!near.contains(&0), "Particle of interest listed as its own neighbor");
}

#[test]
fn snapshot_buffer_flips_on_publish() {
    let buffer = SnapshotBuffer::new();
    assert_eq!(buffer.version(), 0);

    buffer.publish(|s| s.points = vec![NPoint3::new(1.0, 0.0, 0.0)]);
    buffer.publish(|s| s.points = vec![NPoint3::new(2.0, 0.0, 0.0)]);

    assert_eq!(buffer.version(), 2);
    let x = buffer.read(|s| s.points[0].x);
    assert_eq!(x, 2.0, "Reader did not see the latest publish");
    assert_eq!(buffer.latest().points.len(), 1);
}

#[test]
fn simulation_thread_runs_and_stops() {
    let mut cfg = test_config(4, vec![ForceConfig::Gravity { magnitude: 5.0 }]);
    cfg.engine.thread_mode = ThreadMode::Threaded;
    cfg.engine.tick_rate = Some(2000.0);
    let scenario = Scenario::build_scenario(cfg).unwrap();

    let mut thread = SimulationThread::spawn(scenario).unwrap();
    let wait_for = |thread: &SimulationThread, version: u64| {
        let deadline = Instant::now() + Duration::from_secs(10);
        while thread.buffer().version() < version && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
    };

    wait_for(&thread, 5);
    assert!(thread.is_running());
    assert!(thread.send(ParameterEdit::Stiffness(777.0)));
    let seen = thread.buffer().version();
    wait_for(&thread, seen + 3);

    let ticks_seen = thread.buffer().read(|s| s.ticks);
    assert!(ticks_seen > 0, "No tick was published");

    let scenario = thread.stop().expect("thread should hand the scenario back");
    assert!(scenario.ticks() >= ticks_seen);
    assert_eq!(scenario.parameters.stiffness, 777.0, "Edit never reached the thread");
    assert!(!thread.is_running());
    assert!(thread.stop().is_none(), "Second stop should be a no-op");
}

// ==================================================================================
// Configuration tests
// ==================================================================================

#[test]
fn config_parses_full_yaml() {
    let text = r#"
engine:
  thread_mode: inline
  fixed_dt: 0.002
drape:
  n: 12
  anchors: one_edge
  direction: zy
spring:
  stiffness: 2000.0
forces:
  - kind: gravity
    magnitude: 9.8
  - kind: wall
    plane: [0.0, 1.0, 0.0, 5.0]
    force: 800.0
  - kind: density
  - kind: wind
    amplitude: [1.0, 0.0, 0.0]
  - kind: viscosity
    coefficient: 0.1
interaction:
  pinch_force: 10.0
"#;
    let cfg = ScenarioConfig::from_yaml(text).unwrap();

    assert_eq!(cfg.engine.thread_mode, ThreadMode::Inline);
    assert_eq!(cfg.engine.fixed_dt, Some(0.002));
    assert_eq!(cfg.drape.n, 12);
    assert_eq!(cfg.drape.anchors, DrapeAnchors::OneEdge);
    assert_eq!(cfg.drape.direction, DrapeDirection::Zy);
    assert_eq!(cfg.spring.viscosity, 2.5, "Missing field should keep its default");
    assert_eq!(cfg.forces.len(), 5);
    assert_eq!(
        cfg.forces[2],
        ForceConfig::Density {
            repulsion: 500.0,
            lookup_radius: 2.0,
            cell_size: 1.0
        }
    );
    assert_eq!(
        cfg.forces[3],
        ForceConfig::Wind {
            frequency: [0.0, 5.0, 0.5],
            amplitude: [1.0, 0.0, 0.0]
        }
    );
    assert_eq!(cfg.interaction.pinch_force, 10.0);

    let scenario = Scenario::build_scenario(cfg).unwrap();
    assert_eq!(scenario.system.len(), 144);
    assert_eq!(scenario.forces.len(), 5);
}

#[test]
fn config_defaults_when_empty() {
    let cfg = ScenarioConfig::from_yaml("{}").unwrap();
    assert_eq!(cfg.drape.n, 16);
    assert_eq!(cfg.spring.stiffness, 3000.0);
    assert_eq!(cfg.engine.thread_mode, ThreadMode::Threaded);
    assert_eq!(cfg.forces, vec![ForceConfig::Gravity { magnitude: 5.0 }]);
}

#[test]
fn config_rejects_unknown_force() {
    let text = "forces:\n  - kind: magnetism\n";
    assert!(ScenarioConfig::from_yaml(text).is_err());
}

// ==================================================================================
// Visualization tests
// ==================================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Points(usize, Rgb),
    Lines(usize, Rgb),
    Plane(NPoint3, NVec3),
}

#[derive(Default)]
struct RecordingRenderer {
    calls: Vec<Call>,
}

impl Renderer for RecordingRenderer {
    fn draw_points(&mut self, points: &[NPoint3], color: Rgb, _size: f32) {
        self.calls.push(Call::Points(points.len(), color));
    }

    fn draw_lines(&mut self, lines: &[(NPoint3, NPoint3)], color: Rgb, _width: f32) {
        self.calls.push(Call::Lines(lines.len(), color));
    }

    fn draw_plane(&mut self, position: &NPoint3, normal: &NVec3, _color: Rgb, _size: f32) {
        self.calls.push(Call::Plane(*position, *normal));
    }
}

fn scene_snapshot() -> Snapshot {
    let cfg = test_config(
        4,
        vec![
            ForceConfig::Wall {
                plane: [0.0, 1.0, 0.0, 3.0],
                force: 100.0,
            },
            ForceConfig::Density {
                repulsion: 500.0,
                lookup_radius: 1.5,
                cell_size: 1.0,
            },
        ],
    );
    Scenario::build_scenario(cfg).unwrap().snapshot()
}

#[test]
fn draw_scene_emits_every_layer() {
    let snap = scene_snapshot();
    let overlay = Overlay {
        links: true,
        locked: true,
        wall: true,
        neighbors: true,
        cells: true,
        lookup_sphere: true,
    };
    let mut renderer = RecordingRenderer::default();
    draw_scene(&mut renderer, &snap, &overlay);

    let calls = &renderer.calls;
    assert!(calls.contains(&Call::Plane(NPoint3::new(0.0, -3.0, 0.0), NVec3::new(0.0, 1.0, 0.0))));
    assert!(calls.contains(&Call::Lines(42, Rgb::GREY)), "Links missing: {:?}", calls);
    assert!(calls.contains(&Call::Points(16, Rgb::WHITE)));
    assert!(calls.contains(&Call::Points(4, Rgb::RED)), "Locked particles missing");
    assert!(calls.contains(&Call::Points(1, Rgb::YELLOW)), "Particle of interest missing");
    assert!(calls.contains(&Call::Lines(72, Rgb::YELLOW)), "Lookup sphere missing: {:?}", calls);

    let cell_edges = calls.iter().find_map(|c| match c {
        Call::Lines(n, color) if *color == Rgb::BLUE => Some(*n),
        _ => None,
    });
    assert!(cell_edges.is_some_and(|n| n > 0 && n % 12 == 0), "Density cells drawn as {:?}", cell_edges);
}

#[test]
fn draw_scene_without_overlay_draws_points_only() {
    let snap = scene_snapshot();
    let mut renderer = RecordingRenderer::default();
    draw_scene(&mut renderer, &snap, &Overlay::none());

    assert_eq!(
        renderer.calls,
        vec![Call::Points(16, Rgb::WHITE), Call::Points(1, Rgb::YELLOW)]
    );
}

#[test]
fn aabb_has_twelve_edges_of_cell_length() {
    let center = NPoint3::new(1.0, 2.0, 3.0);
    let edges = aabb_edges(&center, 2.0);

    assert_eq!(edges.len(), 12);
    for (a, b) in &edges {
        assert!(close((a - b).norm(), 2.0, 1e-12), "Edge length {}", (a - b).norm());
        assert!(close((a - center).norm(), 3f64.sqrt(), 1e-12), "Corner off the cube");
    }
}

#[test]
fn sphere_rings_lie_on_the_sphere() {
    let center = NPoint3::new(0.0, 1.0, 0.0);
    let rings = sphere_rings(&center, 1.5, 16);

    assert_eq!(rings.len(), 48);
    for (a, b) in &rings {
        assert!(close((a - center).norm(), 1.5, 1e-12));
        assert!(close((b - center).norm(), 1.5, 1e-12));
    }
    assert_eq!(sphere_rings(&center, 1.0, 1).len(), 9, "Segments clamp to 3 per ring");
}
