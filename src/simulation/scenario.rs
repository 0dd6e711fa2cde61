//! Build and drive fully-initialized simulation scenarios
//!
//! Takes a `ScenarioConfig` (YAML-facing) and produces the runtime bundle
//! `Scenario`, containing:
//! - engine settings (`Engine`)
//! - tunable parameters (`Parameters`)
//! - system state (`ParticleSystem`, draped at t = 0)
//! - active single-particle forces (`ForceSet`)
//!
//! `Scenario` is the one orchestrator of the crate: it ticks, resets,
//! applies UI edits and projects its state into a render `Snapshot`. In
//! inline mode it is inserted into Bevy as a `Resource`; in threaded mode it
//! lives on the simulation thread.

use bevy::prelude::Resource;
use ftlog::{debug, info, warn};

use crate::configuration::config::{ForceConfig, ScenarioConfig};
use crate::error::{SimError, SimResult};
use crate::runtime::snapshot::Snapshot;
use crate::simulation::algebra::{NVec3, Plane, Translator};
use crate::simulation::clock::Profiler;
use crate::simulation::density::Density;
use crate::simulation::drape::drape;
use crate::simulation::edits::ParameterEdit;
use crate::simulation::engine::Engine;
use crate::simulation::forces::{ConstantForce, Force, ForceSet, Viscosity, Wall, Wind};
use crate::simulation::integrator::{step, StepReport};
use crate::simulation::params::Parameters;
use crate::simulation::states::ParticleSystem;

/// Runtime bundle of one simulation
#[derive(Resource)]
pub struct Scenario {
    pub engine: Engine,
    pub parameters: Parameters,
    pub system: ParticleSystem,
    pub forces: ForceSet,
    profiler: Profiler,
    ticks: u64, // ticks since last reset
    last_dt: f64, // step of the most recent tick
}

impl Scenario {
    pub fn build_scenario(cfg: ScenarioConfig) -> SimResult<Self> {
        // Engine (runtime) from EngineConfig
        let e_cfg = cfg.engine;
        let engine = Engine {
            thread_mode: e_cfg.thread_mode,
            fixed_dt: e_cfg.fixed_dt,
            max_dt: e_cfg.max_dt,
            tick_rate: e_cfg.tick_rate,
        };
        engine.validate()?;

        // Parameters (runtime) from the drape, spring and interaction sections
        let i_cfg = cfg.interaction;
        let parameters = Parameters {
            n: cfg.drape.n,
            knot: cfg.drape.knot,
            mass: cfg.drape.mass,
            anchors: cfg.drape.anchors,
            direction: cfg.drape.direction,
            stiffness: cfg.spring.stiffness,
            viscosity: cfg.spring.viscosity,
            particle_of_interest: i_cfg.particle_of_interest,
            pinch_direction: NVec3::from(i_cfg.pinch_direction),
            pinch_force: i_cfg.pinch_force,
        };

        // Forces: one term per config entry, in the listed order
        let mut forces = ForceSet::new();
        for f_cfg in &cfg.forces {
            forces.push(build_force(f_cfg)?);
        }

        let last_dt = engine.fixed_dt.unwrap_or(engine.max_dt);
        let mut scenario = Self {
            engine,
            parameters,
            system: ParticleSystem::default(),
            forces,
            profiler: Profiler::new(),
            ticks: 0,
            last_dt,
        };
        scenario.reset()?;

        info!(
            "Built scenario: {} particles, {} links, forces [{}], {:?} mode",
            scenario.system.len(),
            scenario.system.links().len(),
            scenario.forces.iter().map(Force::name).collect::<Vec<_>>().join(", "),
            scenario.engine.thread_mode,
        );

        Ok(scenario)
    }

    /// Rebuild particles and links from the current parameters
    ///
    /// Every density index is rebuilt over the new container.
    pub fn reset(&mut self) -> SimResult<()> {
        let mut particles = Vec::new();
        let mut links = Vec::new();
        drape(&mut particles, &mut links, &self.parameters.drape())?;

        self.system = ParticleSystem::new(particles, links)?;
        self.forces.set_particles(&self.system.particles);
        self.ticks = 0;

        if self.parameters.particle_of_interest >= self.system.len() {
            self.parameters.particle_of_interest = 0;
        }

        info!(
            "Reset drape: n = {}, anchors = {}, {:?}",
            self.parameters.n, self.parameters.anchors, self.parameters.direction
        );
        Ok(())
    }

    /// Advance by one tick of `dt`
    pub fn tick(&mut self, dt: f64) -> StepReport {
        let spring = self.parameters.spring();
        let report = step(&mut self.system, &mut self.forces, &spring, dt, &mut self.profiler);
        self.ticks += 1;
        self.last_dt = dt;
        report
    }

    /// Advance by the engine's step for a measured wall-clock delta
    pub fn tick_measured(&mut self, measured: f64) -> StepReport {
        let dt = self.engine.step_dt(measured);
        self.tick(dt)
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_dt(&self) -> f64 {
        self.last_dt
    }

    pub fn profiler(&self) -> &Profiler {
        &self.profiler
    }

    /// Apply one UI edit between ticks
    pub fn apply_edit(&mut self, edit: ParameterEdit) -> SimResult<()> {
        debug!("Applying edit {:?}", edit);
        match edit {
            ParameterEdit::Stiffness(k) => self.parameters.stiffness = k,
            ParameterEdit::Viscosity(c) => self.parameters.viscosity = c,
            ParameterEdit::AirDrag(c) => match self.forces.viscosity_mut() {
                Some(v) => v.coefficient = c,
                None => self.forces.push(Force::Viscosity(Viscosity { coefficient: c })),
            },
            ParameterEdit::Mass(m) => {
                self.parameters.mass = m;
                for p in &mut self.system.particles {
                    p.mass = m;
                }
            }
            ParameterEdit::Gravity(g) => match self.forces.gravity_mut() {
                Some(c) => *c = ConstantForce::gravity(g),
                None => self.forces.push(Force::Constant(ConstantForce::gravity(g))),
            },
            ParameterEdit::Repulsion(r) => match self.forces.density_mut() {
                Some(d) => d.repulsion_factor = r,
                None => warn!("Repulsion edit ignored: no density force in this scenario"),
            },
            ParameterEdit::LookupRadius(r) => match self.forces.density_mut() {
                Some(d) => d.lookup_radius = r,
                None => warn!("Lookup radius edit ignored: no density force in this scenario"),
            },
            ParameterEdit::CellSize(size) => {
                if let Some(d) = self.forces.density_mut() {
                    d.grid_mut().set_cell_size(size, &self.system.particles)?;
                } else {
                    warn!("Cell size edit ignored: no density force in this scenario");
                }
            }
            ParameterEdit::Anchors(anchors) => {
                self.parameters.anchors = anchors;
                let n = self.parameters.n;
                if self.system.len() == n * n {
                    for (k, p) in self.system.particles.iter_mut().enumerate() {
                        p.locked = anchors.locks(k / n, k % n, n);
                    }
                }
            }
            ParameterEdit::Direction(direction) => self.parameters.direction = direction,
            ParameterEdit::GridSize(n) => {
                if n == 0 {
                    return Err(SimError::EmptyGrid(n));
                }
                self.parameters.n = n;
            }
            ParameterEdit::ParticleOfInterest(index) => {
                if index >= self.system.len() {
                    return Err(SimError::ParticleOutOfBounds {
                        index,
                        len: self.system.len(),
                    });
                }
                self.parameters.particle_of_interest = index;
            }
            ParameterEdit::PinchDirection(direction) => self.parameters.pinch_direction = direction,
            ParameterEdit::PinchForce(force) => self.parameters.pinch_force = force,
            ParameterEdit::GroundPlane([a, b, c, d]) => match self.forces.wall_mut() {
                Some(w) => w.plane = Plane::new(a, b, c, d),
                None => warn!("Ground plane edit ignored: no wall in this scenario"),
            },
            ParameterEdit::Reset => self.reset()?,
            ParameterEdit::Pinch => self.pinch()?,
        }
        Ok(())
    }

    /// One-shot impulse on the particle of interest over the last step
    pub fn pinch(&mut self) -> SimResult<()> {
        let index = self.parameters.particle_of_interest;
        let len = self.system.len();
        let dt = self.last_dt;
        let dir = self.parameters.pinch_direction;
        let impulse = Translator::new(self.parameters.pinch_force, dir.x, dir.y, dir.z);

        let particle = self
            .system
            .particles
            .get_mut(index)
            .ok_or(SimError::ParticleOutOfBounds { index, len })?;
        particle.apply_force(impulse, dt);

        info!("Pinched particle {} with {:.1}", index, self.parameters.pinch_force);
        Ok(())
    }

    /// Project the current state into `out`, reusing its buffers
    pub fn write_snapshot(&self, out: &mut Snapshot) {
        let particles = &self.system.particles;

        out.points.clear();
        out.points.extend(particles.iter().map(|p| p.position));

        out.lines.clear();
        out.lines.extend(
            self.system
                .links()
                .iter()
                .map(|l| (particles[l.a()].position, particles[l.b()].position)),
        );

        out.locked.clear();
        out.locked
            .extend(particles.iter().enumerate().filter(|(_, p)| p.locked).map(|(i, _)| i));

        out.density = match (self.forces.density(), out.density.take()) {
            (Some(d), Some(mut copy)) => {
                copy.clone_from(d.grid());
                Some(copy)
            }
            (Some(d), None) => Some(d.grid().clone()),
            (None, _) => None,
        };
        out.lookup_radius = self.forces.density().map_or(0.0, |d| d.lookup_radius);
        out.wall = self.forces.wall().map(|w| w.plane);

        out.particle_of_interest = self.parameters.particle_of_interest;
        out.t = self.system.t;
        out.ticks = self.ticks;
        out.dt = self.last_dt;
        out.timings.clear();
        out.timings.extend_from_slice(self.profiler.laps());
    }

    /// Owned projection of the current state
    pub fn snapshot(&self) -> Snapshot {
        let mut out = Snapshot::default();
        self.write_snapshot(&mut out);
        out
    }
}

/// Runtime force for one config entry
pub fn build_force(cfg: &ForceConfig) -> SimResult<Force> {
    let force = match *cfg {
        ForceConfig::Gravity { magnitude } => Force::Constant(ConstantForce::gravity(magnitude)),
        ForceConfig::Wall { plane: [a, b, c, d], force } => Force::Wall(Wall {
            plane: Plane::new(a, b, c, d),
            force,
        }),
        ForceConfig::Density {
            repulsion,
            lookup_radius,
            cell_size,
        } => Force::Density(Density::new(repulsion, lookup_radius, cell_size)?),
        ForceConfig::Wind { frequency, amplitude } => {
            Force::Wind(Wind::new(NVec3::from(frequency), NVec3::from(amplitude)))
        }
        ForceConfig::Viscosity { coefficient } => Force::Viscosity(Viscosity { coefficient }),
    };
    Ok(force)
}
