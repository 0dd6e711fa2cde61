pub mod error;
pub mod simulation;
pub mod runtime;
pub mod configuration;
pub mod visualization;
pub mod benchmark;

pub use error::{SimError, SimResult};

pub use simulation::algebra::{NVec3, NPoint3, Translator, Plane};
pub use simulation::states::{Particle, SpringLink, ParticleSystem};
pub use simulation::forces::{Spring, ConstantForce, Wall, Wind, Viscosity, Force, ForceSet};
pub use simulation::density::{CellKey, DensityGrid, Density};
pub use simulation::drape::{drape, DrapeAnchors, DrapeDirection, DrapeParameters};
pub use simulation::integrator::{step, StepReport};
pub use simulation::edits::ParameterEdit;
pub use simulation::scenario::Scenario;

pub use runtime::snapshot::{Snapshot, SnapshotBuffer};
pub use runtime::controller::SimulationThread;

pub use configuration::config::{EngineConfig, DrapeConfig, SpringConfig, ForceConfig, InteractionConfig, ScenarioConfig};

pub use visualization::{draw_scene, Overlay, Renderer, Rgb};
pub use visualization::drapesim_vis3d::run_3d;

pub use benchmark::benchmark::{bench_density, bench_step, bench_step_curve};
