//! Configuration types for loading simulation scenarios from YAML.
//!
//! This module defines a thin, `serde`-deserializable representation of a
//! simulation scenario. A scenario consists of:
//!
//! - [`EngineConfig`]      – thread mode and time-step policy
//! - [`DrapeConfig`]       – mesh layout (grid side, spacing, anchoring, plane)
//! - [`SpringConfig`]      – spring stiffness and damping
//! - [`ForceConfig`]       – the list of single-particle forces
//! - [`InteractionConfig`] – particle of interest and pinch settings
//! - [`ScenarioConfig`]    – top-level wrapper used to load a scenario from YAML
//!
//! Every section is optional and falls back to the defaults shown below.
//!
//! # YAML format
//!
//! ```yaml
//! engine:
//!   thread_mode: threaded   # or "inline"
//!   fixed_dt: 0.002         # omit to use the measured frame delta
//!   max_dt: 0.01            # clamp on the measured delta
//!   tick_rate: 500.0        # optional cap on simulation ticks per second
//!
//! drape:
//!   n: 16                   # particles per side
//!   mass: 1.0
//!   knot: 1.0               # grid spacing / structural rest length
//!   anchors: corners        # none, corners, edges, center, two_corners,
//!                           # two_corners2, one_edge, one_edge2
//!   direction: xz           # xz, xy or zy
//!
//! spring:
//!   stiffness: 3000.0
//!   viscosity: 2.5
//!
//! forces:
//!   - kind: gravity
//!     magnitude: 5.0
//!   - kind: wall
//!     plane: [0.0, 1.0, 0.0, 10.0]   # a, b, c, d of ax + by + cz + d = 0
//!     force: 1000.0
//!   - kind: density
//!     repulsion: 500.0
//!     lookup_radius: 2.0
//!     cell_size: 1.0
//!   - kind: wind
//!     frequency: [0.0, 5.0, 0.5]
//!     amplitude: [0.0, 10.0, 10.0]
//!   - kind: viscosity
//!     coefficient: 0.1
//!
//! interaction:
//!   particle_of_interest: 0
//!   pinch_direction: [0.0, 1.0, 0.0]
//!   pinch_force: 100000.0
//! ```

use serde::Deserialize;

use crate::simulation::drape::{DrapeAnchors, DrapeDirection};
use crate::simulation::engine::ThreadMode;

pub const DEFAULT_N: usize = 16;
pub const DEFAULT_KNOT: f64 = 1.0;
pub const DEFAULT_STIFFNESS: f64 = 3000.0;
pub const DEFAULT_MASS: f64 = 1.0;
pub const DEFAULT_VISCOSITY: f64 = 2.5;
pub const DEFAULT_GRAVITY: f64 = 5.0;
pub const DEFAULT_PINCH_FORCE: f64 = 100_000.0;
pub const DEFAULT_DENSITY_REPULSION: f64 = 500.0;
pub const DEFAULT_DENSITY_LOOKUP_RADIUS: f64 = 2.0;
pub const DEFAULT_DENSITY_GRID_SIZE: f64 = 1.0;
pub const DEFAULT_WIND_AMPLITUDE: [f64; 3] = [0.0, 10.0, 10.0];
pub const DEFAULT_WIND_FREQUENCY: [f64; 3] = [0.0, 5.0, 0.5];

/// How the simulation is driven
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub thread_mode: ThreadMode, // `threaded` - own thread, `inline` - inside the render loop
    pub fixed_dt: Option<f64>,   // fixed time step, measured delta when absent
    pub max_dt: f64,             // upper bound on the measured delta
    pub tick_rate: Option<f64>,  // ticks per second cap for the simulation thread
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_mode: ThreadMode::Threaded,
            fixed_dt: None,
            max_dt: 0.01,
            tick_rate: None,
        }
    }
}

/// Mesh layout
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DrapeConfig {
    pub n: usize,                  // particles per side
    pub mass: f64,                 // mass of every particle
    pub knot: f64,                 // grid spacing
    pub anchors: DrapeAnchors,     // locked pattern
    pub direction: DrapeDirection, // plane of the grid
}

impl Default for DrapeConfig {
    fn default() -> Self {
        Self {
            n: DEFAULT_N,
            mass: DEFAULT_MASS,
            knot: DEFAULT_KNOT,
            anchors: DrapeAnchors::Corners,
            direction: DrapeDirection::Xz,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SpringConfig {
    pub stiffness: f64,
    pub viscosity: f64,
}

impl Default for SpringConfig {
    fn default() -> Self {
        Self {
            stiffness: DEFAULT_STIFFNESS,
            viscosity: DEFAULT_VISCOSITY,
        }
    }
}

/// One single-particle force of the scenario
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForceConfig {
    Gravity {
        #[serde(default = "default_gravity")]
        magnitude: f64,
    },
    Wall {
        plane: [f64; 4], // a, b, c, d
        force: f64,      // push per unit of penetration
    },
    Density {
        #[serde(default = "default_repulsion")]
        repulsion: f64,
        #[serde(default = "default_lookup_radius")]
        lookup_radius: f64,
        #[serde(default = "default_cell_size")]
        cell_size: f64,
    },
    Wind {
        #[serde(default = "default_wind_frequency")]
        frequency: [f64; 3],
        #[serde(default = "default_wind_amplitude")]
        amplitude: [f64; 3],
    },
    Viscosity {
        coefficient: f64,
    },
}

fn default_gravity() -> f64 {
    DEFAULT_GRAVITY
}

fn default_repulsion() -> f64 {
    DEFAULT_DENSITY_REPULSION
}

fn default_lookup_radius() -> f64 {
    DEFAULT_DENSITY_LOOKUP_RADIUS
}

fn default_cell_size() -> f64 {
    DEFAULT_DENSITY_GRID_SIZE
}

fn default_wind_frequency() -> [f64; 3] {
    DEFAULT_WIND_FREQUENCY
}

fn default_wind_amplitude() -> [f64; 3] {
    DEFAULT_WIND_AMPLITUDE
}

fn default_forces() -> Vec<ForceConfig> {
    vec![ForceConfig::Gravity {
        magnitude: DEFAULT_GRAVITY,
    }]
}

/// Particle of interest and pinch impulse
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct InteractionConfig {
    pub particle_of_interest: usize,
    pub pinch_direction: [f64; 3],
    pub pinch_force: f64,
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            particle_of_interest: 0,
            pinch_direction: [0.0, 1.0, 0.0],
            pinch_force: DEFAULT_PINCH_FORCE,
        }
    }
}

/// Top-level scenario configuration loaded from YAML.
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioConfig {
    #[serde(default)]
    pub engine: EngineConfig, // thread mode and time step
    #[serde(default)]
    pub drape: DrapeConfig, // mesh layout
    #[serde(default)]
    pub spring: SpringConfig, // spring constants
    #[serde(default = "default_forces")]
    pub forces: Vec<ForceConfig>, // single-particle forces, in application order
    #[serde(default)]
    pub interaction: InteractionConfig, // UI-driven interaction defaults
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            drape: DrapeConfig::default(),
            spring: SpringConfig::default(),
            forces: default_forces(),
            interaction: InteractionConfig::default(),
        }
    }
}

impl ScenarioConfig {
    /// Parse a scenario from YAML text
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
