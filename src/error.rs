//! Error types for the simulation core
//!
//! Only precondition violations are errors. Degenerate geometry (coincident
//! particles) is recovered locally by the force that meets it.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    #[error("drape grid needs at least one particle per side, got n = {0}")]
    EmptyGrid(usize),

    #[error("a spring cannot link particle {0} to itself")]
    SelfLink(usize),

    #[error("link ({a}, {b}) points outside a container of {len} particles")]
    LinkOutOfBounds { a: usize, b: usize, len: usize },

    #[error("particle index {index} out of range (len {len})")]
    ParticleOutOfBounds { index: usize, len: usize },

    #[error("grid cell size must be positive and finite, got {0}")]
    InvalidCellSize(f64),

    #[error("engine {name} must be positive and finite, got {value}")]
    InvalidTimeStep { name: &'static str, value: f64 },
}

pub type SimResult<T> = Result<T, SimError>;
