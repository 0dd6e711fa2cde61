//! Physical parameters of a scenario
//!
//! `Parameters` holds the values the debug UI is allowed to tune between
//! ticks:
//! - mesh layout (grid side, spacing, anchoring, orientation),
//! - spring stiffness and damping, particle mass,
//! - interaction settings (particle of interest, pinch)

use crate::simulation::algebra::NVec3;
use crate::simulation::drape::{DrapeAnchors, DrapeDirection, DrapeParameters};
use crate::simulation::forces::Spring;

#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub n: usize, // particles per side
    pub knot: f64, // rest spacing
    pub mass: f64, // mass per particle
    pub anchors: DrapeAnchors, // locked particles
    pub direction: DrapeDirection, // plane of the drape
    pub stiffness: f64, // spring constant
    pub viscosity: f64, // spring damping
    pub particle_of_interest: usize, // highlighted / pinched particle
    pub pinch_direction: NVec3, // direction of the pinch impulse
    pub pinch_force: f64, // magnitude of the pinch impulse
}

impl Parameters {
    pub fn drape(&self) -> DrapeParameters {
        DrapeParameters {
            n: self.n,
            mass: self.mass,
            knot: self.knot,
            anchors: self.anchors,
            direction: self.direction,
        }
    }

    pub fn spring(&self) -> Spring {
        Spring {
            stiffness: self.stiffness,
            viscosity: self.viscosity,
        }
    }
}
