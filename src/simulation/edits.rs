//! Parameter edits coming from the debug UI
//!
//! The UI never touches the simulation state directly: it produces
//! `ParameterEdit`s which the scenario applies between ticks.

use crate::simulation::algebra::NVec3;
use crate::simulation::drape::{DrapeAnchors, DrapeDirection};

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterEdit {
    Stiffness(f64),
    Viscosity(f64), // spring damping
    AirDrag(f64), // coefficient of the viscosity force, if any
    Mass(f64), // every particle
    Gravity(f64), // magnitude along -Y
    Repulsion(f64),
    LookupRadius(f64),
    CellSize(f64),
    Anchors(DrapeAnchors), // relocks the current mesh
    Direction(DrapeDirection), // takes effect on next reset
    GridSize(usize), // takes effect on next reset
    ParticleOfInterest(usize),
    PinchDirection(NVec3),
    PinchForce(f64),
    GroundPlane([f64; 4]), // a, b, c, d
    Reset,
    Pinch,
}
