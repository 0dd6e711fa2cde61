//! Procedural cloth ("drape") generation
//!
//! Builds an `n × n` grid of particles centered on the origin, linked by
//! structural springs (axis neighbors, rest length `knot`) and shear springs
//! (diagonal neighbors, rest length `knot·√2`). Particle `(i, j)` has index
//! `i * n + j`.

use std::fmt;

use serde::Deserialize;

use crate::error::{SimError, SimResult};
use crate::simulation::algebra::NPoint3;
use crate::simulation::states::{Particle, SpringLink};

/// Which particles of the grid are locked in place
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrapeAnchors {
    None,
    #[default]
    Corners,
    Edges,
    Center,
    TwoCorners,  // (0, 0) and (0, n-1)
    TwoCorners2, // (0, n-1) and (n-1, n-1)
    OneEdge,     // i == 0
    OneEdge2,    // j == n-1
}

impl DrapeAnchors {
    pub const ALL: [DrapeAnchors; 8] = [
        DrapeAnchors::None,
        DrapeAnchors::Corners,
        DrapeAnchors::Edges,
        DrapeAnchors::Center,
        DrapeAnchors::TwoCorners,
        DrapeAnchors::TwoCorners2,
        DrapeAnchors::OneEdge,
        DrapeAnchors::OneEdge2,
    ];

    /// Whether grid cell `(i, j)` of an `n × n` grid is anchored
    pub fn locks(&self, i: usize, j: usize, n: usize) -> bool {
        let last = n - 1;
        match self {
            DrapeAnchors::None => false,
            DrapeAnchors::Corners => (i == 0 || i == last) && (j == 0 || j == last),
            DrapeAnchors::Edges => i == 0 || i == last || j == 0 || j == last,
            DrapeAnchors::Center => i == n / 2 && j == n / 2,
            DrapeAnchors::TwoCorners => i == 0 && (j == 0 || j == last),
            DrapeAnchors::TwoCorners2 => j == last && (i == 0 || i == last),
            DrapeAnchors::OneEdge => i == 0,
            DrapeAnchors::OneEdge2 => j == last,
        }
    }

    /// Next pattern in [`DrapeAnchors::ALL`], wrapping around
    pub fn next(&self) -> Self {
        let pos = Self::ALL.iter().position(|a| a == self).unwrap_or(0);
        Self::ALL[(pos + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for DrapeAnchors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DrapeAnchors::None => "None",
            DrapeAnchors::Corners => "Corners",
            DrapeAnchors::Edges => "Edges",
            DrapeAnchors::Center => "Center",
            DrapeAnchors::TwoCorners => "Two Corners",
            DrapeAnchors::TwoCorners2 => "Two Corners 2",
            DrapeAnchors::OneEdge => "One Edge",
            DrapeAnchors::OneEdge2 => "One Edge 2",
        };
        f.write_str(name)
    }
}

/// Plane the grid is laid out on
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrapeDirection {
    #[default]
    Xz,
    Xy,
    Zy,
}

impl DrapeDirection {
    pub fn next(&self) -> Self {
        match self {
            DrapeDirection::Xz => DrapeDirection::Xy,
            DrapeDirection::Xy => DrapeDirection::Zy,
            DrapeDirection::Zy => DrapeDirection::Xz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrapeParameters {
    pub n: usize,     // particles per side
    pub mass: f64,    // mass of each particle
    pub knot: f64,    // grid spacing
    pub anchors: DrapeAnchors,
    pub direction: DrapeDirection,
}

/// Fill `particles` and `links` with a fresh drape
///
/// Both containers are cleared first, so calling this twice with the same
/// parameters gives the same layout.
pub fn drape(particles: &mut Vec<Particle>, links: &mut Vec<SpringLink>, params: &DrapeParameters) -> SimResult<()> {
    let DrapeParameters {
        n,
        mass,
        knot,
        anchors,
        direction,
    } = *params;
    if n == 0 {
        return Err(SimError::EmptyGrid(n));
    }

    particles.clear();
    links.clear();
    particles.reserve(n * n);
    links.reserve(2 * n * (n - 1) + 2 * (n - 1) * (n - 1));

    let half = (n / 2) as f64;
    let shear = knot * std::f64::consts::SQRT_2;

    for i in 0..n {
        for j in 0..n {
            let u = (i as f64 - half) * knot;
            let v = (j as f64 - half) * knot;
            let position = match direction {
                DrapeDirection::Xz => NPoint3::new(u, 0.0, v),
                DrapeDirection::Xy => NPoint3::new(u, v, 0.0),
                DrapeDirection::Zy => NPoint3::new(0.0, v, u),
            };
            let mut particle = Particle::new(position, mass);
            particle.locked = anchors.locks(i, j, n);
            particles.push(particle);

            let here = i * n + j;
            if i > 0 {
                links.push(SpringLink::new((i - 1) * n + j, here, knot)?);
            }
            if j > 0 {
                links.push(SpringLink::new(i * n + (j - 1), here, knot)?);
            }
            if i > 0 && j > 0 {
                links.push(SpringLink::new((i - 1) * n + (j - 1), here, shear)?);
                links.push(SpringLink::new(i * n + (j - 1), (i - 1) * n + j, shear)?);
            }
        }
    }

    Ok(())
}
