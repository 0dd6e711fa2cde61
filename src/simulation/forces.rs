//! Force generators for the mass-spring engine
//!
//! The set of forces is closed: springs act on link pairs, every other force
//! acts on one particle at a time and is one variant of [`Force`]. A
//! [`ForceSet`] holds the single-particle forces active in a scenario and
//! sums their contributions per particle.

use crate::error::SimResult;
use crate::simulation::algebra::{join_norm, NVec3, Plane, Translator};
use crate::simulation::density::Density;
use crate::simulation::states::{Moved, Particle, ParticleSystem, SpringLink};

/// Damped Hookean spring, shared by every link of the mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Spring {
    pub stiffness: f64, // spring constant
    pub viscosity: f64, // damping on relative velocity
}

impl Spring {
    /// Force on `p1` from a spring of rest length `length` tied to `p2`
    ///
    /// The restoring term `-k (1 - L / d) (p1 - p2)` and the damping term
    /// `-c (v1 - v2)` are composed as translators. Coincident endpoints give
    /// no force.
    pub fn force(&self, length: f64, p1: &Particle, p2: &Particle) -> Translator {
        let distance = join_norm(&p1.position, &p2.position);
        if distance == 0.0 {
            return Translator::identity();
        }
        let delta = p1.position - p2.position;

        let restoring = Translator::from_vector(delta * (-self.stiffness * (1.0 - length / distance)));
        let damping = Translator::from_vector(
            (p1.velocity.displacement - p2.velocity.displacement) * -self.viscosity,
        );

        restoring * damping
    }

    /// Accumulate equal and opposite contributions, each divided by the
    /// receiving particle's mass
    pub fn prepare_force(&self, length: f64, p1: &mut Particle, p2: &mut Particle) {
        let f = self.force(length, p1, p2);
        p1.prepare_force(f / p1.mass);
        p2.prepare_force(-f / p2.mass);
    }

    /// [`Spring::prepare_force`] on the two ends of `link`
    pub fn prepare_link(&self, link: &SpringLink, system: &mut ParticleSystem) -> SimResult<()> {
        let (p1, p2) = system.pair_mut(link.a(), link.b())?;
        self.prepare_force(link.length(), p1, p2);
        Ok(())
    }
}

/// The same force on every particle (gravity)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantForce {
    pub force: Translator,
}

impl ConstantForce {
    /// Downward pull of magnitude `g` along -Y
    pub fn gravity(g: f64) -> Self {
        Self {
            force: Translator::new(g, 0.0, -1.0, 0.0),
        }
    }
}

/// Soft planar wall
///
/// A particle behind the plane is pushed back along the plane normal with a
/// strength proportional to `force` and to its penetration depth. This is a
/// penalty method, not contact resolution: with a stiff push and a large time
/// step a particle can be thrown well past the plane in one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wall {
    pub plane: Plane,
    pub force: f64, // push per unit of depth
}

impl Wall {
    pub fn force_on(&self, particle: &Particle) -> Translator {
        let distance = self.plane.signed_distance(&particle.position);
        if distance >= 0.0 {
            return Translator::identity();
        }
        let n = self.plane.normal;
        Translator::new(self.force * distance.abs(), n.x, n.y, n.z)
    }
}

/// Oscillating wind, `amplitude[axis] * cos(2π frequency[axis] t)` per axis
///
/// `t` advances through [`Wind::update`], once per tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Wind {
    pub frequency: NVec3,
    pub amplitude: NVec3,
    time: f64,
}

impl Wind {
    pub fn new(frequency: NVec3, amplitude: NVec3) -> Self {
        Self {
            frequency,
            amplitude,
            time: 0.0,
        }
    }

    pub fn update(&mut self, dt: f64) {
        self.time += dt;
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn force(&self) -> Translator {
        let tau = std::f64::consts::TAU;
        let phase = |axis: usize| self.amplitude[axis] * (tau * self.frequency[axis] * self.time).cos();
        Translator::from_vector(NVec3::new(phase(0), phase(1), phase(2)))
    }
}

/// Air drag, `-c * v / m`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viscosity {
    pub coefficient: f64,
}

impl Viscosity {
    pub fn force_on(&self, particle: &Particle) -> Translator {
        particle.velocity * (-self.coefficient / particle.mass)
    }
}

/// Single-particle force
#[derive(Debug, Clone)]
pub enum Force {
    Constant(ConstantForce),
    Wall(Wall),
    Density(Density),
    Wind(Wind),
    Viscosity(Viscosity),
}

impl Force {
    pub fn name(&self) -> &'static str {
        match self {
            Force::Constant(_) => "constant",
            Force::Wall(_) => "wall",
            Force::Density(_) => "density",
            Force::Wind(_) => "wind",
            Force::Viscosity(_) => "viscosity",
        }
    }

    /// Contribution of this force to particle `index`
    pub fn force_on(&self, index: usize, particles: &[Particle]) -> Translator {
        let Some(p) = particles.get(index) else {
            return Translator::identity();
        };
        match self {
            Force::Constant(c) => c.force,
            Force::Wall(w) => w.force_on(p),
            Force::Density(d) => d.force_on(index, particles),
            Force::Wind(w) => w.force(),
            Force::Viscosity(v) => v.force_on(p),
        }
    }

    /// Accumulate this force into particle `index`
    pub fn prepare_force(&self, index: usize, particles: &mut [Particle]) {
        let f = self.force_on(index, particles);
        if let Some(p) = particles.get_mut(index) {
            p.prepare_force(f);
        }
    }

    /// Per-tick state that must advance once regardless of particle count
    pub fn advance(&mut self, dt: f64) {
        if let Force::Wind(w) = self {
            w.update(dt);
        }
    }
}

/// Single-particle forces active in a scenario
#[derive(Debug, Clone, Default)]
pub struct ForceSet {
    terms: Vec<Force>,
}

impl ForceSet {
    /// Create an empty force set
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add a force term
    pub fn with(mut self, term: Force) -> Self {
        self.terms.push(term);
        self
    }

    pub fn push(&mut self, term: Force) {
        self.terms.push(term);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Force> {
        self.terms.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Force> {
        self.terms.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sum of every term's contribution to particle `index`
    pub fn force_on(&self, index: usize, particles: &[Particle]) -> Translator {
        self.terms
            .iter()
            .fold(Translator::identity(), |acc, term| acc + term.force_on(index, particles))
    }

    /// Advance time-dependent terms by one tick
    pub fn advance(&mut self, dt: f64) {
        for term in &mut self.terms {
            term.advance(dt);
        }
    }

    /// Re-index every density term over a new particle container
    pub fn set_particles(&mut self, particles: &[Particle]) {
        for term in &mut self.terms {
            if let Force::Density(d) = term {
                d.set_particles(particles);
            }
        }
    }

    /// Bring every density index up to date after particles moved
    ///
    /// Returns how many particles changed cell, summed over density terms.
    pub fn refresh_indices(&mut self, moves: &[Moved], particles: &[Particle]) -> usize {
        let mut changed = 0;
        for term in &mut self.terms {
            if let Force::Density(d) = term {
                changed += d.grid_mut().apply_moves(moves, particles);
            }
        }
        changed
    }

    pub fn density(&self) -> Option<&Density> {
        self.terms.iter().find_map(|t| match t {
            Force::Density(d) => Some(d),
            _ => None,
        })
    }

    pub fn density_mut(&mut self) -> Option<&mut Density> {
        self.terms.iter_mut().find_map(|t| match t {
            Force::Density(d) => Some(d),
            _ => None,
        })
    }

    pub fn gravity_mut(&mut self) -> Option<&mut ConstantForce> {
        self.terms.iter_mut().find_map(|t| match t {
            Force::Constant(c) => Some(c),
            _ => None,
        })
    }

    pub fn wall(&self) -> Option<&Wall> {
        self.terms.iter().find_map(|t| match t {
            Force::Wall(w) => Some(w),
            _ => None,
        })
    }

    pub fn wall_mut(&mut self) -> Option<&mut Wall> {
        self.terms.iter_mut().find_map(|t| match t {
            Force::Wall(w) => Some(w),
            _ => None,
        })
    }

    pub fn wind_mut(&mut self) -> Option<&mut Wind> {
        self.terms.iter_mut().find_map(|t| match t {
            Force::Wind(w) => Some(w),
            _ => None,
        })
    }

    pub fn viscosity_mut(&mut self) -> Option<&mut Viscosity> {
        self.terms.iter_mut().find_map(|t| match t {
            Force::Viscosity(v) => Some(v),
            _ => None,
        })
    }
}
