//! Core state types for the mass-spring simulation
//!
//! - `Particle`: point mass with velocity / force accumulators and a lock
//! - `SpringLink`: index pair plus rest length
//! - `ParticleSystem`: the particle and link containers, plus the link
//!   incidence table used to gather spring forces per particle in parallel

use crate::error::{SimError, SimResult};
use crate::simulation::algebra::{NPoint3, Translator};

/// Point mass
///
/// Forces are accumulated with [`Particle::prepare_force`], turned into
/// velocity by [`Particle::update_force`] and into motion by
/// [`Particle::update`], in that order, once per tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: NPoint3,
    pub velocity: Translator,
    pub force: Translator, // accumulator, neutral between ticks
    pub mass: f64,         // must be > 0
    pub locked: bool,      // frozen in place
}

/// Position change reported by [`Particle::update`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moved {
    pub old: NPoint3,
    pub new: NPoint3,
}

impl Particle {
    pub fn new(position: NPoint3, mass: f64) -> Self {
        Self {
            position,
            velocity: Translator::identity(),
            force: Translator::identity(),
            mass,
            locked: false,
        }
    }

    /// Accumulate a force contribution
    pub fn prepare_force(&mut self, force: Translator) {
        self.force += force;
    }

    /// Turn the accumulated force into velocity and reset the accumulator
    pub fn update_force(&mut self, dt: f64) {
        self.velocity += self.force * dt;
        self.force = Translator::identity();
    }

    /// Move by `velocity * dt`; a locked particle has its velocity zeroed first
    pub fn update(&mut self, dt: f64) -> Moved {
        if self.locked {
            self.velocity = Translator::identity();
        }
        let old = self.position;
        self.position = (self.velocity * dt).apply(&old);
        Moved {
            old,
            new: self.position,
        }
    }

    /// Apply a force immediately, bypassing the accumulator
    pub fn apply_force(&mut self, force: Translator, dt: f64) {
        self.velocity = self.velocity * (force * dt);
    }
}

/// Spring between particles `a` and `b` of the container
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringLink {
    a: usize,
    b: usize,
    length: f64, // rest length
}

impl SpringLink {
    pub fn new(a: usize, b: usize, length: f64) -> SimResult<Self> {
        if a == b {
            return Err(SimError::SelfLink(a));
        }
        Ok(Self { a, b, length })
    }

    pub fn a(&self) -> usize {
        self.a
    }

    pub fn b(&self) -> usize {
        self.b
    }

    pub fn length(&self) -> f64 {
        self.length
    }
}

/// For every particle, the links it takes part in and on which end
///
/// Stored flat: the links of particle `i` are
/// `entries[offsets[i]..offsets[i + 1]]`.
#[derive(Debug, Clone, Default)]
pub struct Incidence {
    offsets: Vec<usize>,
    entries: Vec<(usize, bool)>, // (link index, particle is end `a`)
}

impl Incidence {
    fn build(n_particles: usize, links: &[SpringLink]) -> Self {
        let mut counts = vec![0usize; n_particles + 1];
        for link in links {
            counts[link.a + 1] += 1;
            counts[link.b + 1] += 1;
        }
        for i in 0..n_particles {
            counts[i + 1] += counts[i];
        }
        let offsets = counts;

        let mut cursor = offsets.clone();
        let mut entries = vec![(0usize, false); 2 * links.len()];
        for (k, link) in links.iter().enumerate() {
            entries[cursor[link.a]] = (k, true);
            cursor[link.a] += 1;
            entries[cursor[link.b]] = (k, false);
            cursor[link.b] += 1;
        }

        Self { offsets, entries }
    }

    /// Links touching particle `i`
    pub fn of(&self, i: usize) -> &[(usize, bool)] {
        match (self.offsets.get(i), self.offsets.get(i + 1)) {
            (Some(&start), Some(&end)) => &self.entries[start..end],
            _ => &[],
        }
    }
}

/// Particle and link containers
#[derive(Debug, Clone, Default)]
pub struct ParticleSystem {
    pub particles: Vec<Particle>,
    links: Vec<SpringLink>,
    incidence: Incidence,
    pub t: f64, // simulated time
}

impl ParticleSystem {
    /// Build a system, checking that every link points into `particles`
    pub fn new(particles: Vec<Particle>, links: Vec<SpringLink>) -> SimResult<Self> {
        let len = particles.len();
        if let Some(bad) = links.iter().find(|l| l.a >= len || l.b >= len) {
            return Err(SimError::LinkOutOfBounds {
                a: bad.a,
                b: bad.b,
                len,
            });
        }
        let incidence = Incidence::build(len, &links);
        Ok(Self {
            particles,
            links,
            incidence,
            t: 0.0,
        })
    }

    pub fn links(&self) -> &[SpringLink] {
        &self.links
    }

    pub fn incidence(&self) -> &Incidence {
        &self.incidence
    }

    /// Particles (mutable) alongside the read-only link tables
    pub fn parts_mut(&mut self) -> (&mut [Particle], &[SpringLink], &Incidence) {
        (&mut self.particles, &self.links, &self.incidence)
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Mutable access to both ends of a link
    ///
    /// Fails when `a == b`: a two-particle force needs two distinct particles.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> SimResult<(&mut Particle, &mut Particle)> {
        let len = self.particles.len();
        if a == b {
            return Err(SimError::SelfLink(a));
        }
        if a >= len || b >= len {
            return Err(SimError::LinkOutOfBounds { a, b, len });
        }
        if a < b {
            let (left, right) = self.particles.split_at_mut(b);
            Ok((&mut left[a], &mut right[0]))
        } else {
            let (left, right) = self.particles.split_at_mut(a);
            Ok((&mut right[0], &mut left[b]))
        }
    }

    /// Flat point array for the renderer
    pub fn points(&self) -> Vec<NPoint3> {
        self.particles.iter().map(|p| p.position).collect()
    }

    /// Flat line-endpoint array for the renderer, one pair per link
    pub fn lines(&self) -> Vec<(NPoint3, NPoint3)> {
        self.links
            .iter()
            .map(|l| (self.particles[l.a].position, self.particles[l.b].position))
            .collect()
    }
}
