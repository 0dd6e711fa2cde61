//! Read-only view of the simulation handed to the render side
//!
//! `SnapshotBuffer` is a double buffer: the simulation thread fills the back
//! slot, then flips the `front` index; the render thread only ever locks the
//! front slot. The two sides contend for a lock only in the short window
//! where the render side still reads the slot that is about to become the
//! back slot again, and never while forces are being computed.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::simulation::algebra::{NPoint3, Plane};
use crate::simulation::density::DensityGrid;

/// Derived rendering quantities of one tick
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub points: Vec<NPoint3>, // particle positions
    pub lines: Vec<(NPoint3, NPoint3)>, // one segment per spring link
    pub locked: Vec<usize>, // indices of locked particles
    pub density: Option<DensityGrid>, // copy of the spatial index
    pub lookup_radius: f64, // density lookup radius
    pub wall: Option<Plane>, // ground plane, if any
    pub particle_of_interest: usize,
    pub t: f64, // simulated time
    pub ticks: u64, // ticks since last reset
    pub dt: f64, // step used by the last tick
    pub timings: Vec<(&'static str, Duration)>, // phase durations of the last tick
}

impl Snapshot {
    /// Candidate neighbors of the particle of interest in the copied index
    pub fn neighbors_of_interest(&self, out: &mut Vec<usize>) {
        out.clear();
        let (Some(grid), Some(p)) = (&self.density, self.points.get(self.particle_of_interest)) else {
            return;
        };
        grid.nearby_particles(p, self.lookup_radius, out);
        out.retain(|&j| j != self.particle_of_interest);
    }
}

fn lock(slot: &Mutex<Snapshot>) -> MutexGuard<'_, Snapshot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Two snapshot slots with an atomically swapped front index
///
/// Single writer, any number of readers.
#[derive(Debug, Default)]
pub struct SnapshotBuffer {
    slots: [Mutex<Snapshot>; 2],
    front: AtomicUsize,
    version: AtomicU64, // number of publishes so far
}

impl SnapshotBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill the back slot with `fill`, then make it the front slot
    pub fn publish(&self, fill: impl FnOnce(&mut Snapshot)) {
        let back = 1 - self.front.load(Ordering::Acquire);
        {
            let mut slot = lock(&self.slots[back]);
            fill(&mut slot);
        }
        self.front.store(back, Ordering::Release);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Run `f` on the most recently published snapshot
    pub fn read<R>(&self, f: impl FnOnce(&Snapshot) -> R) -> R {
        let front = self.front.load(Ordering::Acquire);
        let slot = lock(&self.slots[front]);
        f(&slot)
    }

    /// Owned copy of the most recently published snapshot
    pub fn latest(&self) -> Snapshot {
        self.read(Snapshot::clone)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}
