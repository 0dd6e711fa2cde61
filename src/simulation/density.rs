//! # Density: spatial hash and neighbor repulsion
//!
//! Space is cut into cubes of side `cell_size`. A particle at `p` lives in
//! the cell `round(p / cell_size)` (componentwise), so cell `k` is centered
//! on `k * cell_size`. The grid is a multimap from cell key to the indices of
//! the particles inside, plus the reverse table (`membership`) giving each
//! particle's recorded cell.
//!
//! ## Maintenance
//!
//! The grid is rebuilt wholesale when the particle container is rebuilt
//! ([`DensityGrid::rebuild`]) and updated incrementally after every
//! integration pass from the reported moves ([`DensityGrid::apply_moves`]):
//! only particles whose cell changed touch the map.
//! [`DensityGrid::refresh`] does the same from positions alone. After a refresh, for every particle `i`,
//! `recorded_cell(i) == cell_of(particles[i].position)`.
//!
//! ## Queries
//!
//! A query of radius `r` around `p` looks at the cube of
//! `2 * ceil(r / cell_size) + 1` cells per axis centered on `p`'s cell.
//! [`DensityGrid::nearby_cells`] prunes cells that cannot intersect the ball
//! (center distance above `r` plus half a cell diagonal), which keeps the
//! result a superset of the true neighborhood.
//!
//! The repulsion force ([`Density::force_on`]) does not compose the two
//! general queries: it walks the candidate cube once and does the
//! authoritative distance check per neighbor.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::error::{SimError, SimResult};
use crate::simulation::algebra::{inverse_lerp, join_norm, smoothstep, NPoint3, Translator};
use crate::simulation::states::{Moved, Particle};

/// Integer coordinates of a grid cell
pub type CellKey = [i32; 3];

/// `center` shifted by `(x, y, z)` cells, `None` past the edge of the key space
///
/// Far-flung particles saturate to the extreme keys in [`DensityGrid::cell_of`];
/// cells beyond those do not exist.
fn offset_cell(center: &CellKey, x: i32, y: i32, z: i32) -> Option<CellKey> {
    Some([
        center[0].checked_add(x)?,
        center[1].checked_add(y)?,
        center[2].checked_add(z)?,
    ])
}

/// Spatial hash over particle indices
#[derive(Debug)]
pub struct DensityGrid {
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    membership: Vec<CellKey>, // recorded cell of particle i
}

impl Clone for DensityGrid {
    fn clone(&self) -> Self {
        Self {
            cell_size: self.cell_size,
            cells: self.cells.clone(),
            membership: self.membership.clone(),
        }
    }

    // Reuses the allocations of `self`; the render snapshot is refreshed
    // this way every tick.
    fn clone_from(&mut self, source: &Self) {
        self.cell_size = source.cell_size;
        self.cells.clone_from(&source.cells);
        self.membership.clone_from(&source.membership);
    }
}

impl DensityGrid {
    pub fn new(cell_size: f64) -> SimResult<Self> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(SimError::InvalidCellSize(cell_size));
        }
        Ok(Self {
            cell_size,
            cells: HashMap::new(),
            membership: Vec::new(),
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Cell containing `position`
    pub fn cell_of(&self, position: &NPoint3) -> CellKey {
        [
            (position.x / self.cell_size).round() as i32,
            (position.y / self.cell_size).round() as i32,
            (position.z / self.cell_size).round() as i32,
        ]
    }

    /// World-space center of `cell`
    pub fn cell_in_space(&self, cell: &CellKey) -> NPoint3 {
        NPoint3::new(
            cell[0] as f64 * self.cell_size,
            cell[1] as f64 * self.cell_size,
            cell[2] as f64 * self.cell_size,
        )
    }

    /// Number of cells to look at on each side of the center cell
    pub fn reach(&self, radius: f64) -> i32 {
        (radius / self.cell_size).ceil().max(0.0) as i32
    }

    /// Forget everything and index `particles` from scratch
    pub fn rebuild(&mut self, particles: &[Particle]) {
        self.cells.clear();
        self.cells.reserve(particles.len());
        self.membership.clear();
        self.membership.reserve(particles.len());

        for (i, p) in particles.iter().enumerate() {
            let cell = self.cell_of(&p.position);
            self.cells.entry(cell).or_default().push(i);
            self.membership.push(cell);
        }
    }

    /// Change the grid resolution and re-index
    pub fn set_cell_size(&mut self, cell_size: f64, particles: &[Particle]) -> SimResult<()> {
        if !(cell_size > 0.0 && cell_size.is_finite()) {
            return Err(SimError::InvalidCellSize(cell_size));
        }
        self.cell_size = cell_size;
        self.rebuild(particles);
        Ok(())
    }

    /// Record that particle `index` is now at `position`
    ///
    /// Returns `true` when the particle changed cell.
    pub fn relocate(&mut self, index: usize, position: &NPoint3) -> bool {
        let new_cell = self.cell_of(position);
        self.move_to(index, new_cell)
    }

    fn move_to(&mut self, index: usize, new_cell: CellKey) -> bool {
        let Some(&old_cell) = self.membership.get(index) else {
            return false;
        };
        if old_cell == new_cell {
            return false;
        }

        if let Some(bucket) = self.cells.get_mut(&old_cell) {
            if let Some(pos) = bucket.iter().position(|&j| j == index) {
                bucket.swap_remove(pos);
            }
            if bucket.is_empty() {
                self.cells.remove(&old_cell);
            }
        }
        self.cells.entry(new_cell).or_default().push(index);
        self.membership[index] = new_cell;
        true
    }

    /// Bring the grid in line with the current particle positions
    ///
    /// New cells are computed in parallel, the map edits are applied
    /// serially. Returns the number of particles that changed cell.
    pub fn refresh(&mut self, particles: &[Particle]) -> usize {
        if particles.len() != self.membership.len() {
            self.rebuild(particles);
            return particles.len();
        }

        let fresh: Vec<CellKey> = particles
            .par_iter()
            .map(|p| self.cell_of(&p.position))
            .collect();

        let mut moved = 0;
        for (i, cell) in fresh.into_iter().enumerate() {
            if self.move_to(i, cell) {
                moved += 1;
            }
        }
        moved
    }

    /// Catch up with the moves of one integration pass
    ///
    /// `moves[i]` is particle `i`'s old and new position. Only particles whose
    /// position changed are looked at. Returns the number that changed cell.
    pub fn apply_moves(&mut self, moves: &[Moved], particles: &[Particle]) -> usize {
        if moves.len() != self.membership.len() {
            self.rebuild(particles);
            return particles.len();
        }

        let fresh: Vec<(usize, CellKey)> = moves
            .par_iter()
            .enumerate()
            .filter(|(_, m)| m.old != m.new)
            .map(|(i, m)| (i, self.cell_of(&m.new)))
            .collect();

        fresh
            .into_iter()
            .filter(|&(i, cell)| self.move_to(i, cell))
            .count()
    }

    /// Cell the grid currently files particle `index` under
    pub fn recorded_cell(&self, index: usize) -> Option<CellKey> {
        self.membership.get(index).copied()
    }

    /// Indices filed under `cell`
    pub fn particles_in(&self, cell: &CellKey) -> &[usize] {
        self.cells.get(cell).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Non-empty cells and their particles
    pub fn occupied_cells(&self) -> impl Iterator<Item = (&CellKey, &[usize])> {
        self.cells.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of indexed particles
    pub fn len(&self) -> usize {
        self.membership.len()
    }

    pub fn is_empty(&self) -> bool {
        self.membership.is_empty()
    }

    /// Cells that may hold particles within `radius` of `position`
    ///
    /// `out` is cleared and refilled, so callers can reuse one buffer across
    /// queries.
    pub fn nearby_cells(&self, position: &NPoint3, radius: f64, out: &mut Vec<CellKey>) {
        out.clear();
        let center = self.cell_of(position);
        let reach = self.reach(radius);
        let half_diagonal = 0.5 * self.cell_size * 3f64.sqrt();
        let limit = radius + half_diagonal;
        let limit2 = limit * limit;

        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    let Some(cell) = offset_cell(&center, x, y, z) else {
                        continue;
                    };
                    let offset = self.cell_in_space(&cell) - position;
                    if offset.norm_squared() <= limit2 {
                        out.push(cell);
                    }
                }
            }
        }
    }

    /// Candidate neighbors of `position` (a superset of the particles within
    /// `radius`); `out` is cleared and refilled
    pub fn nearby_particles(&self, position: &NPoint3, radius: f64, out: &mut Vec<usize>) {
        out.clear();
        let center = self.cell_of(position);
        let reach = self.reach(radius);
        let half_diagonal = 0.5 * self.cell_size * 3f64.sqrt();
        let limit = radius + half_diagonal;
        let limit2 = limit * limit;

        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    let Some(cell) = offset_cell(&center, x, y, z) else {
                        continue;
                    };
                    let offset = self.cell_in_space(&cell) - position;
                    if offset.norm_squared() <= limit2 {
                        out.extend_from_slice(self.particles_in(&cell));
                    }
                }
            }
        }
    }
}

/// Short-range repulsion between particles, backed by a [`DensityGrid`]
#[derive(Debug, Clone)]
pub struct Density {
    pub repulsion_factor: f64, // force at zero distance
    pub lookup_radius: f64,    // no force beyond this distance
    grid: DensityGrid,
}

impl Density {
    pub fn new(repulsion_factor: f64, lookup_radius: f64, cell_size: f64) -> SimResult<Self> {
        Ok(Self {
            repulsion_factor,
            lookup_radius,
            grid: DensityGrid::new(cell_size)?,
        })
    }

    pub fn grid(&self) -> &DensityGrid {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut DensityGrid {
        &mut self.grid
    }

    /// Index a freshly built particle container
    pub fn set_particles(&mut self, particles: &[Particle]) {
        self.grid.rebuild(particles);
    }

    /// Repulsion magnitude at distance `d`
    ///
    /// `repulsion_factor` at 0, 0 at `lookup_radius` and beyond, cubic in
    /// between.
    pub fn falloff(&self, d: f64) -> f64 {
        if d > self.lookup_radius {
            return 0.0;
        }
        let t = inverse_lerp(0.0, self.lookup_radius, d);
        self.repulsion_factor * smoothstep(1.0, 0.0, t)
    }

    /// Repulsion on particle `index` from its indexed neighbors
    ///
    /// Neighbors sitting exactly on the particle have no direction and are
    /// skipped.
    pub fn force_on(&self, index: usize, particles: &[Particle]) -> Translator {
        let mut force = Translator::identity();
        let Some(p) = particles.get(index) else {
            return force;
        };

        let center = self.grid.cell_of(&p.position);
        let reach = self.grid.reach(self.lookup_radius);

        for x in -reach..=reach {
            for y in -reach..=reach {
                for z in -reach..=reach {
                    let Some(cell) = offset_cell(&center, x, y, z) else {
                        continue;
                    };
                    for &j in self.grid.particles_in(&cell) {
                        if j == index {
                            continue; // self
                        }
                        let Some(q) = particles.get(j) else {
                            continue;
                        };

                        let d = join_norm(&p.position, &q.position);
                        if d <= self.lookup_radius && d > 0.0 {
                            let direction = (p.position - q.position) / d;
                            force *= Translator::new(
                                self.falloff(d),
                                direction.x,
                                direction.y,
                                direction.z,
                            );
                        }
                    }
                }
            }
        }
        force
    }

    pub fn prepare_force(&self, index: usize, particles: &mut [Particle]) {
        let f = self.force_on(index, particles);
        if let Some(p) = particles.get_mut(index) {
            p.prepare_force(f);
        }
    }
}
