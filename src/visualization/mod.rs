//! Drawing the simulation
//!
//! The physics never talks to a graphics API. [`draw_scene`] turns a
//! [`Snapshot`] into calls on a [`Renderer`], which only knows how to draw
//! points, line segments and planes in world space. The Bevy viewer in
//! [`drapesim_vis3d`] is one such renderer; tests use a recording one.

pub mod shapes;
pub mod drapesim_vis3d;

use crate::runtime::snapshot::Snapshot;
use crate::simulation::algebra::{NPoint3, NVec3};
use crate::simulation::density::CellKey;
use crate::visualization::shapes::{aabb_edges, sphere_rings};

/// Linear RGB color, components in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgb(pub f32, pub f32, pub f32);

impl Rgb {
    pub const WHITE: Rgb = Rgb(1.0, 1.0, 1.0);
    pub const GREY: Rgb = Rgb(0.5, 0.5, 0.5);
    pub const RED: Rgb = Rgb(1.0, 0.2, 0.2);
    pub const GREEN: Rgb = Rgb(0.2, 0.8, 0.3);
    pub const BLUE: Rgb = Rgb(0.3, 0.5, 1.0);
    pub const YELLOW: Rgb = Rgb(1.0, 0.9, 0.2);
}

/// Drawing capability consumed by [`draw_scene`]
pub trait Renderer {
    fn draw_points(&mut self, points: &[NPoint3], color: Rgb, size: f32);
    fn draw_lines(&mut self, lines: &[(NPoint3, NPoint3)], color: Rgb, width: f32);
    fn draw_plane(&mut self, position: &NPoint3, normal: &NVec3, color: Rgb, size: f32);
}

/// Which debug layers to draw on top of the mesh
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub links: bool,
    pub locked: bool,
    pub wall: bool,
    pub neighbors: bool, // candidates of the particle of interest
    pub cells: bool, // density cells around the particle of interest
    pub lookup_sphere: bool,
}

impl Default for Overlay {
    fn default() -> Self {
        Self {
            links: true,
            locked: true,
            wall: true,
            neighbors: true,
            cells: false,
            lookup_sphere: false,
        }
    }
}

impl Overlay {
    pub fn none() -> Self {
        Self {
            links: false,
            locked: false,
            wall: false,
            neighbors: false,
            cells: false,
            lookup_sphere: false,
        }
    }
}

pub const POINT_SIZE: f32 = 4.0;
pub const HIGHLIGHT_SIZE: f32 = 7.0;
pub const LINE_WIDTH: f32 = 1.0;
pub const PLANE_SIZE: f32 = 40.0;
const SPHERE_SEGMENTS: usize = 24;

/// Issue every draw call for one frame
pub fn draw_scene<R: Renderer + ?Sized>(renderer: &mut R, snapshot: &Snapshot, overlay: &Overlay) {
    if overlay.wall {
        if let Some(plane) = &snapshot.wall {
            renderer.draw_plane(&plane.anchor(), &plane.normal, Rgb::GREEN, PLANE_SIZE);
        }
    }

    if overlay.links && !snapshot.lines.is_empty() {
        renderer.draw_lines(&snapshot.lines, Rgb::GREY, LINE_WIDTH);
    }

    renderer.draw_points(&snapshot.points, Rgb::WHITE, POINT_SIZE);

    if overlay.locked && !snapshot.locked.is_empty() {
        let locked: Vec<NPoint3> = snapshot
            .locked
            .iter()
            .filter_map(|&i| snapshot.points.get(i).copied())
            .collect();
        renderer.draw_points(&locked, Rgb::RED, HIGHLIGHT_SIZE);
    }

    let Some(focus) = snapshot.points.get(snapshot.particle_of_interest).copied() else {
        return;
    };
    renderer.draw_points(&[focus], Rgb::YELLOW, HIGHLIGHT_SIZE);

    if overlay.neighbors {
        let mut candidates = Vec::new();
        snapshot.neighbors_of_interest(&mut candidates);
        let near: Vec<NPoint3> = candidates
            .iter()
            .filter_map(|&j| snapshot.points.get(j).copied())
            .collect();
        if !near.is_empty() {
            renderer.draw_points(&near, Rgb::BLUE, HIGHLIGHT_SIZE);
        }
    }

    if overlay.cells {
        if let Some(grid) = &snapshot.density {
            let mut cells: Vec<CellKey> = Vec::new();
            grid.nearby_cells(&focus, snapshot.lookup_radius, &mut cells);
            let edges: Vec<(NPoint3, NPoint3)> = cells
                .iter()
                .filter(|cell| !grid.particles_in(cell).is_empty())
                .flat_map(|cell| aabb_edges(&grid.cell_in_space(cell), grid.cell_size()))
                .collect();
            if !edges.is_empty() {
                renderer.draw_lines(&edges, Rgb::BLUE, LINE_WIDTH);
            }
        }
    }

    if overlay.lookup_sphere && snapshot.lookup_radius > 0.0 {
        let rings = sphere_rings(&focus, snapshot.lookup_radius, SPHERE_SEGMENTS);
        renderer.draw_lines(&rings, Rgb::YELLOW, LINE_WIDTH);
    }
}
