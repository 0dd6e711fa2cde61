//! Line-segment outlines for debug overlays

use std::f64::consts::TAU;

use crate::simulation::algebra::{NPoint3, NVec3};

/// The 12 edges of the axis-aligned cube of side `size` centered on `center`
pub fn aabb_edges(center: &NPoint3, size: f64) -> Vec<(NPoint3, NPoint3)> {
    let h = 0.5 * size;
    // corner k has bit 0 / 1 / 2 set for +x / +y / +z
    let corner = |k: usize| {
        let sign = |bit: usize| if k & bit == 0 { -h } else { h };
        center + NVec3::new(sign(1), sign(2), sign(4))
    };

    let mut edges = Vec::with_capacity(12);
    for k in 0..8 {
        for bit in [1, 2, 4] {
            if k & bit == 0 {
                edges.push((corner(k), corner(k | bit)));
            }
        }
    }
    edges
}

/// Three great circles (in the XY, YZ and XZ planes) approximating a sphere
///
/// Each circle has `segments` segments, at least 3.
pub fn sphere_rings(center: &NPoint3, radius: f64, segments: usize) -> Vec<(NPoint3, NPoint3)> {
    let segments = segments.max(3);
    let mut rings = Vec::with_capacity(3 * segments);

    let planes: [fn(f64, f64) -> NVec3; 3] = [
        |c, s| NVec3::new(c, s, 0.0),
        |c, s| NVec3::new(0.0, c, s),
        |c, s| NVec3::new(c, 0.0, s),
    ];
    for on_plane in planes {
        let point = |k: usize| {
            let angle = TAU * k as f64 / segments as f64;
            center + on_plane(angle.cos(), angle.sin()) * radius
        };
        for k in 0..segments {
            rings.push((point(k), point(k + 1)));
        }
    }
    rings
}
