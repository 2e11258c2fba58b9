//! Per-texel kernel bodies shared by the CPU backend.
//!
//! Each function computes exactly one output texel from read-only inputs;
//! the WGSL kernels in `gpu::shaders` mirror them line for line.

use glam::Vec2;

use crate::backend::KernelParams;
use crate::core::{colors_match, Texel, CLASS_OBJECT, CLASS_SURFACE, EMPTY_SPACE, UNRESOLVED};

/// Candidate offsets in scan order; the first strictly closer candidate wins.
pub const NEIGHBOR_OFFSETS: [(i32, i32); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Half side of the texel square tested against triangles; slightly under
/// half a texel so edges lying exactly on texel borders do not spill over.
pub const COVERAGE_HALF: f32 = 0.5 - 1e-4;

/// Whether a propagation texel carries a seed.
pub fn is_resolved(texel: Texel) -> bool {
    texel[3] > 0.5
}

/// L-infinity distance in texels from `(x, y)` to the seed a texel carries.
pub fn chebyshev(x: i32, y: i32, texel: Texel) -> f32 {
    (texel[0] - x as f32).abs().max((texel[1] - y as f32).abs())
}

/// Turns a rasterized color into a seed at `(x, y)` or the unresolved marker.
pub fn seed_texel(x: u32, y: u32, raster: Texel, params: &KernelParams) -> Texel {
    if colors_match(raster, params.background_color) {
        return UNRESOLVED;
    }
    let class = if colors_match(raster, params.object_color) {
        CLASS_OBJECT
    } else {
        CLASS_SURFACE
    };
    [x as f32, y as f32, class, 1.0]
}

/// One jump-flood step for texel `(x, y)` over a row-major `src`.
///
/// Out-of-range candidates are skipped.
pub fn jump_texel(src: &[Texel], x: u32, y: u32, params: &KernelParams) -> Texel {
    let width = params.width as i32;
    let height = params.height as i32;
    let step = params.step as i32;
    let (x, y) = (x as i32, y as i32);

    let mut best = UNRESOLVED;
    let mut best_dist = f32::INFINITY;
    for (dx, dy) in NEIGHBOR_OFFSETS {
        let nx = x + dx * step;
        let ny = y + dy * step;
        if nx < 0 || ny < 0 || nx >= width || ny >= height {
            continue;
        }
        let candidate = src[(ny * width + nx) as usize];
        if !is_resolved(candidate) {
            continue;
        }
        let dist = chebyshev(x, y, candidate);
        if dist < best_dist {
            best_dist = dist;
            best = candidate;
        }
    }
    best
}

/// Resolves a propagated texel to `[distance, inside_object, class, is_boundary]`.
///
/// Distance is normalized by the map width.
pub fn fill_texel(x: u32, y: u32, texel: Texel, params: &KernelParams) -> Texel {
    if !is_resolved(texel) {
        return EMPTY_SPACE;
    }
    let dist = chebyshev(x as i32, y as i32, texel);
    let class = texel[2];
    let is_boundary = dist == 0.0;
    let inside_object = is_boundary && class == CLASS_OBJECT;
    [
        dist / params.width.max(1) as f32,
        if inside_object { 1.0 } else { 0.0 },
        class,
        if is_boundary { 1.0 } else { 0.0 },
    ]
}

/// Separating-axis overlap test between a triangle and the texel square
/// centered at `center` with half side `half`.
///
/// Zero-area triangles (walls seen edge-on) still cover the texels their
/// edges pass through.
pub fn triangle_covers_texel(center: Vec2, half: f32, tri: &[Vec2; 3]) -> bool {
    let v = [tri[0] - center, tri[1] - center, tri[2] - center];

    let min = v[0].min(v[1]).min(v[2]);
    let max = v[0].max(v[1]).max(v[2]);
    if min.x > half || max.x < -half || min.y > half || max.y < -half {
        return false;
    }

    for i in 0..3 {
        let edge = v[(i + 1) % 3] - v[i];
        let axis = Vec2::new(-edge.y, edge.x);
        if axis.length_squared() <= f32::EPSILON {
            continue;
        }
        let p0 = v[0].dot(axis);
        let p1 = v[1].dot(axis);
        let p2 = v[2].dot(axis);
        let min_p = p0.min(p1.min(p2));
        let max_p = p0.max(p1.max(p2));
        let r = half * (axis.x.abs() + axis.y.abs());
        if min_p > r || max_p < -r {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(width: u32, step: u32) -> KernelParams {
        KernelParams {
            width,
            height: width,
            step,
            triangle_count: 0,
            surface_color: [1.0, 1.0, 1.0, 1.0],
            object_color: [1.0, 0.0, 0.0, 1.0],
            background_color: [0.0, 0.0, 0.0, 0.0],
            draw_color: [0.0; 4],
        }
    }

    #[test]
    fn seed_classifies_raster_colors() {
        let p = params(4, 0);
        assert_eq!(seed_texel(1, 2, [0.0; 4], &p), UNRESOLVED);
        assert_eq!(seed_texel(1, 2, [1.0, 0.0, 0.0, 1.0], &p), [1.0, 2.0, CLASS_OBJECT, 1.0]);
        assert_eq!(seed_texel(3, 0, [1.0, 1.0, 1.0, 1.0], &p), [3.0, 0.0, CLASS_SURFACE, 1.0]);
    }

    #[test]
    fn jump_prefers_first_candidate_on_ties() {
        // Texel (1, 1) sees two seeds at distance 1: (0, 0) comes first in scan order.
        let width = 3;
        let mut src = vec![UNRESOLVED; 9];
        src[0] = [0.0, 0.0, CLASS_SURFACE, 1.0];
        src[2] = [2.0, 0.0, CLASS_OBJECT, 1.0];
        let out = jump_texel(&src, 1, 1, &params(width, 1));
        assert_eq!(out, src[0]);
    }

    #[test]
    fn jump_keeps_own_seed() {
        let mut src = vec![UNRESOLVED; 16];
        src[5] = [1.0, 1.0, CLASS_OBJECT, 1.0];
        src[6] = [2.0, 1.0, CLASS_SURFACE, 1.0];
        assert_eq!(jump_texel(&src, 1, 1, &params(4, 1)), src[5]);
    }

    #[test]
    fn jump_skips_out_of_range_candidates() {
        let src = vec![UNRESOLVED; 16];
        assert_eq!(jump_texel(&src, 0, 0, &params(4, 2)), UNRESOLVED);
    }

    #[test]
    fn fill_encodes_distance_and_inside_flag() {
        let p = params(8, 0);
        let seed = [2.0, 3.0, CLASS_OBJECT, 1.0];
        assert_eq!(fill_texel(2, 3, seed, &p), [0.0, 1.0, CLASS_OBJECT, 1.0]);
        assert_eq!(fill_texel(6, 4, seed, &p), [0.5, 0.0, CLASS_OBJECT, 0.0]);
        assert_eq!(fill_texel(0, 0, UNRESOLVED, &p), EMPTY_SPACE);
    }

    #[test]
    fn covers_texels_inside_triangle() {
        let tri = [Vec2::new(0.0, 0.0), Vec2::new(4.0, 0.0), Vec2::new(0.0, 4.0)];
        assert!(triangle_covers_texel(Vec2::new(0.5, 0.5), COVERAGE_HALF, &tri));
        assert!(triangle_covers_texel(Vec2::new(1.5, 1.5), COVERAGE_HALF, &tri));
        assert!(!triangle_covers_texel(Vec2::new(3.5, 3.5), COVERAGE_HALF, &tri));
        assert!(!triangle_covers_texel(Vec2::new(4.5, 0.5), COVERAGE_HALF, &tri));
    }

    #[test]
    fn edge_on_triangle_covers_its_line() {
        let a = Vec2::new(0.2, 2.5);
        let b = Vec2::new(3.8, 2.5);
        let tri = [a, b, a];
        for x in 0..4 {
            let center = Vec2::new(x as f32 + 0.5, 2.5);
            assert!(triangle_covers_texel(center, COVERAGE_HALF, &tri));
        }
        assert!(!triangle_covers_texel(Vec2::new(1.5, 1.5), COVERAGE_HALF, &tri));
        assert!(!triangle_covers_texel(Vec2::new(1.5, 3.5), COVERAGE_HALF, &tri));
    }

    #[test]
    fn border_aligned_edges_do_not_spill() {
        let tri = [Vec2::new(1.0, 1.0), Vec2::new(3.0, 1.0), Vec2::new(3.0, 3.0)];
        assert!(!triangle_covers_texel(Vec2::new(0.5, 1.5), COVERAGE_HALF, &tri));
        assert!(!triangle_covers_texel(Vec2::new(2.5, 0.5), COVERAGE_HALF, &tri));
        assert!(triangle_covers_texel(Vec2::new(2.5, 1.5), COVERAGE_HALF, &tri));
    }
}
