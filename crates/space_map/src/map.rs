//! Published space maps and the sampling behind the query surface.

use glam::{Vec2, Vec3, Vec4};

use crate::backend::TextureId;
use crate::camera::CaptureFrame;
use crate::core::{CaptureTarget, Texel};
use crate::gradient::GradientLut;
use crate::stats::CaptureStats;

/// A resolved capture: the texture it was written to plus a host copy of
/// its texels and the frame needed to project world positions into it.
///
/// Maps are immutable once built; the controller publishes them behind an
/// `Arc` so a query never sees a partially written map.
#[derive(Debug, Clone)]
pub struct SpaceMap {
    target: CaptureTarget,
    generation: u64,
    texture: TextureId,
    size: u32,
    frame: CaptureFrame,
    texels: Vec<Texel>,
    stats: CaptureStats,
}

/// Nearest boundary feature seen from a world position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundaryHit {
    /// `CLASS_SURFACE` or `CLASS_OBJECT`.
    pub class: f32,
    /// Chebyshev distance to the boundary in world meters.
    pub distance_m: f32,
    pub inside_object: bool,
}

impl SpaceMap {
    /// Wraps read-back texels. `stats.seed_texels` is recounted from the
    /// boundary channel.
    pub fn new(
        target: CaptureTarget,
        generation: u64,
        texture: TextureId,
        size: u32,
        frame: CaptureFrame,
        texels: Vec<Texel>,
        mut stats: CaptureStats,
    ) -> Self {
        debug_assert_eq!(texels.len(), (size as usize) * (size as usize));
        stats.seed_texels = texels.iter().filter(|t| t[3] > 0.5).count();
        Self {
            target,
            generation,
            texture,
            size,
            frame,
            texels,
            stats,
        }
    }

    /// Key this map was published under.
    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    /// Generation of the capture that produced this map.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Backend texture holding the resolved texels.
    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Camera framing the map was captured with.
    pub fn frame(&self) -> &CaptureFrame {
        &self.frame
    }

    /// CPU copy of the resolved texels, row-major.
    pub fn texels(&self) -> &[Texel] {
        &self.texels
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    /// True when nothing was rasterized, so every texel is empty space.
    pub fn is_empty(&self) -> bool {
        !self.stats.has_seeds()
    }

    /// Texel at integer coordinates, clamped to the edge.
    pub fn texel(&self, x: i64, y: i64) -> Texel {
        let max = self.size as i64 - 1;
        let x = x.clamp(0, max) as usize;
        let y = y.clamp(0, max) as usize;
        self.texels[y * self.size as usize + x]
    }

    /// Bilinear sample at normalized `uv` with clamp-to-edge addressing.
    pub fn sample_bilinear(&self, uv: Vec2) -> Vec4 {
        let p = uv * self.size as f32 - Vec2::splat(0.5);
        if !p.is_finite() {
            return Vec4::from(self.texel(0, 0));
        }
        let base = p.floor();
        let f = p - base;
        let (x0, y0) = (base.x as i64, base.y as i64);

        let t00 = Vec4::from(self.texel(x0, y0));
        let t10 = Vec4::from(self.texel(x0 + 1, y0));
        let t01 = Vec4::from(self.texel(x0, y0 + 1));
        let t11 = Vec4::from(self.texel(x0 + 1, y0 + 1));
        t00.lerp(t10, f.x).lerp(t01.lerp(t11, f.x), f.y)
    }

    /// Texel containing `uv`, clamped to the edge.
    pub fn nearest_texel(&self, uv: Vec2) -> Texel {
        let p = uv * self.size as f32;
        if !p.is_finite() {
            return self.texel(0, 0);
        }
        self.texel(p.x.floor() as i64, p.y.floor() as i64)
    }

    /// Projects `world` through the capture camera.
    pub fn world_to_uv(&self, world: Vec3) -> Vec2 {
        self.frame.world_to_uv(world)
    }

    /// Color for a world position: the inside-object override when the
    /// sampled inside channel is set, otherwise the gradient at the
    /// sampled normalized distance.
    pub fn shade(&self, world: Vec3, inside_color: Vec4, lut: &GradientLut) -> Vec4 {
        let sample = self.sample_bilinear(self.world_to_uv(world));
        if sample.y >= 0.5 {
            inside_color
        } else {
            lut.sample(sample.x.clamp(0.0, 1.0))
        }
    }

    /// Nearest boundary from a world position, or `None` for empty space.
    pub fn nearest_boundary(&self, world: Vec3) -> Option<BoundaryHit> {
        let texel = self.nearest_texel(self.world_to_uv(world));
        if texel[2] < 0.0 {
            return None;
        }
        let distance_texels = texel[0] * self.size as f32;
        Some(BoundaryHit {
            class: texel[2],
            distance_m: distance_texels * self.frame.meters_per_texel(self.size),
            inside_object: texel[1] > 0.5,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Rect;
    use crate::core::{CLASS_OBJECT, CLASS_SURFACE, EMPTY_SPACE};
    use crate::gradient::{ColorGradient, GradientStop};

    /// 4x4 map over the square `[0, 4] x [0, 4]`: one object texel at
    /// (1, 1) and surface texels along the bottom row.
    fn map() -> SpaceMap {
        let size = 4;
        let frame = CaptureFrame::new(
            Rect {
                min: Vec2::ZERO,
                max: Vec2::splat(4.0),
            },
            0.0,
            0.0,
            10.0,
        );
        let mut texels = vec![[0.25, 0.0, CLASS_OBJECT, 0.0]; 16];
        texels[5] = [0.0, 1.0, CLASS_OBJECT, 1.0];
        for x in 0..4 {
            texels[12 + x] = [0.0, 0.0, CLASS_SURFACE, 1.0];
        }
        SpaceMap::new(
            CaptureTarget::Filter(crate::core::RoomFilter::AllRooms),
            1,
            TextureId(0),
            size,
            frame,
            texels,
            CaptureStats::default(),
        )
    }

    fn lut() -> GradientLut {
        ColorGradient::new(vec![
            GradientStop { position: 0.0, color: Vec4::new(1.0, 0.0, 0.0, 1.0) },
            GradientStop { position: 1.0, color: Vec4::new(0.0, 0.0, 1.0, 1.0) },
        ])
        .bake_blocking(5)
    }

    #[test]
    fn counts_boundary_texels() {
        assert_eq!(map().stats().seed_texels, 5);
        assert!(!map().is_empty());
    }

    #[test]
    fn bilinear_hits_texel_centers_exactly() {
        let map = map();
        let center = map.sample_bilinear(Vec2::new(1.5 / 4.0, 1.5 / 4.0));
        assert_eq!(center, Vec4::new(0.0, 1.0, CLASS_OBJECT, 1.0));
    }

    #[test]
    fn bilinear_blends_between_centers() {
        let map = map();
        let between = map.sample_bilinear(Vec2::new(2.0 / 4.0, 1.5 / 4.0));
        assert!((between.x - 0.125).abs() < 1e-6);
        assert!((between.y - 0.5).abs() < 1e-6);
    }

    #[test]
    fn out_of_range_clamps_to_edge() {
        let map = map();
        assert_eq!(map.sample_bilinear(Vec2::new(-3.0, 0.1)), Vec4::from(map.texel(0, 0)));
        assert_eq!(
            map.sample_bilinear(Vec2::new(0.1, 9.0)),
            Vec4::from([0.0, 0.0, CLASS_SURFACE, 1.0])
        );
        assert_eq!(map.nearest_texel(Vec2::new(7.0, 7.0)), map.texel(3, 3));
    }

    #[test]
    fn shade_overrides_inside_objects() {
        let map = map();
        let inside = Vec4::new(0.5, 0.5, 0.5, 1.0);
        // World (1.5, 0, 1.5) is the center of texel (1, 1).
        assert_eq!(map.shade(Vec3::new(1.5, 0.0, 1.5), inside, &lut()), inside);
        // Texel (3, 0) sits at distance 0.25 on the ramp.
        let shaded = map.shade(Vec3::new(3.5, 0.0, 0.5), inside, &lut());
        assert!((shaded - Vec4::new(0.75, 0.0, 0.25, 1.0)).length() < 1e-5);
    }

    #[test]
    fn nearest_boundary_reports_meters() {
        let map = map();
        let hit = map.nearest_boundary(Vec3::new(3.5, 0.0, 0.5)).unwrap();
        assert_eq!(hit.class, CLASS_OBJECT);
        assert!(!hit.inside_object);
        assert!((hit.distance_m - 1.0).abs() < 1e-5);

        let inside = map.nearest_boundary(Vec3::new(1.5, 0.0, 1.5)).unwrap();
        assert!(inside.inside_object);
        assert_eq!(inside.distance_m, 0.0);
    }

    #[test]
    fn empty_space_has_no_boundary() {
        let mut map = map();
        map.texels.fill(EMPTY_SPACE);
        assert!(map.nearest_boundary(Vec3::new(1.0, 0.0, 1.0)).is_none());
    }
}
