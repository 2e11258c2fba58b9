//! Geometry rasterizer: labeled room geometry -> flat-colored top-down buffer.

use std::sync::Arc;

use glam::Vec2;

use crate::backend::{ComputeBackend, SurfaceDraw, TextureId};
use crate::camera::CaptureFrame;
use crate::core::SpaceMapConfig;
use crate::error::Result;
use crate::scene::{Room, Surface};

/// Draw list for one capture, in submission order.
#[derive(Debug, Clone, Default)]
pub struct RasterPlan {
    pub draws: Vec<SurfaceDraw>,
    pub surfaces_drawn: usize,
    pub anchors_skipped: usize,
}

/// Distance vertices are kept from the texture border, larger than the
/// coverage inset so geometry lying on the frame edge still covers the
/// outermost texels.
pub const EDGE_INSET: f32 = 1e-3;

fn project(surface: &Surface, frame: &CaptureFrame, size: u32, color: [f32; 4]) -> SurfaceDraw {
    let lo = Vec2::splat(EDGE_INSET);
    let hi = Vec2::splat(size as f32 - EDGE_INSET);
    let triangles: Vec<[Vec2; 3]> = surface
        .world_triangles()
        .map(|tri| tri.map(|v| frame.world_to_texel(v, size).clamp(lo, hi)))
        .collect();
    SurfaceDraw { triangles, color }
}

/// Builds the draw list: every floor and wall in the surface color, then
/// every anchor carrying one of the configured object labels in the object
/// color. Unlabeled anchors are skipped.
pub fn plan_draws(
    rooms: &[Arc<Room>],
    frame: &CaptureFrame,
    config: &SpaceMapConfig,
) -> RasterPlan {
    let size = config.texture_size;
    let surface_color = config.surface_color.to_array();
    let object_color = config.object_color.to_array();
    let mut plan = RasterPlan::default();

    for room in rooms {
        plan.draws.push(project(&room.floor, frame, size, surface_color));
        for wall in &room.walls {
            plan.draws.push(project(wall, frame, size, surface_color));
        }
    }
    for room in rooms {
        for anchor in &room.anchors {
            if !anchor.has_any_label(config.object_labels) {
                plan.anchors_skipped += 1;
                continue;
            }
            plan.draws.push(project(&anchor.surface, frame, size, object_color));
        }
    }

    plan.draws.retain(|draw| !draw.triangles.is_empty());
    plan.surfaces_drawn = plan.draws.len();
    plan
}

/// Clears `target` to the background color and submits the plan.
pub fn rasterize<B: ComputeBackend>(
    backend: &mut B,
    target: TextureId,
    plan: &RasterPlan,
    background: [f32; 4],
) -> Result<()> {
    backend.clear_texture(target, background)?;
    for draw in &plan.draws {
        backend.draw(target, draw)?;
    }
    log::debug!(
        "raster: {} draws, {} anchors skipped",
        plan.surfaces_drawn,
        plan.anchors_skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureDesc;
    use crate::camera::frame_rooms;
    use crate::reference_cpu::CpuBackend;
    use crate::scene::{Anchor, AnchorId, RoomId, SceneLabels};
    use glam::{Mat4, Vec3};

    fn config() -> SpaceMapConfig {
        SpaceMapConfig {
            texture_size: 16,
            border_buffer: 0.0,
            ..Default::default()
        }
    }

    fn furnished_room() -> Arc<Room> {
        let mut room = Room::new(RoomId(1), Surface::quad_xz(4.0, 4.0, Mat4::IDENTITY));
        room.anchors.push(Anchor {
            id: AnchorId(1),
            room: RoomId(1),
            labels: SceneLabels::TABLE,
            surface: Surface::cuboid(Vec3::new(1.0, 0.7, 1.0), Mat4::IDENTITY),
        });
        room.anchors.push(Anchor {
            id: AnchorId(2),
            room: RoomId(1),
            labels: SceneLabels::WINDOW_FRAME,
            surface: Surface::quad_xy(1.0, 1.0, Mat4::from_translation(Vec3::new(0.0, 1.0, 2.0))),
        });
        Arc::new(room)
    }

    #[test]
    fn floor_precedes_objects_and_unlabeled_are_skipped() {
        let config = config();
        let rooms = [furnished_room()];
        let frame = frame_rooms(&rooms, config.object_labels, config.border_buffer, config.camera_height);
        let plan = plan_draws(&rooms, &frame, &config);

        assert_eq!(plan.surfaces_drawn, 2);
        assert_eq!(plan.anchors_skipped, 1);
        assert_eq!(plan.draws[0].color, config.surface_color.to_array());
        assert_eq!(plan.draws[1].color, config.object_color.to_array());
    }

    #[test]
    fn objects_draw_over_floor() {
        let config = config();
        let rooms = [furnished_room()];
        let frame = frame_rooms(&rooms, config.object_labels, config.border_buffer, config.camera_height);
        let plan = plan_draws(&rooms, &frame, &config);

        let mut backend = CpuBackend::new();
        let target = backend.allocate_texture(&TextureDesc::square("raster", 16)).unwrap();
        rasterize(&mut backend, target, &plan, config.background_color.to_array()).unwrap();
        let texels = backend.read_texture(target).unwrap();

        // 4 m floor over 16 texels: the 1 m table covers texels 6..10 on both axes.
        let at = |x: usize, y: usize| texels[y * 16 + x];
        assert_eq!(at(8, 8), config.object_color.to_array());
        assert_eq!(at(6, 9), config.object_color.to_array());
        assert_eq!(at(5, 8), config.surface_color.to_array());
        assert_eq!(at(0, 0), config.surface_color.to_array());
        assert_eq!(at(15, 15), config.surface_color.to_array());
    }

    #[test]
    fn walls_on_the_frame_edge_are_drawn() {
        // Walls alone define the frame, so with no border they sit exactly on
        // the first and last texel rows.
        let config = config();
        let mut room = Room::new(RoomId(1), Surface::quad_xz(1.0, 1.0, Mat4::IDENTITY));
        for z in [-2.0, 2.0] {
            room = room.with_wall(Surface::quad_xy(4.0, 2.5, Mat4::from_translation(Vec3::new(0.0, 0.0, z))));
        }
        let rooms = [Arc::new(room)];
        let frame = frame_rooms(&rooms, config.object_labels, config.border_buffer, config.camera_height);
        let plan = plan_draws(&rooms, &frame, &config);

        let mut backend = CpuBackend::new();
        let target = backend.allocate_texture(&TextureDesc::square("raster", 16)).unwrap();
        rasterize(&mut backend, target, &plan, config.background_color.to_array()).unwrap();
        let texels = backend.read_texture(target).unwrap();

        let surface = config.surface_color.to_array();
        for x in 0..16 {
            assert_eq!(texels[x], surface, "first row, texel {x}");
            assert_eq!(texels[15 * 16 + x], surface, "last row, texel {x}");
        }
        assert_eq!(texels[4 * 16 + 4], config.background_color.to_array());
    }
}
