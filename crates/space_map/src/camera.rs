//! Top-down orthographic capture framing.
//!
//! World +Y is up. The capture camera looks straight down; map texel
//! `(u, v)` grows with world `x` and world `z` respectively.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};

use crate::scene::{Room, SceneLabels};

/// Smallest orthographic half-extent a frame will use.
pub const MIN_HALF_EXTENT: f32 = 1e-3;

const NEAR_PLANE: f32 = 0.01;

/// Rectangle on the horizontal (XZ) plane.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    /// Zero-sized rectangle at `p`.
    pub fn point(p: Vec2) -> Self {
        Self { min: p, max: p }
    }

    /// Grow to contain `p`.
    pub fn include(&mut self, p: Vec2) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Rectangle grown by `border` on every side.
    pub fn expand(&self, border: f32) -> Self {
        Self {
            min: self.min - Vec2::splat(border),
            max: self.max + Vec2::splat(border),
        }
    }

    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }
}

/// Placement of the virtual capture camera for one capture.
#[derive(Debug, Clone, Copy)]
pub struct CaptureFrame {
    /// Framed geometry bounds including the border buffer.
    pub bounds: Rect,
    pub eye: Vec3,
    pub half_extent: f32,
    pub view: Mat4,
    pub projection: Mat4,
}

impl CaptureFrame {
    /// Frames a rectangle whose geometry spans heights `bottom..=top`,
    /// with the camera `camera_height` above `top`.
    pub fn new(bounds: Rect, bottom: f32, top: f32, camera_height: f32) -> Self {
        let center = bounds.center();
        let size = bounds.size();
        let half_extent = (size.x.max(size.y) * 0.5).max(MIN_HALF_EXTENT);
        let eye = Vec3::new(center.x, top + camera_height, center.y);
        let view = Mat4::look_at_rh(eye, eye - Vec3::Y, Vec3::NEG_Z);
        let far = camera_height + (top - bottom).max(0.0) + 1.0;
        let projection = Mat4::orthographic_rh(
            -half_extent,
            half_extent,
            -half_extent,
            half_extent,
            NEAR_PLANE,
            far,
        );
        Self {
            bounds,
            eye,
            half_extent,
            view,
            projection,
        }
    }

    /// Projection times view, world space to clip space.
    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }

    /// Normalized screen coordinates of a world position; `[0, 1]` inside
    /// the frame, unclamped outside it.
    pub fn world_to_uv(&self, world: Vec3) -> Vec2 {
        let ndc = self.view_projection().project_point3(world);
        Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5)
    }

    /// Continuous texel-space position for a map of side `size`.
    pub fn world_to_texel(&self, world: Vec3, size: u32) -> Vec2 {
        self.world_to_uv(world) * size as f32
    }

    /// World position on the capture plane (`y = 0`) for a uv coordinate.
    pub fn uv_to_world(&self, uv: Vec2) -> Vec3 {
        let min = self.eye.truncate_xz() - Vec2::splat(self.half_extent);
        let p = min + uv * (2.0 * self.half_extent);
        Vec3::new(p.x, 0.0, p.y)
    }

    /// World meters covered by one texel of a map of side `size`.
    pub fn meters_per_texel(&self, size: u32) -> f32 {
        2.0 * self.half_extent / size.max(1) as f32
    }
}

trait TruncateXz {
    fn truncate_xz(self) -> Vec2;
}

impl TruncateXz for Vec3 {
    fn truncate_xz(self) -> Vec2 {
        Vec2::new(self.x, self.z)
    }
}

/// Frames every floor, wall and labeled anchor of `rooms`.
///
/// An empty room set collapses to a point at the origin with the minimum
/// extent and no border.
pub fn frame_rooms(
    rooms: &[Arc<Room>],
    object_labels: SceneLabels,
    border_buffer: f32,
    camera_height: f32,
) -> CaptureFrame {
    let mut bounds: Option<Rect> = None;
    let mut top = f32::MIN;
    let mut bottom = f32::MAX;
    let mut include = |p: Vec3| {
        let xz = p.truncate_xz();
        match bounds.as_mut() {
            Some(rect) => rect.include(xz),
            None => bounds = Some(Rect::point(xz)),
        }
        top = top.max(p.y);
        bottom = bottom.min(p.y);
    };

    for room in rooms {
        room.floor.world_vertices().for_each(&mut include);
        for wall in &room.walls {
            wall.world_vertices().for_each(&mut include);
        }
        for anchor in room.anchors.iter().filter(|a| a.has_any_label(object_labels)) {
            anchor.surface.world_vertices().for_each(&mut include);
        }
    }

    match bounds {
        Some(rect) => CaptureFrame::new(rect.expand(border_buffer), bottom, top, camera_height),
        None => CaptureFrame::new(Rect::point(Vec2::ZERO), 0.0, 0.0, camera_height),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::{Anchor, AnchorId, RoomId, Surface};

    fn room_4x2() -> Arc<Room> {
        let floor = Surface::quad_xz(4.0, 2.0, Mat4::from_translation(Vec3::new(1.0, 0.0, 3.0)));
        Arc::new(Room::new(RoomId(1), floor))
    }

    #[test]
    fn frames_floor_with_border() {
        let frame = frame_rooms(&[room_4x2()], SceneLabels::OBJECTS, 0.5, 10.0);
        assert_eq!(frame.bounds.min, Vec2::new(-1.5, 1.5));
        assert_eq!(frame.bounds.max, Vec2::new(3.5, 4.5));
        assert!((frame.half_extent - 2.5).abs() < 1e-6);
        assert_eq!(frame.eye, Vec3::new(1.0, 10.0, 3.0));
    }

    #[test]
    fn uv_grows_with_world_x_and_z() {
        let frame = frame_rooms(&[room_4x2()], SceneLabels::OBJECTS, 0.5, 10.0);
        let center = frame.world_to_uv(Vec3::new(1.0, 0.0, 3.0));
        assert!((center - Vec2::splat(0.5)).length() < 1e-5);

        let corner = frame.world_to_uv(Vec3::new(-1.5, 0.0, 0.5));
        assert!(corner.length() < 1e-5, "got {corner:?}");

        let far = frame.world_to_uv(Vec3::new(3.5, 0.0, 5.5));
        assert!((far - Vec2::ONE).length() < 1e-5, "got {far:?}");
    }

    #[test]
    fn height_does_not_move_uv() {
        let frame = frame_rooms(&[room_4x2()], SceneLabels::OBJECTS, 0.0, 10.0);
        let low = frame.world_to_uv(Vec3::new(2.0, 0.0, 3.5));
        let high = frame.world_to_uv(Vec3::new(2.0, 2.5, 3.5));
        assert!((low - high).length() < 1e-5);
    }

    #[test]
    fn uv_round_trips_to_world() {
        let frame = frame_rooms(&[room_4x2()], SceneLabels::OBJECTS, 0.25, 10.0);
        let world = Vec3::new(0.3, 0.0, 2.2);
        let back = frame.uv_to_world(frame.world_to_uv(world));
        assert!((back - world).length() < 1e-4);
    }

    #[test]
    fn unlabeled_anchors_do_not_extend_bounds() {
        let mut room = (*room_4x2()).clone();
        room.anchors.push(Anchor {
            id: AnchorId(1),
            room: RoomId(1),
            labels: SceneLabels::WALL_ART,
            surface: Surface::cuboid(Vec3::ONE, Mat4::from_translation(Vec3::new(50.0, 0.0, 0.0))),
        });
        let frame = frame_rooms(&[Arc::new(room)], SceneLabels::OBJECTS, 0.0, 10.0);
        assert_eq!(frame.bounds.max.x, 3.0);
    }

    #[test]
    fn empty_scene_collapses_to_point() {
        let frame = frame_rooms(&[], SceneLabels::OBJECTS, 0.5, 10.0);
        assert_eq!(frame.bounds, Rect::point(Vec2::ZERO));
        assert_eq!(frame.half_extent, MIN_HALF_EXTENT);
        let uv = frame.world_to_uv(Vec3::new(3.0, 0.0, -2.0));
        assert!(uv.is_finite());
    }
}
