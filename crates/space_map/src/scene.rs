//! Scene/room provider interface and an in-memory scene graph.
//!
//! The capture pipeline only ever reads rooms through [`SceneProvider`]:
//! it enumerates rooms, asks for the current room, and listens for
//! [`SceneEvent`]s. [`SceneGraph`] is a complete provider that keeps rooms
//! in memory and fans events out to every subscriber.

use std::collections::BTreeMap;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use glam::{Mat4, Vec3};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnchorId(pub u64);

/// Bitmask of semantic classification labels carried by an anchor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SceneLabels(pub u32);

impl SceneLabels {
    pub const NONE: SceneLabels = SceneLabels(0);
    pub const FLOOR: SceneLabels = SceneLabels(1 << 0);
    pub const CEILING: SceneLabels = SceneLabels(1 << 1);
    pub const WALL_FACE: SceneLabels = SceneLabels(1 << 2);
    pub const TABLE: SceneLabels = SceneLabels(1 << 3);
    pub const COUCH: SceneLabels = SceneLabels(1 << 4);
    pub const DOOR_FRAME: SceneLabels = SceneLabels(1 << 5);
    pub const WINDOW_FRAME: SceneLabels = SceneLabels(1 << 6);
    pub const OTHER: SceneLabels = SceneLabels(1 << 7);
    pub const STORAGE: SceneLabels = SceneLabels(1 << 8);
    pub const BED: SceneLabels = SceneLabels(1 << 9);
    pub const SCREEN: SceneLabels = SceneLabels(1 << 10);
    pub const LAMP: SceneLabels = SceneLabels(1 << 11);
    pub const PLANT: SceneLabels = SceneLabels(1 << 12);
    pub const WALL_ART: SceneLabels = SceneLabels(1 << 13);
    pub const GLOBAL_MESH: SceneLabels = SceneLabels(1 << 14);
    pub const INVISIBLE_WALL_FACE: SceneLabels = SceneLabels(1 << 15);

    /// Free-standing furniture and clutter.
    pub const OBJECTS: SceneLabels = SceneLabels(
        Self::TABLE.0
            | Self::COUCH.0
            | Self::OTHER.0
            | Self::STORAGE.0
            | Self::BED.0
            | Self::SCREEN.0
            | Self::LAMP.0
            | Self::PLANT.0,
    );

    /// Whether every label of `other` is set.
    pub fn contains(self, other: SceneLabels) -> bool {
        self.0 & other.0 == other.0
    }

    /// Label membership test used by the rasterizer.
    pub fn intersects(self, other: SceneLabels) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for SceneLabels {
    type Output = SceneLabels;

    fn bitor(self, rhs: SceneLabels) -> SceneLabels {
        SceneLabels(self.0 | rhs.0)
    }
}

impl BitOrAssign for SceneLabels {
    fn bitor_assign(&mut self, rhs: SceneLabels) {
        self.0 |= rhs.0;
    }
}

/// Renderable geometry: triangles in local space plus a world transform.
#[derive(Debug, Clone)]
pub struct Surface {
    pub triangles: Vec<[Vec3; 3]>,
    pub transform: Mat4,
}

impl Surface {
    /// Surface from local-space triangles and a local-to-world transform.
    pub fn new(triangles: Vec<[Vec3; 3]>, transform: Mat4) -> Self {
        Self { triangles, transform }
    }

    /// Axis-aligned quad on the local XZ plane, centered on the origin.
    pub fn quad_xz(width: f32, depth: f32, transform: Mat4) -> Self {
        let hx = width * 0.5;
        let hz = depth * 0.5;
        let a = Vec3::new(-hx, 0.0, -hz);
        let b = Vec3::new(hx, 0.0, -hz);
        let c = Vec3::new(hx, 0.0, hz);
        let d = Vec3::new(-hx, 0.0, hz);
        Self::new(vec![[a, b, c], [a, c, d]], transform)
    }

    /// Vertical quad on the local XY plane; its base sits on y = 0.
    pub fn quad_xy(width: f32, height: f32, transform: Mat4) -> Self {
        let hx = width * 0.5;
        let a = Vec3::new(-hx, 0.0, 0.0);
        let b = Vec3::new(hx, 0.0, 0.0);
        let c = Vec3::new(hx, height, 0.0);
        let d = Vec3::new(-hx, height, 0.0);
        Self::new(vec![[a, b, c], [a, c, d]], transform)
    }

    /// Axis-aligned box with its base centered on the local origin.
    pub fn cuboid(size: Vec3, transform: Mat4) -> Self {
        let h = Vec3::new(size.x * 0.5, 0.0, size.z * 0.5);
        let corners = [
            Vec3::new(-h.x, 0.0, -h.z),
            Vec3::new(h.x, 0.0, -h.z),
            Vec3::new(h.x, 0.0, h.z),
            Vec3::new(-h.x, 0.0, h.z),
            Vec3::new(-h.x, size.y, -h.z),
            Vec3::new(h.x, size.y, -h.z),
            Vec3::new(h.x, size.y, h.z),
            Vec3::new(-h.x, size.y, h.z),
        ];
        let faces: [[usize; 4]; 6] = [
            [0, 1, 2, 3],
            [4, 5, 6, 7],
            [0, 1, 5, 4],
            [1, 2, 6, 5],
            [2, 3, 7, 6],
            [3, 0, 4, 7],
        ];
        let mut triangles = Vec::with_capacity(12);
        for face in faces.iter() {
            let [a, b, c, d] = face.map(|i| corners[i]);
            triangles.push([a, b, c]);
            triangles.push([a, c, d]);
        }
        Self::new(triangles, transform)
    }

    /// Triangles transformed to world space.
    pub fn world_triangles(&self) -> impl Iterator<Item = [Vec3; 3]> + '_ {
        self.triangles
            .iter()
            .map(move |tri| tri.map(|v| self.transform.transform_point3(v)))
    }

    pub fn world_vertices(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.world_triangles().flat_map(|tri| tri.into_iter())
    }

    /// Origin of the surface in world space.
    pub fn world_position(&self) -> Vec3 {
        self.transform.transform_point3(Vec3::ZERO)
    }
}

/// Labeled scene object owned by a room.
#[derive(Debug, Clone)]
pub struct Anchor {
    pub id: AnchorId,
    pub room: RoomId,
    pub labels: SceneLabels,
    pub surface: Surface,
}

impl Anchor {
    /// Label membership test used to pick object anchors.
    pub fn has_any_label(&self, labels: SceneLabels) -> bool {
        self.labels.intersects(labels)
    }
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub floor: Surface,
    pub walls: Vec<Surface>,
    pub anchors: Vec<Anchor>,
}

impl Room {
    /// Room with a floor and no walls or anchors.
    pub fn new(id: RoomId, floor: Surface) -> Self {
        Self {
            id,
            floor,
            walls: Vec::new(),
            anchors: Vec::new(),
        }
    }

    /// Adds a wall surface.
    pub fn with_wall(mut self, wall: Surface) -> Self {
        self.walls.push(wall);
        self
    }
}

/// Change notification emitted by a scene provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SceneEvent {
    RoomAdded(RoomId),
    RoomRemoved(RoomId),
    AnchorAdded { room: RoomId, anchor: AnchorId },
    AnchorRemoved { room: RoomId, anchor: AnchorId },
    AnchorUpdated { room: RoomId, anchor: AnchorId },
}

/// Source of rooms and room/anchor change notifications.
pub trait SceneProvider {
    /// Every room in the scene.
    fn rooms(&self) -> Vec<Arc<Room>>;

    /// Room by id, `None` once removed.
    fn room(&self, id: RoomId) -> Option<Arc<Room>>;

    /// Room the user is in, if known.
    fn current_room(&self) -> Option<RoomId>;

    /// Registers interest in scene events; dropping the receiver unsubscribes.
    fn subscribe(&mut self) -> UnboundedReceiver<SceneEvent>;
}

/// In-memory [`SceneProvider`].
#[derive(Default)]
pub struct SceneGraph {
    rooms: BTreeMap<RoomId, Arc<Room>>,
    current_room: Option<RoomId>,
    subscribers: Vec<UnboundedSender<SceneEvent>>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) a room. The first room added becomes current.
    pub fn add_room(&mut self, room: Room) {
        let id = room.id;
        self.rooms.insert(id, Arc::new(room));
        if self.current_room.is_none() {
            self.current_room = Some(id);
        }
        self.notify(SceneEvent::RoomAdded(id));
    }

    /// Removes a room together with its anchors.
    pub fn remove_room(&mut self, id: RoomId) -> Option<Arc<Room>> {
        let removed = self.rooms.remove(&id)?;
        if self.current_room == Some(id) {
            self.current_room = self.rooms.keys().next().copied();
        }
        self.notify(SceneEvent::RoomRemoved(id));
        Some(removed)
    }

    /// Selects the current room; unknown ids clear it.
    pub fn set_current_room(&mut self, id: Option<RoomId>) {
        self.current_room = id.filter(|id| self.rooms.contains_key(id));
    }

    /// Attaches an anchor to its room. Returns false if the room is unknown.
    pub fn add_anchor(&mut self, anchor: Anchor) -> bool {
        let room_id = anchor.room;
        let anchor_id = anchor.id;
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let room = Arc::make_mut(room);
        room.anchors.retain(|a| a.id != anchor_id);
        room.anchors.push(anchor);
        self.notify(SceneEvent::AnchorAdded {
            room: room_id,
            anchor: anchor_id,
        });
        true
    }

    /// Replaces an anchor's labels and surface.
    pub fn update_anchor(&mut self, anchor: Anchor) -> bool {
        let room_id = anchor.room;
        let anchor_id = anchor.id;
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return false;
        };
        let room = Arc::make_mut(room);
        let Some(slot) = room.anchors.iter_mut().find(|a| a.id == anchor_id) else {
            return false;
        };
        *slot = anchor;
        self.notify(SceneEvent::AnchorUpdated {
            room: room_id,
            anchor: anchor_id,
        });
        true
    }

    /// Detaches an anchor from its room and returns it.
    pub fn remove_anchor(&mut self, room_id: RoomId, anchor_id: AnchorId) -> Option<Anchor> {
        let room = Arc::make_mut(self.rooms.get_mut(&room_id)?);
        let index = room.anchors.iter().position(|a| a.id == anchor_id)?;
        let anchor = room.anchors.remove(index);
        self.notify(SceneEvent::AnchorRemoved {
            room: room_id,
            anchor: anchor_id,
        });
        Some(anchor)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn notify(&mut self, event: SceneEvent) {
        log::trace!("scene event {event:?}");
        self.subscribers
            .retain(|sender| sender.unbounded_send(event).is_ok());
    }
}

impl SceneProvider for SceneGraph {
    fn rooms(&self) -> Vec<Arc<Room>> {
        self.rooms.values().cloned().collect()
    }

    fn room(&self, id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&id).cloned()
    }

    fn current_room(&self) -> Option<RoomId> {
        self.current_room
    }

    fn subscribe(&mut self) -> UnboundedReceiver<SceneEvent> {
        let (sender, receiver) = unbounded();
        self.subscribers.push(sender);
        receiver
    }
}
