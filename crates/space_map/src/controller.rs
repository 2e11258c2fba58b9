//! SpaceMapper: capture lifecycle, per-room caching and queries.
//!
//! ```text
//!  scene events ──▶ DirtyTracker ──update()──▶ begin_capture ──▶ execute ──▶ publish
//!                                                 │ generation++              │ generation check
//!                                                 ▼                           ▼
//!                                         KeyState::Capturing        room_maps / default_map
//! ```
//!
//! Captures are keyed by [`CaptureTarget`]. Every `begin_capture` issues a
//! new generation for its key; only a result carrying the latest
//! generation is published, so a superseded capture that completes late is
//! discarded instead of overwriting a newer map. Room removal bumps a
//! per-room epoch, which rejects in-flight captures of that room.
//!
//! A room's cache slot is filled by two keys, `Room(id)` and
//! `Filter(CurrentRoom)`. Their generations are independent, so each
//! capture touching a room also draws a per-room sequence number; a slot
//! only ever moves to a later sequence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use glam::{Vec3, Vec4};

use crate::backend::{ComputeBackend, TextureDesc, TextureId};
use crate::camera::{frame_rooms, CaptureFrame};
use crate::core::{validate_texture_size, CaptureTarget, RoomFilter, SpaceMapConfig};
use crate::dirty::DirtyTracker;
use crate::error::Result;
use crate::gradient::GradientLut;
use crate::map::{BoundaryHit, SpaceMap};
use crate::pipeline::{ensure_buffers, run_capture, CaptureBuffers};
use crate::raster::{plan_draws, RasterPlan};
use crate::scene::{Room, RoomId, SceneEvent, SceneProvider};
use crate::state::{CaptureState, KeyState};
use crate::stats::UpdateStats;

/// Notification sent when a capture is published.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapEvent {
    /// The first default map was published.
    Created,
    /// A room received its first cached map.
    CreatedForRoom(RoomId),
    /// Any publication, including the first.
    Updated(CaptureTarget),
}

/// Room cache slot a capture fills.
#[derive(Debug, Clone, Copy)]
struct RoomSlot {
    id: RoomId,
    /// Room epoch at issue time.
    epoch: u64,
    /// Per-room issue order across every key writing this slot.
    sequence: u64,
}

/// Snapshot of one in-flight capture.
///
/// Geometry and framing are fixed when the ticket is issued, so scene
/// changes after `begin_capture` never leak into its result.
#[derive(Debug, Clone)]
pub struct CaptureTicket {
    target: CaptureTarget,
    generation: u64,
    room: Option<RoomSlot>,
    size: u32,
    frame: CaptureFrame,
    plan: RasterPlan,
}

impl CaptureTicket {
    /// Key this capture publishes under.
    pub fn target(&self) -> CaptureTarget {
        self.target
    }

    /// Generation issued for the key at `begin_capture`.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Room whose cache slot the result fills, if any.
    pub fn room(&self) -> Option<RoomId> {
        self.room.map(|slot| slot.id)
    }
}

/// Owns the backend, the scene subscription and every published map.
pub struct SpaceMapper<B: ComputeBackend, S: SceneProvider> {
    backend: B,
    scene: S,
    config: SpaceMapConfig,
    events: UnboundedReceiver<SceneEvent>,

    lut: GradientLut,
    lut_texture: TextureId,
    buffers: Option<CaptureBuffers>,

    keys: HashMap<CaptureTarget, KeyState>,
    room_epochs: HashMap<RoomId, u64>,
    /// Last sequence issued per room.
    room_issued: HashMap<RoomId, u64>,
    /// Sequence of the map currently in each room slot.
    room_published: HashMap<RoomId, u64>,
    room_maps: HashMap<RoomId, Arc<SpaceMap>>,
    filter_maps: HashMap<RoomFilter, Arc<SpaceMap>>,
    default_map: Option<Arc<SpaceMap>>,
    default_target: Option<CaptureTarget>,
    dirty: DirtyTracker,

    map_subscribers: Vec<UnboundedSender<MapEvent>>,
}

impl<B: ComputeBackend, S: SceneProvider> SpaceMapper<B, S> {
    /// Validates `config`, subscribes to `scene` and uploads the baked
    /// gradient before any capture can run.
    pub async fn new(mut backend: B, mut scene: S, config: SpaceMapConfig) -> Result<Self> {
        config.validate()?;
        let events = scene.subscribe();

        let lut = config.gradient.bake(config.gradient_resolution).await?;
        let lut_texture = backend.allocate_texture(&TextureDesc {
            label: "space_map.gradient",
            width: lut.len() as u32,
            height: 1,
        })?;
        backend.write_texture(lut_texture, &lut.to_texels())?;
        log::info!(
            "space mapper ready: {}x{} maps, {} gradient entries",
            config.texture_size,
            config.texture_size,
            lut.len()
        );

        Ok(Self {
            backend,
            scene,
            config,
            events,
            lut,
            lut_texture,
            buffers: None,
            keys: HashMap::new(),
            room_epochs: HashMap::new(),
            room_issued: HashMap::new(),
            room_published: HashMap::new(),
            room_maps: HashMap::new(),
            filter_maps: HashMap::new(),
            default_map: None,
            default_target: None,
            dirty: DirtyTracker::new(),
            map_subscribers: Vec::new(),
        })
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Active configuration.
    pub fn config(&self) -> &SpaceMapConfig {
        &self.config
    }

    /// Backend owning every texture of this mapper.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Mutable backend access, e.g. to bind a published map.
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Scene provider the mapper listens to.
    pub fn scene(&self) -> &S {
        &self.scene
    }

    /// Mutating the scene queues events; they are applied on the next
    /// [`update`](Self::update).
    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// Gradient lookup table used by the query surface.
    pub fn lut(&self) -> &GradientLut {
        &self.lut
    }

    /// The `len x 1` gradient lookup texture used for colorization.
    pub fn lut_texture(&self) -> TextureId {
        self.lut_texture
    }

    /// Target whose result becomes the default map.
    pub fn default_target(&self) -> Option<CaptureTarget> {
        self.default_target
    }

    /// Lifecycle state of `target`; `Idle` for keys never captured.
    pub fn capture_state(&self, target: CaptureTarget) -> CaptureState {
        self.keys.get(&target).map(|key| key.state).unwrap_or_default()
    }

    /// Whether a default map has been published.
    pub fn is_ready(&self) -> bool {
        self.default_map.is_some()
    }

    /// Enable or disable recapture on anchor creation and updates.
    pub fn set_track_live_updates(&mut self, enabled: bool) {
        self.config.track_live_updates = enabled;
    }

    /// Changes the map size for subsequent captures and drops the capture
    /// buffers of the old size. Published maps keep their size.
    pub fn set_texture_size(&mut self, size: u32) -> Result<()> {
        validate_texture_size(size)?;
        if self.config.texture_size == size {
            return Ok(());
        }
        self.config.texture_size = size;
        if let Some(buffers) = self.buffers.take() {
            buffers.release(&mut self.backend);
        }
        Ok(())
    }

    /// Receive a [`MapEvent`] for every publication; dropping the receiver unsubscribes.
    pub fn subscribe_maps(&mut self) -> UnboundedReceiver<MapEvent> {
        let (sender, receiver) = unbounded();
        self.map_subscribers.push(sender);
        receiver
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Captures `target` now and makes it the target recaptured on scene
    /// changes.
    ///
    /// Returns whether the result was published. On error the previously
    /// published map stays current.
    pub fn start_capture(&mut self, target: CaptureTarget) -> Result<bool> {
        self.default_target = Some(target);
        self.dirty.unmark(target);
        self.capture(target)
    }

    /// Snapshots the geometry for `target`, frames the camera and issues a
    /// new generation, superseding any capture of the same key in flight.
    pub fn begin_capture(&mut self, target: CaptureTarget) -> CaptureTicket {
        let (rooms, room) = self.resolve(target);
        let room = room.map(|id| {
            let epoch = self.room_epoch(id);
            let issued = self.room_issued.entry(id).or_default();
            *issued += 1;
            RoomSlot {
                id,
                epoch,
                sequence: *issued,
            }
        });
        let frame = frame_rooms(
            &rooms,
            self.config.object_labels,
            self.config.border_buffer,
            self.config.camera_height,
        );
        let plan = plan_draws(&rooms, &frame, &self.config);
        let generation = self.keys.entry(target).or_default().begin();
        log::debug!(
            "begin capture of {target} (generation {generation}, {} rooms)",
            rooms.len()
        );

        CaptureTicket {
            target,
            generation,
            room,
            size: self.config.texture_size,
            frame,
            plan,
        }
    }

    /// Runs every pass for `ticket` and returns the unpublished map.
    ///
    /// The map owns a freshly allocated texture; it is released again if
    /// any step fails.
    pub fn execute(&mut self, ticket: &CaptureTicket) -> Result<SpaceMap> {
        let start = Instant::now();
        let buffers = ensure_buffers(&mut self.backend, &mut self.buffers, ticket.size)?;
        let texture = self
            .backend
            .allocate_texture(&TextureDesc::square("space_map.map", ticket.size))?;

        let resolved = run_capture(&mut self.backend, &buffers, &ticket.plan, &self.config, texture)
            .and_then(|stats| Ok((stats, self.backend.read_texture(texture)?)));
        let (mut stats, texels) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => {
                self.backend.release_texture(texture);
                return Err(e);
            }
        };
        stats.elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        Ok(SpaceMap::new(
            ticket.target,
            ticket.generation,
            texture,
            ticket.size,
            ticket.frame,
            texels,
            stats,
        ))
    }

    /// Publishes `map` if `ticket` is still the latest capture of its key
    /// and, for captures of a single room, the room still exists and no
    /// later-issued capture of it was published first.
    ///
    /// The result replaces the current map of its key (room slot or filter
    /// slot) and, when it belongs to the default target (or none is set),
    /// the default map.
    ///
    /// Returns false and releases the map's texture otherwise.
    pub fn publish(&mut self, ticket: CaptureTicket, map: SpaceMap) -> bool {
        let current = self
            .keys
            .get_mut(&ticket.target)
            .is_some_and(|key| key.finish(ticket.generation));
        let room_fresh = ticket.room.map_or(true, |slot| {
            self.room_epoch(slot.id) == slot.epoch
                && self.scene.room(slot.id).is_some()
                && self
                    .room_published
                    .get(&slot.id)
                    .map_or(true, |&published| slot.sequence > published)
        });
        if !current || !room_fresh {
            log::warn!(
                "discarding stale capture of {} (generation {})",
                ticket.target,
                ticket.generation
            );
            self.backend.release_texture(map.texture());
            return false;
        }

        let map = Arc::new(map);
        let mut events = Vec::new();
        if let Some(slot) = ticket.room {
            self.room_published.insert(slot.id, slot.sequence);
            let previous = self.room_maps.insert(slot.id, Arc::clone(&map));
            if previous.is_none() {
                events.push(MapEvent::CreatedForRoom(slot.id));
            }
            self.release_unreferenced(previous);
        }
        if let CaptureTarget::Filter(filter) = ticket.target {
            let previous = self.filter_maps.insert(filter, Arc::clone(&map));
            self.release_unreferenced(previous);
        }
        if self.default_target.map_or(true, |target| target == ticket.target) {
            let previous = self.default_map.replace(Arc::clone(&map));
            if previous.is_none() {
                events.insert(0, MapEvent::Created);
            }
            self.release_unreferenced(previous);
        }
        events.push(MapEvent::Updated(ticket.target));

        log::info!(
            "published {} (generation {}, {} passes, {} seed texels, {:.2} ms)",
            ticket.target,
            ticket.generation,
            map.stats().passes,
            map.stats().seed_texels,
            map.stats().elapsed_ms
        );
        for event in events {
            self.emit(event);
        }
        true
    }

    /// Returns the key to `Idle` after a failed capture.
    pub fn abort(&mut self, ticket: &CaptureTicket) {
        if let Some(key) = self.keys.get_mut(&ticket.target) {
            key.finish(ticket.generation);
        }
    }

    fn capture(&mut self, target: CaptureTarget) -> Result<bool> {
        let ticket = self.begin_capture(target);
        match self.execute(&ticket) {
            Ok(map) => Ok(self.publish(ticket, map)),
            Err(e) => {
                log::warn!("capture of {target} failed: {e}");
                self.abort(&ticket);
                Err(e)
            }
        }
    }

    /// Rooms taking part in a capture of `target`, plus the room whose
    /// cache slot the result fills when the target resolves to one room.
    fn resolve(&self, target: CaptureTarget) -> (Vec<Arc<Room>>, Option<RoomId>) {
        match target {
            CaptureTarget::Room(id) => {
                let rooms = self.scene.room(id).into_iter().collect();
                (rooms, Some(id))
            }
            CaptureTarget::Filter(RoomFilter::None) => (Vec::new(), None),
            CaptureTarget::Filter(RoomFilter::CurrentRoom) => {
                match self.scene.current_room().and_then(|id| self.scene.room(id)) {
                    Some(room) => {
                        let id = room.id;
                        (vec![room], Some(id))
                    }
                    None => (Vec::new(), None),
                }
            }
            CaptureTarget::Filter(RoomFilter::AllRooms) => (self.scene.rooms(), None),
        }
    }

    fn room_epoch(&self, id: RoomId) -> u64 {
        self.room_epochs.get(&id).copied().unwrap_or(0)
    }

    /// Releases the texture of a replaced map once no cache slot holds it.
    fn release_unreferenced(&mut self, map: Option<Arc<SpaceMap>>) {
        let Some(map) = map else {
            return;
        };
        let referenced = self
            .default_map
            .iter()
            .chain(self.room_maps.values())
            .chain(self.filter_maps.values())
            .any(|held| Arc::ptr_eq(held, &map));
        if !referenced {
            self.backend.release_texture(map.texture());
        }
    }

    fn emit(&mut self, event: MapEvent) {
        self.map_subscribers
            .retain(|sender| sender.unbounded_send(event).is_ok());
    }

    // ========================================================================
    // Scene updates
    // ========================================================================

    /// Applies the load policy once the scene is available and captures
    /// it. A `None` policy captures nothing.
    pub fn on_scene_loaded(&mut self) -> UpdateStats {
        if self.config.load_policy != RoomFilter::None {
            let target = CaptureTarget::Filter(self.config.load_policy);
            self.default_target = Some(target);
            self.dirty.mark_dirty(target);
        }
        self.update()
    }

    /// Drains pending scene events, then recaptures every dirty target once.
    pub fn update(&mut self) -> UpdateStats {
        let mut stats = UpdateStats::default();
        while let Ok(Some(event)) = self.events.try_next() {
            stats.events_processed += 1;
            self.handle_event(event);
        }

        for target in self.dirty.take_dirty() {
            match self.capture(target) {
                Ok(true) => stats.captures_published += 1,
                Ok(false) => stats.stale_discarded += 1,
                Err(_) => stats.captures_failed += 1,
            }
        }
        if stats.any_published() {
            log::debug!("update published {} maps", stats.captures_published);
        }
        stats
    }

    fn handle_event(&mut self, event: SceneEvent) {
        log::trace!("space mapper received {event:?}");
        match event {
            SceneEvent::RoomAdded(_) => self.mark_default_dirty(),
            SceneEvent::RoomRemoved(id) => self.evict_room(id),
            SceneEvent::AnchorAdded { room, .. } | SceneEvent::AnchorUpdated { room, .. } => {
                if self.config.track_live_updates {
                    self.mark_room_dirty(room);
                }
            }
            // Removal recaptures even without live tracking.
            SceneEvent::AnchorRemoved { room, .. } => self.mark_room_dirty(room),
        }
    }

    fn evict_room(&mut self, id: RoomId) {
        *self.room_epochs.entry(id).or_default() += 1;
        let target = CaptureTarget::Room(id);
        self.keys.remove(&target);
        self.dirty.unmark(target);
        self.room_published.remove(&id);
        if let Some(evicted) = self.room_maps.remove(&id) {
            log::debug!("evicted map of room {}", id.0);
            self.release_unreferenced(Some(evicted));
        }

        if self.default_target == Some(target) {
            self.default_target = match self.config.load_policy {
                RoomFilter::None => None,
                policy => Some(CaptureTarget::Filter(policy)),
            };
        }
        self.mark_default_dirty();
    }

    fn mark_default_dirty(&mut self) {
        if let Some(target) = self.default_target {
            self.dirty.mark_dirty(target);
        }
    }

    fn mark_room_dirty(&mut self, room: RoomId) {
        self.mark_default_dirty();
        if self.room_maps.contains_key(&room) {
            self.dirty.mark_dirty(CaptureTarget::Room(room));
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Map for `room`, or the default map for `None`.
    ///
    /// A room without a cached map falls back to the default map.
    pub fn get_map(&self, room: Option<RoomId>) -> Option<Arc<SpaceMap>> {
        let Some(id) = room else {
            return self.default_map.clone();
        };
        match self.room_maps.get(&id) {
            Some(map) => Some(Arc::clone(map)),
            None => {
                log::warn!("no map captured for room {}, using default map", id.0);
                self.default_map.clone()
            }
        }
    }

    /// Latest map published for `filter`, whether or not it is the default.
    pub fn filter_map(&self, filter: RoomFilter) -> Option<Arc<SpaceMap>> {
        self.filter_maps.get(&filter).cloned()
    }

    /// Cached map of `room` without fallback.
    pub fn room_map(&self, room: RoomId) -> Option<Arc<SpaceMap>> {
        self.room_maps.get(&room).cloned()
    }

    /// Color of the default map at `world`.
    ///
    /// Returns `unavailable_color` before the first capture and
    /// `background_color` when the capture contained no geometry.
    pub fn sample_at(&self, world: Vec3) -> Vec4 {
        self.shade(self.default_map.as_deref(), world)
    }

    /// Like [`sample_at`](Self::sample_at) against `room`'s map.
    pub fn sample_in_room(&self, room: RoomId, world: Vec3) -> Vec4 {
        let map = self.get_map(Some(room));
        self.shade(map.as_deref(), world)
    }

    /// Nearest boundary to `world` in the default map.
    pub fn nearest_boundary(&self, world: Vec3) -> Option<BoundaryHit> {
        self.default_map.as_ref()?.nearest_boundary(world)
    }

    fn shade(&self, map: Option<&SpaceMap>, world: Vec3) -> Vec4 {
        match map {
            None => self.config.unavailable_color,
            Some(map) if map.is_empty() => self.config.background_color,
            Some(map) => map.shade(world, self.config.inside_object_color, &self.lut),
        }
    }
}
