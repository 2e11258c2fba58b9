use std::fmt;
use std::str::FromStr;

use glam::Vec4;

use crate::error::{Result, SpaceMapError};
use crate::gradient::ColorGradient;
use crate::scene::{RoomId, SceneLabels};

/// One RGBA32F texel.
pub type Texel = [f32; 4];

/// Class written for floor and wall seeds.
pub const CLASS_SURFACE: f32 = 0.0;
/// Class written for labeled scene object seeds.
pub const CLASS_OBJECT: f32 = 1.0;
/// Class of a texel no seed ever reached.
pub const CLASS_EMPTY: f32 = -1.0;

/// Propagation texel with no seed: `[seed_x, seed_y, class, resolved]`.
pub const UNRESOLVED: Texel = [-1.0, -1.0, CLASS_EMPTY, 0.0];

/// Resolved texel written by the fill pass when nothing was propagated:
/// `[distance, inside_object, class, is_boundary]`.
pub const EMPTY_SPACE: Texel = [1.0, 0.0, CLASS_EMPTY, 0.0];

/// Side of a compute workgroup (8x8 threads).
pub const WORKGROUP_DIM: u32 = 8;

/// Which rooms take part in a capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RoomFilter {
    None,
    #[default]
    CurrentRoom,
    AllRooms,
}

impl TryFrom<u32> for RoomFilter {
    type Error = SpaceMapError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(RoomFilter::None),
            1 => Ok(RoomFilter::CurrentRoom),
            2 => Ok(RoomFilter::AllRooms),
            other => Err(SpaceMapError::InvalidFilter(other.to_string())),
        }
    }
}

impl FromStr for RoomFilter {
    type Err = SpaceMapError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(RoomFilter::None),
            "current" | "current_room" | "currentroom" => Ok(RoomFilter::CurrentRoom),
            "all" | "all_rooms" | "allrooms" => Ok(RoomFilter::AllRooms),
            _ => Err(SpaceMapError::InvalidFilter(s.to_string())),
        }
    }
}

impl fmt::Display for RoomFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RoomFilter::None => "none",
            RoomFilter::CurrentRoom => "current_room",
            RoomFilter::AllRooms => "all_rooms",
        };
        f.write_str(name)
    }
}

/// Key a capture is published under.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CaptureTarget {
    /// A single room, cached per room.
    Room(RoomId),
    /// A filtered room set; the result becomes the default map.
    Filter(RoomFilter),
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Room(id) => write!(f, "room {}", id.0),
            CaptureTarget::Filter(filter) => write!(f, "filter {filter}"),
        }
    }
}

/// Configuration for capture, propagation and queries.
#[derive(Debug, Clone)]
pub struct SpaceMapConfig {
    /// Side length of the square map; must be a power of two.
    pub texture_size: u32,
    /// Extra border around the framed geometry, in meters.
    pub border_buffer: f32,
    /// Height of the top-down capture camera above the framed center.
    pub camera_height: f32,
    /// Anchors carrying any of these labels are drawn as objects.
    pub object_labels: SceneLabels,
    /// Flat raster color for floor and wall surfaces.
    pub surface_color: Vec4,
    /// Flat raster color for labeled objects.
    pub object_color: Vec4,
    /// Clear color of the intermediate buffer.
    pub background_color: Vec4,
    /// Returned by queries that land inside an object.
    pub inside_object_color: Vec4,
    /// Returned by queries before any capture has completed.
    pub unavailable_color: Vec4,
    /// Ramp applied to normalized distance at query time.
    pub gradient: ColorGradient,
    /// Number of entries in the baked gradient lookup table.
    pub gradient_resolution: u32,
    /// Rooms captured when the scene first loads.
    pub load_policy: RoomFilter,
    /// Recapture on anchor creation and updates.
    pub track_live_updates: bool,
}

impl Default for SpaceMapConfig {
    fn default() -> Self {
        Self {
            texture_size: 512,
            border_buffer: 0.5,
            camera_height: 10.0,
            object_labels: SceneLabels::OBJECTS,
            surface_color: Vec4::new(1.0, 1.0, 1.0, 1.0),
            object_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            background_color: Vec4::new(0.0, 0.0, 0.0, 0.0),
            inside_object_color: Vec4::new(1.0, 0.0, 0.0, 1.0),
            unavailable_color: Vec4::ZERO,
            gradient: ColorGradient::default(),
            gradient_resolution: 256,
            load_policy: RoomFilter::CurrentRoom,
            track_live_updates: false,
        }
    }
}

impl SpaceMapConfig {
    /// Checks each field and returns the first failure.
    pub fn validate(&self) -> Result<()> {
        validate_texture_size(self.texture_size)?;
        if !self.border_buffer.is_finite() || self.border_buffer < 0.0 {
            return Err(SpaceMapError::InvalidConfig(
                "border_buffer must be finite and >= 0".into(),
            ));
        }
        if !self.camera_height.is_finite() || self.camera_height <= 0.0 {
            return Err(SpaceMapError::InvalidConfig(
                "camera_height must be finite and > 0".into(),
            ));
        }
        if self.gradient_resolution < 2 {
            return Err(SpaceMapError::InvalidConfig(
                "gradient_resolution must be >= 2".into(),
            ));
        }
        let colors = [
            ("surface_color", self.surface_color),
            ("object_color", self.object_color),
            ("background_color", self.background_color),
        ];
        for (name, color) in colors.iter() {
            if !color.is_finite() {
                return Err(SpaceMapError::InvalidConfig(format!("{name} must be finite")));
            }
        }
        for i in 0..colors.len() {
            for j in (i + 1)..colors.len() {
                if colors_match(colors[i].1.to_array(), colors[j].1.to_array()) {
                    return Err(SpaceMapError::InvalidConfig(format!(
                        "{} and {} must differ",
                        colors[i].0, colors[j].0
                    )));
                }
            }
        }
        self.gradient.validate()
    }
}

/// Texture sides must be non-zero powers of two.
pub fn validate_texture_size(size: u32) -> Result<()> {
    if size == 0 || !size.is_power_of_two() {
        return Err(SpaceMapError::InvalidTextureSize(size));
    }
    Ok(())
}

/// Tolerance used when classifying rasterized colors.
pub const COLOR_EPSILON: f32 = 1e-3;

/// Per-channel comparison within [`COLOR_EPSILON`].
pub fn colors_match(a: Texel, b: Texel) -> bool {
    a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() <= COLOR_EPSILON)
}
