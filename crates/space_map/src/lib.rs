//! Top-down nearest-boundary maps of rooms.
//!
//! Room geometry is rasterized from an orthographic top-down camera, turned
//! into seeds and flooded across a square texture with the jump-flood
//! algorithm, so every texel knows its nearest floor/wall or object boundary.
//! [`SpaceMapper`] drives captures from scene notifications and answers
//! world-space queries against the published maps.

pub mod backend;
pub mod camera;
pub mod controller;
pub mod core;
pub mod dirty;
pub mod error;
pub mod gpu;
pub mod gradient;
pub mod kernels;
pub mod map;
pub mod pipeline;
pub mod raster;
pub mod reference_cpu;
pub mod scene;
pub mod state;
pub mod stats;

pub use crate::backend::{ComputeBackend, Kernel, KernelParams, TextureDesc, TextureId};
pub use crate::camera::CaptureFrame;
pub use crate::controller::{CaptureTicket, MapEvent, SpaceMapper};
pub use crate::core::{CaptureTarget, RoomFilter, SpaceMapConfig, Texel};
pub use crate::error::{Result, SpaceMapError};
pub use crate::gpu::{WgpuBackend, WgpuBackendConfig};
pub use crate::gradient::{ColorGradient, GradientLut, GradientStop};
pub use crate::map::{BoundaryHit, SpaceMap};
pub use crate::reference_cpu::CpuBackend;
pub use crate::scene::{Anchor, AnchorId, Room, RoomId, SceneEvent, SceneGraph, SceneLabels, SceneProvider, Surface};
pub use crate::state::CaptureState;
pub use crate::stats::{CaptureStats, UpdateStats};
