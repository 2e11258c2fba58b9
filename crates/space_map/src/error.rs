use thiserror::Error;

use crate::backend::TextureId;

/// Errors produced while configuring or running a space map capture.
#[derive(Debug, Error)]
pub enum SpaceMapError {
    #[error("texture size must be a power of two (got {0})")]
    InvalidTextureSize(u32),

    #[error("unrecognized room filter: {0}")]
    InvalidFilter(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to allocate {width}x{height} texture: {reason}")]
    AllocationFailed {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("unknown texture {0:?}")]
    UnknownTexture(TextureId),

    #[error("texture size mismatch: {0}")]
    SizeMismatch(String),

    #[error("no GPU adapter available")]
    NoAdapter,

    #[error("device error: {0}")]
    Device(String),

    #[error("gradient bake failed: {0}")]
    GradientBake(String),
}

pub type Result<T> = std::result::Result<T, SpaceMapError>;
