//! Statistics structs for captures and controller updates.

/// Statistics from one capture.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureStats {
    /// Number of jump-flood passes dispatched.
    pub passes: u32,
    /// Step size of each pass, in dispatch order.
    pub steps: Vec<u32>,
    /// Surfaces submitted to the rasterizer.
    pub surfaces_drawn: usize,
    /// Anchors skipped because none of their labels matched.
    pub anchors_skipped: usize,
    /// Texels that were touched by rasterization.
    pub seed_texels: usize,
    /// Wall time of the capture, draw through readback (milliseconds).
    pub elapsed_ms: f64,
}

impl CaptureStats {
    /// Whether the capture rasterized anything at all.
    pub fn has_seeds(&self) -> bool {
        self.seed_texels > 0
    }
}

/// Statistics from one [`update`](crate::controller::SpaceMapper::update).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateStats {
    /// Scene events drained from the provider.
    pub events_processed: usize,
    /// Captures whose result was published.
    pub captures_published: usize,
    /// Captures that failed (previous map kept).
    pub captures_failed: usize,
    /// Captures whose result was discarded as stale.
    pub stale_discarded: usize,
}

impl UpdateStats {
    /// Whether this update replaced at least one map.
    pub fn any_published(&self) -> bool {
        self.captures_published > 0
    }
}
