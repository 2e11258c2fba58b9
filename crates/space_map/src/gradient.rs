//! Color ramp applied to normalized boundary distance at query time.

use futures::channel::oneshot;
use glam::Vec4;

use crate::core::Texel;
use crate::error::{Result, SpaceMapError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub position: f32,
    pub color: Vec4,
}

/// Continuous 1D color ramp keyed by a scalar in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorGradient {
    stops: Vec<GradientStop>,
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self::new(vec![
            GradientStop { position: 0.0, color: Vec4::new(1.0, 0.25, 0.0, 1.0) },
            GradientStop { position: 0.1, color: Vec4::new(1.0, 0.9, 0.0, 1.0) },
            GradientStop { position: 0.3, color: Vec4::new(0.0, 0.8, 0.3, 1.0) },
            GradientStop { position: 1.0, color: Vec4::new(0.0, 0.2, 0.8, 1.0) },
        ])
    }
}

impl ColorGradient {
    /// Stops are sorted by position.
    pub fn new(mut stops: Vec<GradientStop>) -> Self {
        stops.sort_by(|a, b| a.position.total_cmp(&b.position));
        Self { stops }
    }

    /// Single-color gradient.
    pub fn solid(color: Vec4) -> Self {
        Self::new(vec![GradientStop { position: 0.0, color }])
    }

    /// Stops sorted by position.
    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    /// Requires at least one stop with finite positions in `[0, 1]` and finite colors.
    pub fn validate(&self) -> Result<()> {
        if self.stops.is_empty() {
            return Err(SpaceMapError::InvalidConfig("gradient needs at least one stop".into()));
        }
        for stop in &self.stops {
            if !stop.position.is_finite() || !(0.0..=1.0).contains(&stop.position) {
                return Err(SpaceMapError::InvalidConfig(format!(
                    "gradient stop position {} outside [0, 1]",
                    stop.position
                )));
            }
            if !stop.color.is_finite() {
                return Err(SpaceMapError::InvalidConfig("gradient color must be finite".into()));
            }
        }
        Ok(())
    }

    /// Color at `t`, clamped to the first/last stop outside their range.
    pub fn evaluate(&self, t: f32) -> Vec4 {
        let Some(first) = self.stops.first() else {
            return Vec4::ZERO;
        };
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        if t <= first.position {
            return first.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.position {
                let span = b.position - a.position;
                if span <= f32::EPSILON {
                    return b.color;
                }
                return a.color.lerp(b.color, (t - a.position) / span);
            }
        }
        self.stops[self.stops.len() - 1].color
    }

    /// Samples the ramp into a lookup table on the calling thread.
    pub fn bake_blocking(&self, resolution: u32) -> GradientLut {
        let resolution = resolution.max(2);
        let last = (resolution - 1) as f32;
        let entries = (0..resolution)
            .map(|i| self.evaluate(i as f32 / last))
            .collect();
        GradientLut { entries }
    }

    /// Bakes the lookup table on the rayon pool.
    ///
    /// The returned future resolves once every entry is written.
    pub async fn bake(&self, resolution: u32) -> Result<GradientLut> {
        let gradient = self.clone();
        let (sender, receiver) = oneshot::channel();
        rayon::spawn(move || {
            let _ = sender.send(gradient.bake_blocking(resolution));
        });
        receiver
            .await
            .map_err(|_| SpaceMapError::GradientBake("bake task dropped its result".into()))
    }
}

/// Baked gradient, uploaded as a `len x 1` texture before the first capture.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientLut {
    entries: Vec<Vec4>,
}

impl GradientLut {
    /// Number of baked entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Linearly interpolated lookup at `t` in `[0, 1]`.
    pub fn sample(&self, t: f32) -> Vec4 {
        match self.entries.len() {
            0 => Vec4::ZERO,
            1 => self.entries[0],
            n => {
                let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
                let x = t * (n - 1) as f32;
                let i = (x.floor() as usize).min(n - 2);
                let frac = x - i as f32;
                self.entries[i].lerp(self.entries[i + 1], frac)
            }
        }
    }

    /// Entries as texels for the `len x 1` lookup texture.
    pub fn to_texels(&self) -> Vec<Texel> {
        self.entries.iter().map(|c| c.to_array()).collect()
    }
}
