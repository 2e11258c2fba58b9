//! Render/compute backend interface consumed by the capture pipeline.
//!
//! A backend owns RGBA32F textures addressed by [`TextureId`]. Every call
//! is ordered after the previous one: a dispatch observes all writes of
//! earlier draws and dispatches.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::core::{Texel, WORKGROUP_DIM};
use crate::error::Result;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
}

impl TextureDesc {
    /// Square `size` x `size` texture.
    pub fn square(label: &'static str, size: u32) -> Self {
        Self {
            label,
            width: size,
            height: size,
        }
    }

    /// Number of texels, `width * height`.
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Named compute kernels of the propagation pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kernel {
    /// Raster buffer -> propagation seeds.
    Seed,
    /// One jump-flood pass at `KernelParams::step`.
    JumpFlood,
    /// Propagation texels -> resolved map texels.
    Fill,
}

impl Kernel {
    /// Entry point name in the propagation shader module.
    pub fn name(self) -> &'static str {
        match self {
            Kernel::Seed => "seed",
            Kernel::JumpFlood => "jump_flood",
            Kernel::Fill => "fill",
        }
    }
}

/// Uniforms shared by every kernel; laid out for a WGSL uniform buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct KernelParams {
    pub width: u32,
    pub height: u32,
    pub step: u32,
    pub triangle_count: u32,
    pub surface_color: [f32; 4],
    pub object_color: [f32; 4],
    pub background_color: [f32; 4],
    pub draw_color: [f32; 4],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelBindings {
    pub input: TextureId,
    pub output: TextureId,
}

/// Flat-colored triangles already projected into texel space.
#[derive(Debug, Clone)]
pub struct SurfaceDraw {
    pub triangles: Vec<[Vec2; 3]>,
    pub color: [f32; 4],
}

/// Thread groups covering a `width x height` grid with 8x8 groups.
pub fn workgroups_for(width: u32, height: u32) -> [u32; 2] {
    [width.div_ceil(WORKGROUP_DIM), height.div_ceil(WORKGROUP_DIM)]
}

pub trait ComputeBackend {
    /// Allocates a float texture with random-access write capability.
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureId>;

    /// Free a texture. Unknown ids are ignored.
    fn release_texture(&mut self, id: TextureId);

    /// Description the texture was allocated with.
    fn texture_desc(&self, id: TextureId) -> Result<TextureDesc>;

    /// Fill every texel with `value`.
    fn clear_texture(&mut self, id: TextureId, value: Texel) -> Result<()>;

    /// Uploads row-major texels covering the whole texture.
    fn write_texture(&mut self, id: TextureId, texels: &[Texel]) -> Result<()>;

    /// Draws flat-colored triangles into `target`; uncovered texels keep
    /// their value.
    fn draw(&mut self, target: TextureId, draw: &SurfaceDraw) -> Result<()>;

    /// Run `kernel` over `workgroups` reading `bindings.input` and writing `bindings.output`.
    fn dispatch(
        &mut self,
        kernel: Kernel,
        workgroups: [u32; 2],
        bindings: KernelBindings,
        params: &KernelParams,
    ) -> Result<()>;

    /// Copy `src` into `dst`; both must have the same size.
    fn blit(&mut self, src: TextureId, dst: TextureId) -> Result<()>;

    /// Waits for all queued work and reads the texture back.
    fn read_texture(&mut self, id: TextureId) -> Result<Vec<Texel>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroups_round_up() {
        assert_eq!(workgroups_for(512, 512), [64, 64]);
        assert_eq!(workgroups_for(4, 4), [1, 1]);
        assert_eq!(workgroups_for(9, 17), [2, 3]);
    }

    #[test]
    fn params_match_uniform_layout() {
        assert_eq!(std::mem::size_of::<KernelParams>(), 80);
    }
}
