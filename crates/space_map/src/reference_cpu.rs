//! Data-parallel CPU implementation of [`ComputeBackend`].
//!
//! Each draw and dispatch is split into independent rows on the rayon
//! pool; returning from the call is the barrier between passes.

use std::collections::HashMap;

use glam::Vec2;
use rayon::prelude::*;

use crate::backend::{ComputeBackend, Kernel, KernelBindings, KernelParams, SurfaceDraw, TextureDesc, TextureId};
use crate::core::{Texel, WORKGROUP_DIM};
use crate::error::{Result, SpaceMapError};
use crate::kernels::{fill_texel, jump_texel, seed_texel, triangle_covers_texel, COVERAGE_HALF};

/// Largest texture side the CPU backend will allocate by default.
pub const DEFAULT_MAX_TEXTURE_DIM: u32 = 8192;

struct CpuTexture {
    desc: TextureDesc,
    texels: Vec<Texel>,
}

/// One recorded kernel dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRecord {
    pub kernel: Kernel,
    pub step: u32,
    pub workgroups: [u32; 2],
}

pub struct CpuBackend {
    textures: HashMap<TextureId, CpuTexture>,
    next_id: u32,
    max_texture_dim: u32,
    dispatches: Vec<DispatchRecord>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::with_max_texture_dim(DEFAULT_MAX_TEXTURE_DIM)
    }

    /// Backend that fails allocations wider or taller than `max_texture_dim`.
    pub fn with_max_texture_dim(max_texture_dim: u32) -> Self {
        Self {
            textures: HashMap::new(),
            next_id: 0,
            max_texture_dim,
            dispatches: Vec::new(),
        }
    }

    /// Every dispatch issued so far, in issue order.
    pub fn dispatches(&self) -> &[DispatchRecord] {
        &self.dispatches
    }

    /// Forget recorded dispatches, e.g. between captures under test.
    pub fn clear_dispatches(&mut self) {
        self.dispatches.clear();
    }

    /// Number of textures currently allocated.
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    fn texture(&self, id: TextureId) -> Result<&CpuTexture> {
        self.textures.get(&id).ok_or(SpaceMapError::UnknownTexture(id))
    }

    fn texture_mut(&mut self, id: TextureId) -> Result<&mut CpuTexture> {
        self.textures.get_mut(&id).ok_or(SpaceMapError::UnknownTexture(id))
    }
}

impl ComputeBackend for CpuBackend {
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        if desc.width == 0 || desc.height == 0 {
            return Err(SpaceMapError::AllocationFailed {
                width: desc.width,
                height: desc.height,
                reason: "zero-sized texture".into(),
            });
        }
        if desc.width > self.max_texture_dim || desc.height > self.max_texture_dim {
            return Err(SpaceMapError::AllocationFailed {
                width: desc.width,
                height: desc.height,
                reason: format!("exceeds max dimension {}", self.max_texture_dim),
            });
        }
        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(
            id,
            CpuTexture {
                desc: *desc,
                texels: vec![[0.0; 4]; desc.texel_count()],
            },
        );
        log::debug!("cpu: allocated {} {}x{} as {:?}", desc.label, desc.width, desc.height, id);
        Ok(id)
    }

    fn release_texture(&mut self, id: TextureId) {
        self.textures.remove(&id);
    }

    fn texture_desc(&self, id: TextureId) -> Result<TextureDesc> {
        Ok(self.texture(id)?.desc)
    }

    fn clear_texture(&mut self, id: TextureId, value: Texel) -> Result<()> {
        self.texture_mut(id)?.texels.fill(value);
        Ok(())
    }

    fn write_texture(&mut self, id: TextureId, texels: &[Texel]) -> Result<()> {
        let texture = self.texture_mut(id)?;
        if texels.len() != texture.texels.len() {
            return Err(SpaceMapError::SizeMismatch(format!(
                "write of {} texels into {}x{} texture",
                texels.len(),
                texture.desc.width,
                texture.desc.height
            )));
        }
        texture.texels.copy_from_slice(texels);
        Ok(())
    }

    fn draw(&mut self, target: TextureId, draw: &SurfaceDraw) -> Result<()> {
        let texture = self.texture_mut(target)?;
        let width = texture.desc.width as usize;
        let color = draw.color;

        texture
            .texels
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(y, row)| {
                let center_y = y as f32 + 0.5;
                for tri in &draw.triangles {
                    let min = tri[0].min(tri[1]).min(tri[2]);
                    let max = tri[0].max(tri[1]).max(tri[2]);
                    if center_y + COVERAGE_HALF < min.y || center_y - COVERAGE_HALF > max.y {
                        continue;
                    }
                    let x0 = (min.x - 0.5).floor().max(0.0) as usize;
                    let x1 = ((max.x + 0.5).ceil().max(0.0) as usize).min(row.len());
                    for x in x0..x1 {
                        let center = Vec2::new(x as f32 + 0.5, center_y);
                        if triangle_covers_texel(center, COVERAGE_HALF, tri) {
                            row[x] = color;
                        }
                    }
                }
            });
        Ok(())
    }

    fn dispatch(
        &mut self,
        kernel: Kernel,
        workgroups: [u32; 2],
        bindings: KernelBindings,
        params: &KernelParams,
    ) -> Result<()> {
        if bindings.input == bindings.output {
            return Err(SpaceMapError::Device(format!(
                "{} kernel reads and writes {:?}",
                kernel.name(),
                bindings.input
            )));
        }
        let mut output = self
            .textures
            .remove(&bindings.output)
            .ok_or(SpaceMapError::UnknownTexture(bindings.output))?;
        let result = run_kernel(self, kernel, workgroups, bindings.input, &mut output, params);
        self.textures.insert(bindings.output, output);
        result?;

        self.dispatches.push(DispatchRecord {
            kernel,
            step: params.step,
            workgroups,
        });
        Ok(())
    }

    fn blit(&mut self, src: TextureId, dst: TextureId) -> Result<()> {
        let src_desc = self.texture(src)?.desc;
        let dst_desc = self.texture(dst)?.desc;
        if (src_desc.width, src_desc.height) != (dst_desc.width, dst_desc.height) {
            return Err(SpaceMapError::SizeMismatch(format!(
                "blit {}x{} into {}x{}",
                src_desc.width, src_desc.height, dst_desc.width, dst_desc.height
            )));
        }
        if src == dst {
            return Ok(());
        }
        let texels = self.texture(src)?.texels.clone();
        self.texture_mut(dst)?.texels = texels;
        Ok(())
    }

    fn read_texture(&mut self, id: TextureId) -> Result<Vec<Texel>> {
        Ok(self.texture(id)?.texels.clone())
    }
}

fn run_kernel(
    backend: &CpuBackend,
    kernel: Kernel,
    workgroups: [u32; 2],
    input: TextureId,
    output: &mut CpuTexture,
    params: &KernelParams,
) -> Result<()> {
    let src = backend.texture(input)?;
    if (src.desc.width, src.desc.height) != (output.desc.width, output.desc.height) {
        return Err(SpaceMapError::SizeMismatch(format!(
            "{} kernel input {}x{} vs output {}x{}",
            kernel.name(),
            src.desc.width,
            src.desc.height,
            output.desc.width,
            output.desc.height
        )));
    }
    let width = output.desc.width;
    let limit_x = (workgroups[0] * WORKGROUP_DIM).min(width) as usize;
    let limit_y = (workgroups[1] * WORKGROUP_DIM).min(output.desc.height) as usize;
    let src = &src.texels;

    output
        .texels
        .par_chunks_mut(width as usize)
        .enumerate()
        .take(limit_y)
        .for_each(|(y, row)| {
            let y = y as u32;
            for (x, out) in row.iter_mut().enumerate().take(limit_x) {
                let x = x as u32;
                let index = (y * width + x) as usize;
                *out = match kernel {
                    Kernel::Seed => seed_texel(x, y, src[index], params),
                    Kernel::JumpFlood => jump_texel(src, x, y, params),
                    Kernel::Fill => fill_texel(x, y, src[index], params),
                };
            }
        });
    Ok(())
}
