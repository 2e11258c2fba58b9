//! wgpu implementation of [`ComputeBackend`](crate::backend::ComputeBackend).
//!
//! Textures are `Rgba32Float` with storage, sampling and copy usages. Every
//! draw and dispatch is encoded into its own command buffer and submitted
//! in issue order, which gives the pass-to-pass barrier the pipeline needs.

use std::collections::HashMap;

use crate::backend::{TextureDesc, TextureId};
use crate::error::{Result, SpaceMapError};

mod buffers;
mod dispatch;
mod pipelines;
mod shaders;

use pipelines::{create_pipelines, GpuPipelines};

pub use shaders::{PROPAGATE_WGSL, RASTER_WGSL};

/// Configuration for the wgpu backend.
#[derive(Debug, Clone, Default)]
pub struct WgpuBackendConfig {
    pub power_preference: wgpu::PowerPreference,
    /// Prefix for the device label, useful when several backends share a
    /// GPU capture.
    pub label_prefix: Option<String>,
}

/// Summary of device limits relevant to map captures.
#[derive(Debug, Clone, Copy)]
pub struct GpuLimitsSummary {
    pub max_texture_dimension_2d: u32,
    pub max_compute_workgroups_per_dimension: u32,
    pub max_storage_buffer_binding_size: u64,
}

pub(crate) struct GpuTexture {
    pub desc: TextureDesc,
    pub texture: wgpu::Texture,
}

/// GPU backend running the raster, seed, jump-flood and fill kernels as
/// wgpu compute pipelines.
pub struct WgpuBackend {
    pub(crate) instance: wgpu::Instance,
    pub(crate) adapter: wgpu::Adapter,
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) pipelines: GpuPipelines,
    pub(crate) textures: HashMap<TextureId, GpuTexture>,
    pub(crate) next_id: u32,
    pub(crate) limits: GpuLimitsSummary,
}

impl WgpuBackend {
    /// Requests an adapter and device and compiles every pipeline.
    pub async fn new(config: WgpuBackendConfig) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                ..Default::default()
            })
            .await
            .ok_or(SpaceMapError::NoAdapter)?;

        let label = config
            .label_prefix
            .as_deref()
            .map(|prefix| format!("{prefix}.space_map.device"));
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: label.as_deref(),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| SpaceMapError::Device(format!("failed to request device: {e}")))?;

        let device_limits = device.limits();
        let limits = GpuLimitsSummary {
            max_texture_dimension_2d: device_limits.max_texture_dimension_2d,
            max_compute_workgroups_per_dimension: device_limits.max_compute_workgroups_per_dimension,
            max_storage_buffer_binding_size: device_limits.max_storage_buffer_binding_size as u64,
        };

        let pipelines = create_pipelines(&device).await?;
        log::info!(
            "wgpu backend on {} (max texture {})",
            adapter.get_info().name,
            limits.max_texture_dimension_2d
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            pipelines,
            textures: HashMap::new(),
            next_id: 0,
            limits,
        })
    }

    pub fn instance(&self) -> &wgpu::Instance {
        &self.instance
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Limits captured at device creation.
    pub fn limits_summary(&self) -> GpuLimitsSummary {
        self.limits
    }

    /// The wgpu texture behind `id`, for binding a published map in a
    /// render pass.
    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(&id).map(|t| &t.texture)
    }

    pub(crate) fn gpu_texture(&self, id: TextureId) -> Result<&GpuTexture> {
        self.textures.get(&id).ok_or(SpaceMapError::UnknownTexture(id))
    }

    pub(crate) fn ensure_workgroups_fit(&self, workgroups: [u32; 2], label: &str) -> Result<()> {
        let max = self.limits.max_compute_workgroups_per_dimension;
        if workgroups[0] > max || workgroups[1] > max {
            return Err(SpaceMapError::Device(format!(
                "{label}: workgroups {workgroups:?} exceed max {max}"
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_storage_fits(&self, bytes: u64, label: &str) -> Result<()> {
        if bytes > self.limits.max_storage_buffer_binding_size {
            return Err(SpaceMapError::Device(format!(
                "{label}: buffer size {} bytes exceeds max {} bytes",
                bytes, self.limits.max_storage_buffer_binding_size
            )));
        }
        Ok(())
    }
}
