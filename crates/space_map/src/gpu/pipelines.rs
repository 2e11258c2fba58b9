use crate::backend::Kernel;
use crate::error::{Result, SpaceMapError};

use super::shaders::{PROPAGATE_WGSL, RASTER_WGSL};

pub struct GpuPipelines {
    pub raster: wgpu::ComputePipeline,
    pub raster_bind_group_layout: wgpu::BindGroupLayout,
    pub seed: wgpu::ComputePipeline,
    pub jump_flood: wgpu::ComputePipeline,
    pub fill: wgpu::ComputePipeline,
    pub kernel_bind_group_layout: wgpu::BindGroupLayout,
}

impl GpuPipelines {
    pub fn kernel(&self, kernel: Kernel) -> &wgpu::ComputePipeline {
        match kernel {
            Kernel::Seed => &self.seed,
            Kernel::JumpFlood => &self.jump_flood,
            Kernel::Fill => &self.fill,
        }
    }
}

fn storage_texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::StorageTexture {
            access: wgpu::StorageTextureAccess::WriteOnly,
            format: wgpu::TextureFormat::Rgba32Float,
            view_dimension: wgpu::TextureViewDimension::D2,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub async fn create_pipelines(device: &wgpu::Device) -> Result<GpuPipelines> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let raster_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("space_map.raster.wgsl"),
        source: wgpu::ShaderSource::Wgsl(RASTER_WGSL.into()),
    });
    let propagate_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("space_map.propagate.wgsl"),
        source: wgpu::ShaderSource::Wgsl(PROPAGATE_WGSL.into()),
    });

    let raster_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("space_map.raster_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            storage_texture_entry(1),
            uniform_entry(2),
        ],
    });
    let kernel_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("space_map.kernel_bind_group_layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            storage_texture_entry(1),
            uniform_entry(2),
        ],
    });

    let raster_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("space_map.raster_pipeline_layout"),
        bind_group_layouts: &[&raster_bind_group_layout],
        push_constant_ranges: &[],
    });
    let kernel_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("space_map.kernel_pipeline_layout"),
        bind_group_layouts: &[&kernel_bind_group_layout],
        push_constant_ranges: &[],
    });

    let raster = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some("space_map.raster_pipeline"),
        layout: Some(&raster_pipeline_layout),
        module: &raster_shader,
        entry_point: "main",
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    let kernel_pipeline = |kernel: Kernel| {
        device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(kernel.name()),
            layout: Some(&kernel_pipeline_layout),
            module: &propagate_shader,
            entry_point: kernel.name(),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        })
    };
    let seed = kernel_pipeline(Kernel::Seed);
    let jump_flood = kernel_pipeline(Kernel::JumpFlood);
    let fill = kernel_pipeline(Kernel::Fill);

    if let Some(err) = device.pop_error_scope().await {
        return Err(SpaceMapError::Device(format!("pipeline validation error: {err}")));
    }

    Ok(GpuPipelines {
        raster,
        raster_bind_group_layout,
        seed,
        jump_flood,
        fill,
        kernel_bind_group_layout,
    })
}
