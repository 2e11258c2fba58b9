use futures::executor::block_on;
use wgpu::util::DeviceExt;

use crate::backend::{
    workgroups_for, ComputeBackend, Kernel, KernelBindings, KernelParams, SurfaceDraw, TextureDesc,
    TextureId,
};
use crate::core::Texel;
use crate::error::{Result, SpaceMapError};

use super::buffers::{map_buffer_bytes, padded_bytes_per_row, unpad_rows};
use super::{GpuTexture, WgpuBackend};

fn extent(desc: &TextureDesc) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: desc.width,
        height: desc.height,
        depth_or_array_layers: 1,
    }
}

fn full_copy(texture: &wgpu::Texture) -> wgpu::ImageCopyTexture<'_> {
    wgpu::ImageCopyTexture {
        texture,
        mip_level: 0,
        origin: wgpu::Origin3d::ZERO,
        aspect: wgpu::TextureAspect::All,
    }
}

impl WgpuBackend {
    fn params_buffer(&self, params: &KernelParams) -> wgpu::Buffer {
        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("space_map.params"),
            contents: bytemuck::bytes_of(params),
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    fn submit_compute(
        &self,
        label: &str,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups: [u32; 2],
    ) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("space_map.encoder"),
        });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(label),
                timestamp_writes: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.dispatch_workgroups(workgroups[0], workgroups[1], 1);
        }
        self.queue.submit([encoder.finish()]);
    }
}

impl ComputeBackend for WgpuBackend {
    fn allocate_texture(&mut self, desc: &TextureDesc) -> Result<TextureId> {
        let max = self.limits.max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(SpaceMapError::AllocationFailed {
                width: desc.width,
                height: desc.height,
                reason: format!("dimensions must be within 1..={max}"),
            });
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: extent(desc),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            texture.destroy();
            return Err(SpaceMapError::AllocationFailed {
                width: desc.width,
                height: desc.height,
                reason: err.to_string(),
            });
        }

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.textures.insert(id, GpuTexture { desc: *desc, texture });
        log::debug!("gpu: allocated {} {}x{} as {:?}", desc.label, desc.width, desc.height, id);
        Ok(id)
    }

    fn release_texture(&mut self, id: TextureId) {
        if let Some(gpu) = self.textures.remove(&id) {
            gpu.texture.destroy();
        }
    }

    fn texture_desc(&self, id: TextureId) -> Result<TextureDesc> {
        Ok(self.gpu_texture(id)?.desc)
    }

    fn clear_texture(&mut self, id: TextureId, value: Texel) -> Result<()> {
        let count = self.gpu_texture(id)?.desc.texel_count();
        self.write_texture(id, &vec![value; count])
    }

    fn write_texture(&mut self, id: TextureId, texels: &[Texel]) -> Result<()> {
        let gpu = self.gpu_texture(id)?;
        if texels.len() != gpu.desc.texel_count() {
            return Err(SpaceMapError::SizeMismatch(format!(
                "write of {} texels into {}x{} texture",
                texels.len(),
                gpu.desc.width,
                gpu.desc.height
            )));
        }
        self.queue.write_texture(
            full_copy(&gpu.texture),
            bytemuck::cast_slice(texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(gpu.desc.width * std::mem::size_of::<Texel>() as u32),
                rows_per_image: Some(gpu.desc.height),
            },
            extent(&gpu.desc),
        );
        Ok(())
    }

    fn draw(&mut self, target: TextureId, draw: &SurfaceDraw) -> Result<()> {
        if draw.triangles.is_empty() {
            return Ok(());
        }
        let gpu = self.gpu_texture(target)?;
        let desc = gpu.desc;

        let tri_data: Vec<[f32; 4]> = draw
            .triangles
            .iter()
            .flat_map(|[a, b, c]| [[a.x, a.y, b.x, b.y], [c.x, c.y, 0.0, 0.0]])
            .collect();
        let tri_bytes = (tri_data.len() * std::mem::size_of::<[f32; 4]>()) as u64;
        self.ensure_storage_fits(tri_bytes, "raster triangles")?;
        let workgroups = workgroups_for(desc.width, desc.height);
        self.ensure_workgroups_fit(workgroups, "raster dispatch")?;

        let tri_buf = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("space_map.triangles"),
            contents: bytemuck::cast_slice(&tri_data),
            usage: wgpu::BufferUsages::STORAGE,
        });
        let params = KernelParams {
            width: desc.width,
            height: desc.height,
            step: 0,
            triangle_count: draw.triangles.len() as u32,
            surface_color: [0.0; 4],
            object_color: [0.0; 4],
            background_color: [0.0; 4],
            draw_color: draw.color,
        };
        let params_buf = self.params_buffer(&params);
        let view = gpu.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("space_map.raster_bind_group"),
            layout: &self.pipelines.raster_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: tri_buf.as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&view) },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });
        self.submit_compute("space_map.raster", &self.pipelines.raster, &bind_group, workgroups);
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
        self.ensure_workgroups_fit(workgroups, kernel.name())?;
        let input = self.gpu_texture(bindings.input)?;
        let output = self.gpu_texture(bindings.output)?;
        if (input.desc.width, input.desc.height) != (output.desc.width, output.desc.height) {
            return Err(SpaceMapError::SizeMismatch(format!(
                "{} kernel input {}x{} vs output {}x{}",
                kernel.name(),
                input.desc.width,
                input.desc.height,
                output.desc.width,
                output.desc.height
            )));
        }

        let input_view = input.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let output_view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let params_buf = self.params_buffer(params);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("space_map.kernel_bind_group"),
            layout: &self.pipelines.kernel_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&input_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::TextureView(&output_view) },
                wgpu::BindGroupEntry { binding: 2, resource: params_buf.as_entire_binding() },
            ],
        });
        self.submit_compute(kernel.name(), self.pipelines.kernel(kernel), &bind_group, workgroups);
        log::debug!("gpu: dispatched {} step {} over {:?}", kernel.name(), params.step, workgroups);
        Ok(())
    }

    fn blit(&mut self, src: TextureId, dst: TextureId) -> Result<()> {
        let source = self.gpu_texture(src)?;
        let target = self.gpu_texture(dst)?;
        if (source.desc.width, source.desc.height) != (target.desc.width, target.desc.height) {
            return Err(SpaceMapError::SizeMismatch(format!(
                "blit {}x{} into {}x{}",
                source.desc.width, source.desc.height, target.desc.width, target.desc.height
            )));
        }
        if src == dst {
            return Ok(());
        }
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("space_map.blit"),
        });
        encoder.copy_texture_to_texture(
            full_copy(&source.texture),
            full_copy(&target.texture),
            extent(&source.desc),
        );
        self.queue.submit([encoder.finish()]);
        Ok(())
    }

    fn read_texture(&mut self, id: TextureId) -> Result<Vec<Texel>> {
        let gpu = self.gpu_texture(id)?;
        let desc = gpu.desc;
        let pitch = padded_bytes_per_row(desc.width);

        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("space_map.readback"),
            size: pitch as u64 * desc.height as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("space_map.readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            full_copy(&gpu.texture),
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(pitch),
                    rows_per_image: Some(desc.height),
                },
            },
            extent(&desc),
        );
        self.queue.submit([encoder.finish()]);

        let bytes = block_on(map_buffer_bytes(&readback, &self.device))?;
        unpad_rows(&bytes, desc.width, desc.height, pitch)
    }
}
