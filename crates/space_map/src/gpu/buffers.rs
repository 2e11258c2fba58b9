use crate::core::Texel;
use crate::error::{Result, SpaceMapError};

const TEXEL_BYTES: u32 = std::mem::size_of::<Texel>() as u32;

/// Row pitch of a texture-to-buffer copy, rounded up to the copy alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * TEXEL_BYTES;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Strips row padding from a readback buffer.
pub fn unpad_rows(data: &[u8], width: u32, height: u32, padded_bytes_per_row: u32) -> Result<Vec<Texel>> {
    let row_bytes = (width * TEXEL_BYTES) as usize;
    let pitch = padded_bytes_per_row as usize;
    if data.len() < pitch * (height as usize).saturating_sub(1) + row_bytes {
        return Err(SpaceMapError::SizeMismatch(format!(
            "readback of {} bytes for {width}x{height} texture",
            data.len()
        )));
    }
    let mut texels = Vec::with_capacity(width as usize * height as usize);
    for row in 0..height as usize {
        let start = row * pitch;
        texels.extend(
            data[start..start + row_bytes]
                .chunks_exact(TEXEL_BYTES as usize)
                .map(bytemuck::pod_read_unaligned::<Texel>),
        );
    }
    Ok(texels)
}

pub async fn map_buffer_bytes(buffer: &wgpu::Buffer, device: &wgpu::Device) -> Result<Vec<u8>> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    receiver
        .await
        .map_err(|_| SpaceMapError::Device("map callback dropped".into()))?
        .map_err(|e| SpaceMapError::Device(format!("map buffer: {e}")))?;
    let data = slice.get_mapped_range();
    let result = data.to_vec();
    drop(data);
    buffer.unmap();
    Ok(result)
}
