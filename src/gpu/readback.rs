//! Offscreen target with CPU readback, for headless renders.

use anyhow::{anyhow, Result};

use super::backend::OutputTarget;
use super::context::OFFSCREEN_FORMAT;
use crate::pipeline::RenderExtent;

/// Rows of a texture-to-buffer copy must be a multiple of this many bytes.
const ROW_ALIGNMENT: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Bytes per row once padded for a copy.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let padding = (ROW_ALIGNMENT - unpadded % ROW_ALIGNMENT) % ROW_ALIGNMENT;
    unpadded + padding
}

pub struct OffscreenTarget {
    texture: wgpu::Texture,
    target: OutputTarget,
    buffer: wgpu::Buffer,
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, extent: RenderExtent) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        // Buffer for reading back data
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_bytes_per_row(extent.width) * extent.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Self {
            texture,
            target: OutputTarget { view, extent },
            buffer,
        }
    }

    pub fn extent(&self) -> RenderExtent {
        self.target.extent
    }

    pub fn target_mut(&mut self) -> &mut OutputTarget {
        &mut self.target
    }

    /// Copy the last rendered frame back as tightly packed RGBA8 rows.
    pub fn read_rgba8(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<u8>> {
        let RenderExtent { width, height } = self.extent();
        let padded = padded_bytes_per_row(width);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &self.buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(Some(encoder.finish()));

        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| anyhow!("Readback callback dropped"))?
            .map_err(|e| anyhow!("Failed to map readback buffer: {}", e))?;

        let mut pixels = Vec::with_capacity((width * height * 4) as usize);
        {
            let data = slice.get_mapped_range();
            for row in 0..height {
                let start = (row * padded) as usize;
                pixels.extend_from_slice(&data[start..start + (width * 4) as usize]);
            }
        }
        self.buffer.unmap();
        Ok(pixels)
    }
}
