//! [`RenderBackend`] on wgpu.

use anyhow::{bail, Result};
use wgpu::util::DeviceExt;

use super::bloom_processor::BloomProcessor;
use super::lensing_pass::LensingPass;
use super::mesh::QUAD_VERTICES;
use super::scene_pass::ScenePass;
use super::{
    create_color_texture, create_fullscreen_pipeline, create_sampler, draw_fullscreen, texture_bind_group,
    texture_layout,
};
use crate::bloom::BloomParams;
use crate::disk::DiskParams;
use crate::lensing::LensingParams;
use crate::pipeline::{
    FrameInputs, PassKind, PassStep, RenderBackend, RenderExtent, Source, Target, INTERMEDIATE_BUFFERS,
};
use crate::programs::BLIT_PROGRAM;
use crate::scene::Scene;
use crate::uniforms::FrameUniforms;

/// Where the final pass lands: a surface frame or an offscreen texture.
///
/// Its size may differ from the render extent; the chain is then rendered at
/// the extent and stretched onto the target.
pub struct OutputTarget {
    pub view: wgpu::TextureView,
    pub extent: RenderExtent,
}

struct RenderTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    extent: RenderExtent,
}

impl RenderTexture {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat, extent: RenderExtent, label: &str) -> Self {
        let (texture, view) = create_color_texture(device, format, extent, label);
        Self {
            _texture: texture,
            view,
            extent,
        }
    }
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    extent: RenderExtent,

    buffers: Vec<RenderTexture>,
    /// Black input for steps reading [`Source::Cleared`]; cleared lazily.
    blank: RenderTexture,
    blank_dirty: bool,
    /// Final pass target when the output is not at the render extent.
    present: Option<RenderTexture>,

    quad_vertex_buffer: wgpu::Buffer,
    scene_pass: ScenePass,
    lensing_pass: LensingPass,
    bloom: BloomProcessor,

    blit_pipeline: wgpu::RenderPipeline,
    blit_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,

    /// Last uniform revision uploaded per pass.
    uploaded: [Option<u64>; 3],
}

impl GpuBackend {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        format: wgpu::TextureFormat,
        extent: RenderExtent,
        scene: &Scene,
    ) -> Result<Self> {
        let buffers = (0..INTERMEDIATE_BUFFERS)
            .map(|i| RenderTexture::new(&device, format, extent, &format!("Pass Buffer {}", i)))
            .collect();
        let blank = RenderTexture::new(&device, format, extent, "Blank Buffer");

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let scene_pass = ScenePass::new(&device, format, extent, scene)?;
        let lensing_pass = LensingPass::new(&device, format)?;
        let bloom = BloomProcessor::new(&device, format, extent)?;

        let blit_layout = texture_layout(&device, "Blit Texture Layout", 1);
        let blit_pipeline = create_fullscreen_pipeline(&device, &BLIT_PROGRAM, format, &[&blit_layout])?;
        let sampler = create_sampler(&device, "Blit Sampler");

        log::info!("GPU backend ready at {}x{} ({:?})", extent.width, extent.height, format);

        Ok(Self {
            device,
            queue,
            format,
            extent,
            buffers,
            blank,
            blank_dirty: true,
            present: None,
            quad_vertex_buffer,
            scene_pass,
            lensing_pass,
            bloom,
            blit_pipeline,
            blit_layout,
            sampler,
            uploaded: [None; 3],
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    /// Re-upload the starfield (e.g. after regenerating it).
    pub fn set_stars(&mut self, scene: &Scene) {
        self.scene_pass.set_stars(&self.device, &scene.starfield);
    }

    fn upload_uniforms(&mut self, steps: &[PassStep], uniforms: &FrameUniforms) -> Result<()> {
        for step in steps {
            let set = uniforms.for_pass(step.kind);
            let slot = &mut self.uploaded[pass_slot(step.kind)];
            if *slot == Some(set.revision()) {
                continue;
            }
            match step.kind {
                PassKind::Scene => self.scene_pass.write_disk(&self.queue, &DiskParams::from_set(set)?),
                PassKind::Lensing => self.lensing_pass.write_params(&self.queue, &LensingParams::from_set(set)?),
                PassKind::Bloom => self.bloom.write_params(&self.queue, &BloomParams::from_set(set)?),
            }
            *slot = Some(set.revision());
        }
        Ok(())
    }

    fn blit(&self, encoder: &mut wgpu::CommandEncoder, label: &str, input: &wgpu::TextureView, output: &wgpu::TextureView) {
        let group = texture_bind_group(&self.device, &self.blit_layout, &[input], &self.sampler, "Blit Bind Group");
        draw_fullscreen(encoder, label, &self.blit_pipeline, &[&group], &self.quad_vertex_buffer, output);
    }

    fn input_view(&self, source: Source) -> Result<&wgpu::TextureView> {
        match source {
            Source::Cleared => Ok(&self.blank.view),
            Source::Buffer(i) => match self.buffers.get(i) {
                Some(buffer) => Ok(&buffer.view),
                None => bail!("Pass reads buffer {} but only {} exist", i, self.buffers.len()),
            },
        }
    }
}

fn pass_slot(kind: PassKind) -> usize {
    match kind {
        PassKind::Scene => 0,
        PassKind::Lensing => 1,
        PassKind::Bloom => 2,
    }
}

fn clear_view(encoder: &mut wgpu::CommandEncoder, label: &str, view: &wgpu::TextureView) {
    let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
}

impl RenderBackend for GpuBackend {
    type Target = OutputTarget;

    fn resize(&mut self, extent: RenderExtent) {
        if extent == self.extent && self.buffers.iter().all(|b| b.extent == extent) {
            return;
        }
        self.extent = extent;
        self.buffers = (0..INTERMEDIATE_BUFFERS)
            .map(|i| RenderTexture::new(&self.device, self.format, extent, &format!("Pass Buffer {}", i)))
            .collect();
        self.blank = RenderTexture::new(&self.device, self.format, extent, "Blank Buffer");
        self.blank_dirty = true;
        self.present = None;
        self.scene_pass.resize(&self.device, extent);
        self.bloom.resize(&self.device, extent, BloomParams::default().downsample);
        log::debug!("GPU buffers resized to {}x{}", extent.width, extent.height);
    }

    fn execute(&mut self, steps: &[PassStep], frame: &FrameInputs<'_>, target: &mut OutputTarget) -> Result<()> {
        self.upload_uniforms(steps, frame.uniforms)?;
        self.scene_pass
            .write_frame(&self.queue, frame.camera, frame.scene, self.extent);

        let stretched = target.extent != self.extent;
        if stretched && self.present.is_none() {
            self.present = Some(RenderTexture::new(&self.device, self.format, self.extent, "Present Buffer"));
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        if self.blank_dirty {
            clear_view(&mut encoder, "Blank Clear Pass", &self.blank.view);
            self.blank_dirty = false;
        }

        if steps.is_empty() {
            clear_view(&mut encoder, "Empty Frame Pass", &target.view);
        }

        for step in steps {
            let input = self.input_view(step.input)?;
            let output = match step.output {
                Target::Buffer(i) => match self.buffers.get(i) {
                    Some(buffer) => &buffer.view,
                    None => bail!("Pass writes buffer {} but only {} exist", i, self.buffers.len()),
                },
                Target::Output => match (&self.present, stretched) {
                    (Some(present), true) => &present.view,
                    _ => &target.view,
                },
            };

            match step.kind {
                PassKind::Scene => {
                    self.scene_pass
                        .record(&mut encoder, output, frame.scene.starfield.visible);
                }
                PassKind::Lensing => {
                    self.lensing_pass
                        .record(&self.device, &mut encoder, &self.quad_vertex_buffer, input, output);
                }
                PassKind::Bloom => {
                    let params = BloomParams::from_set(frame.uniforms.for_pass(PassKind::Bloom))?;
                    let bloomed = self.bloom.process(
                        &self.device,
                        &mut encoder,
                        &self.quad_vertex_buffer,
                        input,
                        output,
                        &params,
                    );
                    if !bloomed {
                        self.blit(&mut encoder, "Bloom Blit Pass", input, output);
                    }
                }
            }
        }

        if stretched && !steps.is_empty() {
            if let Some(present) = &self.present {
                self.blit(&mut encoder, "Present Blit Pass", &present.view, &target.view);
            }
        }

        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn buffer_extents(&self) -> Vec<RenderExtent> {
        self.buffers.iter().map(|b| b.extent).collect()
    }
}
