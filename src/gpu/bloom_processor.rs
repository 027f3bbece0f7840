//! Multi-pass bloom processor.
//!
//! Implements efficient bloom using:
//! 1. Threshold pass - extract bright pixels
//! 2. Downscale - process at lower resolution
//! 3. Separable blur - horizontal then vertical passes
//! 4. Composite - add the glow back onto the input

use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::{
    create_color_texture, create_fullscreen_pipeline, create_sampler, draw_fullscreen, texture_bind_group,
    texture_layout, uniform_buffer, uniform_layout,
};
use crate::bloom::{BloomParams, SOFT_KNEE};
use crate::pipeline::RenderExtent;
use crate::programs::{BLOOM_BLUR_PROGRAM, BLOOM_COMPOSITE_PROGRAM, BLOOM_THRESHOLD_PROGRAM};

/// Uniforms for threshold pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct ThresholdUniforms {
    threshold: f32,
    soft_knee: f32,
    _padding: [f32; 2],
}

/// Uniforms for blur pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct BlurUniforms {
    direction_and_radius: [f32; 4], // xy = direction, z = radius, w = unused
}

/// Uniforms for composite pass
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct CompositeUniforms {
    strength: f32,
    _padding: [f32; 3],
}

/// Multi-pass bloom processor
pub struct BloomProcessor {
    // Textures for bloom processing (downsampled resolution)
    _bloom_texture_a: wgpu::Texture,
    _bloom_texture_b: wgpu::Texture,
    bloom_view_a: wgpu::TextureView,
    bloom_view_b: wgpu::TextureView,

    threshold_pipeline: wgpu::RenderPipeline,
    blur_pipeline: wgpu::RenderPipeline,
    composite_pipeline: wgpu::RenderPipeline,

    single_texture_layout: wgpu::BindGroupLayout,
    composite_layout: wgpu::BindGroupLayout,

    // Each blur direction has its own buffer: both are written before the
    // encoder is submitted.
    threshold_uniform_buffer: wgpu::Buffer,
    blur_h_uniform_buffer: wgpu::Buffer,
    blur_v_uniform_buffer: wgpu::Buffer,
    composite_uniform_buffer: wgpu::Buffer,

    threshold_uniform_bind_group: wgpu::BindGroup,
    blur_h_uniform_bind_group: wgpu::BindGroup,
    blur_v_uniform_bind_group: wgpu::BindGroup,
    composite_uniform_bind_group: wgpu::BindGroup,

    sampler: wgpu::Sampler,

    bloom_extent: RenderExtent,
    format: wgpu::TextureFormat,
    current_downsample: u32,
}

impl BloomProcessor {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, extent: RenderExtent) -> Result<Self> {
        let downsample = BloomParams::default().downsample;
        let bloom_extent = extent.downsampled(downsample);

        let (bloom_texture_a, bloom_view_a) = create_color_texture(device, format, bloom_extent, "Bloom A");
        let (bloom_texture_b, bloom_view_b) = create_color_texture(device, format, bloom_extent, "Bloom B");

        let sampler = create_sampler(device, "Bloom Sampler");

        let single_texture_layout = texture_layout(device, "Bloom Single Texture Layout", 1);
        // Composite needs two textures
        let composite_layout = texture_layout(device, "Bloom Composite Layout", 2);
        let params_layout = uniform_layout(device, "Bloom Uniform Layout", wgpu::ShaderStages::FRAGMENT);

        let threshold_pipeline = create_fullscreen_pipeline(
            device,
            &BLOOM_THRESHOLD_PROGRAM,
            format,
            &[&single_texture_layout, &params_layout],
        )?;
        let blur_pipeline =
            create_fullscreen_pipeline(device, &BLOOM_BLUR_PROGRAM, format, &[&single_texture_layout, &params_layout])?;
        let composite_pipeline = create_fullscreen_pipeline(
            device,
            &BLOOM_COMPOSITE_PROGRAM,
            format,
            &[&composite_layout, &params_layout],
        )?;

        let (threshold_uniform_buffer, threshold_uniform_bind_group) = uniform_buffer(
            device,
            &params_layout,
            std::mem::size_of::<ThresholdUniforms>(),
            "Bloom Threshold Uniforms",
        );
        let (blur_h_uniform_buffer, blur_h_uniform_bind_group) = uniform_buffer(
            device,
            &params_layout,
            std::mem::size_of::<BlurUniforms>(),
            "Bloom Blur H Uniforms",
        );
        let (blur_v_uniform_buffer, blur_v_uniform_bind_group) = uniform_buffer(
            device,
            &params_layout,
            std::mem::size_of::<BlurUniforms>(),
            "Bloom Blur V Uniforms",
        );
        let (composite_uniform_buffer, composite_uniform_bind_group) = uniform_buffer(
            device,
            &params_layout,
            std::mem::size_of::<CompositeUniforms>(),
            "Bloom Composite Uniforms",
        );

        Ok(Self {
            _bloom_texture_a: bloom_texture_a,
            _bloom_texture_b: bloom_texture_b,
            bloom_view_a,
            bloom_view_b,
            threshold_pipeline,
            blur_pipeline,
            composite_pipeline,
            single_texture_layout,
            composite_layout,
            threshold_uniform_buffer,
            blur_h_uniform_buffer,
            blur_v_uniform_buffer,
            composite_uniform_buffer,
            threshold_uniform_bind_group,
            blur_h_uniform_bind_group,
            blur_v_uniform_bind_group,
            composite_uniform_bind_group,
            sampler,
            bloom_extent,
            format,
            current_downsample: downsample,
        })
    }

    /// Resize bloom textures
    pub fn resize(&mut self, device: &wgpu::Device, extent: RenderExtent, downsample: u32) {
        let ds = downsample.clamp(1, 8);
        let bloom_extent = extent.downsampled(ds);
        if bloom_extent == self.bloom_extent {
            return;
        }

        self.bloom_extent = bloom_extent;
        self.current_downsample = ds;

        let (tex_a, view_a) = create_color_texture(device, self.format, bloom_extent, "Bloom A");
        let (tex_b, view_b) = create_color_texture(device, self.format, bloom_extent, "Bloom B");
        self._bloom_texture_a = tex_a;
        self._bloom_texture_b = tex_b;
        self.bloom_view_a = view_a;
        self.bloom_view_b = view_b;
    }

    /// Get current downsample factor
    pub fn current_downsample(&self) -> u32 {
        self.current_downsample
    }

    pub fn bloom_extent(&self) -> RenderExtent {
        self.bloom_extent
    }

    /// Upload the tunables. Called only when the bloom uniform set changed.
    pub fn write_params(&self, queue: &wgpu::Queue, params: &BloomParams) {
        let params = params.sanitize();
        let radius = params.blur_radius();

        let threshold = ThresholdUniforms {
            threshold: params.threshold,
            soft_knee: SOFT_KNEE,
            _padding: [0.0; 2],
        };
        queue.write_buffer(&self.threshold_uniform_buffer, 0, bytemuck::bytes_of(&threshold));

        let horizontal = BlurUniforms {
            direction_and_radius: [1.0, 0.0, radius, 0.0],
        };
        queue.write_buffer(&self.blur_h_uniform_buffer, 0, bytemuck::bytes_of(&horizontal));

        let vertical = BlurUniforms {
            direction_and_radius: [0.0, 1.0, radius, 0.0],
        };
        queue.write_buffer(&self.blur_v_uniform_buffer, 0, bytemuck::bytes_of(&vertical));

        let composite = CompositeUniforms {
            strength: params.strength,
            _padding: [0.0; 3],
        };
        queue.write_buffer(&self.composite_uniform_buffer, 0, bytemuck::bytes_of(&composite));
    }

    /// Record the bloom chain from `input_view` into `output_view`.
    ///
    /// Returns false without recording anything when `params` make bloom a
    /// copy; the caller blits instead.
    pub fn process(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        quad: &wgpu::Buffer,
        input_view: &wgpu::TextureView,
        output_view: &wgpu::TextureView,
        params: &BloomParams,
    ) -> bool {
        if params.sanitize().is_passthrough() {
            return false;
        }

        // 1. Threshold pass: scene -> bloom_a (downsampled)
        let input_group = texture_bind_group(
            device,
            &self.single_texture_layout,
            &[input_view],
            &self.sampler,
            "Bloom Threshold Texture Bind Group",
        );
        draw_fullscreen(
            encoder,
            "Bloom Threshold Pass",
            &self.threshold_pipeline,
            &[&input_group, &self.threshold_uniform_bind_group],
            quad,
            &self.bloom_view_a,
        );

        // 2. Horizontal blur: bloom_a -> bloom_b
        let a_group = texture_bind_group(
            device,
            &self.single_texture_layout,
            &[&self.bloom_view_a],
            &self.sampler,
            "Bloom Blur H Texture Bind Group",
        );
        draw_fullscreen(
            encoder,
            "Bloom Blur H Pass",
            &self.blur_pipeline,
            &[&a_group, &self.blur_h_uniform_bind_group],
            quad,
            &self.bloom_view_b,
        );

        // 3. Vertical blur: bloom_b -> bloom_a
        let b_group = texture_bind_group(
            device,
            &self.single_texture_layout,
            &[&self.bloom_view_b],
            &self.sampler,
            "Bloom Blur V Texture Bind Group",
        );
        draw_fullscreen(
            encoder,
            "Bloom Blur V Pass",
            &self.blur_pipeline,
            &[&b_group, &self.blur_v_uniform_bind_group],
            quad,
            &self.bloom_view_a,
        );

        // 4. Composite: scene + bloom_a -> output
        let composite_group = texture_bind_group(
            device,
            &self.composite_layout,
            &[input_view, &self.bloom_view_a],
            &self.sampler,
            "Bloom Composite Texture Bind Group",
        );
        draw_fullscreen(
            encoder,
            "Bloom Composite Pass",
            &self.composite_pipeline,
            &[&composite_group, &self.composite_uniform_bind_group],
            quad,
            output_view,
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        assert_eq!(std::mem::size_of::<ThresholdUniforms>(), 16);
        assert_eq!(std::mem::size_of::<BlurUniforms>(), 16);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 16);
    }
}
