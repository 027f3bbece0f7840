//! Fullscreen lensing distortion.

use anyhow::Result;

use super::{
    create_fullscreen_pipeline, create_sampler, draw_fullscreen, texture_bind_group, texture_layout, uniform_buffer,
    uniform_layout,
};
use crate::lensing::{LensingParams, LensingUniforms};
use crate::programs::LENSING_PROGRAM;

pub struct LensingPass {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    sampler: wgpu::Sampler,
}

impl LensingPass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self> {
        let texture_layout = texture_layout(device, "Lensing Texture Layout", 1);
        let params_layout = uniform_layout(device, "Lensing Uniform Layout", wgpu::ShaderStages::FRAGMENT);
        let pipeline = create_fullscreen_pipeline(device, &LENSING_PROGRAM, format, &[&texture_layout, &params_layout])?;
        let (uniform_buffer, uniform_bind_group) = uniform_buffer(
            device,
            &params_layout,
            std::mem::size_of::<LensingUniforms>(),
            "Lensing Uniforms",
        );

        Ok(Self {
            pipeline,
            texture_layout,
            uniform_buffer,
            uniform_bind_group,
            sampler: create_sampler(device, "Lensing Sampler"),
        })
    }

    pub fn write_params(&self, queue: &wgpu::Queue, params: &LensingParams) {
        let uniforms = LensingUniforms::from(params);
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn record(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        quad: &wgpu::Buffer,
        input: &wgpu::TextureView,
        output: &wgpu::TextureView,
    ) {
        let input_group = texture_bind_group(
            device,
            &self.texture_layout,
            &[input],
            &self.sampler,
            "Lensing Texture Bind Group",
        );
        draw_fullscreen(
            encoder,
            "Lensing Pass",
            &self.pipeline,
            &[&input_group, &self.uniform_bind_group],
            quad,
            output,
        );
    }
}
