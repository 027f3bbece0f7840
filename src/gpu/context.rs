//! Adapter, device and shader compilation.

use anyhow::{anyhow, Context, Result};

use crate::programs::ProgramAsset;

/// Format of offscreen targets (headless renders, readback).
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Device without a surface, for offscreen rendering.
    pub async fn headless() -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("No adapter found"))?;
        Self::finish(instance, adapter, wgpu::Limits::default()).await
    }

    /// Device able to present to `surface`.
    pub async fn for_surface(
        instance: wgpu::Instance,
        surface: &wgpu::Surface<'_>,
        limits: wgpu::Limits,
    ) -> Result<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::None,
                compatible_surface: Some(surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| anyhow!("Failed to find an appropriate adapter"))?;
        Self::finish(instance, adapter, limits).await
    }

    async fn finish(instance: wgpu::Instance, adapter: wgpu::Adapter, limits: wgpu::Limits) -> Result<Self> {
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Event Horizon Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .context("Failed to create device")?;

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
        })
    }

    /// Surface configuration preferring an sRGB format.
    pub fn surface_config(&self, surface: &wgpu::Surface<'_>, width: u32, height: u32) -> wgpu::SurfaceConfiguration {
        let caps = surface.get_capabilities(&self.adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .unwrap_or(OFFSCREEN_FORMAT);
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }
}

/// Compile `program`, turning validation failures into an error that names it.
///
/// On the web the error scope cannot be awaited synchronously; failures
/// there surface through the device's uncaptured error handler instead.
pub fn compile_program(device: &wgpu::Device, program: &ProgramAsset) -> Result<wgpu::ShaderModule> {
    let label = program.label();
    let source = program.source();

    #[cfg(not(target_arch = "wasm32"))]
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    #[cfg(not(target_arch = "wasm32"))]
    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(anyhow!("Failed to compile {}: {}", label, error));
    }

    log::debug!("Compiled {}", label);
    Ok(module)
}
