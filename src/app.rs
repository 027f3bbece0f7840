//! Native window.
//!
//! One `winit` event loop drives everything: window events, key bindings,
//! orbit input and redraws. Console updates arrive on a [`ControlChannel`]
//! and are applied at the start of each redraw.

use std::sync::Arc;

use anyhow::Result;
use winit::dpi::{LogicalSize, PhysicalPosition, PhysicalSize};
use winit::event::{ElementState, Event, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::window::{Window, WindowBuilder};

use crate::config::AppConfig;
use crate::control::{describe_params, nudge, spawn_console, toggle, ControlChannel};
use crate::frame::{tick, FrameClock, FrameContext, Viewport};
use crate::gpu::{GpuBackend, GpuContext, OutputTarget};
use crate::params::{ParamId, ParamUpdate};
use crate::pipeline::RenderExtent;
use crate::scene::Scene;

/// Pixels of wheel travel counted as one zoom step.
const PIXELS_PER_ZOOM_STEP: f64 = 50.0;

const KEY_HELP: &str = "keys: B bloom, L lensing, S stars, +/- bloom strength, \
    Up/Down lensing mass, Left/Right disk speed, [/] resolution scale, P params, Esc quit";

struct WindowApp {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    ctx: FrameContext<GpuBackend>,
    dragging: bool,
    cursor: Option<PhysicalPosition<f64>>,
}

impl WindowApp {
    async fn new(config: &AppConfig, window: Arc<Window>) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window.clone())?;
        let gpu = GpuContext::for_surface(instance, &surface, wgpu::Limits::default()).await?;

        let size = window.inner_size();
        let surface_config = gpu.surface_config(&surface, size.width, size.height);
        surface.configure(&gpu.device, &surface_config);
        log::info!(
            "Surface {}x{} ({:?})",
            surface_config.width,
            surface_config.height,
            surface_config.format
        );

        let dpr = window.scale_factor();
        let logical = size.to_logical::<f64>(dpr);
        let viewport = Viewport::new(logical.width, logical.height, dpr, config.max_pixel_ratio as f64);

        let scene = Scene::new(&config.stars);
        let extent = viewport.extent(config.params.resolution_scale);
        let GpuContext { device, queue, .. } = gpu;
        let backend = GpuBackend::new(device, queue, surface_config.format, extent, &scene)?;
        let ctx = FrameContext::with_scene(config, scene, backend, viewport)?;

        Ok(Self {
            window,
            surface,
            config: surface_config,
            ctx,
            dragging: false,
            cursor: None,
        })
    }

    fn configure_surface(&self) {
        self.surface
            .configure(self.ctx.composer.backend().device(), &self.config);
    }

    fn resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        // Minimised
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.configure_surface();

        let dpr = self.window.scale_factor();
        let logical = size.to_logical::<f64>(dpr);
        self.ctx.resize_viewport(logical.width, logical.height, dpr)?;
        Ok(())
    }

    /// Returns false when the loop should stop.
    fn handle_key(&mut self, key: &Key) -> Result<bool> {
        let surface = &self.ctx.surface;
        let update: Option<ParamUpdate> = match key {
            Key::Named(NamedKey::Escape) => return Ok(false),
            Key::Named(NamedKey::ArrowUp) => nudge(surface, ParamId::LensingMass, 0.005),
            Key::Named(NamedKey::ArrowDown) => nudge(surface, ParamId::LensingMass, -0.005),
            Key::Named(NamedKey::ArrowRight) => nudge(surface, ParamId::DiskSpeed, 0.1),
            Key::Named(NamedKey::ArrowLeft) => nudge(surface, ParamId::DiskSpeed, -0.1),
            Key::Character(c) => match c.to_lowercase().as_str() {
                "b" => toggle(surface, ParamId::BloomEnabled),
                "l" => toggle(surface, ParamId::LensingEnabled),
                "s" => toggle(surface, ParamId::StarsVisible),
                "+" | "=" => nudge(surface, ParamId::BloomStrength, 0.1),
                "-" => nudge(surface, ParamId::BloomStrength, -0.1),
                "]" => nudge(surface, ParamId::ResolutionScale, 0.1),
                "[" => nudge(surface, ParamId::ResolutionScale, -0.1),
                "p" => {
                    println!("{}", describe_params(surface));
                    None
                }
                "h" => {
                    println!("{}", KEY_HELP);
                    None
                }
                _ => None,
            },
            _ => None,
        };

        if let Some(update) = update {
            if let Some(reaction) = self.ctx.apply(update)? {
                log::info!("{} = {}", update.id, self.ctx.surface.get(update.id));
                log::debug!("{:?}", reaction);
            }
        }
        Ok(true)
    }

    fn cursor_moved(&mut self, position: PhysicalPosition<f64>) {
        if self.dragging {
            if let Some(last) = self.cursor {
                let dx = (position.x - last.x) as f32;
                let dy = (position.y - last.y) as f32;
                self.ctx.camera.controls.rotate(dx, dy);
            }
        }
        self.cursor = Some(position);
    }

    fn wheel(&mut self, delta: MouseScrollDelta) {
        let steps = match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(p) => (p.y / PIXELS_PER_ZOOM_STEP) as f32,
        };
        self.ctx.camera.controls.zoom(steps);
    }

    /// Render one frame. Returns false when the loop should stop.
    fn redraw(&mut self, elapsed: f32, channel: &ControlChannel) -> Result<bool> {
        self.ctx.apply_pending(channel)?;

        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::warn!("Surface lost, reconfiguring");
                self.configure_surface();
                return Ok(true);
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
                return Ok(false);
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
                return Ok(true);
            }
        };

        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let mut target = OutputTarget {
            view,
            extent: RenderExtent::new(self.config.width, self.config.height),
        };
        tick(&mut self.ctx, elapsed, &mut target)?;
        frame.present();
        Ok(true)
    }
}

/// Open the window and run until it is closed.
pub fn run(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window.title.as_str())
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height))
            .build(&event_loop)?,
    );

    let mut app = pollster::block_on(WindowApp::new(&config, window))?;

    let channel = ControlChannel::new();
    if let Err(e) = spawn_console(channel.sender()) {
        log::warn!("Console unavailable: {}", e);
    }
    println!("{}", KEY_HELP);

    let clock = FrameClock::start();
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, window_id } if window_id == app.window.id() => {
            let result = match event {
                WindowEvent::CloseRequested => Ok(false),
                WindowEvent::Resized(size) => app.resize(size).map(|_| true),
                WindowEvent::ScaleFactorChanged { .. } => {
                    let size = app.window.inner_size();
                    app.resize(size).map(|_| true)
                }
                WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed => {
                    app.handle_key(&event.logical_key)
                }
                WindowEvent::MouseInput {
                    state,
                    button: MouseButton::Left,
                    ..
                } => {
                    app.dragging = state == ElementState::Pressed;
                    Ok(true)
                }
                WindowEvent::CursorMoved { position, .. } => {
                    app.cursor_moved(position);
                    Ok(true)
                }
                WindowEvent::MouseWheel { delta, .. } => {
                    app.wheel(delta);
                    Ok(true)
                }
                WindowEvent::RedrawRequested => app.redraw(clock.elapsed(), &channel),
                _ => Ok(true),
            };

            match result {
                Ok(true) => {}
                Ok(false) => elwt.exit(),
                Err(e) => {
                    log::error!("{:#}", e);
                    elwt.exit();
                }
            }
        }
        Event::AboutToWait => app.window.request_redraw(),
        _ => {}
    })?;
    Ok(())
}
