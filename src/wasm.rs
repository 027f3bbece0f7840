use std::cell::RefCell;
use std::rc::Rc;
use serde::Serialize;
use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

use crate::config::AppConfig;
use crate::control::parse_value;
use crate::frame::{tick, FrameContext, Viewport};
use crate::gpu::{GpuBackend, GpuContext, OutputTarget};
use crate::params::{ParamDef, ParamId, ParamUpdate, ParamValue};
use crate::pipeline::RenderExtent;
use crate::scene::Scene;

/// Control panel row, serialized to JSON for the page.
#[derive(Serialize)]
struct ParamEntry {
    #[serde(flatten)]
    def: ParamDef,
    value: ParamValue,
}

#[wasm_bindgen]
pub struct WasmBlackHole {
    inner: Rc<RefCell<BlackHoleContext>>,
}

struct BlackHoleContext {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    frame: FrameContext<GpuBackend>,
}

impl BlackHoleContext {
    fn configure_surface(&self) {
        self.surface
            .configure(self.frame.composer.backend().device(), &self.config);
    }
}

#[wasm_bindgen]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
    let _ = console_log::init_with_level(log::Level::Info);
}

#[wasm_bindgen]
impl WasmBlackHole {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        panic!("Use create_black_hole async constructor");
    }

    /// Follow a canvas resize. `width` and `height` are CSS pixels.
    pub fn resize(&self, width: f64, height: f64, device_pixel_ratio: f64) {
        if !(width > 0.0 && height > 0.0) {
            return;
        }

        let mut inner = self.inner.borrow_mut();
        let ctx = &mut *inner;

        let dpr = if device_pixel_ratio > 0.0 { device_pixel_ratio } else { 1.0 };
        ctx.config.width = ((width * dpr).round() as u32).max(1);
        ctx.config.height = ((height * dpr).round() as u32).max(1);
        ctx.configure_surface();

        if let Err(e) = ctx.frame.resize_viewport(width, height, dpr) {
            log::error!("Resize failed: {:#}", e);
        }
    }

    /// Set a parameter from its control panel name and textual value.
    /// Returns false if the name, value or its type is not accepted.
    pub fn set_param(&self, name: &str, value: &str) -> bool {
        let Some(id) = ParamId::from_name(name) else {
            log::warn!("Unknown parameter '{}'", name);
            return false;
        };
        let value = match parse_value(id, value) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("{:#}", e);
                return false;
            }
        };

        let mut inner = self.inner.borrow_mut();
        let frame = &mut inner.frame;
        match frame.surface.try_apply(ParamUpdate::new(id, value)) {
            Ok(Some(reaction)) => match frame.react(reaction) {
                Ok(()) => true,
                Err(e) => {
                    log::error!("Failed to apply {}: {:#}", id, e);
                    false
                }
            },
            Ok(None) => true,
            Err(rejection) => {
                log::warn!("Rejected parameter update: {}", rejection);
                false
            }
        }
    }

    /// Drag the orbit by a pointer delta in CSS pixels.
    pub fn orbit(&self, dx: f32, dy: f32) {
        self.inner.borrow_mut().frame.camera.controls.rotate(dx, dy);
    }

    pub fn zoom(&self, steps: f32) {
        self.inner.borrow_mut().frame.camera.controls.zoom(steps);
    }

    /// Every parameter with its definition and current value.
    pub fn param_table_json(&self) -> String {
        let inner = self.inner.borrow();
        let entries: Vec<ParamEntry> = ParamId::ALL
            .iter()
            .map(|id| ParamEntry {
                def: id.def(),
                value: inner.frame.surface.get(*id),
            })
            .collect();
        serde_json::to_string(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    /// Render one frame. `elapsed` is seconds since the animation started.
    pub fn render(&self, elapsed: f32) {
        let mut inner = self.inner.borrow_mut();
        let ctx = &mut *inner;

        match ctx.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                let mut target = OutputTarget {
                    view,
                    extent: RenderExtent::new(ctx.config.width, ctx.config.height),
                };
                if let Err(e) = tick(&mut ctx.frame, elapsed, &mut target) {
                    log::error!("Frame failed: {:#}", e);
                }
                output.present();
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                ctx.configure_surface();
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                log::error!("Surface out of memory");
            }
            Err(e) => {
                log::warn!("Surface error: {:?}", e);
            }
        }
    }
}

/// Create the visualisation on `canvas`. `config_json` may be empty for
/// defaults.
#[wasm_bindgen]
pub async fn create_black_hole(
    canvas: HtmlCanvasElement,
    device_pixel_ratio: f64,
    config_json: &str,
) -> Result<WasmBlackHole, JsValue> {
    init_panic_hook();

    let config = if config_json.trim().is_empty() {
        AppConfig::default()
    } else {
        AppConfig::from_json(config_json).map_err(|e| JsValue::from_str(&format!("{:#}", e)))?
    };

    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        dx12_shader_compiler: Default::default(),
        flags: wgpu::InstanceFlags::default(),
        gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
    });

    let target = wgpu::SurfaceTarget::Canvas(canvas.clone());
    let surface = instance
        .create_surface(target)
        .map_err(|e| JsValue::from_str(&format!("Failed to create surface: {}", e)))?;

    let gpu = GpuContext::for_surface(instance, &surface, wgpu::Limits::downlevel_webgl2_defaults())
        .await
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;

    let surface_config = gpu.surface_config(&surface, canvas.width(), canvas.height());
    surface.configure(&gpu.device, &surface_config);

    let dpr = if device_pixel_ratio > 0.0 { device_pixel_ratio } else { 1.0 };
    let viewport = Viewport::new(
        surface_config.width as f64 / dpr,
        surface_config.height as f64 / dpr,
        dpr,
        config.max_pixel_ratio as f64,
    );

    let scene = Scene::new(&config.stars);
    let extent = viewport.extent(config.params.resolution_scale);
    let GpuContext { device, queue, .. } = gpu;
    let backend = GpuBackend::new(device, queue, surface_config.format, extent, &scene)
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;
    let frame = FrameContext::with_scene(&config, scene, backend, viewport)
        .map_err(|e| JsValue::from_str(&format!("{:#}", e)))?;

    Ok(WasmBlackHole {
        inner: Rc::new(RefCell::new(BlackHoleContext {
            surface,
            config: surface_config,
            frame,
        })),
    })
}
