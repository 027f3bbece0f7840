//! Frame driver.
//!
//! A [`FrameContext`] owns everything one frame needs. [`tick`] advances it
//! and renders into a backend target. Parameter changes go through
//! [`FrameContext::apply`], which routes each [`Reaction`] to the part of
//! the context that has to follow it.

use anyhow::Result;
use glam::Vec2;

use crate::camera::OrbitCamera;
use crate::config::AppConfig;
use crate::control::ControlChannel;
use crate::params::{ParamSurface, ParamUpdate, Reaction};
use crate::pipeline::{Composer, PassKind, RenderBackend, RenderExtent};
use crate::scene::Scene;
use crate::uniforms::{FrameUniforms, UniformValue};

/// Disk spin per tick is `disk_speed * TICK_SCALE` radians, independent of
/// the frame time.
pub const TICK_SCALE: f32 = 0.05;

/// Frames between periodic debug lines.
pub const FRAME_LOG_INTERVAL: u64 = 300;

// ============================================================================
// Viewport
// ============================================================================

/// Logical drawing area plus the display's pixel density.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
    /// Upper bound on the pixel ratio used for rendering.
    pub max_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64, max_pixel_ratio: f64) -> Self {
        Self {
            width,
            height,
            device_pixel_ratio,
            max_pixel_ratio,
        }
    }

    /// Multiplier from logical size to render extent.
    pub fn render_scale(&self, resolution_scale: f32) -> f64 {
        let dpr = if self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0 {
            self.device_pixel_ratio
        } else {
            1.0
        };
        dpr.min(self.max_pixel_ratio) * resolution_scale as f64
    }

    pub fn extent(&self, resolution_scale: f32) -> RenderExtent {
        RenderExtent::scaled(self.width, self.height, self.render_scale(resolution_scale))
    }

    pub fn aspect(&self) -> f32 {
        if self.width > 0.0 && self.height > 0.0 {
            (self.width / self.height) as f32
        } else {
            1.0
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// What [`tick`] reports about the frame it rendered.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameReport {
    pub frame: u64,
    pub elapsed: f32,
    /// Horizon centre in texture coordinates, as bound for lensing.
    pub center: Vec2,
    pub extent: RenderExtent,
}

pub struct FrameContext<B: RenderBackend> {
    pub scene: Scene,
    pub camera: OrbitCamera,
    pub composer: Composer<B>,
    pub surface: ParamSurface,
    pub uniforms: FrameUniforms,
    pub viewport: Viewport,
    frame: u64,
}

impl<B: RenderBackend> FrameContext<B> {
    /// Build a context with a freshly generated starfield.
    pub fn new(config: &AppConfig, backend: B, viewport: Viewport) -> Result<Self> {
        Self::with_scene(config, Scene::new(&config.stars), backend, viewport)
    }

    /// Build a context around an existing scene, e.g. one a GPU backend was
    /// already created from.
    pub fn with_scene(config: &AppConfig, mut scene: Scene, backend: B, viewport: Viewport) -> Result<Self> {
        let surface = ParamSurface::new(config.params.sanitized());
        let params = surface.params().clone();
        let extent = viewport.extent(params.resolution_scale);

        scene.starfield.visible = params.stars_visible;
        let mut composer = Composer::new(backend, extent);
        composer.set_pass_enabled(PassKind::Lensing, params.lensing_enabled);
        composer.set_pass_enabled(PassKind::Bloom, params.bloom_enabled);
        let uniforms = FrameUniforms::new(&params, extent)?;

        log::info!(
            "Frame context at {}x{} (scale {:.2})",
            extent.width,
            extent.height,
            viewport.render_scale(params.resolution_scale)
        );

        Ok(Self {
            camera: OrbitCamera::from_config(&config.camera, viewport.aspect()),
            scene,
            composer,
            surface,
            uniforms,
            viewport,
            frame: 0,
        })
    }

    /// Frames rendered so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn extent(&self) -> RenderExtent {
        self.composer.extent()
    }

    /// Apply one parameter update and follow its reaction.
    pub fn apply(&mut self, update: ParamUpdate) -> Result<Option<Reaction>> {
        let reaction = self.surface.apply(update);
        if let Some(reaction) = reaction {
            self.react(reaction)?;
        }
        Ok(reaction)
    }

    /// Apply everything queued on `channel`, in order. Returns how many
    /// updates changed something.
    pub fn apply_pending(&mut self, channel: &ControlChannel) -> Result<usize> {
        let mut changed = 0;
        for update in channel.drain() {
            if self.apply(update)?.is_some() {
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Follow a reaction returned by [`ParamSurface::try_apply`].
    pub fn react(&mut self, reaction: Reaction) -> Result<()> {
        log::debug!("Reaction {:?}", reaction);
        match reaction {
            Reaction::BloomUniforms | Reaction::DiskColor | Reaction::LensingUniforms => {
                self.uniforms.apply_params(self.surface.params())?;
            }
            Reaction::Resize(_) => {
                self.resize_chain()?;
            }
            Reaction::PassToggled(kind, enabled) => self.composer.set_pass_enabled(kind, enabled),
            Reaction::StarsVisible(visible) => self.scene.starfield.visible = visible,
            Reaction::ReadEachTick => {}
        }
        Ok(())
    }

    /// Follow a window or canvas resize.
    pub fn resize_viewport(&mut self, width: f64, height: f64, device_pixel_ratio: f64) -> Result<RenderExtent> {
        self.viewport.width = width;
        self.viewport.height = height;
        self.viewport.device_pixel_ratio = device_pixel_ratio;
        self.camera.camera.set_aspect(self.viewport.aspect());
        self.resize_chain()
    }

    fn resize_chain(&mut self) -> Result<RenderExtent> {
        let scale = self.viewport.render_scale(self.surface.params().resolution_scale);
        self.composer
            .resize(self.viewport.width, self.viewport.height, scale, &mut self.uniforms)
    }
}

// ============================================================================
// Tick
// ============================================================================

/// Advance `ctx` to `elapsed` seconds and render into `target`.
pub fn tick<B: RenderBackend>(ctx: &mut FrameContext<B>, elapsed: f32, target: &mut B::Target) -> Result<FrameReport> {
    ctx.uniforms.disk.set("time", UniformValue::Float(elapsed))?;
    ctx.scene
        .disk
        .advance(ctx.surface.params().disk_speed * TICK_SCALE);

    let center = ctx.camera.camera.screen_position(ctx.scene.horizon.center).uv;
    ctx.uniforms.lensing.set("center", UniformValue::Vec2(center))?;

    ctx.camera.update();

    ctx.composer
        .render(&ctx.scene, &ctx.camera.camera, &mut ctx.uniforms, target)?;

    let report = FrameReport {
        frame: ctx.frame,
        elapsed,
        center,
        extent: ctx.composer.extent(),
    };
    ctx.frame += 1;
    if ctx.frame % FRAME_LOG_INTERVAL == 0 {
        log::debug!(
            "Frame {} at {:.2}s, {}x{}, centre ({:.3}, {:.3})",
            report.frame,
            elapsed,
            report.extent.width,
            report.extent.height,
            center.x,
            center.y
        );
    }
    Ok(report)
}

// ============================================================================
// Clocks
// ============================================================================

/// Wall-clock time since the clock was started.
#[cfg(not(target_arch = "wasm32"))]
pub struct FrameClock {
    start: std::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl FrameClock {
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    pub fn elapsed(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }
}

/// Frame times `0, 1/fps, 2/fps, ...` for headless rendering.
#[derive(Clone, Debug)]
pub struct FixedRateClock {
    fps: f32,
    frame: u64,
}

impl FixedRateClock {
    /// Non-positive or non-finite rates fall back to 60 fps.
    pub fn new(fps: f32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 {
            fps
        } else {
            log::warn!("Invalid frame rate {}, using 60", fps);
            60.0
        };
        Self { fps, frame: 0 }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Iterator for FixedRateClock {
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let t = (self.frame as f64 / self.fps as f64) as f32;
        self.frame += 1;
        Some(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{ParamId, ParamValue};
    use crate::software::{Framebuffer, SoftwareBackend};

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.stars.count = 50;
        config
    }

    fn context() -> FrameContext<SoftwareBackend> {
        let viewport = Viewport::new(64.0, 36.0, 1.0, 2.0);
        FrameContext::new(&small_config(), SoftwareBackend::default(), viewport).unwrap()
    }

    #[test]
    fn test_render_scale_caps_pixel_ratio() {
        let viewport = Viewport::new(100.0, 50.0, 3.0, 2.0);
        assert_eq!(viewport.render_scale(1.0), 2.0);
        assert_eq!(viewport.render_scale(0.5), 1.0);
        assert_eq!(viewport.extent(1.0), RenderExtent::new(200, 100));

        let bad = Viewport::new(100.0, 50.0, f64::NAN, 2.0);
        assert_eq!(bad.render_scale(1.0), 1.0);
    }

    #[test]
    fn test_tick_advances_disk_and_counts_frames() {
        let mut ctx = context();
        let mut target = Framebuffer::default();
        let spin = ctx.scene.disk.spin;

        let first = tick(&mut ctx, 0.0, &mut target).unwrap();
        let second = tick(&mut ctx, 1.0 / 60.0, &mut target).unwrap();

        assert_eq!(first.frame, 0);
        assert_eq!(second.frame, 1);
        assert_eq!(ctx.frame(), 2);
        let expected = spin + 2.0 * ctx.surface.params().disk_speed * TICK_SCALE;
        assert!((ctx.scene.disk.spin - expected).abs() < 1e-6);
        assert_eq!(ctx.uniforms.disk.float("time").unwrap(), 1.0 / 60.0);
        assert_eq!(target.extent(), RenderExtent::new(64, 36));
    }

    #[test]
    fn test_tick_binds_projected_centre() {
        let mut ctx = context();
        let mut target = Framebuffer::default();
        let report = tick(&mut ctx, 0.0, &mut target).unwrap();
        assert!((report.center - Vec2::splat(0.5)).length() < 1e-4);
        assert_eq!(ctx.uniforms.lensing.vec2("center").unwrap(), report.center);
    }

    #[test]
    fn test_reactions_reach_their_targets() {
        let mut ctx = context();

        ctx.apply(ParamUpdate::new(ParamId::BloomEnabled, ParamValue::Bool(false)))
            .unwrap();
        assert!(!ctx.composer.pipeline().is_enabled(PassKind::Bloom));

        ctx.apply(ParamUpdate::new(ParamId::StarsVisible, ParamValue::Bool(false)))
            .unwrap();
        assert!(!ctx.scene.starfield.visible);

        ctx.apply(ParamUpdate::new(ParamId::LensingMass, ParamValue::Float(0.07)))
            .unwrap();
        assert_eq!(ctx.uniforms.lensing.float("mass").unwrap(), 0.07);

        ctx.apply(ParamUpdate::new(ParamId::ResolutionScale, ParamValue::Float(0.5)))
            .unwrap();
        assert_eq!(ctx.extent(), RenderExtent::new(32, 18));
        assert_eq!(ctx.uniforms.lensing.vec2("resolution").unwrap(), Vec2::new(32.0, 18.0));
    }

    #[test]
    fn test_unchanged_update_has_no_reaction() {
        let mut ctx = context();
        let revision = ctx.uniforms.bloom.revision();
        let strength = ctx.surface.params().bloom_strength;
        let reaction = ctx
            .apply(ParamUpdate::new(ParamId::BloomStrength, ParamValue::Float(strength)))
            .unwrap();
        assert_eq!(reaction, None);
        assert_eq!(ctx.uniforms.bloom.revision(), revision);
    }

    #[test]
    fn test_apply_pending_drains_in_order() {
        let mut ctx = context();
        let channel = ControlChannel::new();
        let tx = channel.sender();
        tx.send(ParamUpdate::new(ParamId::DiskSpeed, ParamValue::Float(1.0))).unwrap();
        tx.send(ParamUpdate::new(ParamId::DiskSpeed, ParamValue::Float(0.5))).unwrap();
        tx.send(ParamUpdate::new(ParamId::DiskSpeed, ParamValue::Float(f32::NAN))).unwrap();

        assert_eq!(ctx.apply_pending(&channel).unwrap(), 2);
        assert_eq!(ctx.surface.params().disk_speed, 0.5);
        assert_eq!(ctx.apply_pending(&channel).unwrap(), 0);
    }

    #[test]
    fn test_resize_viewport_updates_aspect() {
        let mut ctx = context();
        let extent = ctx.resize_viewport(100.0, 100.0, 2.0).unwrap();
        assert_eq!(extent, RenderExtent::new(200, 200));
        assert_eq!(ctx.camera.camera.aspect, 1.0);
    }

    #[test]
    fn test_fixed_rate_clock() {
        let times: Vec<f32> = FixedRateClock::new(4.0).take(3).collect();
        assert_eq!(times, vec![0.0, 0.25, 0.5]);
        assert_eq!(FixedRateClock::new(0.0).fps(), 60.0);
    }
}
