//! End-to-end behaviour of the pass chain on the CPU backend.

use event_horizon::camera::Camera;
use event_horizon::config::{AppConfig, CameraConfig, StarfieldConfig};
use event_horizon::frame::{tick, FixedRateClock, FrameContext, Viewport};
use event_horizon::params::{ParamId, ParamUpdate, ParamValue, Params};
use event_horizon::pipeline::{Composer, PassKind, RenderBackend, RenderExtent};
use event_horizon::scene::Scene;
use event_horizon::software::{Framebuffer, SoftwareBackend};
use event_horizon::uniforms::{FrameUniforms, UniformValue};
use glam::Vec2;

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.stars = StarfieldConfig {
        count: 300,
        ..StarfieldConfig::default()
    };
    config
}

fn context(width: f64, height: f64) -> FrameContext<SoftwareBackend> {
    FrameContext::new(&config(), SoftwareBackend::default(), Viewport::new(width, height, 1.0, 2.0)).unwrap()
}

#[test]
fn resize_then_render_matches_extent_and_round_trips() {
    let extent = RenderExtent::new(96, 54);
    let scene = Scene::new(&config().stars);
    let camera = Camera::from_config(&CameraConfig::default(), extent.aspect());
    let mut uniforms = FrameUniforms::new(&Params::default(), extent).unwrap();
    let mut composer = Composer::new(SoftwareBackend::default(), extent);
    let mut target = Framebuffer::default();

    composer.render(&scene, &camera, &mut uniforms, &mut target).unwrap();
    assert_eq!(target.extent(), extent);

    let smaller = composer.resize(96, 54, 0.75, &mut uniforms).unwrap();
    assert_eq!(smaller, RenderExtent::new(72, 40));
    assert_eq!(uniforms.lensing.vec2("resolution").unwrap(), Vec2::new(72.0, 40.0));
    composer.render(&scene, &camera, &mut uniforms, &mut target).unwrap();
    assert_eq!(target.extent(), smaller);
    assert!(composer.backend().buffer_extents().iter().all(|e| *e == smaller));

    let restored = composer.resize(96, 54, 1.0, &mut uniforms).unwrap();
    assert_eq!(restored, extent);
    assert_eq!(uniforms.lensing.vec2("resolution").unwrap(), Vec2::new(96.0, 54.0));
    composer.render(&scene, &camera, &mut uniforms, &mut target).unwrap();
    assert_eq!(target.extent(), extent);
}

#[test]
fn toggling_a_pass_off_and_on_is_pixel_identical() {
    let extent = RenderExtent::new(64, 36);
    let scene = Scene::new(&config().stars);
    let camera = Camera::from_config(&CameraConfig::default(), extent.aspect());
    let mut uniforms = FrameUniforms::new(&Params::default(), extent).unwrap();
    uniforms.disk.set("time", UniformValue::Float(2.5)).unwrap();
    uniforms.lensing.set("center", UniformValue::Vec2(Vec2::splat(0.5))).unwrap();
    let mut composer = Composer::new(SoftwareBackend::default(), extent);

    let mut before = Framebuffer::default();
    composer.render(&scene, &camera, &mut uniforms, &mut before).unwrap();

    for kind in [PassKind::Lensing, PassKind::Bloom] {
        let mut without = Framebuffer::default();
        composer.set_pass_enabled(kind, false);
        composer.render(&scene, &camera, &mut uniforms, &mut without).unwrap();
        composer.set_pass_enabled(kind, true);

        let mut after = Framebuffer::default();
        composer.render(&scene, &camera, &mut uniforms, &mut after).unwrap();
        assert_eq!(before, after, "toggling {} changed the frame", kind.name());
    }
}

#[test]
fn all_passes_disabled_yields_black_frame() {
    let mut ctx = context(32.0, 32.0);
    for id in [ParamId::LensingEnabled, ParamId::BloomEnabled] {
        ctx.apply(ParamUpdate::new(id, ParamValue::Bool(false))).unwrap();
    }
    ctx.composer.set_pass_enabled(PassKind::Scene, false);

    let mut target = Framebuffer::default();
    tick(&mut ctx, 0.0, &mut target).unwrap();
    assert_eq!(target.extent(), RenderExtent::new(32, 32));
    assert!(target.pixels().iter().all(|p| *p == Framebuffer::CLEAR));
}

#[test]
fn horizon_centre_is_black_from_default_camera() {
    let mut ctx = context(160.0, 90.0);
    ctx.apply(ParamUpdate::new(ParamId::BloomEnabled, ParamValue::Bool(false)))
        .unwrap();
    assert_eq!(ctx.surface.params().lensing_mass, 0.02);
    assert_eq!(ctx.surface.params().lensing_radius, 0.05);

    let mut target = Framebuffer::default();
    let report = tick(&mut ctx, 0.0, &mut target).unwrap();
    assert!((report.center - Vec2::splat(0.5)).length() < 1e-3);

    let aspect = target.width() as f32 / target.height() as f32;
    let mut inside = 0;
    for y in 0..target.height() {
        for x in 0..target.width() {
            let mut d = target.texel_uv(x, y) - report.center;
            d.x *= aspect;
            if d.length() < 0.05 {
                inside += 1;
                assert_eq!(target.pixel(x, y), Framebuffer::CLEAR, "pixel ({}, {})", x, y);
            }
        }
    }
    assert!(inside > 0);
}

#[test]
fn horizon_centre_stays_dark_with_default_bloom() {
    let mut ctx = context(160.0, 90.0);
    assert!(ctx.surface.params().bloom_enabled);

    let mut target = Framebuffer::default();
    let report = tick(&mut ctx, 0.0, &mut target).unwrap();

    let aspect = target.width() as f32 / target.height() as f32;
    let mut inside = 0;
    for y in 0..target.height() {
        for x in 0..target.width() {
            let mut d = target.texel_uv(x, y) - report.center;
            d.x *= aspect;
            if d.length() < 0.05 {
                inside += 1;
                let p = target.pixel(x, y);
                assert!(p.truncate().max_element() < 0.05, "pixel ({}, {}) = {:?}", x, y, p);
            }
        }
    }
    assert!(inside > 0);
}

#[test]
fn halving_resolution_scale_halves_every_buffer() {
    let mut ctx = context(201.0, 101.0);
    assert_eq!(ctx.extent(), RenderExtent::new(201, 101));

    ctx.apply(ParamUpdate::new(ParamId::ResolutionScale, ParamValue::Float(0.5)))
        .unwrap();
    let halved = RenderExtent::new(100, 50);
    assert_eq!(ctx.extent(), halved);
    assert!(ctx.composer.backend().buffer_extents().iter().all(|e| *e == halved));

    let mut target = Framebuffer::default();
    tick(&mut ctx, 0.5, &mut target).unwrap();
    assert_eq!(target.extent(), halved);
    assert!(target.pixels().iter().any(|p| p.truncate().max_element() > 0.0));
}

#[test]
fn headless_frames_follow_fixed_clock() {
    let mut ctx = context(48.0, 27.0);
    let mut target = Framebuffer::default();
    let reports: Vec<_> = FixedRateClock::new(30.0)
        .take(4)
        .map(|t| tick(&mut ctx, t, &mut target).unwrap())
        .collect();

    assert_eq!(reports.iter().map(|r| r.frame).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert!((reports[3].elapsed - 0.1).abs() < 1e-6);
    assert_eq!(target.to_rgba8().len(), 48 * 27 * 4);
}
