//! Property-based invariants of the shading and sizing primitives.
//!
//! 1. Noise stays in [-1, 1] and is deterministic.
//! 2. Lensing inside the horizon is always opaque black.
//! 3. Outside the horizon the offset is finite and falls off with distance.
//! 4. Disk alpha vanishes at both ring edges.
//! 5. Scaled extents are floor(size * scale), never zero.

use event_horizon::disk::{shade_polar, DISK_INNER_RADIUS, DISK_OUTER_RADIUS};
use event_horizon::lensing::{displacement, lens, LensSample, LensingParams};
use event_horizon::noise::{fbm, noise2d};
use event_horizon::pipeline::{RenderExtent, MAX_EXTENT};
use glam::{Vec2, Vec3};
use proptest::prelude::*;

fn params_strategy() -> impl Strategy<Value = LensingParams> {
    (
        16.0f32..4096.0,
        16.0f32..4096.0,
        0.0f32..1.0,
        0.0f32..1.0,
        0.0f32..0.1,
        0.01f32..0.5,
    )
        .prop_map(|(w, h, cx, cy, mass, radius)| LensingParams {
            resolution: Vec2::new(w, h),
            center: Vec2::new(cx, cy),
            mass,
            radius,
        })
}

proptest! {
    #[test]
    fn noise_in_range_and_deterministic(x in -1.0e4f32..1.0e4, y in -1.0e4f32..1.0e4) {
        let p = Vec2::new(x, y);
        let n = noise2d(p);
        prop_assert!((-1.0..=1.0).contains(&n));
        prop_assert_eq!(n.to_bits(), noise2d(p).to_bits());
        prop_assert!(fbm(p).is_finite());
    }

    #[test]
    fn inside_horizon_is_black(params in params_strategy(), angle in 0.0f32..std::f32::consts::TAU, frac in 0.0f32..0.99) {
        let aspect = params.resolution.x / params.resolution.y;
        let r = params.radius * frac;
        let uv = params.center + Vec2::new(angle.cos() * r / aspect, angle.sin() * r);
        prop_assert_eq!(lens(uv, &params), LensSample::Horizon);
    }

    #[test]
    fn outside_horizon_offset_is_finite(params in params_strategy(), u in -0.5f32..1.5, v in -0.5f32..1.5) {
        let uv = Vec2::new(u, v);
        match lens(uv, &params) {
            LensSample::Horizon => {}
            LensSample::Sample(sampled) => prop_assert!(sampled.is_finite()),
        }
    }

    #[test]
    fn displacement_decreases_with_distance(
        mass in 0.001f32..0.1,
        radius in 0.01f32..0.5,
        near in 0.0f32..1.0,
        gap in 0.001f32..1.0,
    ) {
        let d1 = radius + near;
        let d2 = d1 + gap;
        let a = displacement(d1, mass);
        let b = displacement(d2, mass);
        prop_assert!(a.is_finite() && b.is_finite());
        prop_assert!(b < a);
    }

    #[test]
    fn disk_alpha_zero_at_edges(time in 0.0f32..1000.0, angle in -10.0f32..10.0) {
        let base = Vec3::new(1.0, 0.667, 0.2);
        for dist in [DISK_INNER_RADIUS, DISK_OUTER_RADIUS] {
            let sample = shade_polar(dist, angle, time, base);
            prop_assert!(sample.is_some());
            prop_assert_eq!(sample.map(|s| s.alpha), Some(0.0));
        }
    }

    #[test]
    fn scaled_extent_floors(w in 1u32..4000, h in 1u32..4000, scale in 0.1f64..2.0) {
        let extent = RenderExtent::scaled(w as f64, h as f64, scale);
        let expected_w = ((w as f64 * scale).floor() as u32).clamp(1, MAX_EXTENT);
        let expected_h = ((h as f64 * scale).floor() as u32).clamp(1, MAX_EXTENT);
        prop_assert_eq!(extent, RenderExtent::new(expected_w, expected_h));
    }

    #[test]
    fn degenerate_sizes_clamp_to_one(
        w in -1.0e6f64..=0.0,
        scale in prop_oneof![0.0f64..10.0, Just(f64::NAN), Just(f64::INFINITY)],
    ) {
        let extent = RenderExtent::scaled(w, 10.0, scale);
        prop_assert_eq!(extent.width, 1);
        prop_assert!(extent.height >= 1);
    }
}
