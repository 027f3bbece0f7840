//! Accretion disk shading.
//!
//! CPU twin of `gpu/shaders/disk.wgsl`: given a point in the disk's local
//! plane, the elapsed time and a base colour, compute the additive colour and
//! alpha of the glowing plasma.

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

use crate::noise::{fbm, noise2d};
use crate::uniforms::{UniformError, UniformSet};

/// Inner edge of the ring mesh (horizon radius is 1.0).
pub const DISK_INNER_RADIUS: f32 = 1.5;

/// Outer edge of the ring mesh.
pub const DISK_OUTER_RADIUS: f32 = 4.5;

/// Colour added near the inner edge.
pub const BLUE_SHIFT: Vec3 = Vec3::new(0.2, 0.4, 1.0);

/// Guard for the radial denominator.
const RADIAL_EPSILON: f32 = 1e-4;

/// Hermite smoothstep with a clamped interpolant.
///
/// `edge0 == edge1` is treated as a step at `edge0`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Normalised radial coordinate: 0 at the inner edge, 1 at the outer edge.
#[inline]
pub fn radial_coordinate(dist: f32) -> f32 {
    (dist - DISK_INNER_RADIUS) / (DISK_OUTER_RADIUS - DISK_INNER_RADIUS).max(RADIAL_EPSILON)
}

/// Shaded disk fragment (non-premultiplied; blended as `src * alpha + dst`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiskSample {
    pub color: Vec3,
    pub alpha: f32,
}

impl DiskSample {
    /// Contribution added to the destination under additive blending.
    pub fn additive(&self) -> Vec3 {
        self.color * self.alpha
    }
}

/// Inputs of the disk program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiskParams {
    pub time: f32,
    pub color: Vec3,
}

impl DiskParams {
    /// Read the bound `time` and `color` uniforms.
    pub fn from_set(set: &UniformSet) -> Result<Self, UniformError> {
        Ok(Self {
            time: set.float("time")?,
            color: set.color("color")?,
        })
    }
}

/// GPU layout of [`DiskParams`] (see `disk.wgsl`).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct DiskUniforms {
    /// rgb = base colour, a unused
    pub color: [f32; 4],
    /// x = time, y = inner radius, z = outer radius, w unused
    pub params: [f32; 4],
}

impl From<&DiskParams> for DiskUniforms {
    fn from(params: &DiskParams) -> Self {
        Self {
            color: [params.color.x, params.color.y, params.color.z, 1.0],
            params: [params.time, DISK_INNER_RADIUS, DISK_OUTER_RADIUS, 0.0],
        }
    }
}

/// Shade a point of the disk plane, in local (unrotated) coordinates.
///
/// Returns `None` outside the ring, where the GPU program discards.
pub fn shade(local: Vec2, time: f32, base_color: Vec3) -> Option<DiskSample> {
    shade_polar(local.length(), local.y.atan2(local.x), time, base_color)
}

/// [`shade`] in polar form: distance from the disk centre and angle.
pub fn shade_polar(dist: f32, angle: f32, time: f32, base_color: Vec3) -> Option<DiskSample> {
    let r = radial_coordinate(dist);
    if !(0.0..=1.0).contains(&r) {
        return None;
    }

    let radial = (-r * 3.0).exp();

    // Two fBm layers drifting at different rates
    let noise_uv = Vec2::new(dist * 2.0 - time * 0.5, angle * 4.0 + dist * 2.0);
    let n1 = fbm(noise_uv);
    let n2 = fbm(noise_uv * 1.5 + Vec2::new(time * 0.2, 0.0));
    let clouds = smoothstep(-0.2, 0.8, n1 * 0.6 + n2 * 0.4);

    let wave = ((angle + time * 0.8) * 3.0 + dist * 5.0).sin();
    let flares = smoothstep(0.8, 1.0, wave * noise2d(Vec2::new(angle, time)));

    let intensity = radial * (0.3 + 0.7 * clouds) + flares * radial * 2.0;

    let inner_glow = smoothstep(0.8, 1.0, 1.0 - r);
    let color = base_color * intensity + BLUE_SHIFT * inner_glow * intensity;

    // 1 - smoothstep(0.8, 1, r) is the descending edge smoothstep(1, 0.8, r)
    let alpha = smoothstep(0.0, 0.1, r) * (1.0 - smoothstep(0.8, 1.0, r)) * intensity;

    Some(DiskSample { color, alpha })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    const BASE: Vec3 = Vec3::new(1.0, 0.667, 0.2);

    fn at(dist: f32, angle: f32) -> Vec2 {
        Vec2::new(angle.cos(), angle.sin()) * dist
    }

    #[test]
    fn test_alpha_zero_on_both_edges() {
        for step in 0..32 {
            let angle = step as f32 / 32.0 * TAU;
            for &time in &[0.0, 1.7, 42.0] {
                let inner = shade_polar(DISK_INNER_RADIUS, angle, time, BASE).unwrap();
                let outer = shade_polar(DISK_OUTER_RADIUS, angle, time, BASE).unwrap();
                assert!(inner.alpha.abs() < 1e-5, "inner alpha {}", inner.alpha);
                assert!(outer.alpha.abs() < 1e-5, "outer alpha {}", outer.alpha);
            }
        }
    }

    #[test]
    fn test_outside_ring_is_discarded() {
        assert!(shade(Vec2::ZERO, 0.0, BASE).is_none());
        assert!(shade(at(1.0, 0.3), 0.0, BASE).is_none());
        assert!(shade(at(5.0, 0.3), 0.0, BASE).is_none());
    }

    #[test]
    fn test_mid_ring_is_visible() {
        let sample = shade(at(2.0, 0.5), 3.0, BASE).unwrap();
        assert!(sample.alpha > 0.0);
        assert!(sample.color.is_finite());
        assert!(sample.additive().max_element() > 0.0);
    }

    #[test]
    fn test_inner_region_is_blue_shifted() {
        // r = 0.15 is past the alpha ramp and inside the blue glow band
        let dist = DISK_INNER_RADIUS + 0.15 * (DISK_OUTER_RADIUS - DISK_INNER_RADIUS);
        let black = shade(at(dist, 1.0), 0.0, Vec3::ZERO).unwrap();
        assert!(black.color.z > black.color.x);
    }

    #[test]
    fn test_smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 0.1, 0.0), 0.0);
        assert_eq!(smoothstep(0.0, 0.1, 0.1), 1.0);
        assert_eq!(smoothstep(0.0, 0.1, -4.0), 0.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(smoothstep(0.5, 0.5, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.6), 1.0);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<DiskUniforms>(), 32);
        let gpu = DiskUniforms::from(&DiskParams { time: 2.5, color: BASE });
        assert_eq!(gpu.params[0], 2.5);
        assert_eq!(gpu.params[1], DISK_INNER_RADIUS);
        assert_eq!(gpu.params[2], DISK_OUTER_RADIUS);
    }
}
