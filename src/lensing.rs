//! Screen-space gravitational lensing.
//!
//! A first-order approximation: every pixel samples the scene at a point pulled
//! towards the black hole by `mass / dist`, and everything inside the horizon
//! radius is opaque black. CPU twin of `gpu/shaders/lensing.wgsl`.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::uniforms::{UniformError, UniformSet};

/// Floor applied to `dist^2` before dividing.
pub const MIN_DIST_SQ: f32 = 1e-4;

/// Inputs of the lensing program.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LensingParams {
    /// Pixel size of the buffer being distorted.
    pub resolution: Vec2,
    /// Black hole centre in texture coordinates.
    pub center: Vec2,
    pub mass: f32,
    /// Horizon radius in aspect-corrected texture units.
    pub radius: f32,
}

impl LensingParams {
    pub fn from_set(set: &UniformSet) -> Result<Self, UniformError> {
        Ok(Self {
            resolution: set.vec2("resolution")?,
            center: set.vec2("center")?,
            mass: set.float("mass")?,
            radius: set.float("radius")?,
        })
    }

    /// Width over height of the distorted buffer.
    pub fn aspect(&self) -> f32 {
        self.resolution.x / self.resolution.y.max(1.0)
    }
}

/// GPU layout of [`LensingParams`].
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct LensingUniforms {
    /// xy = resolution, zw = centre
    pub resolution_center: [f32; 4],
    /// x = mass, y = radius
    pub params: [f32; 4],
}

impl From<&LensingParams> for LensingUniforms {
    fn from(p: &LensingParams) -> Self {
        Self {
            resolution_center: [p.resolution.x, p.resolution.y, p.center.x, p.center.y],
            params: [p.mass, p.radius, 0.0, 0.0],
        }
    }
}

/// What a lensed pixel shows.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LensSample {
    /// Inside the horizon: opaque black.
    Horizon,
    /// Sample the source buffer at this texture coordinate.
    Sample(Vec2),
}

/// Radial displacement magnitude at aspect-corrected distance `dist`.
#[inline]
pub fn displacement(dist: f32, mass: f32) -> f32 {
    dist * mass / (dist * dist).max(MIN_DIST_SQ)
}

/// Lens a single texture coordinate.
pub fn lens(uv: Vec2, params: &LensingParams) -> LensSample {
    let aspect = params.aspect();
    let mut diff = uv - params.center;
    diff.x *= aspect;
    let dist = diff.length();

    if dist < params.radius {
        return LensSample::Horizon;
    }

    let mut offset = diff * (params.mass / (dist * dist).max(MIN_DIST_SQ));
    offset.x /= aspect;
    LensSample::Sample(uv - offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(mass: f32, radius: f32) -> LensingParams {
        LensingParams {
            resolution: Vec2::new(1600.0, 900.0),
            center: Vec2::new(0.5, 0.5),
            mass,
            radius,
        }
    }

    #[test]
    fn test_inside_horizon_is_black() {
        let p = params(0.02, 0.05);
        assert_eq!(lens(Vec2::new(0.5, 0.5), &p), LensSample::Horizon);
        assert_eq!(lens(Vec2::new(0.5, 0.53), &p), LensSample::Horizon);
    }

    #[test]
    fn test_horizon_is_aspect_corrected() {
        let p = params(0.02, 0.05);
        // 0.04 in v is inside, the same 0.04 in u is stretched by 16/9 and outside
        assert_eq!(lens(Vec2::new(0.5, 0.54), &p), LensSample::Horizon);
        assert!(matches!(lens(Vec2::new(0.54, 0.5), &p), LensSample::Sample(_)));
    }

    #[test]
    fn test_zero_mass_is_identity() {
        let p = params(0.0, 0.05);
        let uv = Vec2::new(0.8, 0.2);
        assert_eq!(lens(uv, &p), LensSample::Sample(uv));
    }

    #[test]
    fn test_samples_are_pulled_towards_centre() {
        // uv - offset moves the sample towards the centre
        let p = params(0.02, 0.05);
        let uv = Vec2::new(0.5, 0.7);
        match lens(uv, &p) {
            LensSample::Sample(s) => {
                assert!(s.y < uv.y);
                assert!(s.y > p.center.y);
                assert!((s.x - uv.x).abs() < 1e-6);
            }
            LensSample::Horizon => panic!("outside the horizon"),
        }
    }

    #[test]
    fn test_displacement_decreases_with_distance() {
        let mut previous = f32::INFINITY;
        for i in 1..100 {
            let d = 0.01 + i as f32 * 0.01;
            let value = displacement(d, 0.02);
            assert!(value.is_finite());
            assert!(value < previous);
            previous = value;
        }
    }

    #[test]
    fn test_displacement_bounded_near_zero() {
        assert_eq!(displacement(0.0, 0.02), 0.0);
        assert!(displacement(1e-6, 0.1) < 1.0);
    }

    #[test]
    fn test_uniform_layout() {
        assert_eq!(std::mem::size_of::<LensingUniforms>(), 32);
    }
}
