//! Bloom effect definition shared by both backends.
//!
//! Bloom runs as four steps:
//! 1. Threshold - keep the bright part of each pixel (soft knee)
//! 2. Downscale - the glow is computed at `1 / DEFAULT_DOWNSAMPLE` resolution
//! 3. Separable blur - horizontal then vertical Gaussian
//! 4. Composite - `scene + strength * blurred`
//!
//! The GPU implementation lives in `gpu::bloom_processor`, the CPU one in
//! `software::post`.

use glam::Vec3;

use crate::uniforms::{UniformError, UniformSet};

/// Maximum blur radius in bloom texels (caps GPU cost)
pub const MAX_BLOOM_RADIUS: f32 = 32.0;

/// Blur radius used when the `radius` tunable is 0
pub const MIN_BLOOM_RADIUS: f32 = 2.0;

/// Default downsample factor (1 = full res, 2 = half res, etc.)
pub const DEFAULT_DOWNSAMPLE: u32 = 2;

/// Knee width as a fraction of the threshold
pub const SOFT_KNEE: f32 = 0.5;

/// Rec. 709 luma weights
pub const LUMA: Vec3 = Vec3::new(0.2126, 0.7152, 0.0722);

/// Bloom tunables, as bound in the `bloom` uniform set.
#[derive(Clone, Debug, PartialEq)]
pub struct BloomParams {
    pub threshold: f32,
    pub strength: f32,
    /// Normalised spread in [0, 1]; see [`BloomParams::blur_radius`].
    pub radius: f32,
    pub downsample: u32,
}

impl Default for BloomParams {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            strength: 1.5,
            radius: 0.0,
            downsample: DEFAULT_DOWNSAMPLE,
        }
    }
}

impl BloomParams {
    pub fn from_set(set: &UniformSet) -> Result<Self, UniformError> {
        Ok(Self {
            threshold: set.float("threshold")?,
            strength: set.float("strength")?,
            radius: set.float("radius")?,
            downsample: DEFAULT_DOWNSAMPLE,
        })
    }

    /// Clamp parameters to safe ranges
    pub fn sanitize(&self) -> Self {
        Self {
            threshold: finite_or(self.threshold, 0.0).max(0.0),
            strength: finite_or(self.strength, 0.0).max(0.0),
            radius: finite_or(self.radius, 0.0).clamp(0.0, 1.0),
            downsample: self.downsample.clamp(1, 8),
        }
    }

    /// Blur radius in bloom texels.
    pub fn blur_radius(&self) -> f32 {
        MIN_BLOOM_RADIUS + self.radius.clamp(0.0, 1.0) * (MAX_BLOOM_RADIUS - MIN_BLOOM_RADIUS)
    }

    /// Strength 0 turns the pass into a plain copy.
    pub fn is_passthrough(&self) -> bool {
        self.strength <= 0.0
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Bright-pass with a soft knee around `threshold`.
///
/// Threshold 0 passes every non-black pixel unchanged.
pub fn bright_pass(color: Vec3, threshold: f32) -> Vec3 {
    let threshold = threshold.max(0.0);
    let knee = threshold * SOFT_KNEE;
    let brightness = color.dot(LUMA);
    let mut soft = (brightness - threshold + knee).clamp(0.0, 2.0 * knee);
    soft = soft * soft / (4.0 * knee + 1e-4);
    let contribution = soft.max(brightness - threshold) / brightness.max(1e-4);
    color * contribution.max(0.0)
}

/// Normalised Gaussian taps for offsets `-radius..=radius`.
pub fn gaussian_weights(radius: f32) -> Vec<f32> {
    let taps = radius.max(0.0) as i32;
    let sigma = (taps as f32 * 0.5).max(0.5);
    let raw: Vec<f32> = (-taps..=taps)
        .map(|i| {
            let x = i as f32;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let total: f32 = raw.iter().sum();
    raw.into_iter().map(|w| w / total).collect()
}
