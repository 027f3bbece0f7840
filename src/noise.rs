//! 2D simplex noise and fractal (multi-octave) composition.
//!
//! This is the CPU twin of `gpu/shaders/noise.wgsl`. Both follow the same
//! skew/unskew simplex construction with a polynomial permutation, so the
//! software backend and the GPU disk shader see the same plasma pattern.

use glam::{Vec2, Vec3, Vec4};

/// Octave count used by the accretion disk.
pub const DEFAULT_OCTAVES: u32 = 4;

/// Amplitude falloff per octave used by the accretion disk.
pub const DEFAULT_PERSISTENCE: f32 = 0.5;

/// Simplex skew constants:
/// x = (3 - sqrt(3)) / 6, y = (sqrt(3) - 1) / 2, z = -1 + 2x, w = 1 / 41.
const C: Vec4 = Vec4::new(
    0.211_324_87,
    0.366_025_4,
    -0.577_350_3,
    0.024_390_243,
);

#[inline]
fn mod289(x: f32) -> f32 {
    x - (x / 289.0).floor() * 289.0
}

#[inline]
fn mod289_3(v: Vec3) -> Vec3 {
    Vec3::new(mod289(v.x), mod289(v.y), mod289(v.z))
}

#[inline]
fn permute(x: Vec3) -> Vec3 {
    mod289_3((x * 34.0 + Vec3::ONE) * x)
}

/// GLSL-style fract (always in [0, 1), also for negative input).
#[inline]
fn fract(v: Vec3) -> Vec3 {
    v - v.floor()
}

/// Deterministic 2D simplex noise in `[-1, 1]`.
///
/// Non-finite input yields 0.0 instead of propagating NaN into shading.
pub fn noise2d(v: Vec2) -> f32 {
    if !v.is_finite() {
        return 0.0;
    }

    // First corner
    let mut i = (v + Vec2::splat(v.dot(Vec2::splat(C.y)))).floor();
    let x0 = v - i + Vec2::splat(i.dot(Vec2::splat(C.x)));

    // Other corners
    let i1 = if x0.x > x0.y {
        Vec2::new(1.0, 0.0)
    } else {
        Vec2::new(0.0, 1.0)
    };
    let x1 = x0 + Vec2::splat(C.x) - i1;
    let x2 = x0 + Vec2::splat(C.z);

    // Permutations
    i = Vec2::new(mod289(i.x), mod289(i.y));
    let p = permute(
        permute(Vec3::splat(i.y) + Vec3::new(0.0, i1.y, 1.0))
            + Vec3::splat(i.x)
            + Vec3::new(0.0, i1.x, 1.0),
    );

    let mut m = (Vec3::splat(0.5) - Vec3::new(x0.dot(x0), x1.dot(x1), x2.dot(x2))).max(Vec3::ZERO);
    m *= m;
    m *= m;

    // Gradients: 41 points uniformly over a line, mapped onto a diamond.
    let x = 2.0 * fract(p * C.w) - Vec3::ONE;
    let h = x.abs() - Vec3::splat(0.5);
    let ox = (x + Vec3::splat(0.5)).floor();
    let a0 = x - ox;

    // Normalise gradients implicitly by scaling m
    m *= Vec3::splat(1.792_842_9) - 0.853_734_7 * (a0 * a0 + h * h);

    let g = Vec3::new(
        a0.x * x0.x + h.x * x0.y,
        a0.y * x1.x + h.y * x1.y,
        a0.z * x2.x + h.z * x2.y,
    );

    (130.0 * m.dot(g)).clamp(-1.0, 1.0)
}

/// Fractal Brownian motion with the disk's reference settings
/// (4 octaves, persistence 0.5).
pub fn fbm(p: Vec2) -> f32 {
    fractal_noise(p, DEFAULT_OCTAVES, DEFAULT_PERSISTENCE)
}

/// Sum `octaves` noise samples at doubling frequency.
///
/// The first octave has amplitude 0.5 and each further octave is scaled by
/// `persistence`. The result is not normalised; see [`fractal_bound`].
pub fn fractal_noise(p: Vec2, octaves: u32, persistence: f32) -> f32 {
    let mut st = p;
    let mut value = 0.0;
    let mut amplitude = 0.5;
    for _ in 0..octaves {
        value += amplitude * noise2d(st);
        st *= 2.0;
        amplitude *= persistence;
    }
    value
}

/// Upper bound of `|fractal_noise(_, octaves, persistence)|`.
pub fn fractal_bound(octaves: u32, persistence: f32) -> f32 {
    let mut amplitude = 0.5;
    let mut total = 0.0;
    for _ in 0..octaves {
        total += amplitude;
        amplitude *= persistence.abs();
    }
    total
}
