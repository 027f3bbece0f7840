//! CPU lensing and bloom, texel for texel what the fullscreen programs do.

use glam::{Vec2, Vec3, Vec4};

use super::framebuffer::Framebuffer;
use crate::bloom::{bright_pass, gaussian_weights, BloomParams};
use crate::lensing::{lens, LensSample, LensingParams};

/// Distort `input` into `out` (same extent).
pub fn lensing(input: &Framebuffer, params: &LensingParams, out: &mut Framebuffer) {
    out.resize(input.extent());
    for y in 0..out.height() {
        for x in 0..out.width() {
            let color = match lens(out.texel_uv(x, y), params) {
                LensSample::Horizon => Framebuffer::CLEAR,
                LensSample::Sample(uv) => input.sample(uv),
            };
            out.set_pixel(x, y, color);
        }
    }
    out.saturate();
}

/// Scratch buffers for the downsampled glow.
#[derive(Debug, Default)]
pub struct BloomScratch {
    bright: Framebuffer,
    blurred: Framebuffer,
}

impl BloomScratch {
    /// Threshold, blur horizontally then vertically, and composite into `out`.
    pub fn apply(&mut self, input: &Framebuffer, params: &BloomParams, out: &mut Framebuffer) {
        let params = params.sanitize();
        out.resize(input.extent());
        if params.is_passthrough() {
            out.pixels_mut().copy_from_slice(input.pixels());
            return;
        }

        let small = input.extent().downsampled(params.downsample);
        self.bright.resize(small);
        self.blurred.resize(small);

        for y in 0..small.height {
            for x in 0..small.width {
                let color = input.sample(self.bright.texel_uv(x, y)).truncate();
                let glow = bright_pass(color, params.threshold);
                self.bright.set_pixel(x, y, glow.extend(1.0));
            }
        }
        self.bright.saturate();

        let weights = gaussian_weights(params.blur_radius());
        blur(&self.bright, &weights, (1, 0), &mut self.blurred);
        blur(&self.blurred, &weights, (0, 1), &mut self.bright);

        for y in 0..out.height() {
            for x in 0..out.width() {
                let scene = input.pixel(x, y);
                let glow = self.bright.sample(out.texel_uv(x, y)).truncate();
                let rgb = scene.truncate() + glow * params.strength;
                out.set_pixel(x, y, rgb.extend(scene.w));
            }
        }
        out.saturate();
    }
}

/// One separable Gaussian direction with clamp-to-edge fetches.
fn blur(input: &Framebuffer, weights: &[f32], direction: (i64, i64), out: &mut Framebuffer) {
    let taps = (weights.len() / 2) as i64;
    for y in 0..input.height() {
        for x in 0..input.width() {
            let mut sum = Vec3::ZERO;
            for (k, weight) in weights.iter().enumerate() {
                let offset = k as i64 - taps;
                let texel = input.fetch_clamped(
                    x as i64 + offset * direction.0,
                    y as i64 + offset * direction.1,
                );
                sum += texel.truncate() * *weight;
            }
            out.set_pixel(x, y, sum.extend(1.0));
        }
    }
    out.saturate();
}

/// Copy `input` into `out`, resampling when the extents differ.
pub fn blit(input: &Framebuffer, out: &mut Framebuffer) {
    if input.extent() == out.extent() {
        out.pixels_mut().copy_from_slice(input.pixels());
        return;
    }
    for y in 0..out.height() {
        for x in 0..out.width() {
            let uv: Vec2 = out.texel_uv(x, y);
            let color: Vec4 = input.sample(uv);
            out.set_pixel(x, y, color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RenderExtent;

    fn lensing_params(extent: RenderExtent, mass: f32, radius: f32) -> LensingParams {
        LensingParams {
            resolution: Vec2::new(extent.width as f32, extent.height as f32),
            center: Vec2::splat(0.5),
            mass,
            radius,
        }
    }

    fn gradient(extent: RenderExtent) -> Framebuffer {
        let mut fb = Framebuffer::new(extent);
        for y in 0..extent.height {
            for x in 0..extent.width {
                let v = x as f32 / extent.width as f32;
                fb.set_pixel(x, y, Vec4::new(v, 1.0 - v, 0.5, 1.0));
            }
        }
        fb
    }

    #[test]
    fn test_massless_lens_is_identity_outside_horizon() {
        let extent = RenderExtent::new(32, 16);
        let input = gradient(extent);
        let mut out = Framebuffer::default();
        lensing(&input, &lensing_params(extent, 0.0, 0.0), &mut out);
        for (a, b) in input.pixels().iter().zip(out.pixels()) {
            assert!((*a - *b).length() < 1e-5);
        }
    }

    #[test]
    fn test_lens_blacks_out_horizon() {
        let extent = RenderExtent::new(32, 32);
        let mut input = Framebuffer::new(extent);
        input.pixels_mut().fill(Vec4::ONE);
        let mut out = Framebuffer::default();
        lensing(&input, &lensing_params(extent, 0.02, 0.2), &mut out);
        assert_eq!(out.pixel(16, 16), Framebuffer::CLEAR);
        assert_eq!(out.pixel(0, 0), Vec4::ONE);
    }

    #[test]
    fn test_zero_strength_bloom_copies() {
        let extent = RenderExtent::new(20, 10);
        let input = gradient(extent);
        let mut out = Framebuffer::default();
        let params = BloomParams {
            strength: 0.0,
            ..BloomParams::default()
        };
        BloomScratch::default().apply(&input, &params, &mut out);
        assert_eq!(out, input);
    }

    #[test]
    fn test_bloom_spreads_light_and_keeps_black_far_away() {
        let extent = RenderExtent::new(64, 64);
        let mut input = Framebuffer::new(extent);
        input.set_pixel(10, 10, Vec4::ONE);
        input.set_pixel(11, 10, Vec4::ONE);
        input.set_pixel(10, 11, Vec4::ONE);
        input.set_pixel(11, 11, Vec4::ONE);
        let mut out = Framebuffer::default();
        BloomScratch::default().apply(&input, &BloomParams::default(), &mut out);

        assert!(out.pixel(13, 10).x > 0.0, "glow should reach neighbours");
        assert_eq!(out.pixel(50, 50), Framebuffer::CLEAR);
        assert!(out.pixels().iter().all(|p| p.w == 1.0));
    }

    #[test]
    fn test_composite_saturates_without_tone_mapping() {
        let extent = RenderExtent::new(16, 16);
        let mut input = Framebuffer::new(extent);
        input.pixels_mut().fill(Vec4::new(1.0, 0.5, 0.0, 1.0));
        let mut out = Framebuffer::default();
        BloomScratch::default().apply(&input, &BloomParams::default(), &mut out);
        for p in out.pixels() {
            assert_eq!(p.x, 1.0);
            assert!(p.y > 0.5);
            assert_eq!(p.w, 1.0);
        }
    }

    #[test]
    fn test_blit_resamples() {
        let mut input = Framebuffer::new(RenderExtent::new(2, 2));
        input.pixels_mut().fill(Vec4::new(0.25, 0.5, 0.75, 1.0));
        let mut out = Framebuffer::new(RenderExtent::new(5, 3));
        blit(&input, &mut out);
        assert!(out
            .pixels()
            .iter()
            .all(|p| (*p - Vec4::new(0.25, 0.5, 0.75, 1.0)).length() < 1e-6));
    }
}
