//! Linear-light RGBA float image used by the software backend.

use glam::{Vec2, Vec4};

use crate::pipeline::RenderExtent;

#[derive(Clone, Debug, PartialEq)]
pub struct Framebuffer {
    extent: RenderExtent,
    pixels: Vec<Vec4>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new(RenderExtent::new(1, 1))
    }
}

impl Framebuffer {
    /// Opaque black.
    pub const CLEAR: Vec4 = Vec4::new(0.0, 0.0, 0.0, 1.0);

    pub fn new(extent: RenderExtent) -> Self {
        Self {
            extent,
            pixels: vec![Self::CLEAR; extent.pixel_count()],
        }
    }

    pub fn extent(&self) -> RenderExtent {
        self.extent
    }

    pub fn width(&self) -> u32 {
        self.extent.width
    }

    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Reallocate (cleared) when the extent differs.
    pub fn resize(&mut self, extent: RenderExtent) {
        if self.extent != extent {
            *self = Self::new(extent);
        }
    }

    pub fn clear(&mut self) {
        self.pixels.fill(Self::CLEAR);
    }

    pub fn pixels(&self) -> &[Vec4] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [Vec4] {
        &mut self.pixels
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.extent.width as usize + x as usize
    }

    pub fn pixel(&self, x: u32, y: u32) -> Vec4 {
        self.pixels[self.index(x, y)]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, color: Vec4) {
        let i = self.index(x, y);
        self.pixels[i] = color;
    }

    /// Texel fetch with clamp-to-edge addressing.
    pub fn fetch_clamped(&self, x: i64, y: i64) -> Vec4 {
        let x = x.clamp(0, self.extent.width as i64 - 1) as u32;
        let y = y.clamp(0, self.extent.height as i64 - 1) as u32;
        self.pixel(x, y)
    }

    /// Texture coordinate of the centre of texel (x, y).
    pub fn texel_uv(&self, x: u32, y: u32) -> Vec2 {
        Vec2::new(
            (x as f32 + 0.5) / self.extent.width as f32,
            (y as f32 + 0.5) / self.extent.height as f32,
        )
    }

    /// Bilinear sample with clamp-to-edge addressing, as a linear sampler
    /// would do it. Non-finite coordinates sample the clear colour.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        if !uv.is_finite() {
            return Self::CLEAR;
        }
        let x = uv.x * self.extent.width as f32 - 0.5;
        let y = uv.y * self.extent.height as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = self.fetch_clamped(x0, y0).lerp(self.fetch_clamped(x0 + 1, y0), fx);
        let bottom = self
            .fetch_clamped(x0, y0 + 1)
            .lerp(self.fetch_clamped(x0 + 1, y0 + 1), fx);
        top.lerp(bottom, fy)
    }

    /// Clamp to [0, 1], as storing into an 8-bit unorm target does.
    pub fn saturate(&mut self) {
        for p in &mut self.pixels {
            *p = p.clamp(Vec4::ZERO, Vec4::ONE);
        }
    }

    /// sRGB-encoded RGBA8, row-major from the top-left.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() * 4);
        for p in &self.pixels {
            bytes.push(encode_srgb(p.x));
            bytes.push(encode_srgb(p.y));
            bytes.push(encode_srgb(p.z));
            bytes.push((p.w.clamp(0.0, 1.0) * 255.0).round() as u8);
        }
        bytes
    }
}

/// Linear [0, 1] to an 8-bit sRGB code value.
pub fn encode_srgb(linear: f32) -> u8 {
    let c = if linear.is_finite() { linear.clamp(0.0, 1.0) } else { 0.0 };
    let encoded = if c <= 0.003_130_8 {
        c * 12.92
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    };
    (encoded * 255.0).round() as u8
}
