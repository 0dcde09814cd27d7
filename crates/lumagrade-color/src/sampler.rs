//! Texture sampling with the same state the GPU sampler uses:
//! clamp-to-edge on both axes, linear min/mag filtering, no mipmaps.

use glam::{Vec2, Vec4};
use lumagrade_core::FrameBuffer;

/// Bilinear, clamp-to-edge view over a frame.
#[derive(Clone, Copy)]
pub struct Sampler<'a> {
    frame: &'a FrameBuffer,
}

impl<'a> Sampler<'a> {
    pub fn new(frame: &'a FrameBuffer) -> Self {
        Self { frame }
    }

    /// One texel in uv units.
    #[inline]
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(
            1.0 / self.frame.width.max(1) as f32,
            1.0 / self.frame.height.max(1) as f32,
        )
    }

    /// Sample at normalized coordinates. Texel centers sit at `(i + 0.5) / size`,
    /// so sampling exactly there returns the stored value.
    pub fn sample(&self, uv: Vec2) -> Vec4 {
        let (w, h) = self.frame.size();
        if w == 0 || h == 0 {
            return Vec4::ZERO;
        }

        let x = uv.x * w as f32 - 0.5;
        let y = uv.y * h as f32 - 0.5;
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;

        let clamp_x = |v: f32| (v as i64).clamp(0, w as i64 - 1) as u32;
        let clamp_y = |v: f32| (v as i64).clamp(0, h as i64 - 1) as u32;
        let (xa, xb) = (clamp_x(x0), clamp_x(x0 + 1.0));
        let (ya, yb) = (clamp_y(y0), clamp_y(y0 + 1.0));

        let top = self.texel(xa, ya).lerp(self.texel(xb, ya), fx);
        let bottom = self.texel(xa, yb).lerp(self.texel(xb, yb), fx);
        top.lerp(bottom, fy)
    }

    #[inline]
    fn texel(&self, x: u32, y: u32) -> Vec4 {
        let [r, g, b, a] = self.frame.pixel(x, y);
        Vec4::new(r as f32, g as f32, b as f32, a as f32) / 255.0
    }
}

/// Quantize a normalized color to RGBA8.
#[inline]
pub fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0;
    [
        c.x.round() as u8,
        c.y.round() as u8,
        c.z.round() as u8,
        c.w.round() as u8,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumagrade_core::PixelFormat;

    fn ramp() -> FrameBuffer {
        let mut data = Vec::new();
        for v in [0u8, 100, 200, 255] {
            data.extend_from_slice(&[v, v, v, 255]);
        }
        FrameBuffer::from_packed(4, 1, PixelFormat::Rgba8, &data).unwrap()
    }

    #[test]
    fn texel_centers_are_exact() {
        let frame = ramp();
        let s = Sampler::new(&frame);
        for (i, v) in [0u8, 100, 200, 255].into_iter().enumerate() {
            let uv = Vec2::new((i as f32 + 0.5) / 4.0, 0.5);
            assert_eq!(to_rgba8(s.sample(uv))[0], v);
        }
    }

    #[test]
    fn midpoint_is_interpolated() {
        let frame = ramp();
        let s = Sampler::new(&frame);
        let c = s.sample(Vec2::new(0.25, 0.5));
        assert!((c.x - 50.0 / 255.0).abs() < 1e-4);
    }

    #[test]
    fn outside_uv_clamps_to_edge() {
        let frame = ramp();
        let s = Sampler::new(&frame);
        assert_eq!(to_rgba8(s.sample(Vec2::new(-3.0, 0.5)))[0], 0);
        assert_eq!(to_rgba8(s.sample(Vec2::new(7.0, 9.0)))[0], 255);
    }
}
