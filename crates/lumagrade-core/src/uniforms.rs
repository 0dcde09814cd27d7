//! Uniform block shared by the fragment program and the CPU reference.
//!
//! The field order matches `struct Grade` in `grade.frag.wgsl`. Every member
//! is an `f32`, so the WGSL layout is a plain run of 4-byte scalars.

use crate::params::FilterParameters;
use bytemuck::{Pod, Zeroable};

/// Per-draw inputs of the grading program.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FilterUniforms {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub hue: f32,

    pub blur: f32,
    pub sharpen: f32,
    pub sepia: f32,
    pub vignette: f32,

    pub noise: f32,
    pub temperature: f32,
    pub tint: f32,
    pub highlights: f32,

    pub shadows: f32,
    pub clarity: f32,
    pub dehaze: f32,
    pub noise_seed: f32,

    /// Size of one source texel in uv units.
    pub texel_width: f32,
    pub texel_height: f32,
    /// Non-zero skips every stage and outputs the source sample.
    pub bypass: f32,
    pub _padding: f32,

    /// Source crop: `uv = uv_offset + local_uv * uv_scale`.
    pub uv_offset_x: f32,
    pub uv_offset_y: f32,
    pub uv_scale_x: f32,
    pub uv_scale_y: f32,
}

impl FilterUniforms {
    /// Size of the block in bytes.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    /// Pack a parameter snapshot. The snapshot is sanitized first, so the
    /// program never sees an out-of-range or non-finite value.
    pub fn from_parameters(
        params: &FilterParameters,
        source_size: (u32, u32),
        noise_seed: f32,
    ) -> Self {
        let p = params.sanitized();
        let (tw, th) = texel_size(source_size);
        Self {
            brightness: p.brightness,
            contrast: p.contrast,
            saturation: p.saturation,
            hue: p.hue,
            blur: p.blur,
            sharpen: p.sharpen,
            sepia: p.sepia,
            vignette: p.vignette,
            noise: p.noise,
            temperature: p.temperature,
            tint: p.tint,
            highlights: p.highlights,
            shadows: p.shadows,
            clarity: p.clarity,
            dehaze: p.dehaze,
            noise_seed: if noise_seed.is_finite() { noise_seed } else { 0.0 },
            texel_width: tw,
            texel_height: th,
            bypass: 0.0,
            _padding: 0.0,
            uv_offset_x: 0.0,
            uv_offset_y: 0.0,
            uv_scale_x: 1.0,
            uv_scale_y: 1.0,
        }
    }

    /// Uniforms that reproduce the source sample untouched.
    pub fn passthrough(source_size: (u32, u32)) -> Self {
        Self {
            bypass: 1.0,
            ..Self::from_parameters(&FilterParameters::NEUTRAL, source_size, 0.0)
        }
    }

    /// Restrict sampling to the horizontal uv band `[start, end]`.
    pub fn with_horizontal_crop(mut self, start: f32, end: f32) -> Self {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(start, 1.0);
        self.uv_offset_x = start;
        self.uv_scale_x = end - start;
        self
    }

    #[inline]
    pub fn is_bypass(&self) -> bool {
        self.bypass > 0.5
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

fn texel_size((width, height): (u32, u32)) -> (f32, f32) {
    (1.0 / width.max(1) as f32, 1.0 / height.max(1) as f32)
}
