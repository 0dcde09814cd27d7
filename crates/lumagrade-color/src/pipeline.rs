//! The grading pipeline, one pixel at a time.
//!
//! Stages run in the fixed order of [`Stage::ORDER`]; later stages read the
//! color produced by earlier ones. A stage whose parameters are neutral is
//! skipped outright, so an all-neutral uniform block returns the source
//! sample unchanged. `grade.frag.wgsl` implements the same math.

use crate::hsl::{hsl_to_rgb, rgb_to_hsl};
use crate::sampler::Sampler;
use glam::{Vec2, Vec3, Vec4};
use lumagrade_core::FilterUniforms;

/// Spacing of the 5x5 blur taps, in texels.
pub const BLUR_TAP_STEP: f32 = 2.0;
/// Spacing of the 3x3 clarity reference taps, in texels.
pub const CLARITY_TAP_STEP: f32 = 2.0;
/// Scale of the dehaze divisor term.
pub const DEHAZE_STRENGTH: f32 = 0.5;
/// Smallest dehaze divisor.
pub const DEHAZE_MIN_DIVISOR: f32 = 0.1;
/// Grain offset at `noise = 100`.
pub const GRAIN_AMPLITUDE: f32 = 0.1;

/// Rec. 601 luma weights.
pub const LUMA: Vec3 = Vec3::new(0.299, 0.587, 0.114);

const SEPIA_R: Vec3 = Vec3::new(0.393, 0.769, 0.189);
const SEPIA_G: Vec3 = Vec3::new(0.349, 0.686, 0.168);
const SEPIA_B: Vec3 = Vec3::new(0.272, 0.534, 0.131);

/// Per-channel offsets into the grain hash, so channels decorrelate.
const GRAIN_CHANNEL_OFFSETS: [Vec2; 3] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(17.31, 43.7),
    Vec2::new(91.7, 7.13),
];

/// One step of the grading pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SpatialPrefilter,
    HueSaturation,
    BrightnessContrast,
    WhiteBalance,
    HighlightsShadows,
    Clarity,
    Dehaze,
    Sepia,
    Vignette,
    Grain,
}

impl Stage {
    /// Execution order.
    pub const ORDER: [Stage; 10] = [
        Self::SpatialPrefilter,
        Self::HueSaturation,
        Self::BrightnessContrast,
        Self::WhiteBalance,
        Self::HighlightsShadows,
        Self::Clarity,
        Self::Dehaze,
        Self::Sepia,
        Self::Vignette,
        Self::Grain,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SpatialPrefilter => "Blur / Sharpen",
            Self::HueSaturation => "Hue / Saturation",
            Self::BrightnessContrast => "Brightness / Contrast",
            Self::WhiteBalance => "White Balance",
            Self::HighlightsShadows => "Highlights / Shadows",
            Self::Clarity => "Clarity",
            Self::Dehaze => "Dehaze",
            Self::Sepia => "Sepia",
            Self::Vignette => "Vignette",
            Self::Grain => "Film Grain",
        }
    }

    /// Whether this stage changes anything for the given uniforms.
    pub fn is_active(self, u: &FilterUniforms) -> bool {
        match self {
            Self::SpatialPrefilter => u.blur > 0.0 || u.sharpen > 0.0,
            Self::HueSaturation => u.saturation != 100.0 || u.hue != 0.0,
            Self::BrightnessContrast => u.brightness != 100.0 || u.contrast != 100.0,
            Self::WhiteBalance => u.temperature != 100.0 || u.tint != 0.0,
            Self::HighlightsShadows => u.highlights != 0.0 || u.shadows != 0.0,
            Self::Clarity => u.clarity != 0.0,
            Self::Dehaze => u.dehaze != 0.0,
            Self::Sepia => u.sepia > 0.0,
            Self::Vignette => u.vignette > 0.0,
            Self::Grain => u.noise > 0.0,
        }
    }

    fn apply(self, ctx: &ShadeContext<'_>, rgb: Vec3) -> Vec3 {
        match self {
            Self::SpatialPrefilter => spatial_prefilter(ctx, rgb),
            Self::HueSaturation => hue_saturation(ctx.uniforms, rgb),
            Self::BrightnessContrast => brightness_contrast(ctx.uniforms, rgb),
            Self::WhiteBalance => white_balance(ctx.uniforms, rgb),
            Self::HighlightsShadows => highlights_shadows(ctx.uniforms, rgb),
            Self::Clarity => clarity(ctx, rgb),
            Self::Dehaze => dehaze(ctx.uniforms, rgb),
            Self::Sepia => sepia(ctx.uniforms, rgb),
            Self::Vignette => vignette(ctx.uniforms, ctx.uv, rgb),
            Self::Grain => grain(ctx.uniforms, ctx.frag_coord, rgb),
        }
    }
}

/// Everything a stage may read besides the running color.
pub struct ShadeContext<'a> {
    pub source: Sampler<'a>,
    pub uniforms: &'a FilterUniforms,
    /// Source texture coordinate.
    pub uv: Vec2,
    /// Target pixel center, in device pixels.
    pub frag_coord: Vec2,
}

impl ShadeContext<'_> {
    #[inline]
    fn texel(&self) -> Vec2 {
        Vec2::new(self.uniforms.texel_width, self.uniforms.texel_height)
    }
}

/// Shade one pixel. Alpha is the sampled alpha, untouched.
pub fn shade(ctx: &ShadeContext<'_>) -> Vec4 {
    let sampled = ctx.source.sample(ctx.uv);
    if ctx.uniforms.is_bypass() {
        return sampled;
    }

    let mut rgb = sampled.truncate();
    for stage in Stage::ORDER {
        if stage.is_active(ctx.uniforms) {
            rgb = stage.apply(ctx, rgb);
        }
    }
    rgb.clamp(Vec3::ZERO, Vec3::ONE).extend(sampled.w)
}

// ── Stages ──────────────────────────────────────────────────────

fn gaussian(ctx: &ShadeContext<'_>, uv: Vec2) -> Vec3 {
    let sigma = ctx.uniforms.blur / 100.0;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let step = ctx.texel() * BLUR_TAP_STEP;

    let mut sum = Vec3::ZERO;
    let mut total = 0.0;
    for dy in -2..=2 {
        for dx in -2..=2 {
            let (fx, fy) = (dx as f32, dy as f32);
            let w = (-(fx * fx + fy * fy) / two_sigma_sq).exp();
            sum += ctx.source.sample(uv + Vec2::new(fx, fy) * step).truncate() * w;
            total += w;
        }
    }
    sum / total
}

fn prefiltered(ctx: &ShadeContext<'_>, uv: Vec2) -> Vec3 {
    if ctx.uniforms.blur > 0.0 {
        gaussian(ctx, uv)
    } else {
        ctx.source.sample(uv).truncate()
    }
}

fn spatial_prefilter(ctx: &ShadeContext<'_>, rgb: Vec3) -> Vec3 {
    let u = ctx.uniforms;
    let mut rgb = if u.blur > 0.0 {
        gaussian(ctx, ctx.uv)
    } else {
        rgb
    };

    if u.sharpen > 0.0 {
        let t = ctx.texel();
        let up = prefiltered(ctx, ctx.uv - Vec2::new(0.0, t.y));
        let down = prefiltered(ctx, ctx.uv + Vec2::new(0.0, t.y));
        let left = prefiltered(ctx, ctx.uv - Vec2::new(t.x, 0.0));
        let right = prefiltered(ctx, ctx.uv + Vec2::new(t.x, 0.0));
        let laplacian = rgb * 4.0 - up - down - left - right;
        rgb += laplacian * (u.sharpen / 100.0);
    }
    rgb
}

fn hue_saturation(u: &FilterUniforms, rgb: Vec3) -> Vec3 {
    let mut hsl = rgb_to_hsl(rgb.clamp(Vec3::ZERO, Vec3::ONE));
    hsl.y = (hsl.y * u.saturation / 100.0).clamp(0.0, 1.0);
    let h = hsl.x + u.hue / 360.0;
    hsl.x = h - h.floor();
    hsl_to_rgb(hsl)
}

fn brightness_contrast(u: &FilterUniforms, rgb: Vec3) -> Vec3 {
    let rgb = (rgb - 0.5) * (u.contrast / 100.0) + 0.5;
    rgb + (u.brightness - 100.0) / 100.0
}

fn white_balance(u: &FilterUniforms, mut rgb: Vec3) -> Vec3 {
    let t = u.temperature - 100.0;
    if t > 0.0 {
        rgb.x *= 1.0 + t / 200.0;
        rgb.z *= 1.0 - t / 400.0;
    } else if t < 0.0 {
        let c = -t;
        rgb.z *= 1.0 + c / 200.0;
        rgb.x *= 1.0 - c / 400.0;
    }

    if u.tint != 0.0 {
        rgb.y *= 1.0 + u.tint / 200.0;
        rgb.x *= 1.0 - u.tint / 400.0;
        rgb.z *= 1.0 - u.tint / 400.0;
    }
    rgb
}

fn highlights_shadows(u: &FilterUniforms, mut rgb: Vec3) -> Vec3 {
    if u.highlights != 0.0 {
        rgb += (Vec3::ONE - rgb) * (u.highlights / 100.0);
    }
    if u.shadows != 0.0 {
        rgb -= rgb * (-u.shadows / 100.0);
    }
    rgb
}

fn clarity(ctx: &ShadeContext<'_>, rgb: Vec3) -> Vec3 {
    let step = ctx.texel() * CLARITY_TAP_STEP;
    let mut blurred = Vec3::ZERO;
    for dy in -1..=1 {
        for dx in -1..=1 {
            let offset = Vec2::new(dx as f32, dy as f32) * step;
            blurred += ctx.source.sample(ctx.uv + offset).truncate();
        }
    }
    blurred /= 9.0;

    let detail = (rgb - blurred) * 2.0 + 0.5;
    rgb + (detail - rgb) * (ctx.uniforms.clarity / 100.0)
}

fn dehaze(u: &FilterUniforms, rgb: Vec3) -> Vec3 {
    let luma = rgb.dot(LUMA);
    let factor = DEHAZE_STRENGTH * u.dehaze / 100.0;
    let divisor = (1.0 - luma * factor).max(DEHAZE_MIN_DIVISOR);
    let dehazed = rgb / divisor;
    rgb + (dehazed - rgb) * (u.dehaze.abs() / 100.0)
}

fn sepia(u: &FilterUniforms, rgb: Vec3) -> Vec3 {
    let toned = Vec3::new(rgb.dot(SEPIA_R), rgb.dot(SEPIA_G), rgb.dot(SEPIA_B));
    rgb + (toned - rgb) * (u.sepia / 100.0)
}

fn vignette(u: &FilterUniforms, uv: Vec2, rgb: Vec3) -> Vec3 {
    let d = uv.distance(Vec2::splat(0.5));
    rgb * (1.0 - d * d * (u.vignette / 100.0))
}

fn grain(u: &FilterUniforms, frag_coord: Vec2, mut rgb: Vec3) -> Vec3 {
    let amount = u.noise / 100.0 * GRAIN_AMPLITUDE;
    let seed = Vec2::splat(u.noise_seed);
    for (c, offset) in GRAIN_CHANNEL_OFFSETS.iter().enumerate() {
        let n = hash12(frag_coord + *offset + seed) - 0.5;
        rgb[c] += n * amount;
    }
    rgb
}

/// Screen-space hash in `[0, 1)`.
#[inline]
pub fn hash12(p: Vec2) -> f32 {
    let v = (p.dot(Vec2::new(12.9898, 78.233))).sin() * 43758.5453;
    v - v.floor()
}
