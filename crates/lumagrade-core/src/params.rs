//! Filter parameter model.
//!
//! A `FilterParameters` value is replaced wholesale on every adjustment and
//! read as a single snapshot per rendered frame. Every field has a documented
//! range and a neutral value; neutral means "stage off".

use crate::error::{LumaError, Result};
use serde::{Deserialize, Serialize};

/// Range and neutral value of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub neutral: f32,
}

impl ParamRange {
    pub const fn new(min: f32, max: f32, neutral: f32) -> Self {
        Self { min, max, neutral }
    }

    /// Clamp `value` into range. Non-finite input yields the neutral value.
    #[inline]
    pub fn apply(self, value: f32) -> f32 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.neutral
        }
    }
}

/// Documented ranges, one per field.
pub mod ranges {
    use super::ParamRange;

    pub const BRIGHTNESS: ParamRange = ParamRange::new(0.0, 200.0, 100.0);
    pub const CONTRAST: ParamRange = ParamRange::new(0.0, 200.0, 100.0);
    pub const SATURATION: ParamRange = ParamRange::new(0.0, 200.0, 100.0);
    pub const HUE: ParamRange = ParamRange::new(-180.0, 180.0, 0.0);
    pub const BLUR: ParamRange = ParamRange::new(0.0, 100.0, 0.0);
    pub const SEPIA: ParamRange = ParamRange::new(0.0, 100.0, 0.0);
    pub const VIGNETTE: ParamRange = ParamRange::new(0.0, 100.0, 0.0);
    pub const SHARPEN: ParamRange = ParamRange::new(0.0, 100.0, 0.0);
    pub const NOISE: ParamRange = ParamRange::new(0.0, 100.0, 0.0);
    pub const TEMPERATURE: ParamRange = ParamRange::new(0.0, 200.0, 100.0);
    pub const TINT: ParamRange = ParamRange::new(-100.0, 100.0, 0.0);
    pub const HIGHLIGHTS: ParamRange = ParamRange::new(-100.0, 100.0, 0.0);
    pub const SHADOWS: ParamRange = ParamRange::new(-100.0, 100.0, 0.0);
    pub const CLARITY: ParamRange = ParamRange::new(-100.0, 100.0, 0.0);
    pub const DEHAZE: ParamRange = ParamRange::new(-100.0, 100.0, 0.0);

    /// Divider position in split mode, as a fraction of surface width.
    pub const SPLIT_POSITION: ParamRange = ParamRange::new(0.0, 1.0, 0.5);
    /// Divider width in device pixels.
    pub const DIVIDER_WIDTH: ParamRange = ParamRange::new(0.0, 32.0, 2.0);
}

/// Descriptor for one named parameter, used by hosts that build sliders.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    pub range: ParamRange,
}

/// The full adjustment state applied to a preview.
///
/// Missing fields deserialize to their neutral value, so `{}` is a valid
/// all-neutral parameter set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParameters {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Degrees.
    pub hue: f32,
    pub blur: f32,
    pub sepia: f32,
    pub vignette: f32,
    pub sharpen: f32,
    pub noise: f32,
    /// Above 100 warms, below 100 cools.
    pub temperature: f32,
    /// Positive pushes green, negative pushes magenta.
    pub tint: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub clarity: f32,
    pub dehaze: f32,

    // ── Composition ─────────────────────────────
    pub split_position: f32,
    pub divider_width: f32,
}

impl Default for FilterParameters {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

impl FilterParameters {
    /// Every field at its neutral value.
    pub const NEUTRAL: Self = Self {
        brightness: ranges::BRIGHTNESS.neutral,
        contrast: ranges::CONTRAST.neutral,
        saturation: ranges::SATURATION.neutral,
        hue: ranges::HUE.neutral,
        blur: ranges::BLUR.neutral,
        sepia: ranges::SEPIA.neutral,
        vignette: ranges::VIGNETTE.neutral,
        sharpen: ranges::SHARPEN.neutral,
        noise: ranges::NOISE.neutral,
        temperature: ranges::TEMPERATURE.neutral,
        tint: ranges::TINT.neutral,
        highlights: ranges::HIGHLIGHTS.neutral,
        shadows: ranges::SHADOWS.neutral,
        clarity: ranges::CLARITY.neutral,
        dehaze: ranges::DEHAZE.neutral,
        split_position: ranges::SPLIT_POSITION.neutral,
        divider_width: ranges::DIVIDER_WIDTH.neutral,
    };

    /// All parameters in display order.
    pub const SPECS: [ParamSpec; 17] = [
        spec("brightness", "Brightness", ranges::BRIGHTNESS),
        spec("contrast", "Contrast", ranges::CONTRAST),
        spec("saturation", "Saturation", ranges::SATURATION),
        spec("hue", "Hue", ranges::HUE),
        spec("temperature", "Temperature", ranges::TEMPERATURE),
        spec("tint", "Tint", ranges::TINT),
        spec("highlights", "Highlights", ranges::HIGHLIGHTS),
        spec("shadows", "Shadows", ranges::SHADOWS),
        spec("clarity", "Clarity", ranges::CLARITY),
        spec("dehaze", "Dehaze", ranges::DEHAZE),
        spec("blur", "Blur", ranges::BLUR),
        spec("sharpen", "Sharpen", ranges::SHARPEN),
        spec("sepia", "Sepia", ranges::SEPIA),
        spec("vignette", "Vignette", ranges::VIGNETTE),
        spec("noise", "Film Grain", ranges::NOISE),
        spec("split_position", "Split Position", ranges::SPLIT_POSITION),
        spec("divider_width", "Divider Width", ranges::DIVIDER_WIDTH),
    ];

    /// Return a copy with every field clamped to its documented range.
    ///
    /// NaN and infinities are replaced by the field's neutral value.
    pub fn sanitized(&self) -> Self {
        Self {
            brightness: ranges::BRIGHTNESS.apply(self.brightness),
            contrast: ranges::CONTRAST.apply(self.contrast),
            saturation: ranges::SATURATION.apply(self.saturation),
            hue: ranges::HUE.apply(self.hue),
            blur: ranges::BLUR.apply(self.blur),
            sepia: ranges::SEPIA.apply(self.sepia),
            vignette: ranges::VIGNETTE.apply(self.vignette),
            sharpen: ranges::SHARPEN.apply(self.sharpen),
            noise: ranges::NOISE.apply(self.noise),
            temperature: ranges::TEMPERATURE.apply(self.temperature),
            tint: ranges::TINT.apply(self.tint),
            highlights: ranges::HIGHLIGHTS.apply(self.highlights),
            shadows: ranges::SHADOWS.apply(self.shadows),
            clarity: ranges::CLARITY.apply(self.clarity),
            dehaze: ranges::DEHAZE.apply(self.dehaze),
            split_position: ranges::SPLIT_POSITION.apply(self.split_position),
            divider_width: ranges::DIVIDER_WIDTH.apply(self.divider_width),
        }
    }

    /// Whether every filter magnitude is neutral. Composition fields are ignored.
    pub fn is_neutral(&self) -> bool {
        let s = self.sanitized();
        let n = Self::NEUTRAL;
        s.brightness == n.brightness
            && s.contrast == n.contrast
            && s.saturation == n.saturation
            && s.hue == n.hue
            && s.blur == n.blur
            && s.sepia == n.sepia
            && s.vignette == n.vignette
            && s.sharpen == n.sharpen
            && s.noise == n.noise
            && s.temperature == n.temperature
            && s.tint == n.tint
            && s.highlights == n.highlights
            && s.shadows == n.shadows
            && s.clarity == n.clarity
            && s.dehaze == n.dehaze
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<f32> {
        let v = match name {
            "brightness" => self.brightness,
            "contrast" => self.contrast,
            "saturation" => self.saturation,
            "hue" => self.hue,
            "blur" => self.blur,
            "sepia" => self.sepia,
            "vignette" => self.vignette,
            "sharpen" => self.sharpen,
            "noise" => self.noise,
            "temperature" => self.temperature,
            "tint" => self.tint,
            "highlights" => self.highlights,
            "shadows" => self.shadows,
            "clarity" => self.clarity,
            "dehaze" => self.dehaze,
            "split_position" => self.split_position,
            "divider_width" => self.divider_width,
            _ => return None,
        };
        Some(v)
    }

    /// Return a new value with the named field replaced.
    pub fn with_value(&self, name: &str, value: f32) -> Result<Self> {
        let mut next = *self;
        let slot = match name {
            "brightness" => &mut next.brightness,
            "contrast" => &mut next.contrast,
            "saturation" => &mut next.saturation,
            "hue" => &mut next.hue,
            "blur" => &mut next.blur,
            "sepia" => &mut next.sepia,
            "vignette" => &mut next.vignette,
            "sharpen" => &mut next.sharpen,
            "noise" => &mut next.noise,
            "temperature" => &mut next.temperature,
            "tint" => &mut next.tint,
            "highlights" => &mut next.highlights,
            "shadows" => &mut next.shadows,
            "clarity" => &mut next.clarity,
            "dehaze" => &mut next.dehaze,
            "split_position" => &mut next.split_position,
            "divider_width" => &mut next.divider_width,
            _ => {
                return Err(LumaError::InvalidParameter(format!(
                    "unknown filter parameter '{name}'"
                )))
            }
        };
        *slot = value;
        Ok(next)
    }

    /// Parse a JSON object. Missing fields take their neutral value.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| LumaError::Serialization(e.to_string()))
    }
}

const fn spec(name: &'static str, display_name: &'static str, range: ParamRange) -> ParamSpec {
    ParamSpec {
        name,
        display_name,
        range,
    }
}
