use palette::{Hsv, IntoColor, LinSrgb, Mix, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Colour maps: normalised value → RGBColor
// ---------------------------------------------------------------------------

/// The continuous colour maps used by the figures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMap {
    /// Blue → cyan → yellow → red, dark at both ends.
    Jet,
    /// Full hue circle, for cyclic quantities such as phase.
    Hsv,
    /// White → dark red.
    Reds,
}

impl ColorMap {
    /// Colour for `t` in [0, 1]; values outside are clamped, NaN maps to grey.
    pub fn at(self, t: f64) -> RGBColor {
        if t.is_nan() {
            return RGBColor(128, 128, 128);
        }
        let t = t.clamp(0.0, 1.0) as f32;
        let rgb: Srgb = match self {
            ColorMap::Jet => {
                let hue = 240.0 * (1.0 - t);
                // darken the two extremes the way jet does
                let value = 0.5 + 0.5 * (1.0 - (2.0 * t - 1.0).abs()).min(0.25) * 4.0;
                Hsv::new(hue, 1.0, value.min(1.0)).into_color()
            }
            ColorMap::Hsv => Hsv::new(360.0 * t, 1.0, 1.0).into_color(),
            ColorMap::Reds => {
                let light = LinSrgb::new(1.0f32, 0.96, 0.94);
                let dark = LinSrgb::new(0.4f32, 0.0, 0.05);
                Srgb::from_linear(light.mix(dark, t))
            }
        };
        to_rgb(rgb)
    }
}

fn to_rgb(rgb: Srgb) -> RGBColor {
    RGBColor(
        (rgb.red.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.green.clamp(0.0, 1.0) * 255.0) as u8,
        (rgb.blue.clamp(0.0, 1.0) * 255.0) as u8,
    )
}

// ---------------------------------------------------------------------------
// Normalisation
// ---------------------------------------------------------------------------

/// Linear map from a data range onto [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalize {
    lo: f64,
    hi: f64,
}

impl Normalize {
    /// A flat or empty range maps everything to the middle of the colour map.
    pub fn new(range: Option<(f64, f64)>) -> Self {
        match range {
            Some((lo, hi)) if hi > lo => Normalize { lo, hi },
            Some((lo, _)) => Normalize { lo: lo - 1.0, hi: lo + 1.0 },
            None => Normalize { lo: -1.0, hi: 1.0 },
        }
    }

    pub fn apply(&self, v: f64) -> f64 {
        (v - self.lo) / (self.hi - self.lo)
    }
}
