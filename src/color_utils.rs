//! Colour functions for traces, envelopes and intensities.
//!
//! Group colours are derived from the id alone, with no lookup table, so two
//! clients that mint ids independently still agree on every colour. Traces
//! and envelopes draw their hues from two disjoint bands so the kinds never
//! look alike.

use std::fmt;

/// Piecewise-linear breakpoints mapping an even 0..1 input to hue degrees so
/// that equal input steps look like roughly equal hue steps.
const HUE_PREMAPS: [f64; 8] = [
    0.0,
    0.021_739_130_4,
    0.369_565_217_4,
    0.434_782_608_7,
    0.695_652_173_9,
    0.739_130_434_8,
    0.956_521_739_1,
    1.0,
];
const HUE_DEGREES: [f64; 8] = [0.0, 15.0, 75.0, 150.0, 210.0, 255.0, 330.0, 360.0];

const MIN_LIGHTNESS: f64 = 0.25;
const MAX_LIGHTNESS: f64 = 0.9;

/// The two levels of grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKind {
    /// A group of points
    Trace,
    /// A group of traces
    Envelope,
}

impl GroupKind {
    /// Spread factor multiplied into the id before taking the fraction.
    fn factor(self) -> f64 {
        match self {
            GroupKind::Trace => 0.113,
            GroupKind::Envelope => 0.157,
        }
    }

    /// Hue band (left, right) in degrees this kind never uses.
    ///
    /// The envelope band wraps around 0, so envelopes only use the hues the
    /// trace band excludes.
    pub fn excluded_hues(self) -> (f64, f64) {
        match self {
            GroupKind::Trace => (280.0, 340.0),
            GroupKind::Envelope => (340.0, 280.0),
        }
    }

    /// Lowercase name for messages.
    pub fn name(self) -> &'static str {
        match self {
            GroupKind::Trace => "trace",
            GroupKind::Envelope => "envelope",
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An 8-bit RGB colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Build from channel values in 0.0-1.0.
    pub fn from_unit_rgb(r: f64, g: f64, b: f64) -> Self {
        let to_byte = |v: f64| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(to_byte(r), to_byte(g), to_byte(b))
    }

    /// Format as `#rrggbb`.
    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Colour of the unassigned group (id 0).
pub const UNASSIGNED_COLOR: Color = Color::new(0, 0, 0);

/// Colour of the noise trace (id -1).
pub const NOISE_COLOR: Color = Color::new(128, 128, 128);

/// Hue, saturation and lightness, hue in degrees, the rest in 0.0-1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub h: f64,
    pub s: f64,
    pub l: f64,
}

/// Colour for a trace or envelope id.
///
/// Ids 0 and -1 map to fixed neutral colours regardless of kind.
pub fn color_for(id: i64, kind: GroupKind) -> Color {
    match group_hsl(id, kind) {
        Some(hsl) => {
            let (r, g, b) = hsl_to_rgb(hsl.h, hsl.s, hsl.l);
            Color::from_unit_rgb(r, g, b)
        }
        None if id == -1 => NOISE_COLOR,
        None => UNASSIGNED_COLOR,
    }
}

/// Derived HSL for a real group id, or `None` for the reserved ids 0 and -1.
pub fn group_hsl(id: i64, kind: GroupKind) -> Option<Hsl> {
    if id == 0 || id == -1 {
        return None;
    }
    let factor = kind.factor();
    let seq = id as f64;
    let (left, right) = kind.excluded_hues();

    let h = hue_map_exclude_range((seq * factor).rem_euclid(1.0), left, right).round();
    let l = (lightness_map((seq * factor * (factor + 1.0)).rem_euclid(1.0)) * 100.0).floor() / 100.0;
    Some(Hsl { h, s: 1.0, l })
}

/// Map 0..1 onto 0..360 through the perceptual breakpoint table.
pub fn hue_map(input: f64) -> f64 {
    let input = input.clamp(0.0, 1.0);
    for i in 1..HUE_PREMAPS.len() {
        if input <= HUE_PREMAPS[i] {
            return HUE_DEGREES[i - 1]
                + (HUE_DEGREES[i] - HUE_DEGREES[i - 1]) * (input - HUE_PREMAPS[i - 1])
                    / (HUE_PREMAPS[i] - HUE_PREMAPS[i - 1]);
        }
    }
    HUE_DEGREES[HUE_DEGREES.len() - 1]
}

/// Inverse of [`hue_map`]: the 0..1 input that produces a hue.
pub fn inverse_hue_map(hue: f64) -> f64 {
    let hue = hue.rem_euclid(360.0);
    for i in 1..HUE_DEGREES.len() {
        if hue <= HUE_DEGREES[i] {
            return HUE_PREMAPS[i - 1]
                + (HUE_PREMAPS[i] - HUE_PREMAPS[i - 1]) * (hue - HUE_DEGREES[i - 1])
                    / (HUE_DEGREES[i] - HUE_DEGREES[i - 1]);
        }
    }
    1.0
}

/// Like [`hue_map`] but never returns a hue inside `(left, right)`.
///
/// `left` may be greater than `right`, in which case the excluded band wraps
/// through 0 and only hues between `right` and `left` are produced.
pub fn hue_map_exclude_range(input: f64, left: f64, right: f64) -> f64 {
    let left_premap = inverse_hue_map(left);
    let right_premap = inverse_hue_map(right);

    let premap = if left_premap > right_premap {
        right_premap + input * (left_premap - right_premap)
    } else {
        let usable = 1.0 - (right_premap - left_premap);
        let scaled = input * usable;
        if scaled < left_premap {
            scaled
        } else {
            right_premap + (scaled - left_premap)
        }
    };
    hue_map(premap)
}

/// Map 0..1 linearly onto the allowed lightness band.
pub fn lightness_map(input: f64) -> f64 {
    MIN_LIGHTNESS + input * (MAX_LIGHTNESS - MIN_LIGHTNESS)
}

/// Convert HSL to RGB.
///
/// # Arguments
/// * `h` - Hue in degrees (0-360)
/// * `s` - Saturation (0.0-1.0)
/// * `l` - Lightness (0.0-1.0)
///
/// # Returns
/// RGB tuple with values in range 0.0-1.0
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    let h = h.rem_euclid(360.0);
    let c = (1.0 - (2.0 * l - 1.0).abs()) * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = l - c / 2.0;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    (r + m, g + m, b + m)
}

/// Position of an intensity on the colour gradient, 0.0-1.0.
pub fn intensity_fraction(intensity: f64, intmax: f64, log_scale: bool) -> f64 {
    let fraction = if log_scale {
        let max_log = intmax.ln();
        if max_log <= 0.0 {
            return 0.0;
        }
        intensity.ln() / max_log
    } else if intmax > 0.0 {
        intensity / intmax
    } else {
        0.0
    };
    if fraction.is_finite() {
        fraction.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Gradient colour for an intensity fraction.
///
/// Green to blue to red, or blue to yellow to red in colour-blind mode.
pub fn intensity_color(fraction: f64, colorblind: bool) -> Color {
    let val = fraction.clamp(0.0, 1.0);
    let frac = if val < 0.5 { val / 0.5 } else { (val - 0.5) / 0.5 };
    let scale = |max: f64, f: f64| (max * f).round() as u8;

    match (colorblind, val < 0.5) {
        (false, true) => Color::new(10, scale(200.0, 1.0 - frac), scale(255.0, frac)),
        (false, false) => Color::new(scale(255.0, frac), 0, scale(255.0, 1.0 - frac)),
        (true, true) => Color::new(scale(255.0, frac), scale(255.0, frac), scale(255.0, 1.0 - frac)),
        (true, false) => Color::new(255, scale(255.0, 1.0 - frac), 0),
    }
}
