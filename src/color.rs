//! Colour helpers: LAB conversion, robust sampling, SVG hex.

use std::collections::HashMap;

use image::RgbImage;
use palette::{FromColor, Lab, Srgb};

/// 8-bit sRGB triple.
pub type Rgb = [u8; 3];

/// CIE L*a*b* (D65) triple. L* runs 0-100.
pub type LabColor = [f64; 3];

pub fn to_lab(c: Rgb) -> LabColor {
    let srgb = Srgb::new(c[0], c[1], c[2]).into_format::<f32>();
    let lab: Lab = Lab::from_color(srgb);
    [lab.l as f64, lab.a as f64, lab.b as f64]
}

/// LAB of every pixel, row-major. Logos repeat colours heavily, so
/// conversions are memoized per distinct colour.
pub fn lab_image(rgb: &RgbImage) -> Vec<LabColor> {
    let mut cache: HashMap<Rgb, LabColor> = HashMap::new();
    rgb.pixels()
        .map(|p| *cache.entry(p.0).or_insert_with(|| to_lab(p.0)))
        .collect()
}

/// 8-bit LAB encoding (L×2.55, a+128, b+128), unquantized. Merge
/// thresholds are tuned in this space.
pub fn lab_8bit(lab: &LabColor) -> [f64; 3] {
    [lab[0] * 2.55, lab[1] + 128.0, lab[2] + 128.0]
}

/// [`lab_8bit`] rounded to bytes, for per-channel edge detection.
pub fn lab_to_u8(lab: &LabColor) -> [u8; 3] {
    lab_8bit(lab).map(|v| v.round().clamp(0.0, 255.0) as u8)
}

pub fn distance3(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)).sqrt()
}

pub fn to_f64(c: Rgb) -> [f64; 3] {
    [c[0] as f64, c[1] as f64, c[2] as f64]
}

/// Truncating conversion with clamping, matching integer colour casts.
pub fn from_f64(c: [f64; 3]) -> Rgb {
    [
        c[0].clamp(0.0, 255.0) as u8,
        c[1].clamp(0.0, 255.0) as u8,
        c[2].clamp(0.0, 255.0) as u8,
    ]
}

pub fn round_f64(c: [f64; 3]) -> Rgb {
    from_f64([c[0].round(), c[1].round(), c[2].round()])
}

/// Rec.601 luma, the weighting the stroke thresholds were tuned with.
pub fn luma(c: Rgb) -> f64 {
    0.299 * c[0] as f64 + 0.587 * c[1] as f64 + 0.114 * c[2] as f64
}

pub fn hex(c: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", c[0], c[1], c[2])
}

/// Median with even-length averaging. Sorts in place.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let n = values.len();
    Some(if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    })
}

/// Per-channel median colour.
pub fn median_rgb(colors: &[Rgb]) -> Option<Rgb> {
    if colors.is_empty() {
        return None;
    }
    let mut out = [0.0; 3];
    for (ch, slot) in out.iter_mut().enumerate() {
        let mut values: Vec<f64> = colors.iter().map(|c| c[ch] as f64).collect();
        *slot = median(&mut values).unwrap_or(0.0);
    }
    Some(from_f64(out))
}

/// Trimmed mean dropping n/10 samples from each end of every channel when
/// more than 20 samples exist, otherwise the per-channel median.
///
/// This is the closed-form minimiser of interior squared error, with the
/// tails removed so anti-aliased fringe pixels don't drag the fill.
pub fn robust_mean(colors: &[Rgb]) -> Option<Rgb> {
    let n = colors.len();
    if n <= 20 {
        return median_rgb(colors);
    }
    let trim = (n / 10).max(1);
    let mut out = [0.0; 3];
    for (ch, slot) in out.iter_mut().enumerate() {
        let mut values: Vec<u8> = colors.iter().map(|c| c[ch]).collect();
        values.sort_unstable();
        let kept = &values[trim..n - trim];
        *slot = kept.iter().map(|&v| v as f64).sum::<f64>() / kept.len() as f64;
    }
    Some(from_f64(out))
}
