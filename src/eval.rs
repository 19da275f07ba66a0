//! Reconstruction quality: global PSNR, tolerance bands, and per-polygon
//! error against the source pixels.
//!
//! Everything is measured over foreground pixels only; transparent
//! background is never part of the logo.

use std::fmt;

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::polygon::Polygon;
use crate::segment::RegionIndex;

/// PSNR reported when original and render agree exactly.
pub const PSNR_CEILING: f64 = 100.0;

/// Per-pixel tolerances (max channel difference) reported in [`QualityReport`].
pub const TOLERANCES: [u8; 4] = [5, 10, 20, 40];

fn foreground_pairs<'a>(
    original: &'a RgbImage,
    rendered: &'a RgbImage,
    foreground: &'a GrayImage,
) -> impl Iterator<Item = ([u8; 3], [u8; 3])> + 'a {
    original
        .pixels()
        .zip(rendered.pixels())
        .zip(foreground.pixels())
        .filter(|(_, m)| m.0[0] > 0)
        .map(|((o, r), _)| (o.0, r.0))
}

/// Peak signal-to-noise ratio over foreground pixels, per channel.
///
/// Returns [`PSNR_CEILING`] for identical rasters or an empty foreground.
pub fn psnr(original: &RgbImage, rendered: &RgbImage, foreground: &GrayImage) -> f64 {
    let (mut sum, mut n) = (0.0, 0usize);
    for (o, r) in foreground_pairs(original, rendered, foreground) {
        for c in 0..3 {
            sum += (o[c] as f64 - r[c] as f64).powi(2);
        }
        n += 3;
    }
    if n == 0 {
        return PSNR_CEILING;
    }
    let mse = sum / n as f64;
    if mse < 1e-10 {
        return PSNR_CEILING;
    }
    10.0 * (255.0f64 * 255.0 / mse).log10()
}

/// Global fidelity summary of one render.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityReport {
    pub psnr: f64,
    /// Mean absolute channel difference.
    pub mean_error: f64,
    /// (tolerance, percentage of pixels whose max channel difference is within it)
    pub within: Vec<(u8, f64)>,
    pub pixels: usize,
}

impl QualityReport {
    pub fn measure(original: &RgbImage, rendered: &RgbImage, foreground: &GrayImage) -> Self {
        let mut abs_sum = 0.0;
        let mut counts = [0usize; TOLERANCES.len()];
        let mut pixels = 0usize;
        for (o, r) in foreground_pairs(original, rendered, foreground) {
            let mut max_diff = 0u8;
            for c in 0..3 {
                let d = o[c].abs_diff(r[c]);
                abs_sum += d as f64;
                max_diff = max_diff.max(d);
            }
            for (count, &t) in counts.iter_mut().zip(TOLERANCES.iter()) {
                if max_diff <= t {
                    *count += 1;
                }
            }
            pixels += 1;
        }
        let pct = |c: usize| if pixels == 0 { 100.0 } else { c as f64 * 100.0 / pixels as f64 };
        Self {
            psnr: psnr(original, rendered, foreground),
            mean_error: if pixels == 0 { 0.0 } else { abs_sum / (pixels * 3) as f64 },
            within: TOLERANCES.iter().zip(counts).map(|(&t, c)| (t, pct(c))).collect(),
            pixels,
        }
    }

    /// Percentage within `tolerance`, if it is one of [`TOLERANCES`].
    pub fn within(&self, tolerance: u8) -> Option<f64> {
        self.within.iter().find(|(t, _)| *t == tolerance).map(|&(_, p)| p)
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  PSNR        {:.2} dB", self.psnr)?;
        writeln!(f, "  Mean error  {:.1} RGB", self.mean_error)?;
        for (t, pct) in &self.within {
            writeln!(f, "  Within {:2}   {:.1}%", t, pct)?;
        }
        Ok(())
    }
}

/// Error of one polygon's interior, fresh for each render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorRecord {
    /// Mean over pixels of the summed squared channel error.
    pub mse: f64,
    pub observed_mean: [f64; 3],
    pub rendered_mean: [f64; 3],
    /// Interior pixels measured; 0 when the polygon was too small to measure.
    pub pixels: usize,
}

impl ErrorRecord {
    pub const EMPTY: ErrorRecord = ErrorRecord {
        mse: 0.0,
        observed_mean: [0.0; 3],
        rendered_mean: [0.0; 3],
        pixels: 0,
    };
}

/// Error per polygon (same order), measured inside each polygon's pixel
/// mask eroded by 2 px so overlap with neighbours doesn't count.
pub fn per_polygon_error(
    original: &RgbImage,
    rendered: &RgbImage,
    polygons: &[Polygon],
    index: &RegionIndex,
) -> Vec<ErrorRecord> {
    polygons
        .par_iter()
        .map(|poly| {
            let Some(mask) = poly.pixel_mask(index) else {
                return ErrorRecord::EMPTY;
            };
            let pixels = mask.interior(&[(2, 10)]).pixels();
            if pixels.len() < 5 {
                return ErrorRecord::EMPTY;
            }
            let n = pixels.len() as f64;
            let (mut sq, mut obs, mut ren) = (0.0, [0.0; 3], [0.0; 3]);
            for &(x, y) in &pixels {
                let (o, r) = (original.get_pixel(x, y).0, rendered.get_pixel(x, y).0);
                for c in 0..3 {
                    let (ov, rv) = (o[c] as f64, r[c] as f64);
                    sq += (ov - rv).powi(2);
                    obs[c] += ov / n;
                    ren[c] += rv / n;
                }
            }
            ErrorRecord {
                mse: sq / n,
                observed_mean: obs,
                rendered_mean: ren,
                pixels: pixels.len(),
            }
        })
        .collect()
}
