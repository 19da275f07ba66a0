//! Dark outline detection.
//!
//! Low-poly logo art often draws near-black outlines between facets. A
//! region's boundary band only counts as an outline when it is mostly
//! near-black, clearly darker than the region itself, and wider than
//! anti-aliasing.

use std::collections::BTreeMap;

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::{euclidean_squared_distance_transform, Norm};
use rayon::prelude::*;

use crate::bitmap::SourceImage;
use crate::color::{luma, median, median_rgb, Rgb};
use crate::config::StrokeConfig;
use crate::mask::DEFAULT_PAD;
use crate::segment::RegionIndex;

/// Outline drawn around one region.
#[derive(Debug, Clone, PartialEq)]
pub struct StrokeRecord {
    pub width: f64,
    pub color: Rgb,
    /// Share of the boundary band that is near-black.
    pub dark_fraction: f64,
}

/// Stroke records keyed by merged region id.
pub type StrokeTable = BTreeMap<u32, StrokeRecord>;

/// Rounded Rec.601 gray plane.
pub fn gray_plane(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    GrayImage::from_fn(w, h, |x, y| Luma([luma(rgb.get_pixel(x, y).0).round() as u8]))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Find regions whose boundary carries a genuine dark outline.
pub fn detect_strokes(
    source: &SourceImage,
    index: &RegionIndex,
    config: &StrokeConfig,
    foreground_alpha: u8,
) -> StrokeTable {
    let (w, h) = source.dimensions();
    let gray = gray_plane(&source.rgb);
    let fg = source.foreground(foreground_alpha);
    let dark = GrayImage::from_fn(w, h, |x, y| {
        let on = gray.get_pixel(x, y).0[0] < config.near_black && fg.get_pixel(x, y).0[0] > 0;
        Luma([if on { 255 } else { 0 }])
    });
    let dark = imageproc::morphology::close(&dark, Norm::LInf, 1);

    // Distance from each dark pixel to the nearest non-dark pixel.
    let outside = GrayImage::from_fn(w, h, |x, y| {
        Luma([if dark.get_pixel(x, y).0[0] > 0 { 0 } else { 255 }])
    });
    let dist_sq = euclidean_squared_distance_transform(&outside);

    let table: StrokeTable = (0..index.len() as u32)
        .into_par_iter()
        .filter_map(|rid| {
            let pixels = index.pixels(rid);
            if pixels.len() < config.min_region_pixels {
                return None;
            }
            let mask = index.mask(rid, DEFAULT_PAD)?;
            let band = mask.ring(2);
            if band.is_empty() {
                return None;
            }
            let dark_band: Vec<(u32, u32)> = band
                .iter()
                .copied()
                .filter(|&(x, y)| {
                    let gray_dark = gray.get_pixel(x, y).0[0] < config.near_black;
                    gray_dark && fg.get_pixel(x, y).0[0] > 0
                })
                .collect();
            if dark_band.len() < config.min_dark_pixels {
                return None;
            }

            let mut inner: Vec<f64> = pixels.iter().map(|&(x, y)| gray.get_pixel(x, y).0[0] as f64).collect();
            let mut outer: Vec<f64> = dark_band.iter().map(|&(x, y)| gray.get_pixel(x, y).0[0] as f64).collect();
            let contrast = median(&mut inner)? - median(&mut outer)?;
            if contrast < config.min_contrast {
                return None;
            }
            let dark_fraction = dark_band.len() as f64 / band.len() as f64;
            if dark_fraction < config.min_dark_fraction {
                return None;
            }

            let mut widths: Vec<f64> = dark_band
                .iter()
                .map(|&(x, y)| 2.0 * dist_sq.get_pixel(x, y).0[0].sqrt())
                .collect();
            let band_width = median(&mut widths)?;
            if band_width < config.min_band_width {
                return None;
            }

            let colors: Vec<Rgb> = dark_band.iter().map(|&(x, y)| source.color(x, y)).collect();
            let color = median_rgb(&colors)?;
            let width = round1((band_width * config.width_scale).clamp(config.min_width, config.max_width));
            log::debug!("stroke region {}: width {:.1}, dark {:.2}", rid, width, dark_fraction);
            Some((rid, StrokeRecord { width, color, dark_fraction }))
        })
        .collect();

    log::info!("  Strokes     {} regions with dark outlines", table.len());
    table
}

/// Move stroke widths toward matching the original boundary brightness.
///
/// A rendered boundary brighter than the original means the outline is too
/// thin, darker means too thick. Returns how many widths changed.
pub fn nudge_stroke_widths(
    strokes: &mut StrokeTable,
    index: &RegionIndex,
    original: &RgbImage,
    rendered: &RgbImage,
    foreground: &GrayImage,
) -> usize {
    let gray_orig = gray_plane(original);
    let gray_rend = gray_plane(rendered);
    let mut adjusted = 0;
    for (&rid, record) in strokes.iter_mut() {
        let Some(mask) = index.mask(rid, DEFAULT_PAD) else {
            continue;
        };
        let band: Vec<(u32, u32)> = mask
            .ring(2)
            .into_iter()
            .filter(|&(x, y)| foreground.get_pixel(x, y).0[0] > 0)
            .collect();
        if band.len() < 10 {
            continue;
        }
        let n = band.len() as f64;
        let orig: f64 = band.iter().map(|&(x, y)| gray_orig.get_pixel(x, y).0[0] as f64).sum::<f64>() / n;
        let rend: f64 = band.iter().map(|&(x, y)| gray_rend.get_pixel(x, y).0[0] as f64).sum::<f64>() / n;
        let diff = rend - orig;
        if diff.abs() <= 3.0 {
            continue;
        }
        let width = (record.width + (diff * 0.02).clamp(-0.15, 0.15)).clamp(0.5, 4.0);
        if (width - record.width).abs() > 0.05 {
            record.width = round1(width);
            adjusted += 1;
        }
    }
    adjusted
}
