//! Region masks → smoothed polygons with sampled fills.
//!
//! Per region:
//! 1. Close 3×3 and dilate 1 px so neighbours overlap without seams
//! 2. Take the largest outer border
//! 3. Coarse RDP, then Gaussian smoothing of the full border, then a
//!    final RDP; the coarse ring is the fallback if smoothing folds it
//! 4. Sample the fill from source pixels and try a gradient

use kurbo::Point;
use rayon::prelude::*;

use crate::bitmap::SourceImage;
use crate::color::{median, robust_mean, to_lab, Rgb};
use crate::config::VectorizeConfig;
use crate::contour;
use crate::geom;
use crate::gradient::{fit_gradient, verify_gradient_improvement};
use crate::mask::{RegionMask, DEFAULT_PAD};
use crate::polygon::{Paint, Polygon};
use crate::segment::{RegionIndex, RegionStats};
use crate::simplify::{coarse_epsilon_factor, gaussian_smooth_closed, rdp_closed, smoothing_sigma};

/// Traced outline of a mask.
#[derive(Debug, Clone)]
pub struct Shape {
    pub points: Vec<Point>,
    /// Area enclosed by the raw border.
    pub area: f64,
    pub centroid: Point,
}

/// How a border becomes a polygon.
#[derive(Debug, Clone, Copy)]
pub struct TraceParams {
    pub min_area: f64,
    /// Run the coarse area-tiered RDP first and keep it as the fallback.
    pub coarse: bool,
    pub sigma: f64,
}

/// Final simplification tolerance as a fraction of smoothed perimeter.
const FINAL_EPSILON: f64 = 0.005;

/// Trace the largest outer border of `mask` into a simple polygon.
///
/// `sigma` maps border area to a smoothing sigma.
pub fn trace_shape(mask: &RegionMask, min_area: f64, coarse: bool, sigma: impl Fn(f64) -> f64) -> Option<Shape> {
    let border = contour::largest_outer(mask)?;
    let area = geom::area(&border);
    if area < min_area {
        return None;
    }
    let params = TraceParams {
        min_area,
        coarse,
        sigma: sigma(area),
    };
    let points = simplify_border(&border, area, &params)?;
    Some(Shape {
        points,
        area,
        centroid: geom::centroid(&border),
    })
}

fn simplify_border(border: &[Point], area: f64, params: &TraceParams) -> Option<Vec<Point>> {
    let coarse = if params.coarse {
        let ring = rdp_closed(border, coarse_epsilon_factor(area) * geom::perimeter(border));
        if ring.len() < 3 {
            return None;
        }
        Some(ring)
    } else {
        None
    };

    let smoothed = gaussian_smooth_closed(border, params.sigma);
    let fine = geom::dedup_ring(&rdp_closed(&smoothed, FINAL_EPSILON * geom::perimeter(&smoothed)));
    if fine.len() < 3 {
        return None;
    }
    if geom::is_simple(&fine) {
        return Some(fine);
    }
    match coarse {
        Some(ring) if geom::is_simple(&ring) => {
            log::debug!("smoothed ring folds, keeping coarse ring ({} points)", ring.len());
            Some(geom::dedup_ring(&ring))
        }
        _ => None,
    }
}

/// Robust fill colour and opacity from source pixels under `mask`,
/// skipping the 1 px rim where neighbours bleed in.
pub fn sample_color(source: &SourceImage, mask: &RegionMask) -> Option<(Rgb, f64)> {
    let inner = mask.interior(&[(1, 5)]);
    let pixels = inner.pixels();
    let colors: Vec<Rgb> = pixels.iter().map(|&(x, y)| source.color(x, y)).collect();
    let color = robust_mean(&colors)?;
    let mut alphas: Vec<f64> = pixels.iter().map(|&(x, y)| source.alpha_at(x, y) as f64).collect();
    let alpha = median(&mut alphas)? / 255.0;
    Some((color, alpha))
}

/// Solid fill, upgraded to a verified gradient for large enough shapes.
pub fn sample_paint(source: &SourceImage, mask: &RegionMask, area: f64, config: &VectorizeConfig) -> Option<(Paint, f64)> {
    let (color, alpha) = sample_color(source, mask)?;
    let mut paint = Paint::solid(color);
    if area > config.extract.gradient_min_area {
        let pixels = mask.pixels();
        paint.gradient = fit_gradient(&source.rgb, &pixels, &config.gradient).and_then(|g| {
            verify_gradient_improvement(&source.rgb, &pixels, color, g, config.gradient.improvement_ratio)
        });
    }
    Some((paint, alpha))
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

/// Build a polygon from an already cleaned-up mask.
///
/// `brightness` defaults to L* of the sampled colour.
pub fn polygon_from_mask(
    source: &SourceImage,
    mask: &RegionMask,
    shape: Shape,
    region_id: u32,
    brightness: Option<f64>,
    config: &VectorizeConfig,
) -> Option<Polygon> {
    let (paint, alpha) = sample_paint(source, mask, shape.area, config)?;
    let brightness = brightness.unwrap_or_else(|| to_lab(paint.color)[0]);
    Some(Polygon {
        points: shape.points,
        paint,
        opacity: round3(alpha.min(1.0)),
        region_id,
        part: None,
        area: shape.area,
        centroid: shape.centroid,
        brightness,
    })
}

/// Trace every merged region into at most one polygon.
pub fn extract_polygons(
    source: &SourceImage,
    index: &RegionIndex,
    regions: &[RegionStats],
    config: &VectorizeConfig,
) -> Vec<Polygon> {
    let min_area = config.extract.min_area;
    let polygons: Vec<Polygon> = (0..index.len() as u32)
        .into_par_iter()
        .filter_map(|rid| {
            let stats = regions.get(rid as usize)?;
            if (index.pixels(rid).len() as f64) < min_area {
                return None;
            }
            if stats.mean_alpha / 255.0 < config.extract.min_alpha {
                return None;
            }
            let mask = index.mask(rid, DEFAULT_PAD)?.close(1).dilate(1);
            let shape = trace_shape(&mask, min_area, true, smoothing_sigma)?;
            polygon_from_mask(source, &mask, shape, rid, Some(stats.brightness()), config)
        })
        .collect();

    let gradients = polygons.iter().filter(|p| p.paint.is_gradient()).count();
    log::info!(
        "  Extract     {} polygons ({} gradients, {} solid)",
        polygons.len(),
        gradients,
        polygons.len() - gradients
    );
    polygons
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::LabelMap;
    use image::RgbaImage;

    /// Two regions: a light disc (id 1) on a darker square (id 0).
    fn disc_scene() -> (SourceImage, LabelMap) {
        let (w, h) = (48u32, 48u32);
        let inside = |x: u32, y: u32| {
            let (dx, dy) = (x as f64 - 24.0, y as f64 - 24.0);
            dx * dx + dy * dy < 14.0 * 14.0
        };
        let rgba = RgbaImage::from_fn(w, h, |x, y| {
            if inside(x, y) {
                image::Rgba([240, 220, 60, 255])
            } else {
                image::Rgba([30, 60, 150, 255])
            }
        });
        let data = (0..w * h).map(|i| u32::from(inside(i % w, i / w))).collect();
        (SourceImage::from_rgba(&rgba), LabelMap::from_raw(w, h, data).unwrap())
    }

    fn stats_for(source: &SourceImage, labels: &LabelMap) -> Vec<RegionStats> {
        let lab = crate::color::lab_image(&source.rgb);
        crate::segment::stats::compute(labels, 2, source, &lab)
    }

    #[test]
    fn disc_becomes_simple_polygon_with_exact_color() {
        let (source, labels) = disc_scene();
        let regions = stats_for(&source, &labels);
        let polys = extract_polygons(&source, &labels.index(), &regions, &VectorizeConfig::default());
        let disc = polys.iter().find(|p| p.region_id == 1).unwrap();
        assert!(disc.points.len() >= 6);
        assert!(geom::is_simple(&disc.points));
        assert_eq!(disc.paint, Paint::solid([240, 220, 60]));
        assert_eq!(disc.opacity, 1.0);
        assert!((disc.centroid.x - 24.0).abs() < 1.0);
        // Dilated by a pixel: a bit larger than the 14 px disc.
        let expected = std::f64::consts::PI * 14.0 * 14.0;
        assert!(disc.area > expected * 0.9 && disc.area < expected * 1.25);
        for p in &disc.points {
            assert_eq!(p.x.fract(), 0.0);
            assert_eq!(p.y.fract(), 0.0);
        }
    }

    #[test]
    fn tiny_and_translucent_regions_are_skipped() {
        let (source, labels) = disc_scene();
        let mut regions = stats_for(&source, &labels);
        regions[1].mean_alpha = 100.0;
        let config = VectorizeConfig::default();
        let polys = extract_polygons(&source, &labels.index(), &regions, &config);
        assert!(polys.iter().all(|p| p.region_id != 1));

        let speck = LabelMap::from_raw(4, 4, vec![0; 16]).unwrap();
        let small = SourceImage::from_rgba(&RgbaImage::from_pixel(4, 4, image::Rgba([9, 9, 9, 255])));
        let stats = stats_for(&small, &speck);
        let mut config = config;
        config.extract.min_area = 20.0;
        assert!(extract_polygons(&small, &speck.index(), &stats, &config).is_empty());
    }

    #[test]
    fn horizontal_ramp_gets_gradient() {
        let rgba = RgbaImage::from_fn(60, 30, |x, _| {
            let v = (x * 4) as u8;
            image::Rgba([v, 255 - v, 128, 255])
        });
        let source = SourceImage::from_rgba(&rgba);
        let labels = LabelMap::from_raw(60, 30, vec![0; 1800]).unwrap();
        let lab = crate::color::lab_image(&source.rgb);
        let regions = crate::segment::stats::compute(&labels, 1, &source, &lab);
        let polys = extract_polygons(&source, &labels.index(), &regions, &VectorizeConfig::default());
        assert_eq!(polys.len(), 1);
        let g = polys[0].paint.gradient.as_ref().expect("ramp fits a gradient");
        assert!(g.end.x > g.start.x + 40.0);
        assert!(g.start_color[0] < g.end_color[0]);
    }

    #[test]
    fn sample_color_uses_interior() {
        // 10x10 block whose rim is red and interior blue.
        let rgba = RgbaImage::from_fn(12, 12, |x, y| {
            let rim = x == 1 || y == 1 || x == 10 || y == 10;
            if rim {
                image::Rgba([255, 0, 0, 255])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        let source = SourceImage::from_rgba(&rgba);
        let pixels: Vec<(u32, u32)> = (1..11).flat_map(|y| (1..11).map(move |x| (x, y))).collect();
        let mask = RegionMask::from_pixels(&pixels, DEFAULT_PAD, 12, 12).unwrap();
        let (color, alpha) = sample_color(&source, &mask).unwrap();
        assert_eq!(color, [0, 0, 255]);
        assert_eq!(alpha, 1.0);
    }
}
