//! Palette quantization and per-colour tracing.
//!
//! Each palette colour becomes one layer of even-odd compound paths (an
//! outer ring plus its holes), so shapes with counters need no extra
//! polygons.

use image::Luma;
use kurbo::BezPath;

use crate::bitmap::SourceImage;
use crate::cluster::ColorClusterer;
use crate::color::{from_f64, to_f64, to_lab};
use crate::config::QuantizeConfig;
use crate::contour;
use crate::geom;
use crate::mask::{RegionMask, DEFAULT_PAD};
use crate::simplify::rdp_closed;
use crate::svg::Layer;

/// Blur applied before re-thresholding so traced edges don't staircase.
const EDGE_BLUR_SIGMA: f32 = 0.6;

/// Quantize the foreground and trace every sufficiently used colour.
///
/// Layers come back in paint order: larger total area first, brighter
/// first on ties.
pub fn quantize_layers(
    source: &SourceImage,
    config: &QuantizeConfig,
    foreground_alpha: u8,
    clusterer: &dyn ColorClusterer,
) -> Vec<Layer> {
    let (w, h) = source.dimensions();
    let fg = source.foreground(foreground_alpha);
    let pixels: Vec<(u32, u32)> = fg
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect();
    let colors: Vec<[f64; 3]> = pixels.iter().map(|&(x, y)| to_f64(source.color(x, y))).collect();
    let clustering = clusterer.cluster(&colors, config.colors);
    log::info!(
        "  Quantize    {} colours ({} foreground pixels)",
        clustering.centers.len(),
        pixels.len()
    );

    let mut members: Vec<Vec<(u32, u32)>> = vec![Vec::new(); clustering.centers.len()];
    for (&p, &a) in pixels.iter().zip(&clustering.assignments) {
        members[a].push(p);
    }

    let mut layers: Vec<Layer> = clustering
        .centers
        .iter()
        .zip(&members)
        .filter(|(_, m)| m.len() >= config.min_pixels)
        .filter_map(|(center, m)| {
            let mask = RegionMask::from_pixels(m, DEFAULT_PAD, w, h)?;
            let traced = trace_layer(&mask, config);
            if traced.is_empty() {
                return None;
            }
            let color = from_f64(*center);
            Some(Layer {
                color,
                total_area: traced.iter().map(|(_, area)| area).sum(),
                paths: traced.into_iter().map(|(path, _)| path).collect(),
                brightness: to_lab(color)[0],
            })
        })
        .collect();

    layers.sort_by(|a, b| {
        b.total_area
            .total_cmp(&a.total_area)
            .then_with(|| b.brightness.total_cmp(&a.brightness))
    });
    let paths: usize = layers.iter().map(|l| l.paths.len()).sum();
    log::info!("  Layers      {} colour layers, {} paths", layers.len(), paths);
    layers
}

/// Clean up a colour mask and trace it into compound paths, each paired
/// with its outer ring's area.
fn trace_layer(mask: &RegionMask, config: &QuantizeConfig) -> Vec<(BezPath, f64)> {
    let closed = mask.close(1);
    let blurred = imageproc::filter::gaussian_blur_f32(&closed.image, EDGE_BLUR_SIGMA);
    let clean = image::GrayImage::from_fn(blurred.width(), blurred.height(), |x, y| {
        Luma([if blurred.get_pixel(x, y).0[0] > 127 { 255 } else { 0 }])
    });

    let contours = contour::detect(&clean, (mask.x0, mask.y0));
    let ring = |i: usize| -> Option<BezPath> {
        let points = &contours[i].points;
        if geom::area(points) < config.min_area {
            return None;
        }
        let simplified = rdp_closed(points, config.epsilon * geom::perimeter(points));
        (simplified.len() >= 3).then(|| geom::ring_path(&simplified))
    };

    let mut out = Vec::new();
    for (outer, holes) in contour::shapes_with_holes(&contours) {
        let Some(mut path) = ring(outer) else {
            continue;
        };
        for hole in holes {
            if let Some(hole_path) = ring(hole) {
                path.extend(hole_path.elements().iter().copied());
            }
        }
        out.push((path, contours[outer].area()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeans;
    use image::RgbaImage;

    /// A red ring (square with a square hole) and a small blue square on
    /// a transparent canvas.
    fn ring_scene() -> SourceImage {
        let rgba = RgbaImage::from_fn(64, 48, |x, y| {
            let in_ring = (4..36).contains(&x) && (4..36).contains(&y);
            let in_hole = (14..26).contains(&x) && (14..26).contains(&y);
            let in_blue = (44..56).contains(&x) && (10..22).contains(&y);
            if in_ring && !in_hole {
                image::Rgba([220, 20, 20, 255])
            } else if in_blue {
                image::Rgba([20, 40, 220, 255])
            } else {
                image::Rgba([0, 0, 0, 0])
            }
        });
        SourceImage::from_rgba(&rgba)
    }

    #[test]
    fn ring_keeps_its_hole() {
        let source = ring_scene();
        let config = QuantizeConfig::default();
        let layers = quantize_layers(&source, &config, 200, &KMeans::default());
        assert_eq!(layers.len(), 2);
        // Larger layer first.
        assert_eq!(layers[0].color, [220, 20, 20]);
        assert_eq!(layers[0].paths.len(), 1);
        let d = layers[0].paths[0].to_svg();
        assert_eq!(d.matches('Z').count(), 2);
        assert_eq!(layers[1].color, [20, 40, 220]);
        assert!(layers[0].total_area > layers[1].total_area);
    }

    #[test]
    fn rare_colours_are_dropped() {
        let mut rgba = RgbaImage::from_pixel(20, 20, image::Rgba([200, 200, 200, 255]));
        for x in 0..3 {
            rgba.put_pixel(x, 0, image::Rgba([0, 0, 0, 255]));
        }
        let source = SourceImage::from_rgba(&rgba);
        let layers = quantize_layers(&source, &QuantizeConfig::default(), 200, &KMeans::default());
        assert_eq!(layers.len(), 1);
        assert_eq!(layers[0].color, [200, 200, 200]);
    }

    #[test]
    fn transparent_image_has_no_layers() {
        let source = SourceImage::from_rgba(&RgbaImage::new(8, 8));
        assert!(quantize_layers(&source, &QuantizeConfig::default(), 200, &KMeans::default()).is_empty());
    }

    #[test]
    fn ties_paint_brighter_first() {
        let rgba = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgba([30, 30, 30, 255])
            } else {
                image::Rgba([230, 230, 230, 255])
            }
        });
        let layers = quantize_layers(&SourceImage::from_rgba(&rgba), &QuantizeConfig::default(), 200, &KMeans::default());
        assert_eq!(layers.len(), 2);
        if layers[0].total_area == layers[1].total_area {
            assert!(layers[0].brightness > layers[1].brightness);
        }
    }
}
