//! Multi-channel edge map.
//!
//! Luminance edges alone miss boundaries between facets of equal
//! brightness, so Canny runs on gray, on each RGB channel, and on each
//! 8-bit LAB channel, and the results are combined with a pixel-wise max.

use image::{GrayImage, Luma, RgbImage};
use imageproc::edges::canny;

use crate::color::{lab_to_u8, luma, LabColor};

/// (channel, low, high) Canny thresholds.
const PASSES: [(Channel, f32, f32); 8] = [
    (Channel::Gray, 30.0, 80.0),
    (Channel::Gray, 60.0, 160.0),
    (Channel::Rgb(0), 35.0, 100.0),
    (Channel::Rgb(1), 35.0, 100.0),
    (Channel::Rgb(2), 35.0, 100.0),
    (Channel::Lab(0), 30.0, 90.0),
    (Channel::Lab(1), 25.0, 75.0),
    (Channel::Lab(2), 25.0, 75.0),
];

#[derive(Debug, Clone, Copy)]
enum Channel {
    Gray,
    Rgb(usize),
    Lab(usize),
}

/// Combined edge map: 255 where any pass found an edge.
pub fn detect(rgb: &RgbImage, lab: &[LabColor]) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let gray = GrayImage::from_fn(w, h, |x, y| {
        Luma([luma(rgb.get_pixel(x, y).0).round() as u8])
    });
    let lab8: Vec<[u8; 3]> = lab.iter().map(lab_to_u8).collect();

    let mut edges = GrayImage::new(w, h);
    for (channel, low, high) in PASSES {
        let plane = match channel {
            Channel::Gray => gray.clone(),
            Channel::Rgb(c) => GrayImage::from_fn(w, h, |x, y| Luma([rgb.get_pixel(x, y).0[c]])),
            Channel::Lab(c) => GrayImage::from_fn(w, h, |x, y| {
                Luma([lab8[(y * w + x) as usize][c]])
            }),
        };
        let pass = canny(&plane, low, high);
        for (dst, src) in edges.pixels_mut().zip(pass.pixels()) {
            dst.0[0] = dst.0[0].max(src.0[0]);
        }
    }
    edges
}

/// Darken pixels on (1px-dilated) edges so superpixels don't straddle them.
pub fn darken_edges(rgb: &RgbImage, edges: &GrayImage, factor: f64) -> RgbImage {
    let barrier = imageproc::morphology::dilate(edges, imageproc::distance_transform::Norm::LInf, 1);
    let mut out = rgb.clone();
    for (pixel, edge) in out.pixels_mut().zip(barrier.pixels()) {
        if edge.0[0] > 0 {
            for c in pixel.0.iter_mut() {
                *c = (*c as f64 * factor) as u8;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::lab_image;

    #[test]
    fn finds_color_only_boundary() {
        // Red and green halves with equal-ish luminance still produce edges.
        let rgb = RgbImage::from_fn(32, 32, |x, _| {
            if x < 16 {
                image::Rgb([200, 40, 40])
            } else {
                image::Rgb([40, 120, 40])
            }
        });
        let lab = lab_image(&rgb);
        let edges = detect(&rgb, &lab);
        let on_boundary = (0..32).filter(|&y| {
            (14..18).any(|x| edges.get_pixel(x, y).0[0] > 0)
        });
        assert!(on_boundary.count() > 20);
        assert_eq!(edges.get_pixel(4, 16).0[0], 0);
    }

    #[test]
    fn darkening_halves_edge_pixels() {
        let rgb = RgbImage::from_pixel(5, 5, image::Rgb([100, 100, 100]));
        let mut edges = GrayImage::new(5, 5);
        edges.put_pixel(2, 2, Luma([255]));
        let out = darken_edges(&rgb, &edges, 0.5);
        assert_eq!(out.get_pixel(1, 1).0, [50, 50, 50]);
        assert_eq!(out.get_pixel(4, 4).0, [100, 100, 100]);
    }
}
