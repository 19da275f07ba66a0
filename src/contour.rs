use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use kurbo::Point;

use crate::geom;
use crate::mask::RegionMask;

/// A border traced from a binary mask, in image pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawContour {
    /// Border pixel centres, in tracing order.
    pub points: Vec<Point>,
    /// Whether this is an outer contour or a hole.
    pub is_outer: bool,
    /// Index of the parent contour in the returned Vec (for nesting hierarchy).
    pub parent: Option<usize>,
}

impl RawContour {
    pub fn area(&self) -> f64 {
        geom::area(&self.points)
    }
}

/// Trace every border of a binary image (nonzero = inside).
///
/// `origin` is added to every point so crops report image coordinates.
/// Indices in `parent` refer to the returned Vec.
pub fn detect(gray: &GrayImage, origin: (u32, u32)) -> Vec<RawContour> {
    let (ox, oy) = (origin.0 as f64, origin.1 as f64);
    find_contours::<i32>(gray)
        .into_iter()
        .map(|c| RawContour {
            points: c
                .points
                .iter()
                .map(|p| Point::new(p.x as f64 + ox, p.y as f64 + oy))
                .collect(),
            is_outer: c.border_type == BorderType::Outer,
            parent: c.parent,
        })
        .collect()
}

/// Outer border of a region mask enclosing the most area.
pub fn largest_outer(mask: &RegionMask) -> Option<Vec<Point>> {
    detect(&mask.image, (mask.x0, mask.y0))
        .into_iter()
        .filter(|c| c.is_outer && c.points.len() >= 3)
        .map(|c| (c.area(), c.points))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, points)| points)
}

/// Top-level outer borders paired with the indices of their direct holes.
///
/// Outer borders nested inside a hole are reported as their own shapes.
pub fn shapes_with_holes(contours: &[RawContour]) -> Vec<(usize, Vec<usize>)> {
    let mut shapes: Vec<(usize, Vec<usize>)> = contours
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_outer)
        .map(|(i, _)| (i, Vec::new()))
        .collect();
    for (i, c) in contours.iter().enumerate() {
        if c.is_outer {
            continue;
        }
        if let Some(parent) = c.parent {
            if let Some(shape) = shapes.iter_mut().find(|(outer, _)| *outer == parent) {
                shape.1.push(i);
            }
        }
    }
    shapes
}
