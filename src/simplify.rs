//! Polyline smoothing and simplification for closed rings.
//!
//! 1. Coarse RDP (via `geo`) to measure how much detail a ring carries
//! 2. Periodic Gaussian smoothing of the full pixel border
//! 3. Final RDP of the smoothed ring

use geo::{Coord, LineString, Simplify};
use kurbo::Point;

/// RDP-simplify a closed ring, returning it without the repeated endpoint.
///
/// The ring is split at its first vertex, so that vertex always survives.
pub fn rdp_closed(points: &[Point], epsilon: f64) -> Vec<Point> {
    if points.len() <= 3 || epsilon <= 0.0 {
        return points.to_vec();
    }
    let mut coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    coords.push(coords[0]);
    let mut out: Vec<Point> = LineString::new(coords)
        .simplify(&epsilon)
        .into_inner()
        .into_iter()
        .map(|c| Point::new(c.x, c.y))
        .collect();
    if out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Gaussian-smooth a closed ring with wraparound, rounding to whole pixels.
///
/// The kernel extends four sigmas each side. Rings shorter than six points
/// are returned unchanged.
pub fn gaussian_smooth_closed(points: &[Point], sigma: f64) -> Vec<Point> {
    let n = points.len();
    if n < 6 || sigma <= 0.0 {
        return points.to_vec();
    }
    let radius = (4.0 * sigma + 0.5) as isize;
    let weights: Vec<f64> = (-radius..=radius)
        .map(|k| (-(k * k) as f64 / (2.0 * sigma * sigma)).exp())
        .collect();
    let total: f64 = weights.iter().sum();

    (0..n as isize)
        .map(|i| {
            let (mut x, mut y) = (0.0, 0.0);
            for (k, w) in (-radius..=radius).zip(&weights) {
                let p = points[(i + k).rem_euclid(n as isize) as usize];
                x += p.x * w;
                y += p.y * w;
            }
            Point::new((x / total).round(), (y / total).round())
        })
        .collect()
}

/// Coarse simplification tolerance as a fraction of perimeter: small
/// regions are simplified harder.
pub fn coarse_epsilon_factor(area: f64) -> f64 {
    if area < 60.0 {
        0.018
    } else if area < 200.0 {
        0.010
    } else if area < 800.0 {
        0.006
    } else {
        0.004
    }
}

/// Smoothing sigma for a region of `area` pixels.
pub fn smoothing_sigma(area: f64) -> f64 {
    if area < 100.0 {
        1.0
    } else if area < 500.0 {
        1.5
    } else {
        2.5
    }
}
