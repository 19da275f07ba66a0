//! Shared geometry utilities for closed polygons.

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{Coord, Line};
use kurbo::{BezPath, Point};

/// Signed area via the shoelace formula.
///
/// Positive = counter-clockwise in a y-up frame (clockwise on screen).
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let (a, b) = (points[i], points[(i + 1) % n]);
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2.0
}

pub fn area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// Closed perimeter length.
pub fn perimeter(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 2 {
        return 0.0;
    }
    (0..n).map(|i| points[i].distance(points[(i + 1) % n])).sum()
}

/// Area centroid, or the vertex mean for degenerate (zero-area) rings.
pub fn centroid(points: &[Point]) -> Point {
    let n = points.len();
    if n == 0 {
        return Point::ZERO;
    }
    let a = signed_area(points);
    if a.abs() < 1e-9 {
        let (sx, sy) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Point::new(sx / n as f64, sy / n as f64);
    }
    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let (p, q) = (points[i], points[(i + 1) % n]);
        let cross = p.x * q.y - q.x * p.y;
        cx += (p.x + q.x) * cross;
        cy += (p.y + q.y) * cross;
    }
    Point::new(cx / (6.0 * a), cy / (6.0 * a))
}

/// Drop consecutive duplicate vertices (including last == first).
pub fn dedup_ring(points: &[Point]) -> Vec<Point> {
    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for &p in points {
        if out.last() != Some(&p) {
            out.push(p);
        }
    }
    while out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

/// Whether the closed ring has at least three distinct vertices and no
/// two edges touch except adjacent edges at their shared vertex.
pub fn is_simple(points: &[Point]) -> bool {
    let ring = dedup_ring(points);
    let n = ring.len();
    if n < 3 || area(&ring) < 1e-9 {
        return false;
    }
    let edge = |i: usize| {
        let (a, b) = (ring[i], ring[(i + 1) % n]);
        Line::new(Coord { x: a.x, y: a.y }, Coord { x: b.x, y: b.y })
    };
    for i in 0..n {
        for j in i + 1..n {
            let adjacent = j == i + 1 || (i == 0 && j == n - 1);
            match line_intersection(edge(i), edge(j)) {
                None => {}
                Some(LineIntersection::SinglePoint { .. }) if adjacent => {}
                Some(_) => return false,
            }
        }
    }
    true
}

/// Closed line path through `points` (empty for fewer than two points).
pub fn ring_path(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    if points.len() < 2 {
        return path;
    }
    path.move_to(points[0]);
    for &p in &points[1..] {
        path.line_to(p);
    }
    path.close_path();
    path
}
