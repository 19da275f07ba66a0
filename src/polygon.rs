//! The mutable vector state: polygons plus the outline table.

use std::borrow::Cow;

use kurbo::Point;

use crate::color::Rgb;
use crate::gradient::Gradient;
use crate::mask::{RegionMask, DEFAULT_PAD};
use crate::segment::RegionIndex;
use crate::stroke::StrokeTable;

/// Fill description. `color` is always the sampled solid colour; a
/// gradient, when present, is what gets painted.
#[derive(Debug, Clone, PartialEq)]
pub struct Paint {
    pub color: Rgb,
    pub gradient: Option<Gradient>,
}

impl Paint {
    pub fn solid(color: Rgb) -> Self {
        Self { color, gradient: None }
    }

    pub fn is_gradient(&self) -> bool {
        self.gradient.is_some()
    }
}

/// A closed, simple polygon in image coordinates.
#[derive(Debug, Clone)]
pub struct Polygon {
    pub points: Vec<Point>,
    pub paint: Paint,
    /// 0-1.
    pub opacity: f64,
    /// Merged region this polygon was traced from. Split children share
    /// their parent's id.
    pub region_id: u32,
    /// Pixels of a split child's colour cluster; `None` for polygons that
    /// cover their whole region.
    pub part: Option<RegionMask>,
    pub area: f64,
    pub centroid: Point,
    /// L* of the fill, used to break area ties in paint order.
    pub brightness: f64,
}

impl Polygon {
    /// The pixels this polygon is meant to reproduce.
    pub fn pixel_mask<'a>(&'a self, index: &RegionIndex) -> Option<Cow<'a, RegionMask>> {
        match &self.part {
            Some(mask) => Some(Cow::Borrowed(mask)),
            None => index.mask(self.region_id, DEFAULT_PAD).map(Cow::Owned),
        }
    }
}

/// Everything refinement is allowed to change.
#[derive(Debug, Clone, Default)]
pub struct VectorState {
    pub polygons: Vec<Polygon>,
    pub strokes: StrokeTable,
}

impl VectorState {
    pub fn gradient_count(&self) -> usize {
        self.polygons.iter().filter(|p| p.paint.is_gradient()).count()
    }

    /// Capture fills and stroke widths. Geometry is not captured: it only
    /// changes before the first snapshot is taken.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            paints: self.polygons.iter().map(|p| p.paint.clone()).collect(),
            stroke_widths: self.strokes.iter().map(|(&rid, s)| (rid, s.width)).collect(),
        }
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        for (poly, paint) in self.polygons.iter_mut().zip(&snapshot.paints) {
            poly.paint = paint.clone();
        }
        for &(rid, width) in &snapshot.stroke_widths {
            if let Some(record) = self.strokes.get_mut(&rid) {
                record.width = width;
            }
        }
    }
}

/// Immutable copy of the refinable part of a [`VectorState`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    paints: Vec<Paint>,
    stroke_widths: Vec<(u32, f64)>,
}
