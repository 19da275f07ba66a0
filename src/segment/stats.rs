use std::collections::BTreeSet;

use super::labels::LabelMap;
use crate::bitmap::SourceImage;
use crate::color::LabColor;

/// Colour statistics of one region.
///
/// Filled from pixels once, then updated in place by weighted averaging
/// while regions merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionStats {
    pub mean_rgb: [f64; 3],
    pub mean_lab: LabColor,
    /// Mean alpha, 0-255.
    pub mean_alpha: f64,
    pub count: usize,
}

impl RegionStats {
    pub fn empty() -> Self {
        Self {
            mean_rgb: [0.0; 3],
            mean_lab: [0.0; 3],
            mean_alpha: 0.0,
            count: 0,
        }
    }

    /// L* of the mean LAB colour.
    pub fn brightness(&self) -> f64 {
        self.mean_lab[0]
    }

    /// Fold `other` into `self` as a pixel-count-weighted average.
    pub fn absorb(&mut self, other: &RegionStats) {
        let total = self.count + other.count;
        if total > 0 {
            let wa = self.count as f64 / total as f64;
            let wb = other.count as f64 / total as f64;
            for c in 0..3 {
                self.mean_rgb[c] = self.mean_rgb[c] * wa + other.mean_rgb[c] * wb;
                self.mean_lab[c] = self.mean_lab[c] * wa + other.mean_lab[c] * wb;
            }
            self.mean_alpha = self.mean_alpha * wa + other.mean_alpha * wb;
        }
        self.count = total;
    }
}

/// Per-region means over the labelled pixels. `lab` is the row-major
/// LAB plane of `source`.
pub fn compute(labels: &LabelMap, count: usize, source: &SourceImage, lab: &[LabColor]) -> Vec<RegionStats> {
    let (w, h) = labels.dimensions();
    let mut sums = vec![([0.0f64; 3], [0.0f64; 3], 0.0f64, 0usize); count];
    for y in 0..h {
        for x in 0..w {
            let Some(id) = labels.get(x, y) else {
                continue;
            };
            let Some(s) = sums.get_mut(id as usize) else {
                continue;
            };
            let rgb = source.color(x, y);
            let l = &lab[(y * w + x) as usize];
            for c in 0..3 {
                s.0[c] += rgb[c] as f64;
                s.1[c] += l[c];
            }
            s.2 += source.alpha_at(x, y) as f64;
            s.3 += 1;
        }
    }
    sums.into_iter()
        .map(|(rgb, lab, alpha, n)| {
            if n == 0 {
                return RegionStats::empty();
            }
            let k = n as f64;
            RegionStats {
                mean_rgb: [rgb[0] / k, rgb[1] / k, rgb[2] / k],
                mean_lab: [lab[0] / k, lab[1] / k, lab[2] / k],
                mean_alpha: alpha / k,
                count: n,
            }
        })
        .collect()
}

/// Symmetric 4-connected adjacency between labelled regions.
pub fn adjacency(labels: &LabelMap, count: usize) -> Vec<BTreeSet<u32>> {
    let (w, h) = labels.dimensions();
    let mut adj = vec![BTreeSet::new(); count];
    let mut link = |a: Option<u32>, b: Option<u32>| {
        if let (Some(a), Some(b)) = (a, b) {
            if a != b && (a as usize) < count && (b as usize) < count {
                adj[a as usize].insert(b);
                adj[b as usize].insert(a);
            }
        }
    };
    for y in 0..h {
        for x in 0..w {
            let here = labels.get(x, y);
            if x + 1 < w {
                link(here, labels.get(x + 1, y));
            }
            if y + 1 < h {
                link(here, labels.get(x, y + 1));
            }
        }
    }
    adj
}
