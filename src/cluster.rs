//! Colour clustering collaborator and a deterministic k-means.
//!
//! Used for the two-way split of high-error regions and for palette
//! quantization. Seeding is max-min (farthest point), so runs are
//! reproducible without a random source.

use rayon::prelude::*;

use crate::color::distance3;

/// Clustering of colour vectors.
///
/// Implementations may return fewer than `k` centers when the input has
/// fewer distinct colours; every assignment indexes into `centers`.
pub trait ColorClusterer {
    fn cluster(&self, colors: &[[f64; 3]], k: usize) -> Clustering;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Center index per input colour, same order as the input.
    pub assignments: Vec<usize>,
    pub centers: Vec<[f64; 3]>,
}

impl Clustering {
    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    /// Number of inputs assigned to each center.
    pub fn sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.centers.len()];
        for &a in &self.assignments {
            sizes[a] += 1;
        }
        sizes
    }
}

/// Lloyd's algorithm with farthest-point seeding.
#[derive(Debug, Clone)]
pub struct KMeans {
    pub max_iterations: usize,
    /// Stop once no center moves farther than this.
    pub tolerance: f64,
    /// Fit on at most this many evenly strided samples, then assign all.
    pub sample_limit: usize,
}

impl Default for KMeans {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 0.5,
            sample_limit: 20_000,
        }
    }
}

fn squared(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest(color: &[f64; 3], centers: &[[f64; 3]]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centers.iter().enumerate() {
        let d = squared(color, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    best.0
}

fn assign(colors: &[[f64; 3]], centers: &[[f64; 3]]) -> Vec<usize> {
    colors.par_iter().map(|c| nearest(c, centers)).collect()
}

/// First seed is the sample nearest the mean; each further seed is the
/// sample farthest from every seed so far. Stops early when all samples
/// coincide with a seed.
fn seed(samples: &[[f64; 3]], k: usize) -> Vec<[f64; 3]> {
    let n = samples.len() as f64;
    let mut mean = [0.0; 3];
    for s in samples {
        for c in 0..3 {
            mean[c] += s[c] / n;
        }
    }
    let first = samples[nearest(&mean, samples)];
    let mut centers = vec![first];
    let mut dist: Vec<f64> = samples.iter().map(|s| squared(s, &first)).collect();
    while centers.len() < k {
        let (idx, far) = dist
            .iter()
            .enumerate()
            .fold((0, 0.0), |best, (i, &d)| if d > best.1 { (i, d) } else { best });
        if far <= 0.0 {
            break;
        }
        let next = samples[idx];
        centers.push(next);
        for (d, s) in dist.iter_mut().zip(samples) {
            *d = d.min(squared(s, &next));
        }
    }
    centers
}

impl ColorClusterer for KMeans {
    fn cluster(&self, colors: &[[f64; 3]], k: usize) -> Clustering {
        if colors.is_empty() || k == 0 {
            return Clustering {
                assignments: Vec::new(),
                centers: Vec::new(),
            };
        }

        let stride = colors.len().div_ceil(self.sample_limit.max(1));
        let samples: Vec<[f64; 3]> = colors.iter().step_by(stride.max(1)).copied().collect();
        let mut centers = seed(&samples, k);

        for _ in 0..self.max_iterations {
            let labels = assign(&samples, &centers);
            let mut sums = vec![[0.0; 3]; centers.len()];
            let mut counts = vec![0usize; centers.len()];
            for (s, &l) in samples.iter().zip(&labels) {
                for c in 0..3 {
                    sums[l][c] += s[c];
                }
                counts[l] += 1;
            }
            let mut shift: f64 = 0.0;
            for ((center, sum), &count) in centers.iter_mut().zip(&sums).zip(&counts) {
                // Empty clusters keep their previous center.
                if count == 0 {
                    continue;
                }
                let moved = [sum[0] / count as f64, sum[1] / count as f64, sum[2] / count as f64];
                shift = shift.max(distance3(center, &moved));
                *center = moved;
            }
            if shift < self.tolerance {
                break;
            }
        }

        // Drop centers nothing was assigned to and renumber.
        let assignments = assign(colors, &centers);
        let mut used = vec![false; centers.len()];
        for &a in &assignments {
            used[a] = true;
        }
        let mut remap = vec![0; centers.len()];
        let mut kept = Vec::new();
        for (i, c) in centers.into_iter().enumerate() {
            if used[i] {
                remap[i] = kept.len();
                kept.push(c);
            }
        }
        Clustering {
            assignments: assignments.into_iter().map(|a| remap[a]).collect(),
            centers: kept,
        }
    }
}
