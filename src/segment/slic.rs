//! Mask-aware SLIC superpixels.
//!
//! Clusters foreground pixels in (L*, a*, b*, x, y) space with the
//! compactness-weighted distance `dc² + (m/S)²·ds²`. Seeds sit on a
//! regular grid of step `S` (moved to the lowest-gradient pixel of their
//! 3×3 neighbourhood) and each seed only searches a 2S×2S window.
//! Iterations assign a rotating subset of rows, FastSLIC style; one full
//! pass follows before connectivity is enforced.

use std::collections::VecDeque;

use image::{GrayImage, RgbImage};

use super::labels::{LabelMap, BACKGROUND};
use super::SuperpixelOracle;
use crate::color::{lab_image, LabColor};
use crate::config::SegmentConfig;

#[derive(Debug, Clone)]
pub struct Slic {
    pub compactness: f64,
    pub max_iterations: usize,
    pub min_size_factor: f64,
    pub subsample_stride: usize,
}

impl Default for Slic {
    fn default() -> Self {
        Self::from_config(&SegmentConfig::default())
    }
}

impl Slic {
    pub fn from_config(config: &SegmentConfig) -> Self {
        Self {
            compactness: config.compactness,
            max_iterations: config.max_iterations,
            min_size_factor: config.min_size_factor,
            subsample_stride: config.subsample_stride,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Center {
    lab: LabColor,
    x: f64,
    y: f64,
}

/// Foreground plane in LAB with its mask, row-major.
struct Plane<'a> {
    lab: &'a [LabColor],
    fg: &'a [bool],
    w: usize,
    h: usize,
}

/// Cluster centres plus the per-pixel assignment state.
struct Clusters {
    centers: Vec<Center>,
    step: f64,
    labels: Vec<u32>,
    distances: Vec<f64>,
}

impl Clusters {
    fn initialize(plane: &Plane, fg_count: usize, target_regions: usize) -> Self {
        let step = (fg_count as f64 / target_regions as f64).sqrt().max(1.0);
        let mut centers = seed_centers(plane, step);
        if centers.is_empty() {
            // Foreground too sparse for the grid: one seed on the first pixel.
            if let Some(i) = plane.fg.iter().position(|&f| f) {
                centers.push(Center {
                    lab: plane.lab[i],
                    x: (i % plane.w) as f64,
                    y: (i / plane.w) as f64,
                });
            }
        }
        Self {
            centers,
            step,
            labels: vec![BACKGROUND; plane.w * plane.h],
            distances: vec![f64::INFINITY; plane.w * plane.h],
        }
    }

    /// Assign pixels on rows with `y % stride == offset` to their nearest
    /// centre within its search window.
    fn assign(&mut self, plane: &Plane, spatial_weight: f64, stride: usize, offset: usize) {
        self.distances.fill(f64::INFINITY);
        let (wu, hu, step) = (plane.w, plane.h, self.step);
        for (k, c) in self.centers.iter().enumerate() {
            let x_min = (c.x - 2.0 * step).max(0.0) as usize;
            let x_max = ((c.x + 2.0 * step) as usize).min(wu - 1);
            let y_min = (c.y - 2.0 * step).max(0.0) as usize;
            let y_max = ((c.y + 2.0 * step) as usize).min(hu - 1);
            for y in (y_min..=y_max).filter(|y| y % stride == offset) {
                for x in x_min..=x_max {
                    let i = y * wu + x;
                    if !plane.fg[i] {
                        continue;
                    }
                    let l = &plane.lab[i];
                    let dc = (l[0] - c.lab[0]).powi(2) + (l[1] - c.lab[1]).powi(2) + (l[2] - c.lab[2]).powi(2);
                    let ds = (x as f64 - c.x).powi(2) + (y as f64 - c.y).powi(2);
                    let d = dc + ds * spatial_weight;
                    if d < self.distances[i] {
                        self.distances[i] = d;
                        self.labels[i] = k as u32;
                    }
                }
            }
        }
    }

    /// Move every centre to the mean of its pixels. Returns the largest
    /// spatial shift.
    fn update(&mut self, plane: &Plane) -> f64 {
        let mut sums = vec![([0.0f64; 3], 0.0f64, 0.0f64, 0usize); self.centers.len()];
        for (i, &k) in self.labels.iter().enumerate() {
            let Some(s) = sums.get_mut(k as usize) else {
                continue;
            };
            for ch in 0..3 {
                s.0[ch] += plane.lab[i][ch];
            }
            s.1 += (i % plane.w) as f64;
            s.2 += (i / plane.w) as f64;
            s.3 += 1;
        }
        let mut max_shift: f64 = 0.0;
        for (c, (lab_sum, sx, sy, n)) in self.centers.iter_mut().zip(sums) {
            if n == 0 {
                continue;
            }
            let n = n as f64;
            let (nx, ny) = (sx / n, sy / n);
            max_shift = max_shift.max(((c.x - nx).powi(2) + (c.y - ny).powi(2)).sqrt());
            c.lab = [lab_sum[0] / n, lab_sum[1] / n, lab_sum[2] / n];
            c.x = nx;
            c.y = ny;
        }
        max_shift
    }
}

impl SuperpixelOracle for Slic {
    fn segment(&self, image: &RgbImage, foreground: &GrayImage, target_regions: usize) -> LabelMap {
        let (w, h) = image.dimensions();
        let fg: Vec<bool> = foreground.pixels().map(|p| p.0[0] > 0).collect();
        let fg_count = fg.iter().filter(|&&f| f).count();
        if fg_count == 0 || target_regions == 0 {
            return LabelMap::new(w, h);
        }
        let lab = lab_image(image);
        let plane = Plane {
            lab: &lab,
            fg: &fg,
            w: w as usize,
            h: h as usize,
        };

        let mut clusters = Clusters::initialize(&plane, fg_count, target_regions);
        let spatial_weight = (self.compactness / clusters.step).powi(2);
        let stride = self.subsample_stride.max(1);
        for iteration in 0..self.max_iterations {
            clusters.assign(&plane, spatial_weight, stride, iteration % stride);
            if clusters.update(&plane) < 0.5 && iteration + 1 >= stride {
                break;
            }
        }
        clusters.assign(&plane, spatial_weight, 1, 0);

        let mean_size = fg_count as f64 / clusters.centers.len() as f64;
        let min_size = ((mean_size * self.min_size_factor) as usize).max(1);
        let data = enforce_connectivity(&clusters.labels, &fg, plane.w, plane.h, min_size);
        LabelMap::from_raw(w, h, data).unwrap_or_else(|| LabelMap::new(w, h))
    }
}

fn seed_centers(plane: &Plane, step: f64) -> Vec<Center> {
    let Plane { lab, fg, w, h } = *plane;
    let grad = |x: usize, y: usize| -> f64 {
        let at = |x: usize, y: usize| &lab[y * w + x];
        let (xl, xr) = (x.saturating_sub(1), (x + 1).min(w - 1));
        let (yu, yd) = (y.saturating_sub(1), (y + 1).min(h - 1));
        let dx: f64 = (0..3).map(|c| (at(xr, y)[c] - at(xl, y)[c]).powi(2)).sum();
        let dy: f64 = (0..3).map(|c| (at(x, yd)[c] - at(x, yu)[c]).powi(2)).sum();
        dx + dy
    };

    let mut centers = Vec::new();
    let mut gy = step / 2.0;
    while (gy as usize) < h {
        let mut gx = step / 2.0;
        while (gx as usize) < w {
            let (cx, cy) = (gx as usize, gy as usize);
            let mut best: Option<(f64, usize, usize)> = None;
            for y in cy.saturating_sub(1)..=(cy + 1).min(h - 1) {
                for x in cx.saturating_sub(1)..=(cx + 1).min(w - 1) {
                    if !fg[y * w + x] {
                        continue;
                    }
                    let g = grad(x, y);
                    if best.map_or(true, |(bg, _, _)| g < bg) {
                        best = Some((g, x, y));
                    }
                }
            }
            if let Some((_, x, y)) = best {
                centers.push(Center {
                    lab: lab[y * w + x],
                    x: x as f64,
                    y: y as f64,
                });
            }
            gx += step;
        }
        gy += step;
    }
    centers
}

/// Relabel 4-connected components; fragments below `min_size` join an
/// already-labelled neighbour.
fn enforce_connectivity(labels: &[u32], fg: &[bool], w: usize, h: usize, min_size: usize) -> Vec<u32> {
    let mut out = vec![BACKGROUND; w * h];
    let mut visited = vec![false; w * h];
    let mut next = 0u32;
    let mut queue = VecDeque::new();
    let mut component = Vec::new();

    for start in 0..w * h {
        if !fg[start] || visited[start] {
            continue;
        }
        let label = labels[start];
        let mut adjacent: Option<u32> = None;
        component.clear();
        visited[start] = true;
        queue.push_back(start);
        while let Some(i) = queue.pop_front() {
            component.push(i);
            let (x, y) = (i % w, i / w);
            let mut neighbours = [None; 4];
            if x > 0 {
                neighbours[0] = Some(i - 1);
            }
            if x + 1 < w {
                neighbours[1] = Some(i + 1);
            }
            if y > 0 {
                neighbours[2] = Some(i - w);
            }
            if y + 1 < h {
                neighbours[3] = Some(i + w);
            }
            for n in neighbours.into_iter().flatten() {
                if !fg[n] {
                    continue;
                }
                if out[n] != BACKGROUND {
                    adjacent = Some(out[n]);
                } else if !visited[n] && labels[n] == label {
                    visited[n] = true;
                    queue.push_back(n);
                }
            }
        }
        let id = match adjacent {
            Some(a) if component.len() < min_size => a,
            _ => {
                next += 1;
                next - 1
            }
        };
        for &i in &component {
            out[i] = id;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn two_tone(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            if x < w / 2 {
                image::Rgb([220, 30, 30])
            } else {
                image::Rgb([30, 30, 220])
            }
        })
    }

    #[test]
    fn superpixels_respect_color_boundary() {
        let img = two_tone(40, 40);
        let fg = GrayImage::from_pixel(40, 40, Luma([255]));
        let labels = Slic::default().segment(&img, &fg, 16);
        let mut left = std::collections::BTreeSet::new();
        let mut right = std::collections::BTreeSet::new();
        for y in 0..40 {
            for x in 0..40 {
                let id = labels.get(x, y).unwrap();
                if x < 20 {
                    left.insert(id);
                } else {
                    right.insert(id);
                }
            }
        }
        assert!(left.is_disjoint(&right));
        assert!(labels.id_bound() >= 4);
    }

    #[test]
    fn strided_iterations_still_label_every_pixel() {
        let img = two_tone(30, 30);
        let fg = GrayImage::from_pixel(30, 30, Luma([255]));
        for (stride, iterations) in [(1, 10), (5, 1), (5, 10)] {
            let slic = Slic {
                subsample_stride: stride,
                max_iterations: iterations,
                ..Slic::default()
            };
            let labels = slic.segment(&img, &fg, 9);
            for y in 0..30 {
                for x in 0..30 {
                    assert!(labels.get(x, y).is_some(), "stride {stride}: ({x}, {y})");
                }
            }
            assert_ne!(labels.get(0, 0), labels.get(29, 0));
        }
    }

    #[test]
    fn background_stays_unlabelled() {
        let img = two_tone(20, 20);
        let fg = GrayImage::from_fn(20, 20, |x, _| Luma([if x < 10 { 255 } else { 0 }]));
        let labels = Slic::default().segment(&img, &fg, 4);
        assert!(labels.get(15, 5).is_none());
        assert!(labels.get(5, 5).is_some());
    }

    #[test]
    fn empty_foreground_gives_empty_map() {
        let img = two_tone(8, 8);
        let fg = GrayImage::new(8, 8);
        let labels = Slic::default().segment(&img, &fg, 10);
        assert_eq!(labels.id_bound(), 0);
    }

    #[test]
    fn fragments_join_neighbours() {
        // Label 1 has a stray single pixel inside label 0's area.
        let w = 6;
        let mut labels = vec![0u32; 36];
        for i in 18..36 {
            labels[i] = 1;
        }
        labels[2] = 1;
        let fg = vec![true; 36];
        let out = enforce_connectivity(&labels, &fg, w, 6, 3);
        assert_eq!(out[2], out[0]);
        assert_ne!(out[0], out[35]);
    }
}
