//! Two-stop linear gradient fitting.
//!
//! A gradient and its 180°-rotated twin are the same fill with the stops
//! swapped, so candidate axes only sweep a half-turn.

use image::RgbImage;
use kurbo::{Point, Vec2};

use crate::color::{round_f64, to_f64, Rgb};
use crate::config::GradientConfig;

/// Linear gradient in image coordinates: `start_color` at `start`,
/// `end_color` at `end`, clamped beyond either end.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub start: Point,
    pub end: Point,
    pub start_color: Rgb,
    pub end_color: Rgb,
    /// Coefficient of determination of the fit, all channels pooled.
    pub r2: f64,
}

impl Gradient {
    /// Interpolated colour at pixel `(x, y)`, or `None` for a degenerate axis.
    pub fn color_at(&self, x: f64, y: f64) -> Option<[f64; 3]> {
        let axis = self.end - self.start;
        let len_sq = axis.hypot2();
        if len_sq < 1.0 {
            return None;
        }
        let t = ((Point::new(x, y) - self.start).dot(axis) / len_sq).clamp(0.0, 1.0);
        let (a, b) = (to_f64(self.start_color), to_f64(self.end_color));
        Some([
            a[0] + t * (b[0] - a[0]),
            a[1] + t * (b[1] - a[1]),
            a[2] + t * (b[2] - a[2]),
        ])
    }
}

fn sq_err(actual: Rgb, predicted: [f64; 3]) -> f64 {
    let a = to_f64(actual);
    (0..3).map(|c| (a[c] - predicted[c]).powi(2)).sum()
}

/// Mean (over pixels) summed squared channel error of a solid fill.
pub fn solid_mse(rgb: &RgbImage, pixels: &[(u32, u32)], color: Rgb) -> f64 {
    if pixels.is_empty() {
        return 0.0;
    }
    let c = to_f64(color);
    pixels.iter().map(|&(x, y)| sq_err(rgb.get_pixel(x, y).0, c)).sum::<f64>() / pixels.len() as f64
}

/// Same error measure for a gradient fill.
pub fn gradient_mse(rgb: &RgbImage, pixels: &[(u32, u32)], gradient: &Gradient) -> Option<f64> {
    if pixels.is_empty() {
        return None;
    }
    let mut total = 0.0;
    for &(x, y) in pixels {
        total += sq_err(rgb.get_pixel(x, y).0, gradient.color_at(x as f64, y as f64)?);
    }
    Some(total / pixels.len() as f64)
}

/// Keep `gradient` only if it cuts the solid-fill error below
/// `improvement_ratio` of its value.
pub fn verify_gradient_improvement(
    rgb: &RgbImage,
    pixels: &[(u32, u32)],
    solid: Rgb,
    gradient: Gradient,
    improvement_ratio: f64,
) -> Option<Gradient> {
    if pixels.len() < 10 {
        return None;
    }
    let mse_solid = solid_mse(rgb, pixels, solid);
    let mse_gradient = gradient_mse(rgb, pixels, &gradient)?;
    (mse_gradient < mse_solid * improvement_ratio).then_some(gradient)
}

/// Best-R² linear gradient over the given pixels, if the region really
/// varies and some axis explains that variation.
pub fn fit_gradient(rgb: &RgbImage, pixels: &[(u32, u32)], config: &GradientConfig) -> Option<Gradient> {
    let n = pixels.len();
    if n < config.min_pixels.max(2) {
        return None;
    }
    let colors: Vec<[f64; 3]> = pixels.iter().map(|&(x, y)| to_f64(rgb.get_pixel(x, y).0)).collect();
    let nf = n as f64;
    let mut mean = [0.0; 3];
    for c in &colors {
        for ch in 0..3 {
            mean[ch] += c[ch] / nf;
        }
    }
    let ss_tot: Vec<f64> = (0..3)
        .map(|ch| colors.iter().map(|c| (c[ch] - mean[ch]).powi(2)).sum())
        .collect();
    let max_std = ss_tot.iter().map(|ss| (ss / nf).sqrt()).fold(0.0, f64::max);
    if max_std < config.noise_floor {
        return None;
    }

    let centre = pixels
        .iter()
        .fold(Vec2::ZERO, |acc, &(x, y)| acc + Vec2::new(x as f64, y as f64))
        / nf;
    let step = config.angle_step_deg.max(1);

    let mut best: Option<Gradient> = None;
    for deg in (0..180).step_by(step) {
        let theta = (deg as f64).to_radians();
        let dir = Vec2::new(theta.cos(), theta.sin());
        let proj: Vec<f64> = pixels
            .iter()
            .map(|&(x, y)| (Vec2::new(x as f64, y as f64) - centre).dot(dir))
            .collect();
        let (lo, hi) = proj
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)));
        let span = hi - lo;
        if span < config.min_span {
            continue;
        }
        let t: Vec<f64> = proj.iter().map(|p| (p - lo) / span).collect();
        let t_mean = t.iter().sum::<f64>() / nf;
        let t_var: f64 = t.iter().map(|v| (v - t_mean).powi(2)).sum();

        let (mut total, mut residual) = (0.0, 0.0);
        let (mut start, mut end) = ([0.0; 3], [0.0; 3]);
        for ch in 0..3 {
            if ss_tot[ch] < 1.0 {
                start[ch] = mean[ch];
                end[ch] = mean[ch];
                continue;
            }
            let cov: f64 = t
                .iter()
                .zip(&colors)
                .map(|(tv, c)| (tv - t_mean) * (c[ch] - mean[ch]))
                .sum();
            let slope = cov / (t_var + 1e-10);
            let intercept = mean[ch] - slope * t_mean;
            let ss_res: f64 = t
                .iter()
                .zip(&colors)
                .map(|(tv, c)| (c[ch] - (intercept + slope * tv)).powi(2))
                .sum();
            total += ss_tot[ch];
            residual += ss_res;
            start[ch] = intercept.clamp(0.0, 255.0);
            end[ch] = (intercept + slope).clamp(0.0, 255.0);
        }
        if total < 1.0 {
            continue;
        }
        let r2 = 1.0 - residual / total;
        let range = crate::color::distance3(&start, &end);
        let better = best.as_ref().map_or(true, |b| r2 > b.r2);
        if better && r2 > config.min_r2 && range > config.min_color_range {
            let origin = Point::new(centre.x, centre.y);
            best = Some(Gradient {
                start: origin + dir * lo,
                end: origin + dir * hi,
                start_color: round_f64(start),
                end_color: round_f64(end),
                r2,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(w: u32, h: u32) -> Vec<(u32, u32)> {
        (0..h).flat_map(|y| (0..w).map(move |x| (x, y))).collect()
    }

    fn ramp(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            let v = (x as f64 * 255.0 / (w - 1) as f64).round() as u8;
            image::Rgb([v, v, v])
        })
    }

    #[test]
    fn ramp_fits_black_to_white() {
        let img = ramp(64, 8);
        let g = fit_gradient(&img, &block(64, 8), &GradientConfig::default()).unwrap();
        assert!(g.r2 > 0.95);
        for ch in 0..3 {
            assert!(g.start_color[ch] <= 3);
            assert!(g.end_color[ch] >= 252);
        }
        assert!((g.start.x - 0.0).abs() < 1e-6);
        assert!((g.end.x - 63.0).abs() < 1e-6);
        // Endpoints reproduce the ramp.
        let mid = g.color_at(31.5, 4.0).unwrap();
        assert!((mid[0] - 127.5).abs() < 3.0);
    }

    #[test]
    fn solid_region_has_no_gradient() {
        let img = RgbImage::from_pixel(30, 30, image::Rgb([120, 40, 200]));
        assert!(fit_gradient(&img, &block(30, 30), &GradientConfig::default()).is_none());
    }

    #[test]
    fn tiny_region_has_no_gradient() {
        let img = ramp(64, 8);
        assert!(fit_gradient(&img, &block(4, 4), &GradientConfig::default()).is_none());
    }

    #[test]
    fn constant_channel_keeps_its_value() {
        let img = RgbImage::from_fn(40, 10, |x, _| image::Rgb([(x * 6) as u8, 90, 0]));
        let g = fit_gradient(&img, &block(40, 10), &GradientConfig::default()).unwrap();
        assert_eq!(g.start_color[1], 90);
        assert_eq!(g.end_color[1], 90);
    }

    #[test]
    fn verification_is_monotonic() {
        let img = ramp(64, 8);
        let pixels = block(64, 8);
        let fitted = fit_gradient(&img, &pixels, &GradientConfig::default()).unwrap();
        // Progressively worse gradients: shrink the colour span.
        for k in 0..8u8 {
            let g = Gradient {
                start_color: [k * 16, k * 16, k * 16],
                end_color: [255 - k * 16, 255 - k * 16, 255 - k * 16],
                ..fitted.clone()
            };
            for solid in [[0u8, 0, 0], [128, 128, 128], [255, 255, 255]] {
                let mse_solid = solid_mse(&img, &pixels, solid);
                if let Some(kept) = verify_gradient_improvement(&img, &pixels, solid, g.clone(), 0.85) {
                    let mse_grad = gradient_mse(&img, &pixels, &kept).unwrap();
                    assert!(mse_grad <= 0.85 * mse_solid);
                }
            }
        }
        assert!(verify_gradient_improvement(&img, &pixels, [128, 128, 128], fitted, 0.85).is_some());
    }
}
