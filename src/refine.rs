//! Render-driven refinement.
//!
//! Phases, strictly in order:
//! 1. Direct optimisation: fills set to the robust mean of interior pixels
//! 2. One render, then a one-time two-way colour split of high-error regions
//! 3. Hill climbing: render, keep the best state seen, roll back on
//!    regression, upgrade high-error solid fills to gradients
//!
//! The state returned is never worse than the best render observed.

use std::time::Instant;

use image::{GrayImage, RgbImage};
use log::{debug, info, warn};

use crate::bitmap::{rgb_of, SourceImage};
use crate::cluster::ColorClusterer;
use crate::color::{distance3, robust_mean, to_f64};
use crate::config::VectorizeConfig;
use crate::error::VectorizeError;
use crate::eval::{per_polygon_error, ErrorRecord, QualityReport};
use crate::extract::{polygon_from_mask, trace_shape};
use crate::gradient::{fit_gradient, verify_gradient_improvement};
use crate::mask::{RegionMask, DEFAULT_PAD};
use crate::polygon::{Polygon, Snapshot, VectorState};
use crate::render::Rasterizer;
use crate::segment::RegionIndex;
use crate::stroke::nudge_stroke_widths;
use crate::svg::polygons_to_svg;

/// Regions smaller than this are never split.
const SPLIT_MIN_REGION_PIXELS: usize = 100;
/// Colour clusters (and their traced contours) smaller than this are dropped.
const SPLIT_MIN_PART: usize = 30;
const UPGRADE_MIN_PIXELS: usize = 50;
/// Gradients are only refit from interiors larger than this.
const REFIT_MIN_PIXELS: usize = 50;

/// Set every fill to the robust mean of its interior pixels and refit
/// existing gradients from the same pixels.
///
/// No render is needed, and a second call with nothing changed in between
/// is a no-op. Returns how many solid colours changed.
pub fn direct_optimize_colors(
    polygons: &mut [Polygon],
    source: &SourceImage,
    index: &RegionIndex,
    config: &VectorizeConfig,
) -> usize {
    let mut updated = 0;
    for poly in polygons.iter_mut() {
        let Some(mask) = poly.pixel_mask(index) else {
            continue;
        };
        let interior = mask.interior(&[(3, 10), (1, 5)]).pixels();
        if interior.len() < 5 {
            continue;
        }
        let colors: Vec<_> = interior.iter().map(|&(x, y)| source.color(x, y)).collect();
        let Some(optimal) = robust_mean(&colors) else {
            continue;
        };
        if optimal != poly.paint.color {
            poly.paint.color = optimal;
            updated += 1;
        }

        if poly.paint.is_gradient() && interior.len() > REFIT_MIN_PIXELS {
            let refit = fit_gradient(&source.rgb, &interior, &config.gradient).and_then(|g| {
                verify_gradient_improvement(&source.rgb, &interior, optimal, g, config.gradient.improvement_ratio)
            });
            if let Some(g) = refit {
                poly.paint.gradient = Some(g);
            }
        }
    }
    updated
}

/// Split a polygon's pixels into two colour clusters and trace each.
///
/// Returns `None` unless the clusters are clearly different colours and at
/// least two children survive tracing. Children keep the parent's region
/// id and carry their cluster's pixels for later error measurement.
pub fn split_high_error_polygon(
    poly: &Polygon,
    source: &SourceImage,
    index: &RegionIndex,
    config: &VectorizeConfig,
    clusterer: &dyn ColorClusterer,
) -> Option<Vec<Polygon>> {
    let pixels = poly.pixel_mask(index)?.pixels();
    if pixels.len() < SPLIT_MIN_REGION_PIXELS {
        return None;
    }
    let colors: Vec<[f64; 3]> = pixels.iter().map(|&(x, y)| to_f64(source.color(x, y))).collect();
    let clustering = clusterer.cluster(&colors, 2);
    if clustering.centers.len() < 2 {
        return None;
    }
    let separation = distance3(&clustering.centers[0], &clustering.centers[1]);
    if separation < config.refine.split_min_color_distance {
        debug!("region {}: clusters {:.1} apart, not splitting", poly.region_id, separation);
        return None;
    }

    let (w, h) = source.dimensions();
    let mut children = Vec::new();
    for k in 0..2 {
        let members: Vec<(u32, u32)> = pixels
            .iter()
            .zip(&clustering.assignments)
            .filter(|(_, &a)| a == k)
            .map(|(&p, _)| p)
            .collect();
        if members.len() < SPLIT_MIN_PART {
            continue;
        }
        let Some(part) = RegionMask::from_pixels(&members, DEFAULT_PAD, w, h) else {
            continue;
        };
        let cleaned = part.close(2).dilate(1);
        let sigma = |area: f64| if area < 200.0 { 1.0 } else { 1.5 };
        let Some(shape) = trace_shape(&cleaned, SPLIT_MIN_PART as f64, false, sigma) else {
            continue;
        };
        if let Some(mut child) = polygon_from_mask(source, &cleaned, shape, poly.region_id, None, config) {
            child.part = Some(part);
            children.push(child);
        }
    }
    (children.len() >= 2).then_some(children)
}

/// Upgrade a solid fill with high measured error to a verified gradient.
pub fn try_upgrade_to_gradient(
    poly: &mut Polygon,
    error: &ErrorRecord,
    source: &SourceImage,
    index: &RegionIndex,
    config: &VectorizeConfig,
) -> bool {
    if poly.paint.is_gradient() || error.mse < config.refine.upgrade_mse {
        return false;
    }
    let Some(mask) = poly.pixel_mask(index) else {
        return false;
    };
    let pixels = mask.pixels();
    if pixels.len() < UPGRADE_MIN_PIXELS {
        return false;
    }
    let upgraded = fit_gradient(&source.rgb, &pixels, &config.gradient).and_then(|g| {
        verify_gradient_improvement(&source.rgb, &pixels, poly.paint.color, g, config.gradient.improvement_ratio)
    });
    match upgraded {
        Some(g) => {
            poly.paint.gradient = Some(g);
            true
        }
        None => false,
    }
}

/// One pass of the hill-climbing loop.
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration: usize,
    pub psnr: f64,
    pub within_20: f64,
    /// Whether this render beat every earlier one.
    pub improved: bool,
    pub upgrades: usize,
    pub nudged: usize,
}

#[derive(Debug, Clone)]
pub struct RefineReport {
    pub direct_updates: usize,
    /// Polygons replaced by splitting, and the children that replaced them.
    pub splits: usize,
    pub split_children: usize,
    pub baseline: QualityReport,
    pub iterations: Vec<IterationRecord>,
    pub best_psnr: f64,
    /// Quality of the restored best state.
    pub final_quality: QualityReport,
}

/// Everything refinement reads, plus the collaborators it calls.
pub struct Refiner<'a> {
    pub source: &'a SourceImage,
    pub index: &'a RegionIndex,
    pub foreground: &'a GrayImage,
    pub config: &'a VectorizeConfig,
    pub clusterer: &'a dyn ColorClusterer,
    pub rasterizer: &'a dyn Rasterizer,
}

impl Refiner<'_> {
    /// Rasterize the current state at source resolution.
    pub fn render(&self, state: &VectorState) -> Result<RgbImage, VectorizeError> {
        let (w, h) = self.source.dimensions();
        let svg = polygons_to_svg(state, w, h);
        Ok(rgb_of(&self.rasterizer.rasterize(&svg, w, h)?))
    }

    fn measure(&self, rendered: &RgbImage) -> QualityReport {
        QualityReport::measure(&self.source.rgb, rendered, self.foreground)
    }

    /// Run every phase.
    ///
    /// On a rasterizer failure the best state seen so far is restored
    /// (or, before the first loop render, the state is left as committed)
    /// and the error is returned.
    pub fn run(&self, state: &mut VectorState) -> Result<RefineReport, VectorizeError> {
        let t_start = Instant::now();

        // ── Direct optimisation ───────────────────────────────
        let direct_updates = direct_optimize_colors(&mut state.polygons, self.source, self.index, self.config);
        info!("  Direct      {} fills updated", direct_updates);

        // ── Baseline & split ──────────────────────────────────
        let rendered = self.render(state)?;
        let baseline = self.measure(&rendered);
        info!(
            "  Baseline    PSNR {:.2} dB \u{00b7} {:.1}% within 20",
            baseline.psnr,
            baseline.within(20).unwrap_or(0.0)
        );
        let (splits, split_children) = self.split_phase(state, &rendered);
        if splits > 0 {
            info!(
                "  Split       {} polygons \u{2192} {} parts ({} total)",
                splits,
                split_children,
                state.polygons.len()
            );
        }

        // ── Hill climbing ─────────────────────────────────────
        let mut best: Option<(f64, Snapshot)> = None;
        let mut iterations = Vec::new();
        let climbed = self
            .hill_climb(state, &mut best, &mut iterations)
            .and_then(|()| {
                if let Some((_, snapshot)) = &best {
                    state.restore(snapshot);
                }
                self.render(state)
            });
        let rendered = match climbed {
            Ok(rendered) => rendered,
            Err(e) => {
                if let Some((psnr, snapshot)) = &best {
                    state.restore(snapshot);
                    warn!("  Refine      render failed, kept best state ({:.2} dB)", psnr);
                } else {
                    warn!("  Refine      render failed before any state was scored");
                }
                return Err(e);
            }
        };

        let final_quality = self.measure(&rendered);
        let best_psnr = best.map_or(final_quality.psnr, |(psnr, _)| psnr);
        info!(
            "  Refine      {} iterations, best {:.2} dB  ({}ms)",
            iterations.len(),
            best_psnr,
            t_start.elapsed().as_millis()
        );
        Ok(RefineReport {
            direct_updates,
            splits,
            split_children,
            baseline,
            iterations,
            best_psnr,
            final_quality,
        })
    }

    fn split_phase(&self, state: &mut VectorState, rendered: &RgbImage) -> (usize, usize) {
        let refine = &self.config.refine;
        let errors = per_polygon_error(&self.source.rgb, rendered, &state.polygons, self.index);
        let mut ranked: Vec<usize> = (0..errors.len())
            .filter(|&i| errors[i].mse >= refine.split_mse && errors[i].pixels >= refine.split_min_pixels)
            .collect();
        ranked.sort_by(|&a, &b| errors[b].mse.total_cmp(&errors[a].mse));

        let mut removed = Vec::new();
        let mut added = Vec::new();
        for i in ranked {
            if let Some(children) =
                split_high_error_polygon(&state.polygons[i], self.source, self.index, self.config, self.clusterer)
            {
                debug!(
                    "region {}: split into {} parts (mse {:.0})",
                    state.polygons[i].region_id,
                    children.len(),
                    errors[i].mse
                );
                removed.push(i);
                added.extend(children);
            }
        }
        let splits = removed.len();
        let children = added.len();
        removed.sort_unstable();
        for i in removed.into_iter().rev() {
            state.polygons.remove(i);
        }
        state.polygons.extend(added);
        (splits, children)
    }

    fn hill_climb(
        &self,
        state: &mut VectorState,
        best: &mut Option<(f64, Snapshot)>,
        iterations: &mut Vec<IterationRecord>,
    ) -> Result<(), VectorizeError> {
        let refine = &self.config.refine;
        let mut stall = 0;

        for iteration in 0..refine.max_iterations {
            let mut rendered = self.render(state)?;
            let quality = self.measure(&rendered);
            let best_psnr = best.as_ref().map_or(f64::NEG_INFINITY, |b| b.0);
            let delta = if best.is_some() { quality.psnr - best_psnr } else { quality.psnr };
            let improved = quality.psnr > best_psnr;
            if improved {
                *best = Some((quality.psnr, state.snapshot()));
                stall = 0;
            } else {
                if let Some((_, snapshot)) = best.as_ref() {
                    state.restore(snapshot);
                }
                stall += 1;
            }
            let mut record = IterationRecord {
                iteration,
                psnr: quality.psnr,
                within_20: quality.within(20).unwrap_or(0.0),
                improved,
                upgrades: 0,
                nudged: 0,
            };
            info!(
                "  Iter {:<7}PSNR {:.2} dB ({:+.2}) \u{00b7} {:.1}% within 20{}",
                iteration,
                record.psnr,
                delta,
                record.within_20,
                if improved { "" } else { " \u{00b7} reverted" }
            );

            if stall >= refine.stall_limit {
                info!("  Stop        no improvement for {} iterations", stall);
                iterations.push(record);
                break;
            }
            if stall > 0 {
                rendered = self.render(state)?;
            }

            let errors = per_polygon_error(&self.source.rgb, &rendered, &state.polygons, self.index);
            let mut ranked: Vec<usize> = (0..errors.len()).filter(|&i| errors[i].pixels > 0).collect();
            ranked.sort_by(|&a, &b| errors[b].mse.total_cmp(&errors[a].mse));
            let fraction = if iteration < refine.early_iterations {
                refine.early_fraction
            } else {
                refine.late_fraction
            };
            let take = ((ranked.len() as f64 * fraction) as usize).max(1);
            for &i in ranked.iter().take(take) {
                if try_upgrade_to_gradient(&mut state.polygons[i], &errors[i], self.source, self.index, self.config) {
                    record.upgrades += 1;
                }
            }
            if refine.nudge_strokes {
                record.nudged = nudge_stroke_widths(
                    &mut state.strokes,
                    self.index,
                    &self.source.rgb,
                    &rendered,
                    self.foreground,
                );
            }
            debug!("iteration {}: {} upgrades, {} widths nudged", iteration, record.upgrades, record.nudged);

            let changed = record.upgrades + record.nudged;
            iterations.push(record);
            if changed == 0 {
                info!("  Stop        nothing left to upgrade");
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::KMeans;
    use crate::extract::extract_polygons;
    use crate::render::Resvg;
    use crate::segment::{stats, LabelMap};
    use image::RgbaImage;
    use std::cell::RefCell;

    fn scene(rgba: &RgbaImage, labels: LabelMap, count: usize) -> (SourceImage, RegionIndex, VectorState) {
        let source = SourceImage::from_rgba(rgba);
        let lab = crate::color::lab_image(&source.rgb);
        let regions = stats::compute(&labels, count, &source, &lab);
        let index = labels.index();
        let polygons = extract_polygons(&source, &index, &regions, &VectorizeConfig::default());
        let state = VectorState {
            polygons,
            strokes: Default::default(),
        };
        (source, index, state)
    }

    /// Horizontal ramp in red, one region, no gradient yet.
    fn ramp_scene() -> (SourceImage, RegionIndex, VectorState) {
        let rgba = RgbaImage::from_fn(60, 30, |x, _| {
            let v = (x * 4) as u8;
            image::Rgba([v, 255 - v, 128, 255])
        });
        let labels = LabelMap::from_raw(60, 30, vec![0; 1800]).unwrap();
        let (source, index, mut state) = scene(&rgba, labels, 1);
        for p in &mut state.polygons {
            p.paint.gradient = None;
        }
        (source, index, state)
    }

    fn no_split() -> VectorizeConfig {
        let mut config = VectorizeConfig::default();
        config.refine.split_mse = f64::INFINITY;
        config
    }

    /// Records every SVG it is asked to render and fails on one call.
    struct Flaky {
        fail_on: usize,
        calls: RefCell<Vec<String>>,
    }

    impl Rasterizer for Flaky {
        fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<image::RgbaImage, VectorizeError> {
            let mut calls = self.calls.borrow_mut();
            calls.push(svg.to_string());
            if calls.len() == self.fail_on {
                return Err(VectorizeError::Rasterize {
                    status: "exit status: 1".into(),
                    stderr: "simulated failure".into(),
                });
            }
            Resvg.rasterize(svg, width, height)
        }
    }

    #[test]
    fn direct_optimisation_reaches_fixed_point() {
        let rgba = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgba([(x * 12) as u8, 40, 90, 255])
            } else {
                image::Rgba([220, 200, 20, 255])
            }
        });
        let data = (0..800).map(|i| u32::from(i % 40 >= 20)).collect();
        let labels = LabelMap::from_raw(40, 20, data).unwrap();
        let (source, index, mut state) = scene(&rgba, labels, 2);
        assert_eq!(state.polygons.len(), 2);
        for p in &mut state.polygons {
            p.paint.color = [0, 0, 0];
        }
        let config = VectorizeConfig::default();

        assert_eq!(direct_optimize_colors(&mut state.polygons, &source, &index, &config), 2);
        let once = state.snapshot();
        assert_eq!(direct_optimize_colors(&mut state.polygons, &source, &index, &config), 0);
        assert_eq!(state.snapshot(), once);
        let solid = state.polygons.iter().find(|p| p.region_id == 1).unwrap();
        assert_eq!(solid.paint.color, [220, 200, 20]);
    }

    #[test]
    fn upgrade_needs_high_error() {
        let (source, index, mut state) = ramp_scene();
        let config = VectorizeConfig::default();
        let poly = &mut state.polygons[0];
        let low = ErrorRecord {
            mse: 100.0,
            ..ErrorRecord::EMPTY
        };
        assert!(!try_upgrade_to_gradient(poly, &low, &source, &index, &config));
        let high = ErrorRecord {
            mse: 2000.0,
            ..ErrorRecord::EMPTY
        };
        assert!(try_upgrade_to_gradient(poly, &high, &source, &index, &config));
        assert!(poly.paint.is_gradient());
        // Already a gradient.
        assert!(!try_upgrade_to_gradient(poly, &high, &source, &index, &config));
    }

    #[test]
    fn two_tone_region_splits_into_tagged_parts() {
        let rgba = RgbaImage::from_fn(40, 20, |x, _| {
            if x < 20 {
                image::Rgba([200, 30, 30, 255])
            } else {
                image::Rgba([30, 30, 200, 255])
            }
        });
        let labels = LabelMap::from_raw(40, 20, vec![0; 800]).unwrap();
        let (source, index, state) = scene(&rgba, labels, 1);
        let config = VectorizeConfig::default();
        let children =
            split_high_error_polygon(&state.polygons[0], &source, &index, &config, &KMeans::default()).unwrap();
        assert_eq!(children.len(), 2);
        for child in &children {
            assert_eq!(child.region_id, 0);
            assert_eq!(child.part.as_ref().map(|m| m.count()), Some(400));
            assert!(crate::geom::is_simple(&child.points));
        }
        let reds: Vec<u8> = children.iter().map(|c| c.paint.color[0]).collect();
        assert!(reds.iter().any(|&r| r > 190) && reds.iter().any(|&r| r < 40));

        let flat = RgbaImage::from_pixel(40, 20, image::Rgba([90, 90, 90, 255]));
        let labels = LabelMap::from_raw(40, 20, vec![0; 800]).unwrap();
        let (source, index, state) = scene(&flat, labels, 1);
        assert!(split_high_error_polygon(&state.polygons[0], &source, &index, &config, &KMeans::default()).is_none());
    }

    #[test]
    fn refinement_never_regresses() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (source, index, mut state) = ramp_scene();
        let config = no_split();
        let fg = source.foreground(config.foreground_alpha);
        let refiner = Refiner {
            source: &source,
            index: &index,
            foreground: &fg,
            config: &config,
            clusterer: &KMeans::default(),
            rasterizer: &Resvg,
        };
        let report = refiner.run(&mut state).unwrap();
        assert!(!report.iterations.is_empty());
        let best_seen = report.iterations.iter().map(|r| r.psnr).fold(f64::NEG_INFINITY, f64::max);
        assert!(report.final_quality.psnr >= best_seen - 1e-9);
        assert!(report.final_quality.psnr >= report.baseline.psnr - 1e-9);
        assert_eq!(report.best_psnr, best_seen);
    }

    #[test]
    fn render_failure_restores_best_state() {
        let (source, index, mut state) = ramp_scene();
        let config = no_split();
        let fg = source.foreground(config.foreground_alpha);
        // Calls: baseline, iteration 0 (scored, then upgraded), iteration 1 fails.
        let flaky = Flaky {
            fail_on: 3,
            calls: RefCell::new(Vec::new()),
        };
        let refiner = Refiner {
            source: &source,
            index: &index,
            foreground: &fg,
            config: &config,
            clusterer: &KMeans::default(),
            rasterizer: &flaky,
        };
        let err = refiner.run(&mut state).unwrap_err();
        assert!(matches!(err, VectorizeError::Rasterize { .. }));
        let calls = flaky.calls.borrow();
        assert_eq!(calls.len(), 3);
        // The upgraded state was rendered in the failing call.
        assert_ne!(calls[2], calls[1]);
        let (w, h) = source.dimensions();
        assert_eq!(polygons_to_svg(&state, w, h), calls[1]);
        assert_eq!(state.gradient_count(), 0);
    }

    #[test]
    fn failure_before_scoring_keeps_committed_state() {
        let (source, index, mut state) = ramp_scene();
        let config = no_split();
        let fg = source.foreground(config.foreground_alpha);
        let flaky = Flaky {
            fail_on: 1,
            calls: RefCell::new(Vec::new()),
        };
        let refiner = Refiner {
            source: &source,
            index: &index,
            foreground: &fg,
            config: &config,
            clusterer: &KMeans::default(),
            rasterizer: &flaky,
        };
        assert!(refiner.run(&mut state).is_err());
        assert_eq!(state.polygons.len(), 1);
    }
}
