//! img2poly: raster logo → compact SVG polygons.
//!
//! Segments the foreground into superpixels, merges them by LAB colour,
//! traces each merged region into a smoothed polygon with a sampled solid
//! or linear-gradient fill, detects dark outline strokes, then refines
//! fills by rendering the SVG and comparing it against the source.
//!
//! # Example
//!
//! ```no_run
//! use img2poly::{vectorize, Backends, SourceImage, VectorizeConfig};
//! use std::path::Path;
//!
//! let source = SourceImage::load(Path::new("logo.png"))?;
//! let output = vectorize(&source, &VectorizeConfig::default(), &Backends::default());
//! std::fs::write("logo.svg", &output.svg)?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]

mod contour;
mod geom;
mod simplify;

pub mod bitmap;
pub mod cluster;
pub mod color;
pub mod config;
pub mod error;
pub mod eval;
pub mod extract;
pub mod gradient;
pub mod layers;
pub mod mask;
pub mod merge;
pub mod polygon;
pub mod refine;
pub mod render;
pub mod segment;
pub mod stroke;
pub mod svg;

pub use bitmap::SourceImage;
pub use cluster::{ColorClusterer, KMeans};
pub use config::{Mode, VectorizeConfig};
pub use error::VectorizeError;
pub use eval::QualityReport;
pub use polygon::{Polygon, VectorState};
pub use refine::RefineReport;
pub use render::{Rasterizer, Resvg, RsvgConvert};
pub use segment::{Slic, SuperpixelOracle};

use std::time::Instant;

use crate::bitmap::rgb_of;
use crate::color::lab_image;
use crate::refine::Refiner;

/// The external collaborators a run uses.
pub struct Backends<'a> {
    pub oracle: &'a dyn SuperpixelOracle,
    pub clusterer: &'a dyn ColorClusterer,
    pub rasterizer: &'a dyn Rasterizer,
}

impl Default for Backends<'static> {
    fn default() -> Self {
        static SLIC: std::sync::OnceLock<Slic> = std::sync::OnceLock::new();
        static KMEANS: std::sync::OnceLock<KMeans> = std::sync::OnceLock::new();
        Self {
            oracle: SLIC.get_or_init(Slic::default),
            clusterer: KMEANS.get_or_init(KMeans::default),
            rasterizer: &Resvg,
        }
    }
}

/// Counts describing what a run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Summary {
    pub width: u32,
    pub height: u32,
    pub superpixels: usize,
    pub regions: usize,
    pub polygons: usize,
    pub gradients: usize,
    pub outlines: usize,
    /// Quantized mode only.
    pub layers: usize,
    pub paths: usize,
}

/// Result of a run. `svg` is always a complete document, even when a
/// render failed part way through refinement.
#[derive(Debug)]
pub struct Output {
    pub svg: String,
    pub summary: Summary,
    /// Quality of the emitted SVG, when it could be rendered.
    pub quality: Option<QualityReport>,
    pub refinement: Option<RefineReport>,
    /// Render failure that cut the run short. The SVG holds the best
    /// committed state.
    pub failure: Option<VectorizeError>,
}

/// Vectorize with the mode named in `config`.
pub fn vectorize(source: &SourceImage, config: &VectorizeConfig, backends: &Backends) -> Output {
    let (w, h) = source.dimensions();
    log::info!("  Load        {}x{} px, {:?} mode", w, h, config.mode);
    match config.mode {
        Mode::Superpixel => vectorize_superpixel(source, config, backends),
        Mode::Quantized => vectorize_quantized(source, config, backends),
    }
}

/// Superpixel pipeline: segment, merge, extract, detect strokes, refine.
pub fn vectorize_superpixel(source: &SourceImage, config: &VectorizeConfig, backends: &Backends) -> Output {
    let t_start = Instant::now();
    let (w, h) = source.dimensions();
    let mut summary = Summary {
        width: w,
        height: h,
        ..Summary::default()
    };

    // ── Segment & merge ───────────────────────────────────
    let lab = lab_image(&source.rgb);
    let seg = segment::segment_regions(source, &lab, config, backends.oracle);
    summary.superpixels = seg.count;
    if seg.count == 0 {
        log::info!("  Result      no foreground regions, empty document");
        return Output {
            svg: svg::polygons_to_svg(&VectorState::default(), w, h),
            summary,
            quality: None,
            refinement: None,
            failure: None,
        };
    }
    let adjacency = segment::stats::adjacency(&seg.labels, seg.count);
    let merged = merge::merge_regions(
        &seg.labels,
        seg.stats,
        &adjacency,
        &config.merge,
        config.foreground_alpha as f64,
    );
    summary.regions = merged.count;
    let index = merged.labels.index();

    // ── Polygons & strokes ────────────────────────────────
    let polygons = extract::extract_polygons(source, &index, &merged.regions, config);
    let strokes = stroke::detect_strokes(source, &index, &config.stroke, config.foreground_alpha);
    let mut state = VectorState { polygons, strokes };

    // ── Refine ────────────────────────────────────────────
    let foreground = source.foreground(config.foreground_alpha);
    let refiner = Refiner {
        source,
        index: &index,
        foreground: &foreground,
        config,
        clusterer: backends.clusterer,
        rasterizer: backends.rasterizer,
    };
    let (quality, refinement, failure) = if !config.refine.enabled || state.polygons.is_empty() {
        match refiner.render(&state) {
            Ok(rendered) => (
                Some(QualityReport::measure(&source.rgb, &rendered, &foreground)),
                None,
                None,
            ),
            Err(e) => (None, None, Some(e)),
        }
    } else {
        match refiner.run(&mut state) {
            Ok(report) => (Some(report.final_quality.clone()), Some(report), None),
            Err(e) => (None, None, Some(e)),
        }
    };

    summary.polygons = state.polygons.len();
    summary.gradients = state.gradient_count();
    summary.outlines = state.strokes.len();
    let svg = svg::polygons_to_svg(&state, w, h);
    if let Some(q) = &quality {
        log::info!("{}", q.to_string().trim_end());
    }
    log::info!(
        "  Result      {} polygons ({} gradients) \u{00b7} {} outlines \u{00b7} {:.1} KB  ({}ms)",
        summary.polygons,
        summary.gradients,
        summary.outlines,
        svg.len() as f64 / 1024.0,
        t_start.elapsed().as_millis()
    );
    Output {
        svg,
        summary,
        quality,
        refinement,
        failure,
    }
}

/// Palette pipeline: quantize, trace each colour into compound paths.
///
/// No refinement; the result is rendered once for the quality report.
pub fn vectorize_quantized(source: &SourceImage, config: &VectorizeConfig, backends: &Backends) -> Output {
    let t_start = Instant::now();
    let (w, h) = source.dimensions();
    let layers = layers::quantize_layers(source, &config.quantize, config.foreground_alpha, backends.clusterer);
    let svg = svg::layers_to_svg(&layers, w, h);
    let summary = Summary {
        width: w,
        height: h,
        layers: layers.len(),
        paths: layers.iter().map(|l| l.paths.len()).sum(),
        ..Summary::default()
    };

    let foreground = source.foreground(config.foreground_alpha);
    let (quality, failure) = match backends.rasterizer.rasterize(&svg, w, h) {
        Ok(rendered) => (
            Some(QualityReport::measure(&source.rgb, &rgb_of(&rendered), &foreground)),
            None,
        ),
        Err(e) => {
            log::warn!("  Render      {}", e);
            (None, Some(e))
        }
    };
    if let Some(q) = &quality {
        log::info!("{}", q.to_string().trim_end());
    }
    log::info!(
        "  Result      {} layers \u{00b7} {} paths \u{00b7} {:.1} KB  ({}ms)",
        summary.layers,
        summary.paths,
        svg.len() as f64 / 1024.0,
        t_start.elapsed().as_millis()
    );
    Output {
        svg,
        summary,
        quality,
        refinement: None,
        failure,
    }
}
