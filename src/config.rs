//! All vectorization parameters in one struct.
//!
//! Every threshold here was tuned by eye on low-poly logo art; none of
//! them is an invariant. Sections deserialize with `#[serde(default)]`
//! so a JSON preset only has to name the fields it changes.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::VectorizeError;

/// Which vectorizer runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Superpixel segmentation, LAB merging, polygons, render-driven refinement.
    Superpixel,
    /// Colour quantization with one compound even-odd path per traced shape.
    Quantized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizeConfig {
    pub mode: Mode,
    /// Pixels with alpha strictly above this are foreground.
    pub foreground_alpha: u8,
    pub segment: SegmentConfig,
    pub merge: MergeConfig,
    pub stroke: StrokeConfig,
    pub extract: ExtractConfig,
    pub gradient: GradientConfig,
    pub refine: RefineConfig,
    pub quantize: QuantizeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentConfig {
    /// Approximate number of superpixels requested from the oracle.
    pub target_regions: usize,
    /// SLIC compactness (higher = more regular shapes).
    pub compactness: f64,
    pub max_iterations: usize,
    /// Fragments smaller than this fraction of the mean superpixel size
    /// are absorbed by a neighbour during connectivity enforcement.
    pub min_size_factor: f64,
    /// Assignment visits every n-th row per iteration, rotating the
    /// offset; the final pass visits all rows.
    pub subsample_stride: usize,
    /// Multiplier applied to pixels on detected edges before segmentation.
    pub edge_darkening: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Base distance below which adjacent regions merge, in 8-bit LAB
    /// units (L 0-255).
    pub color_threshold: f64,
    /// 8-bit L below which a region counts as dark (outline-like).
    pub dark_threshold: f64,
    /// Threshold multiplier when both regions are dark.
    pub dark_pair_factor: f64,
    /// Threshold multiplier when exactly one region is dark.
    pub mixed_pair_factor: f64,
    /// Upper bound on full merge passes.
    pub max_passes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrokeConfig {
    /// Gray level below which a pixel counts as near-black.
    pub near_black: u8,
    pub min_region_pixels: usize,
    pub min_dark_pixels: usize,
    /// Minimum share of the boundary band that must be near-black.
    pub min_dark_fraction: f64,
    /// Minimum gap between interior median and dark-band median gray.
    pub min_contrast: f64,
    /// Measured band widths below this are anti-aliasing, not strokes.
    pub min_band_width: f64,
    pub width_scale: f64,
    pub min_width: f64,
    pub max_width: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Minimum region (and contour) area in pixels.
    pub min_area: f64,
    /// Minimum merged alpha (0-1) for a region to become a polygon.
    pub min_alpha: f64,
    /// Gradient fitting is only attempted above this contour area.
    pub gradient_min_area: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientConfig {
    pub min_pixels: usize,
    /// Max per-channel standard deviation below which a region is solid.
    pub noise_floor: f64,
    pub angle_step_deg: usize,
    /// Minimum projected extent along a candidate axis.
    pub min_span: f64,
    pub min_r2: f64,
    /// Minimum RGB distance between the two stop colours.
    pub min_color_range: f64,
    /// Gradient MSE must be below this fraction of the solid-fill MSE.
    pub improvement_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefineConfig {
    pub enabled: bool,
    pub max_iterations: usize,
    /// Consecutive non-improving iterations before stopping.
    pub stall_limit: usize,
    pub split_mse: f64,
    pub split_min_pixels: usize,
    pub split_min_color_distance: f64,
    pub upgrade_mse: f64,
    /// Share of polygons (ranked by MSE) considered in early iterations.
    pub early_fraction: f64,
    pub late_fraction: f64,
    pub early_iterations: usize,
    /// Nudge outline widths toward the original boundary brightness.
    pub nudge_strokes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeConfig {
    pub colors: usize,
    pub min_pixels: usize,
    pub min_area: f64,
    /// Ring simplification tolerance as a fraction of ring perimeter.
    pub epsilon: f64,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Superpixel,
            foreground_alpha: 200,
            segment: SegmentConfig::default(),
            merge: MergeConfig::default(),
            stroke: StrokeConfig::default(),
            extract: ExtractConfig::default(),
            gradient: GradientConfig::default(),
            refine: RefineConfig::default(),
            quantize: QuantizeConfig::default(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            target_regions: 3000,
            compactness: 12.0,
            max_iterations: 10,
            min_size_factor: 0.2,
            subsample_stride: 3,
            edge_darkening: 0.5,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            color_threshold: 13.0,
            dark_threshold: 45.0,
            dark_pair_factor: 1.3,
            mixed_pair_factor: 0.5,
            max_passes: 64,
        }
    }
}

impl Default for StrokeConfig {
    fn default() -> Self {
        Self {
            near_black: 45,
            min_region_pixels: 10,
            min_dark_pixels: 5,
            min_dark_fraction: 0.25,
            min_contrast: 40.0,
            min_band_width: 2.5,
            width_scale: 0.45,
            min_width: 1.0,
            max_width: 3.0,
        }
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_area: 12.0,
            min_alpha: 0.8,
            gradient_min_area: 50.0,
        }
    }
}

impl Default for GradientConfig {
    fn default() -> Self {
        Self {
            min_pixels: 20,
            noise_floor: 5.0,
            angle_step_deg: 5,
            min_span: 6.0,
            min_r2: 0.20,
            min_color_range: 15.0,
            improvement_ratio: 0.85,
        }
    }
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_iterations: 10,
            stall_limit: 3,
            split_mse: 500.0,
            split_min_pixels: 80,
            split_min_color_distance: 15.0,
            upgrade_mse: 400.0,
            early_fraction: 0.5,
            late_fraction: 0.25,
            early_iterations: 3,
            nudge_strokes: false,
        }
    }
}

impl Default for QuantizeConfig {
    fn default() -> Self {
        Self {
            colors: 96,
            min_pixels: 10,
            min_area: 8.0,
            epsilon: 0.003,
        }
    }
}

impl VectorizeConfig {
    /// Load a JSON preset. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, VectorizeError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VectorizeError::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| VectorizeError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), VectorizeError> {
        if self.gradient.angle_step_deg == 0 || self.gradient.angle_step_deg > 180 {
            return Err(VectorizeError::Config(
                "gradient.angle_step_deg must be in 1..=180".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.gradient.improvement_ratio) {
            return Err(VectorizeError::Config(
                "gradient.improvement_ratio must be in [0, 1]".into(),
            ));
        }
        if self.merge.max_passes == 0 {
            return Err(VectorizeError::Config("merge.max_passes must be > 0".into()));
        }
        if self.segment.target_regions == 0 || self.quantize.colors == 0 {
            return Err(VectorizeError::Config(
                "segment.target_regions and quantize.colors must be > 0".into(),
            ));
        }
        Ok(())
    }
}
