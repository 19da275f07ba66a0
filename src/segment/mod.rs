//! Region segmentation: edge map → edge-darkened image → superpixel oracle
//! → contiguous label map with per-region statistics.

pub mod edges;
pub mod labels;
pub mod slic;
pub mod stats;

use image::{GrayImage, RgbImage};

pub use labels::{LabelMap, RegionIndex, BACKGROUND};
pub use slic::Slic;
pub use stats::RegionStats;

use crate::bitmap::SourceImage;
use crate::color::LabColor;
use crate::config::VectorizeConfig;

/// Superpixel segmentation collaborator.
///
/// Given an image, a foreground mask (255 = foreground), and a target
/// region count, returns a dense label grid that partitions the
/// foreground into roughly that many spatially connected regions.
/// Background pixels must be left unlabelled.
pub trait SuperpixelOracle {
    fn segment(&self, image: &RgbImage, foreground: &GrayImage, target_regions: usize) -> LabelMap;
}

/// Output of the segmentation stage.
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Ids `0..count`, background elsewhere.
    pub labels: LabelMap,
    pub count: usize,
    pub stats: Vec<RegionStats>,
    /// Number of pixels flagged by the combined edge detector.
    pub edge_pixels: usize,
}

/// Partition the foreground into superpixels.
///
/// An oracle that finds nothing yields `count == 0`; callers treat that
/// as an image with no extractable content.
pub fn segment_regions(
    source: &SourceImage,
    lab: &[LabColor],
    config: &VectorizeConfig,
    oracle: &dyn SuperpixelOracle,
) -> Segmentation {
    let edge_map = edges::detect(&source.rgb, lab);
    let edge_pixels = edge_map.pixels().filter(|p| p.0[0] > 0).count();
    log::info!("  Edges       {} edge pixels", edge_pixels);

    let foreground = source.foreground(config.foreground_alpha);
    let barrier = edges::darken_edges(&source.rgb, &edge_map, config.segment.edge_darkening);
    let raw = oracle.segment(&barrier, &foreground, config.segment.target_regions);

    // The oracle may label outside the mask or leave gaps in its id space.
    let (w, h) = raw.dimensions();
    let masked = if (w, h) == source.dimensions() {
        let mut masked = raw;
        for y in 0..h {
            for x in 0..w {
                if foreground.get_pixel(x, y).0[0] == 0 {
                    masked.set(x, y, None);
                }
            }
        }
        masked
    } else {
        log::warn!(
            "  Segment     oracle returned {}x{} labels for a {}x{} image, ignoring",
            w, h, source.dimensions().0, source.dimensions().1
        );
        LabelMap::new(source.dimensions().0, source.dimensions().1)
    };
    let (labels, count) = masked.compact();
    let stats = stats::compute(&labels, count, source, lab);
    log::info!("  Segment     {} superpixels", count);

    Segmentation {
        labels,
        count,
        stats,
        edge_pixels,
    }
}
