//! End-to-end runs on synthetic logos with the in-process rasterizer.

use image::{Rgba, RgbaImage};
use img2poly::{
    vectorize, Backends, KMeans, Mode, Rasterizer, Resvg, Slic, SourceImage, VectorizeConfig, VectorizeError,
};
use resvg::usvg;

/// Orange card with a 3 px black frame and a teal disc, on transparency.
fn badge() -> SourceImage {
    let rgba = RgbaImage::from_fn(80, 60, |x, y| {
        let (dx, dy) = (x as f64 - 40.0, y as f64 - 30.0);
        let in_card = (10..70).contains(&x) && (10..50).contains(&y);
        let in_frame = in_card && !((13..67).contains(&x) && (13..47).contains(&y));
        if !in_card {
            Rgba([0, 0, 0, 0])
        } else if in_frame {
            Rgba([10, 10, 10, 255])
        } else if dx * dx + dy * dy < 100.0 {
            Rgba([20, 160, 150, 255])
        } else {
            Rgba([240, 140, 30, 255])
        }
    });
    SourceImage::from_rgba(&rgba)
}

fn small_config() -> VectorizeConfig {
    let mut config = VectorizeConfig::default();
    config.segment.target_regions = 150;
    config
}

struct Broken;

impl Rasterizer for Broken {
    fn rasterize(&self, _svg: &str, _w: u32, _h: u32) -> Result<RgbaImage, VectorizeError> {
        Err(VectorizeError::Rasterize {
            status: "exit status: 1".into(),
            stderr: "cannot render".into(),
        })
    }
}

fn backends<'a>(slic: &'a Slic, kmeans: &'a KMeans, rasterizer: &'a dyn Rasterizer) -> Backends<'a> {
    Backends {
        oracle: slic,
        clusterer: kmeans,
        rasterizer,
    }
}

#[test]
fn transparent_image_gives_empty_document() {
    let source = SourceImage::from_rgba(&RgbaImage::new(32, 24));
    let (slic, kmeans) = (Slic::default(), KMeans::default());
    let output = vectorize(&source, &small_config(), &backends(&slic, &kmeans, &Resvg));
    assert!(output.failure.is_none());
    assert!(output.refinement.is_none());
    assert_eq!(output.summary.polygons, 0);
    assert!(output.svg.contains("viewBox=\"0 0 32 24\""));
    let tree = usvg::Tree::from_str(&output.svg, &usvg::Options::default()).unwrap();
    assert_eq!((tree.size().width(), tree.size().height()), (32.0, 24.0));
}

#[test]
fn badge_is_vectorized_and_refined() {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = badge();
    let config = small_config();
    let (slic, kmeans) = (Slic::from_config(&config.segment), KMeans::default());
    let output = vectorize(&source, &config, &backends(&slic, &kmeans, &Resvg));

    assert!(output.failure.is_none());
    assert!(output.summary.polygons >= 2);
    assert!(output.summary.regions <= output.summary.superpixels);
    assert!(usvg::Tree::from_str(&output.svg, &usvg::Options::default()).is_ok());
    assert!(output.svg.contains("#0a0a0a") || output.summary.outlines > 0);

    let report = output.refinement.expect("refinement ran");
    let best_seen = report.iterations.iter().map(|r| r.psnr).fold(f64::NEG_INFINITY, f64::max);
    assert!(report.final_quality.psnr >= best_seen - 1e-9);
    let quality = output.quality.expect("final render measured");
    assert!(quality.psnr > 15.0, "psnr {}", quality.psnr);
    assert!(quality.within(40).unwrap() > 50.0);
}

#[test]
fn broken_rasterizer_still_writes_svg() {
    let source = badge();
    let config = small_config();
    let (slic, kmeans) = (Slic::from_config(&config.segment), KMeans::default());
    let output = vectorize(&source, &config, &backends(&slic, &kmeans, &Broken));

    assert!(matches!(output.failure, Some(VectorizeError::Rasterize { .. })));
    assert!(output.quality.is_none());
    assert!(output.summary.polygons > 0);
    assert!(output.svg.contains("<polygon"));
    assert!(output.svg.trim_end().ends_with("</svg>"));
}

#[test]
fn refinement_can_be_disabled() {
    let source = badge();
    let mut config = small_config();
    config.refine.enabled = false;
    let (slic, kmeans) = (Slic::from_config(&config.segment), KMeans::default());
    let output = vectorize(&source, &config, &backends(&slic, &kmeans, &Resvg));
    assert!(output.refinement.is_none());
    assert!(output.quality.is_some());
    assert!(output.failure.is_none());
}

#[test]
fn quantized_mode_emits_evenodd_layers() {
    let source = badge();
    let mut config = small_config();
    config.mode = Mode::Quantized;
    config.quantize.colors = 8;
    let (slic, kmeans) = (Slic::default(), KMeans::default());
    let output = vectorize(&source, &config, &backends(&slic, &kmeans, &Resvg));

    assert!(output.failure.is_none());
    assert!(output.summary.layers >= 3);
    assert!(output.svg.contains("fill-rule=\"evenodd\""));
    assert!(!output.svg.contains("<polygon"));
    // The frame encloses the card, so at least one path carries a hole.
    assert!(output.svg.lines().any(|l| l.matches('Z').count() >= 2));
    let quality = output.quality.unwrap();
    assert!(quality.psnr > 15.0, "psnr {}", quality.psnr);
}

#[test]
fn preset_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("preset.json");
    std::fs::write(&path, r#"{ "mode": "quantized", "quantize": { "colors": 12 } }"#).unwrap();
    let config = VectorizeConfig::load(&path).unwrap();
    assert_eq!(config.mode, Mode::Quantized);
    assert_eq!(config.quantize.colors, 12);
    assert_eq!(config.refine.stall_limit, 3);

    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(VectorizeConfig::load(&path), Err(VectorizeError::Config(_))));
}
