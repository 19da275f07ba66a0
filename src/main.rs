use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use img2poly::{Backends, KMeans, Mode, Rasterizer, Resvg, RsvgConvert, Slic, SourceImage, VectorizeConfig};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Superpixels, LAB merging, polygons, render-driven refinement
    Superpixel,
    /// Palette quantization, one compound path per traced shape
    Quantized,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RasterizerArg {
    /// In-process resvg
    Resvg,
    /// External rsvg-convert
    Rsvg,
}

#[derive(Parser)]
#[command(name = "img2poly", about = "Raster logo to compact SVG polygons")]
struct Cli {
    /// Input image path (PNG, JPEG, BMP)
    #[arg(short, long)]
    input: PathBuf,

    /// Output SVG path
    #[arg(short, long)]
    output: PathBuf,

    /// Vectorizer
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,

    /// JSON preset; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Approximate superpixel count
    #[arg(long)]
    segments: Option<usize>,

    /// Base 8-bit LAB distance for merging adjacent regions
    #[arg(long)]
    color_threshold: Option<f64>,

    /// 8-bit L below which a region counts as dark (0-255)
    #[arg(long)]
    dark_threshold: Option<f64>,

    /// Refinement iteration cap
    #[arg(long)]
    iterations: Option<usize>,

    /// Skip render-driven refinement
    #[arg(long)]
    no_refine: bool,

    /// Nudge outline widths during refinement
    #[arg(long)]
    nudge_strokes: bool,

    /// Palette size in quantized mode
    #[arg(long)]
    colors: Option<usize>,

    /// SVG rasterizer used for refinement and quality reports
    #[arg(long, value_enum, default_value = "resvg")]
    rasterizer: RasterizerArg,

    /// rsvg-convert executable
    #[arg(long, default_value = "rsvg-convert")]
    rsvg_path: PathBuf,

    /// Write a side-by-side comparison PNG (source, render, error)
    #[arg(long)]
    comparison: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let mut config = match &cli.config {
        Some(path) => VectorizeConfig::load(path)?,
        None => VectorizeConfig::default(),
    };
    if let Some(mode) = cli.mode {
        config.mode = match mode {
            ModeArg::Superpixel => Mode::Superpixel,
            ModeArg::Quantized => Mode::Quantized,
        };
    }
    if let Some(n) = cli.segments {
        config.segment.target_regions = n;
    }
    if let Some(t) = cli.color_threshold {
        config.merge.color_threshold = t;
    }
    if let Some(t) = cli.dark_threshold {
        config.merge.dark_threshold = t;
    }
    if let Some(n) = cli.iterations {
        config.refine.max_iterations = n;
    }
    if let Some(n) = cli.colors {
        config.quantize.colors = n;
    }
    config.refine.enabled &= !cli.no_refine;
    config.refine.nudge_strokes |= cli.nudge_strokes;
    config.validate()?;

    // Header
    eprintln!();
    eprintln!("  img2poly \u{00b7} {}", cli.input.display());
    eprintln!();

    let source = SourceImage::load(&cli.input)?;
    let rsvg;
    let rasterizer: &dyn Rasterizer = match cli.rasterizer {
        RasterizerArg::Resvg => &Resvg,
        RasterizerArg::Rsvg => {
            rsvg = RsvgConvert {
                program: cli.rsvg_path.clone(),
            };
            &rsvg
        }
    };
    let slic = Slic::from_config(&config.segment);
    let kmeans = KMeans::default();
    let backends = Backends {
        oracle: &slic,
        clusterer: &kmeans,
        rasterizer,
    };

    // Pipeline (lib logs step-by-step progress)
    let output = img2poly::vectorize(&source, &config, &backends);
    std::fs::write(&cli.output, &output.svg)?;

    // Footer
    eprintln!();
    eprintln!("  \u{2713} {}", cli.output.display());

    if let Some(e) = output.failure {
        eprintln!("  \u{2717} refinement stopped: {}", e);
        eprintln!();
        return Err(e.into());
    }

    if let Some(path) = &cli.comparison {
        let (w, h) = source.dimensions();
        let rendered = rasterizer.rasterize(&output.svg, w, h)?;
        let foreground = source.foreground(config.foreground_alpha);
        img2poly::render::render_comparison(&source, &rendered, &foreground, path)?;
        eprintln!("  Compare     {}", path.display());
    }

    eprintln!();
    Ok(())
}
