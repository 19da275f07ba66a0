//! SVG → raster, and comparison images.
//!
//! Refinement only sees rasterizers through [`Rasterizer`], so the
//! in-process renderer and the external `rsvg-convert` tool are
//! interchangeable.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use image::{GrayImage, Rgba, RgbaImage};
use resvg::{tiny_skia, usvg};

use crate::bitmap::SourceImage;
use crate::error::VectorizeError;

/// Renders SVG text to a straight-alpha RGBA raster of exactly
/// `width`×`height`.
pub trait Rasterizer {
    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<RgbaImage, VectorizeError>;
}

fn check_size(image: RgbaImage, width: u32, height: u32) -> Result<RgbaImage, VectorizeError> {
    if image.dimensions() != (width, height) {
        return Err(VectorizeError::RasterSize {
            expected_w: width,
            expected_h: height,
            actual_w: image.width(),
            actual_h: image.height(),
        });
    }
    Ok(image)
}

/// In-process rendering with resvg.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resvg;

impl Rasterizer for Resvg {
    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<RgbaImage, VectorizeError> {
        let tree = usvg::Tree::from_str(svg, &usvg::Options::default())
            .map_err(|e| VectorizeError::InvalidSvg(e.to_string()))?;
        let mut pixmap = tiny_skia::Pixmap::new(width, height).ok_or(VectorizeError::RasterSize {
            expected_w: width,
            expected_h: height,
            actual_w: 0,
            actual_h: 0,
        })?;
        let size = tree.size();
        let transform = tiny_skia::Transform::from_scale(
            width as f32 / size.width(),
            height as f32 / size.height(),
        );
        resvg::render(&tree, transform, &mut pixmap.as_mut());

        let mut image = RgbaImage::new(width, height);
        for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        check_size(image, width, height)
    }
}

/// The external `rsvg-convert` tool.
///
/// Input and output live in temporary files that are removed when this
/// call returns, whether or not the tool succeeded.
#[derive(Debug, Clone)]
pub struct RsvgConvert {
    pub program: PathBuf,
}

impl Default for RsvgConvert {
    fn default() -> Self {
        Self {
            program: PathBuf::from("rsvg-convert"),
        }
    }
}

impl Rasterizer for RsvgConvert {
    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<RgbaImage, VectorizeError> {
        let mut input = tempfile::Builder::new().suffix(".svg").tempfile()?;
        input.write_all(svg.as_bytes())?;
        input.flush()?;
        let output = tempfile::Builder::new().suffix(".png").tempfile()?;

        let result = Command::new(&self.program)
            .arg("-w")
            .arg(width.to_string())
            .arg("-h")
            .arg(height.to_string())
            .arg("-o")
            .arg(output.path())
            .arg(input.path())
            .output()?;
        if !result.status.success() {
            return Err(VectorizeError::Rasterize {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        let image = image::open(output.path())
            .map_err(|e| VectorizeError::Rasterize {
                status: result.status.to_string(),
                stderr: format!("unreadable output: {}", e),
            })?
            .to_rgba8();
        check_size(image, width, height)
    }
}

/// Encode a pixmap to PNG bytes.
fn encode_png(pixmap: &tiny_skia::Pixmap) -> Result<Vec<u8>, VectorizeError> {
    let png_err = |e: png::EncodingError| VectorizeError::Png(e.to_string());
    let mut buf = Vec::new();
    let mut encoder = png::Encoder::new(&mut buf, pixmap.width(), pixmap.height());
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header().map_err(png_err)?;
    writer.write_image_data(pixmap.data()).map_err(png_err)?;
    writer.finish().map_err(png_err)?;
    Ok(buf)
}

fn on_white(c: [u8; 4]) -> [u8; 3] {
    let a = c[3] as f64 / 255.0;
    let blend = |v: u8| (v as f64 * a + 255.0 * (1.0 - a)).round() as u8;
    [blend(c[0]), blend(c[1]), blend(c[2])]
}

fn put(pixmap: &mut tiny_skia::Pixmap, x: u32, y: u32, rgb: [u8; 3]) {
    let w = pixmap.width();
    if let Some(c) = tiny_skia::PremultipliedColorU8::from_rgba(rgb[0], rgb[1], rgb[2], 255) {
        pixmap.pixels_mut()[(y * w + x) as usize] = c;
    }
}

/// Build a three-panel comparison image.
///
/// Left panel: source composited on white.
/// Middle panel: rendered output composited on white.
/// Right panel: per-pixel error heat map over the foreground (max channel
/// difference, ×4, in red).
pub fn comparison_image(
    source: &SourceImage,
    rendered: &RgbaImage,
    foreground: &GrayImage,
) -> Result<tiny_skia::Pixmap, VectorizeError> {
    let (w, h) = source.dimensions();
    let separator: u32 = 2;
    let total_w = w * 3 + separator * 2;
    let mut pixmap = tiny_skia::Pixmap::new(total_w, h).ok_or(VectorizeError::RasterSize {
        expected_w: total_w,
        expected_h: h,
        actual_w: 0,
        actual_h: 0,
    })?;
    pixmap.fill(tiny_skia::Color::from_rgba8(200, 200, 200, 255));

    for y in 0..h {
        for x in 0..w {
            let orig = source.color(x, y);
            let alpha = source.alpha_at(x, y);
            let rend = rendered.get_pixel_checked(x, y).map_or([255, 255, 255, 0], |p| p.0);

            put(&mut pixmap, x, y, on_white([orig[0], orig[1], orig[2], alpha]));
            put(&mut pixmap, w + separator + x, y, on_white(rend));

            let heat = if foreground.get_pixel(x, y).0[0] > 0 {
                let diff = (0..3)
                    .map(|c| (orig[c] as i16 - rend[c] as i16).unsigned_abs())
                    .max()
                    .unwrap_or(0);
                let v = (diff as u32 * 4).min(255) as u8;
                [255, 255 - v, 255 - v]
            } else {
                [235, 235, 235]
            };
            put(&mut pixmap, (w + separator) * 2 + x, y, heat);
        }
    }
    Ok(pixmap)
}

/// Write the comparison image as PNG.
pub fn render_comparison(
    source: &SourceImage,
    rendered: &RgbaImage,
    foreground: &GrayImage,
    output_path: &Path,
) -> Result<(), VectorizeError> {
    let pixmap = comparison_image(source, rendered, foreground)?;
    std::fs::write(output_path, encode_png(&pixmap)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 10 10" width="10" height="10">
  <polygon points="0,0 10,0 10,10 0,10" fill="#3366cc"/>
</svg>
"##;

    #[test]
    fn resvg_fills_opaque_polygon() {
        let img = Resvg.rasterize(SQUARE, 10, 10).unwrap();
        assert_eq!(img.dimensions(), (10, 10));
        assert_eq!(img.get_pixel(5, 5).0, [0x33, 0x66, 0xcc, 255]);
    }

    #[test]
    fn resvg_scales_to_requested_size() {
        let img = Resvg.rasterize(SQUARE, 20, 20).unwrap();
        assert_eq!(img.dimensions(), (20, 20));
        assert_eq!(img.get_pixel(19, 19).0[3], 255);
    }

    #[test]
    fn malformed_svg_is_an_error() {
        let err = Resvg.rasterize("<svg", 4, 4).unwrap_err();
        assert!(matches!(err, VectorizeError::InvalidSvg(_)));
    }

    #[test]
    fn missing_tool_is_an_io_error() {
        let tool = RsvgConvert {
            program: PathBuf::from("/nonexistent/rsvg-convert-missing"),
        };
        let err = tool.rasterize(SQUARE, 10, 10).unwrap_err();
        assert!(matches!(err, VectorizeError::Io(_)));
    }

    #[test]
    fn failing_tool_reports_status() {
        // `false` exits non-zero without output.
        let tool = RsvgConvert {
            program: PathBuf::from("false"),
        };
        match tool.rasterize(SQUARE, 10, 10) {
            Err(VectorizeError::Rasterize { .. }) | Err(VectorizeError::Io(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|i| i.dimensions())),
        }
    }

    #[test]
    fn comparison_png_is_written() {
        let rgba = RgbaImage::from_pixel(6, 4, Rgba([10, 200, 30, 255]));
        let source = SourceImage::from_rgba(&rgba);
        let rendered = RgbaImage::from_pixel(6, 4, Rgba([10, 180, 30, 255]));
        let fg = source.foreground(200);
        let pixmap = comparison_image(&source, &rendered, &fg).unwrap();
        assert_eq!((pixmap.width(), pixmap.height()), (22, 4));
        // Error panel: 20 levels ×4 = 80 below white in g and b.
        let px = pixmap.pixel(16, 0).unwrap();
        assert_eq!((px.red(), px.green(), px.blue()), (255, 175, 175));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cmp.png");
        render_comparison(&source, &rendered, &fg, &path).unwrap();
        let back = image::open(&path).unwrap();
        assert_eq!((back.width(), back.height()), (22, 4));
    }
}
