use std::path::Path;

use image::{DynamicImage, GrayImage, ImageReader, Luma, RgbImage, RgbaImage};

use crate::color::Rgb;
use crate::error::VectorizeError;

/// The source raster, split into colour and alpha planes.
///
/// Read-only for the whole pipeline.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub rgb: RgbImage,
    pub alpha: GrayImage,
}

impl SourceImage {
    /// Load an image file. Images without alpha are treated as fully opaque.
    pub fn load(path: &Path) -> Result<Self, VectorizeError> {
        let img = ImageReader::open(path)
            .map_err(|e| VectorizeError::ImageLoad(e.to_string()))?
            .decode()
            .map_err(|e| VectorizeError::ImageLoad(e.to_string()))?;
        Ok(Self::from_dynamic(&img))
    }

    pub fn from_dynamic(img: &DynamicImage) -> Self {
        if img.color().has_alpha() {
            Self::from_rgba(&img.to_rgba8())
        } else {
            let rgb = img.to_rgb8();
            let alpha = GrayImage::from_pixel(rgb.width(), rgb.height(), Luma([255]));
            Self { rgb, alpha }
        }
    }

    pub fn from_rgba(rgba: &RgbaImage) -> Self {
        let (w, h) = rgba.dimensions();
        let rgb = RgbImage::from_fn(w, h, |x, y| {
            let p = rgba.get_pixel(x, y).0;
            image::Rgb([p[0], p[1], p[2]])
        });
        let alpha = GrayImage::from_fn(w, h, |x, y| Luma([rgba.get_pixel(x, y).0[3]]));
        Self { rgb, alpha }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.rgb.dimensions()
    }

    pub fn color(&self, x: u32, y: u32) -> Rgb {
        self.rgb.get_pixel(x, y).0
    }

    pub fn alpha_at(&self, x: u32, y: u32) -> u8 {
        self.alpha.get_pixel(x, y).0[0]
    }

    /// Binary mask (255 = foreground) of pixels with alpha above `threshold`.
    pub fn foreground(&self, threshold: u8) -> GrayImage {
        let (w, h) = self.dimensions();
        GrayImage::from_fn(w, h, |x, y| {
            Luma([if self.alpha_at(x, y) > threshold { 255 } else { 0 }])
        })
    }
}

/// Drop the alpha plane of a rendered raster.
pub fn rgb_of(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let p = rgba.get_pixel(x, y).0;
        image::Rgb([p[0], p[1], p[2]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_input_is_all_foreground() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3])));
        let source = SourceImage::from_dynamic(&img);
        let fg = source.foreground(200);
        assert!(fg.pixels().all(|p| p.0[0] == 255));
        assert_eq!(source.color(2, 1), [1, 2, 3]);
    }

    #[test]
    fn alpha_threshold_is_strict() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 200]));
        rgba.put_pixel(1, 0, image::Rgba([0, 0, 0, 201]));
        let fg = SourceImage::from_rgba(&rgba).foreground(200);
        assert_eq!(fg.get_pixel(0, 0).0[0], 0);
        assert_eq!(fg.get_pixel(1, 0).0[0], 255);
    }
}
