//! Cropped binary masks for per-region morphology.
//!
//! A region usually covers a tiny fraction of the image, so every mask is
//! stored as its padded bounding box plus an offset. Morphology uses
//! square (L∞) structuring elements: `k = 1` is a 3×3 kernel, `k = 2` a
//! 5×5 kernel, which equals two 3×3 passes.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;

/// Padding that keeps every morphology pass in this crate inside the crop.
pub const DEFAULT_PAD: u32 = 4;

#[derive(Debug, Clone)]
pub struct RegionMask {
    /// Image-space position of the crop's top-left pixel.
    pub x0: u32,
    pub y0: u32,
    /// 255 = inside, 0 = outside.
    pub image: GrayImage,
}

impl RegionMask {
    /// Build a mask from image-space pixel coordinates, clipped to the image.
    pub fn from_pixels(pixels: &[(u32, u32)], pad: u32, width: u32, height: u32) -> Option<Self> {
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);
        for &(x, y) in pixels {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
        if pixels.is_empty() || width == 0 || height == 0 {
            return None;
        }
        let x0 = min_x.saturating_sub(pad);
        let y0 = min_y.saturating_sub(pad);
        let x1 = (max_x + pad).min(width - 1);
        let y1 = (max_y + pad).min(height - 1);
        let mut image = GrayImage::new(x1 - x0 + 1, y1 - y0 + 1);
        for &(x, y) in pixels {
            image.put_pixel(x - x0, y - y0, Luma([255]));
        }
        Some(Self { x0, y0, image })
    }

    fn with_image(&self, image: GrayImage) -> Self {
        Self {
            x0: self.x0,
            y0: self.y0,
            image,
        }
    }

    pub fn count(&self) -> usize {
        self.image.pixels().filter(|p| p.0[0] > 0).count()
    }

    /// Image-space coordinates of set pixels, row-major.
    pub fn pixels(&self) -> Vec<(u32, u32)> {
        self.image
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (x + self.x0, y + self.y0))
            .collect()
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        if x < self.x0 || y < self.y0 {
            return false;
        }
        let (lx, ly) = (x - self.x0, y - self.y0);
        lx < self.image.width() && ly < self.image.height() && self.image.get_pixel(lx, ly).0[0] > 0
    }

    pub fn dilate(&self, k: u8) -> Self {
        self.with_image(imageproc::morphology::dilate(&self.image, Norm::LInf, k))
    }

    pub fn erode(&self, k: u8) -> Self {
        self.with_image(imageproc::morphology::erode(&self.image, Norm::LInf, k))
    }

    pub fn close(&self, k: u8) -> Self {
        self.with_image(imageproc::morphology::close(&self.image, Norm::LInf, k))
    }

    /// Pixels added by a `k` dilation: the band just outside the mask.
    pub fn ring(&self, k: u8) -> Vec<(u32, u32)> {
        let dilated = imageproc::morphology::dilate(&self.image, Norm::LInf, k);
        dilated
            .enumerate_pixels()
            .filter(|(x, y, p)| p.0[0] > 0 && self.image.get_pixel(*x, *y).0[0] == 0)
            .map(|(x, y, _)| (x + self.x0, y + self.y0))
            .collect()
    }

    /// Erode progressively, falling back to a shallower interior (and
    /// finally the mask itself) while fewer than `min_pixels` survive.
    ///
    /// `depths` lists erosion radii from deepest to shallowest.
    pub fn interior(&self, depths: &[(u8, usize)]) -> Self {
        for &(k, min_pixels) in depths {
            let eroded = self.erode(k);
            if eroded.count() >= min_pixels {
                return eroded;
            }
        }
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x0: u32, y0: u32, side: u32) -> Vec<(u32, u32)> {
        let mut pixels = Vec::new();
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                pixels.push((x, y));
            }
        }
        pixels
    }

    #[test]
    fn crop_keeps_image_coordinates() {
        let pixels = square(10, 20, 5);
        let mask = RegionMask::from_pixels(&pixels, DEFAULT_PAD, 100, 100).unwrap();
        assert_eq!((mask.x0, mask.y0), (6, 16));
        assert_eq!(mask.count(), 25);
        assert_eq!(mask.pixels(), pixels);
        assert!(mask.contains(14, 24));
        assert!(!mask.contains(15, 24));
    }

    #[test]
    fn erosion_and_ring_sizes() {
        let mask = RegionMask::from_pixels(&square(10, 10, 6), DEFAULT_PAD, 64, 64).unwrap();
        assert_eq!(mask.erode(1).count(), 16);
        assert_eq!(mask.erode(2).count(), 4);
        // 5x5 dilation of a 6x6 square is 10x10.
        assert_eq!(mask.ring(2).len(), 100 - 36);
    }

    #[test]
    fn interior_falls_back_to_mask() {
        let mask = RegionMask::from_pixels(&square(3, 3, 3), DEFAULT_PAD, 20, 20).unwrap();
        let inner = mask.interior(&[(2, 10), (1, 5)]);
        assert_eq!(inner.count(), 9);
    }

    #[test]
    fn clipped_at_image_edge() {
        let mask = RegionMask::from_pixels(&square(0, 0, 2), DEFAULT_PAD, 10, 10).unwrap();
        assert_eq!((mask.x0, mask.y0), (0, 0));
        assert_eq!(mask.image.dimensions(), (6, 6));
    }
}
