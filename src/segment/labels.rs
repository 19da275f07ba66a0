use std::collections::BTreeMap;

use crate::mask::RegionMask;

/// Sentinel for pixels outside every region.
pub const BACKGROUND: u32 = u32::MAX;

/// Dense per-pixel region ids, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    width: u32,
    height: u32,
    data: Vec<u32>,
}

impl LabelMap {
    /// A map with every pixel set to background.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![BACKGROUND; (width as usize) * (height as usize)],
        }
    }

    /// Wrap raw ids. Returns `None` if the length doesn't match the size.
    pub fn from_raw(width: u32, height: u32, data: Vec<u32>) -> Option<Self> {
        (data.len() == (width as usize) * (height as usize)).then_some(Self {
            width,
            height,
            data,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn get(&self, x: u32, y: u32) -> Option<u32> {
        let id = self.data[(y * self.width + x) as usize];
        (id != BACKGROUND).then_some(id)
    }

    pub fn set(&mut self, x: u32, y: u32, id: Option<u32>) {
        self.data[(y * self.width + x) as usize] = id.unwrap_or(BACKGROUND);
    }

    /// One past the largest id in use (0 when all background).
    pub fn id_bound(&self) -> usize {
        self.data
            .iter()
            .filter(|&&id| id != BACKGROUND)
            .map(|&id| id as usize + 1)
            .max()
            .unwrap_or(0)
    }

    /// Produce a new map through `f`; `None` maps a pixel to background.
    pub fn relabel(&self, f: impl Fn(u32) -> Option<u32>) -> Self {
        let data = self
            .data
            .iter()
            .map(|&id| {
                if id == BACKGROUND {
                    BACKGROUND
                } else {
                    f(id).unwrap_or(BACKGROUND)
                }
            })
            .collect();
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Remap ids to a dense `0..n` range, preserving their relative order.
    pub fn compact(&self) -> (Self, usize) {
        let mut ids: BTreeMap<u32, u32> = BTreeMap::new();
        for &id in &self.data {
            if id != BACKGROUND {
                ids.insert(id, 0);
            }
        }
        for (next, slot) in ids.values_mut().enumerate() {
            *slot = next as u32;
        }
        let count = ids.len();
        (self.relabel(|id| ids.get(&id).copied()), count)
    }

    /// Per-region pixel lists, built once and shared by every later stage.
    pub fn index(&self) -> RegionIndex {
        let mut pixels = vec![Vec::new(); self.id_bound()];
        for y in 0..self.height {
            for x in 0..self.width {
                if let Some(id) = self.get(x, y) {
                    pixels[id as usize].push((x, y));
                }
            }
        }
        RegionIndex {
            width: self.width,
            height: self.height,
            pixels,
        }
    }
}

/// Pixel lists per region id, for mask reconstruction without rescanning.
#[derive(Debug, Clone)]
pub struct RegionIndex {
    width: u32,
    height: u32,
    pixels: Vec<Vec<(u32, u32)>>,
}

impl RegionIndex {
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn pixels(&self, id: u32) -> &[(u32, u32)] {
        self.pixels.get(id as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn mask(&self, id: u32, pad: u32) -> Option<RegionMask> {
        RegionMask::from_pixels(self.pixels(id), pad, self.width, self.height)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_closes_gaps() {
        let map = LabelMap::from_raw(3, 1, vec![7, BACKGROUND, 3]).unwrap();
        let (compact, count) = map.compact();
        assert_eq!(count, 2);
        assert_eq!(compact.get(0, 0), Some(1));
        assert_eq!(compact.get(1, 0), None);
        assert_eq!(compact.get(2, 0), Some(0));
    }

    #[test]
    fn index_lists_pixels_per_region() {
        let map = LabelMap::from_raw(2, 2, vec![0, 1, 1, BACKGROUND]).unwrap();
        let index = map.index();
        assert_eq!(index.len(), 2);
        assert_eq!(index.pixels(1), &[(1, 0), (0, 1)]);
        assert!(index.pixels(5).is_empty());
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(LabelMap::from_raw(2, 2, vec![0; 3]).is_none());
    }
}
