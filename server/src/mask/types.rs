//! Mask types and error definitions

use image::{GrayImage, Luma, imageops};
use thiserror::Error;

/// Axis-aligned box `[min_x, min_y, max_x, max_y]`.
///
/// Floats so that fractional boxes reported by the oracle round-trip unchanged.
pub type BoundingBox = [f32; 4];

/// Errors that can occur when encoding, decoding or combining masks
#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Failed to decode payload: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Mask dimensions differ: {left_width}x{left_height} vs {right_width}x{right_height}")]
    DimensionMismatch {
        left_width: u32,
        left_height: u32,
        right_width: u32,
        right_height: u32,
    },
}

/// Binary region mask, row-major, one flag per pixel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl BinaryMask {
    /// Create an all-false mask
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Build a mask by evaluating `f(x, y)` for every pixel
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let mut bits = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                bits.push(f(x, y));
            }
        }
        Self {
            width,
            height,
            bits,
        }
    }

    /// Threshold a grayscale image: a pixel is set iff its value is above `threshold`
    pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            bits: image.pixels().map(|p| p.0[0] > threshold).collect(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Value at `(x, y)`; false outside the grid
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[self.index(x, y)]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let idx = self.index(x, y);
            self.bits[idx] = value;
        }
    }

    /// Row-major flags
    pub fn as_slice(&self) -> &[bool] {
        &self.bits
    }

    /// Number of set pixels
    pub fn count_ones(&self) -> u64 {
        self.bits.iter().filter(|b| **b).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        !self.bits.iter().any(|b| *b)
    }

    /// 0/255 grayscale rendering of the mask
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            Luma([if self.get(x, y) { 255 } else { 0 }])
        })
    }

    /// Nearest-neighbor resize to the given dimensions
    pub fn resized(&self, width: u32, height: u32) -> Self {
        if self.dimensions() == (width, height) {
            return self.clone();
        }
        let scaled = imageops::resize(&self.to_luma(), width, height, imageops::FilterType::Nearest);
        Self::from_luma(&scaled, 0)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }
}
