//! Decoded pixel buffers and the matching-facing `Image` value.

use crate::image::LumaImage;
use crate::util::math::luma_u8;
use crate::util::{LocateError, LocateResult};
use std::sync::Arc;

/// Similarity required from a needle unless the caller overrides it.
pub const DEFAULT_SIMILARITY: f64 = 0.8;

/// Immutable RGB8 pixel buffer in row-major order.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl PixelBuffer {
    /// Creates a buffer from interleaved RGB bytes (`3 * width * height` long).
    pub fn from_rgb(data: Vec<u8>, width: usize, height: usize) -> LocateResult<Self> {
        if width == 0 || height == 0 {
            return Err(LocateError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .and_then(|v| v.checked_mul(3))
            .ok_or(LocateError::InvalidDimensions { width, height })?;
        if data.len() != needed {
            return Err(LocateError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Creates a buffer from a single grayscale plane by replicating channels.
    pub fn from_gray(data: &[u8], width: usize, height: usize) -> LocateResult<Self> {
        let plane = LumaImage::new(data.to_vec(), width, height)?;
        let rgb = plane.data().iter().flat_map(|&v| [v, v, v]).collect();
        Self::from_rgb(rgb, width, height)
    }

    /// Returns the width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the interleaved RGB bytes.
    pub fn as_rgb(&self) -> &[u8] {
        &self.data
    }

    /// Returns the RGB triple at `(x, y)` if it is within bounds.
    pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = 3 * (y * self.width + x);
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Converts the buffer to a single luma plane.
    pub fn luma(&self) -> LumaImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| luma_u8(px[0], px[1], px[2]))
            .collect();
        LumaImage {
            data,
            width: self.width,
            height: self.height,
        }
    }

    /// Splits the buffer into its R, G, and B planes.
    pub fn channels(&self) -> [LumaImage; 3] {
        let count = self.width * self.height;
        let mut planes = [
            Vec::with_capacity(count),
            Vec::with_capacity(count),
            Vec::with_capacity(count),
        ];
        for px in self.data.chunks_exact(3) {
            planes[0].push(px[0]);
            planes[1].push(px[1]);
            planes[2].push(px[2]);
        }
        planes.map(|data| LumaImage {
            data,
            width: self.width,
            height: self.height,
        })
    }

    /// Copies a rectangular region into a new buffer.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> LocateResult<Self> {
        if width == 0 || height == 0 {
            return Err(LocateError::InvalidDimensions { width, height });
        }
        if x + width > self.width || y + height > self.height {
            return Err(LocateError::RoiOutOfBounds {
                x,
                y,
                width,
                height,
                img_width: self.width,
                img_height: self.height,
            });
        }
        let mut data = Vec::with_capacity(3 * width * height);
        for row in y..y + height {
            let start = 3 * (row * self.width + x);
            data.extend_from_slice(&self.data[start..start + 3 * width]);
        }
        Self::from_rgb(data, width, height)
    }
}

/// A needle or haystack image as seen by the matching strategies.
///
/// The pixel buffer is shared between values; changing the similarity or the
/// target offset yields a new `Image` that points at the same pixels.
#[derive(Clone, Debug)]
pub struct Image {
    pixels: Arc<PixelBuffer>,
    similarity: f64,
    target_offset: (i32, i32),
}

impl Image {
    /// Wraps a decoded buffer with default matching metadata.
    pub fn new(pixels: PixelBuffer) -> Self {
        Self::from_shared(Arc::new(pixels))
    }

    /// Wraps an already shared buffer (e.g. a cache entry).
    pub fn from_shared(pixels: Arc<PixelBuffer>) -> Self {
        Self {
            pixels,
            similarity: DEFAULT_SIMILARITY,
            target_offset: (0, 0),
        }
    }

    /// Convenience constructor from interleaved RGB bytes.
    pub fn from_rgb(data: Vec<u8>, width: usize, height: usize) -> LocateResult<Self> {
        Ok(Self::new(PixelBuffer::from_rgb(data, width, height)?))
    }

    /// Convenience constructor from a grayscale plane.
    pub fn from_gray(data: &[u8], width: usize, height: usize) -> LocateResult<Self> {
        Ok(Self::new(PixelBuffer::from_gray(data, width, height)?))
    }

    /// Returns a copy requiring `similarity` (in `[0, 1]`) from its matches.
    pub fn with_similarity(&self, similarity: f64) -> LocateResult<Self> {
        if !(0.0..=1.0).contains(&similarity) {
            return Err(LocateError::OutOfRange {
                name: "similarity".to_owned(),
                value: similarity,
                min: Some(0.0),
                max: Some(1.0),
            });
        }
        Ok(Self {
            similarity,
            ..self.clone()
        })
    }

    /// Returns a copy whose click target is displaced from the match center.
    pub fn with_target_offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            target_offset: (dx, dy),
            ..self.clone()
        }
    }

    /// Returns the width in pixels.
    pub fn width(&self) -> usize {
        self.pixels.width()
    }

    /// Returns the height in pixels.
    pub fn height(&self) -> usize {
        self.pixels.height()
    }

    /// Returns the similarity required from matches of this image.
    pub fn similarity(&self) -> f64 {
        self.similarity
    }

    /// Returns the displacement from the match center to the click point.
    pub fn target_offset(&self) -> (i32, i32) {
        self.target_offset
    }

    /// Returns the decoded pixels.
    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    /// Returns true when both values share the same pixel buffer.
    pub fn shares_pixels(&self, other: &Image) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    /// Copies a rectangular region into a new image with default metadata.
    pub fn crop(&self, x: usize, y: usize, width: usize, height: usize) -> LocateResult<Self> {
        Ok(Self::new(self.pixels.crop(x, y, width, height)?))
    }
}
