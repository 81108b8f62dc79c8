//! Image buffers, views, and the needle/haystack image model.
//!
//! `ImageView` is a borrowed single-channel 2D view into a 1D buffer with an
//! explicit stride. The stride counts elements between the starts of
//! consecutive rows, so a stride larger than the width represents padded rows.
//! ROI slices are zero-copy views into the same backing slice and retain the
//! original stride.
//!
//! `PixelBuffer` holds decoded RGB8 pixels and `Image` pairs a shared buffer
//! with the per-use matching metadata (similarity and target offset).

use crate::util::{LocateError, LocateResult};

mod buffer;
pub mod cache;
#[cfg(feature = "image-io")]
pub mod io;
pub mod zoom;

pub use buffer::{Image, PixelBuffer, DEFAULT_SIMILARITY};
pub use cache::{ImageCache, ImageLoader, ImageSource};

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone, Debug)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> LocateResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> LocateResult<Self> {
        let needed = required_len(width, height, stride)?;
        if data.len() < needed {
            return Err(LocateError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the stride in elements between row starts.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Returns the element at `(x, y)` if it is within bounds.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y.checked_mul(self.stride)?.checked_add(x)?;
        self.data.get(idx)
    }

    /// Returns a contiguous slice for row `y` with length `width`.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y.checked_mul(self.stride)?;
        let end = start.checked_add(self.width)?;
        self.data.get(start..end)
    }

    /// Returns a zero-copy ROI view into the same backing buffer.
    pub fn roi(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> LocateResult<ImageView<'a, T>> {
        if width == 0 || height == 0 {
            return Err(LocateError::InvalidDimensions { width, height });
        }
        let out_of_bounds = LocateError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let end_x = x.checked_add(width).ok_or_else(|| out_of_bounds.clone())?;
        let end_y = y.checked_add(height).ok_or_else(|| out_of_bounds.clone())?;
        if end_x > self.width || end_y > self.height {
            return Err(out_of_bounds);
        }

        let start = y * self.stride + x;
        let data = self.data.get(start..).ok_or(LocateError::BufferTooSmall {
            needed: start.saturating_add(1),
            got: self.data.len(),
        })?;
        ImageView::new(data, width, height, self.stride)
    }
}

fn required_len(width: usize, height: usize, stride: usize) -> LocateResult<usize> {
    if width == 0 || height == 0 {
        return Err(LocateError::InvalidDimensions { width, height });
    }
    if stride < width {
        return Err(LocateError::InvalidDimensions {
            width: stride,
            height,
        });
    }
    (height - 1)
        .checked_mul(stride)
        .and_then(|v| v.checked_add(width))
        .ok_or(LocateError::InvalidDimensions { width, height })
}

/// Owned contiguous single-channel image (intensity plane).
#[derive(Clone, Debug, PartialEq)]
pub struct LumaImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl LumaImage {
    /// Creates an owned plane from a contiguous buffer of exactly `width * height` bytes.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> LocateResult<Self> {
        let needed = required_len(width, height, width)?;
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

    /// Copies a (possibly strided) view into a contiguous plane.
    pub fn from_view(view: ImageView<'_, u8>) -> Self {
        let mut data = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            if let Some(row) = view.row(y) {
                data.extend_from_slice(row);
            }
        }
        Self {
            data,
            width: view.width(),
            height: view.height(),
        }
    }

    /// Returns the plane width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the plane height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the raw row-major buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns a borrowed view of the plane.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ImageView, LumaImage};
    use crate::util::LocateError;

    #[test]
    fn roi_shares_stride_and_values() {
        let data: Vec<u8> = (0u8..16).collect();
        let view = ImageView::from_slice(&data, 4, 4).unwrap();
        let roi = view.roi(1, 1, 2, 2).unwrap();
        assert_eq!(roi.stride(), 4);
        assert_eq!(roi.row(0).unwrap(), &[5u8, 6u8]);
        assert_eq!(roi.row(1).unwrap(), &[9u8, 10u8]);
        assert!(roi.get(2, 0).is_none());

        let plane = LumaImage::from_view(roi);
        assert_eq!(plane.data(), &[5u8, 6, 9, 10]);
    }

    #[test]
    fn roi_rejects_out_of_bounds() {
        let data = [0u8; 16];
        let view = ImageView::from_slice(&data, 4, 4).unwrap();
        assert_eq!(
            view.roi(3, 3, 2, 2).err(),
            Some(LocateError::RoiOutOfBounds {
                x: 3,
                y: 3,
                width: 2,
                height: 2,
                img_width: 4,
                img_height: 4,
            })
        );
    }

    #[test]
    fn luma_image_requires_exact_buffer() {
        assert_eq!(
            LumaImage::new(vec![0u8; 3], 2, 2).err(),
            Some(LocateError::BufferTooSmall { needed: 4, got: 3 })
        );
        assert_eq!(
            ImageView::from_slice(&[0u8; 4], 0, 1).err(),
            Some(LocateError::InvalidDimensions {
                width: 0,
                height: 1
            })
        );
    }
}
