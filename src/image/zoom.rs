//! Bilinear rescaling of intensity planes.
//!
//! Feature detection runs on zoomed copies of the needle and haystack
//! (`nzoom` / `hzoom`). Destination pixel centers are mapped back to the
//! source with `src = (dst + 0.5) / factor - 0.5`, so a keypoint found at
//! pixel `X` of the zoomed plane sits at `(X + 0.5) / factor` in source
//! coordinates measured from the left image edge.

use crate::image::{ImageView, LumaImage};
use crate::util::math::sample_bilinear;
use crate::util::{LocateError, LocateResult};

/// Resizes a plane by `factor` using bilinear sampling.
///
/// The output is `round(width * factor) x round(height * factor)` (at least
/// one pixel per axis). A factor of exactly one returns a copy.
pub fn resize_bilinear(src: ImageView<'_, u8>, factor: f64) -> LocateResult<LumaImage> {
    if !factor.is_finite() || factor <= 0.0 {
        return Err(LocateError::OutOfRange {
            name: "zoom".to_owned(),
            value: factor,
            min: Some(0.0),
            max: None,
        });
    }
    if factor == 1.0 {
        return Ok(LumaImage::from_view(src));
    }

    let width = ((src.width() as f64 * factor).round() as usize).max(1);
    let height = ((src.height() as f64 * factor).round() as usize).max(1);
    let sx = src.width() as f32 / width as f32;
    let sy = src.height() as f32 / height as f32;

    let mut out = Vec::with_capacity(width * height);
    for y in 0..height {
        let src_y = (y as f32 + 0.5) * sy - 0.5;
        for x in 0..width {
            let src_x = (x as f32 + 0.5) * sx - 0.5;
            let value = sample_bilinear(src, src_x, src_y);
            out.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }
    LumaImage::new(out, width, height)
}

#[cfg(test)]
mod tests {
    use super::resize_bilinear;
    use crate::image::ImageView;

    #[test]
    fn doubling_preserves_flat_regions() {
        let data = [10u8, 10, 200, 200];
        let view = ImageView::from_slice(&data, 2, 2).unwrap();
        let out = resize_bilinear(view, 2.0).unwrap();
        assert_eq!((out.width(), out.height()), (4, 4));
        let row = out.view().row(0).unwrap().to_vec();
        assert_eq!(row[0], 10);
        assert_eq!(row[3], 10);
        let last = out.view().row(3).unwrap().to_vec();
        assert_eq!(last[0], 200);
    }

    #[test]
    fn unit_factor_copies() {
        let data: Vec<u8> = (0..12).collect();
        let view = ImageView::from_slice(&data, 4, 3).unwrap();
        let out = resize_bilinear(view, 1.0).unwrap();
        assert_eq!(out.data(), &data[..]);
        assert!(resize_bilinear(view, 0.0).is_err());
    }
}
