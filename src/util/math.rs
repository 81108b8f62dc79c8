//! Numeric helpers shared by the matching strategies.

use crate::image::ImageView;

/// Converts an RGB triple to luma with ITU-R BT.601 integer weights.
#[inline]
pub(crate) fn luma_u8(r: u8, g: u8, b: u8) -> u8 {
    let sum = 299 * u32::from(r) + 587 * u32::from(g) + 114 * u32::from(b);
    ((sum + 500) / 1000) as u8
}

/// Samples a grayscale view at a fractional position with bilinear weights.
///
/// Coordinates are pixel centers; positions outside the image are clamped to
/// the border.
pub(crate) fn sample_bilinear(src: ImageView<'_, u8>, x: f32, y: f32) -> f32 {
    let max_x = (src.width() - 1) as f32;
    let max_y = (src.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let px = |xx: usize, yy: usize| src.get(xx, yy).copied().unwrap_or(0) as f32;
    let a = px(x0, y0);
    let b = px(x1, y0);
    let c = px(x0, y1);
    let d = px(x1, y1);

    a * (1.0 - fx) * (1.0 - fy) + b * fx * (1.0 - fy) + c * (1.0 - fx) * fy + d * fx * fy
}

/// Signed area of a polygon (shoelace formula); positive for clockwise
/// vertex order in image coordinates (y pointing down).
pub(crate) fn signed_area(points: &[[f64; 2]]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut acc = 0.0;
    for i in 0..n {
        let [x0, y0] = points[i];
        let [x1, y1] = points[(i + 1) % n];
        acc += x0 * y1 - x1 * y0;
    }
    0.5 * acc
}

/// Returns true when every turn of the closed polygon has the same sign.
pub(crate) fn is_convex(points: &[[f64; 2]]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let [ax, ay] = points[i];
        let [bx, by] = points[(i + 1) % n];
        let [cx, cy] = points[(i + 2) % n];
        let cross = (bx - ax) * (cy - by) - (by - ay) * (cx - bx);
        if cross.abs() < 1e-12 {
            return false;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    true
}
