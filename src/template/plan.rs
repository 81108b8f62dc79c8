//! Needle statistics precomputed once per template search.

use crate::image::{ImageView, LumaImage, PixelBuffer};

/// Splits a pixel buffer into the planes a template search compares.
///
/// With `ignore_color` the buffer collapses to a single luma plane;
/// otherwise the R, G and B planes are compared separately and their sums
/// accumulated.
pub fn search_planes(pixels: &PixelBuffer, ignore_color: bool) -> Vec<LumaImage> {
    if ignore_color {
        vec![pixels.luma()]
    } else {
        pixels.channels().into()
    }
}

/// Per-plane needle values with their first and second moments.
pub(crate) struct PlaneStats {
    values: Vec<f64>,
    zero_mean: Vec<f64>,
    sum: f64,
    sum_sq: f64,
    var_sum: f64,
}

impl PlaneStats {
    fn from_view(view: ImageView<'_, u8>) -> Self {
        let mut values = Vec::with_capacity(view.width() * view.height());
        for y in 0..view.height() {
            if let Some(row) = view.row(y) {
                values.extend(row.iter().map(|&v| f64::from(v)));
            }
        }
        let count = values.len() as f64;
        let sum: f64 = values.iter().sum();
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();
        let mean = sum / count;
        let zero_mean: Vec<f64> = values.iter().map(|v| v - mean).collect();
        let var_sum = zero_mean.iter().map(|v| v * v).sum();
        Self {
            values,
            zero_mean,
            sum,
            sum_sq,
            var_sum,
        }
    }

    /// Raw needle values in row-major order.
    pub(crate) fn values(&self) -> &[f64] {
        &self.values
    }

    /// Needle values minus their mean.
    pub(crate) fn zero_mean(&self) -> &[f64] {
        &self.zero_mean
    }

    /// Sum of the needle values.
    pub(crate) fn sum(&self) -> f64 {
        self.sum
    }

    /// Sum of squared needle values.
    pub(crate) fn sum_sq(&self) -> f64 {
        self.sum_sq
    }

    /// Sum of squared deviations from the mean.
    pub(crate) fn var_sum(&self) -> f64 {
        self.var_sum
    }
}

/// Precomputed needle statistics for every compared plane.
pub struct TemplatePlan {
    width: usize,
    height: usize,
    planes: Vec<PlaneStats>,
}

impl TemplatePlan {
    /// Builds a plan from the needle planes.
    pub fn from_planes(planes: &[LumaImage]) -> Self {
        let (width, height) = planes
            .first()
            .map_or((0, 0), |p| (p.width(), p.height()));
        Self {
            width,
            height,
            planes: planes.iter().map(|p| PlaneStats::from_view(p.view())).collect(),
        }
    }

    /// Returns the needle width.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the needle height.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the number of pixels per plane.
    pub(crate) fn count(&self) -> usize {
        self.width * self.height
    }

    pub(crate) fn planes(&self) -> &[PlaneStats] {
        &self.planes
    }
}
