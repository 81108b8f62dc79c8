//! Normalized correlation kernels for template matching.
//!
//! Every kernel maps a window of the haystack to a score in `[0, 1]` where
//! 1.0 means pixel-identical. Multi-plane searches accumulate the sums of
//! all planes before normalizing.

use crate::image::LumaImage;
use crate::template::TemplatePlan;

pub mod scalar;

#[cfg(feature = "rayon")]
pub mod rayon;

/// Scoring rule of a single window placement.
pub trait Kernel {
    /// Scores the window whose top-left corner is `(x, y)`.
    ///
    /// The caller guarantees that the window lies inside every plane.
    fn score_at(planes: &[LumaImage], plan: &TemplatePlan, x: usize, y: usize) -> f64;
}

const EPS: f64 = 1e-9;

/// Window sums shared by the kernels.
#[derive(Default)]
struct WindowSums {
    dot: f64,
    dot_zero_mean: f64,
    sum_i2: f64,
    ssd: f64,
    /// Sum over planes of the window's squared deviations from its mean.
    var_i: f64,
}

fn window_sums(planes: &[LumaImage], plan: &TemplatePlan, x: usize, y: usize) -> WindowSums {
    let width = plan.width();
    let count = plan.count() as f64;
    let mut sums = WindowSums::default();
    for (plane, stats) in planes.iter().zip(plan.planes()) {
        let view = plane.view();
        let mut p_sum = 0.0;
        let mut p_sum2 = 0.0;
        for ty in 0..plan.height() {
            let Some(row) = view.row(y + ty) else {
                continue;
            };
            let base = ty * width;
            let t_row = &stats.values()[base..base + width];
            let z_row = &stats.zero_mean()[base..base + width];
            let i_row = &row[x..x + width];
            for ((&t, &z), &i) in t_row.iter().zip(z_row).zip(i_row) {
                let i = f64::from(i);
                sums.dot += t * i;
                sums.dot_zero_mean += z * i;
                sums.ssd += (t - i) * (t - i);
                p_sum += i;
                p_sum2 += i * i;
            }
        }
        sums.sum_i2 += p_sum2;
        sums.var_i += p_sum2 - p_sum * p_sum / count;
    }
    sums
}

/// Zero-mean normalized cross-correlation (`ccoeff_normed`).
pub struct CcoeffNormed;

impl Kernel for CcoeffNormed {
    fn score_at(planes: &[LumaImage], plan: &TemplatePlan, x: usize, y: usize) -> f64 {
        let sums = window_sums(planes, plan, x, y);
        let var_t: f64 = plan.planes().iter().map(|p| p.var_sum()).sum();
        let var_i_total = sums.var_i;
        let count = plan.count() as f64;

        if var_t <= EPS || var_i_total <= EPS {
            if var_t > EPS || var_i_total > EPS {
                return 0.0;
            }
            // Both flat: identical only if every plane has the same mean.
            let same = sums_per_plane_equal(planes, plan, x, y, count);
            return if same { 1.0 } else { 0.0 };
        }

        (sums.dot_zero_mean / (var_t * var_i_total).sqrt()).clamp(0.0, 1.0)
    }
}

fn sums_per_plane_equal(
    planes: &[LumaImage],
    plan: &TemplatePlan,
    x: usize,
    y: usize,
    count: f64,
) -> bool {
    planes.iter().zip(plan.planes()).all(|(plane, stats)| {
        let mean_t = stats.sum() / count;
        let value = plane.view().get(x, y).copied().map_or(0.0, f64::from);
        (mean_t - value).abs() < 0.5
    })
}

/// Normalized cross-correlation without mean removal (`ccorr_normed`).
pub struct CcorrNormed;

impl Kernel for CcorrNormed {
    fn score_at(planes: &[LumaImage], plan: &TemplatePlan, x: usize, y: usize) -> f64 {
        let sums = window_sums(planes, plan, x, y);
        let sum_t2: f64 = plan.planes().iter().map(|p| p.sum_sq()).sum();
        let denom = (sum_t2 * sums.sum_i2).sqrt();
        if denom <= EPS {
            return if sum_t2 <= EPS && sums.sum_i2 <= EPS {
                1.0
            } else {
                0.0
            };
        }
        (sums.dot / denom).clamp(0.0, 1.0)
    }
}

/// Normalized squared difference turned into a similarity (`sqdiff_normed`).
pub struct SqdiffNormed;

impl Kernel for SqdiffNormed {
    fn score_at(planes: &[LumaImage], plan: &TemplatePlan, x: usize, y: usize) -> f64 {
        let sums = window_sums(planes, plan, x, y);
        let sum_t2: f64 = plan.planes().iter().map(|p| p.sum_sq()).sum();
        let denom = (sum_t2 * sums.sum_i2).sqrt();
        if denom <= EPS {
            return if sums.ssd <= EPS { 1.0 } else { 0.0 };
        }
        (1.0 - sums.ssd / denom).clamp(0.0, 1.0)
    }
}

/// Dense score map over every valid window placement.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoreMap {
    width: usize,
    height: usize,
    scores: Vec<f64>,
}

impl ScoreMap {
    pub(crate) fn new(width: usize, height: usize, scores: Vec<f64>) -> Self {
        Self {
            width,
            height,
            scores,
        }
    }

    /// Number of horizontal placements.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Number of vertical placements.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Score of the placement at `(x, y)`.
    pub fn get(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.scores.get(y * self.width + x).copied()
    }

    /// Returns the best placement; the first one in row-major order wins ties.
    pub fn best(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, f64)> = None;
        for (idx, &score) in self.scores.iter().enumerate() {
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((idx, score));
            }
        }
        best.map(|(idx, score)| (idx % self.width, idx / self.width, score))
    }

    /// Iterates over `(x, y, score)` in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.scores
            .iter()
            .enumerate()
            .map(move |(idx, &score)| (idx % self.width, idx / self.width, score))
    }
}
