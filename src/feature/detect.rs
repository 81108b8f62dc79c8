//! Keypoint detectors.
//!
//! All detectors work on a single intensity plane and report keypoints at
//! integer pixel positions. Decisions only depend on a small neighbourhood of
//! each pixel, so an image region pasted into a larger image yields the same
//! keypoints (away from the paste border).

use crate::image::{ImageView, LumaImage};
use std::cmp::Ordering;

/// A detected interest point in plane pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// Column.
    pub x: f32,
    /// Row.
    pub y: f32,
    /// Detector response (larger is stronger).
    pub response: f32,
    /// Orientation in radians; zero until an oriented extractor assigns it.
    pub angle: f32,
}

impl Keypoint {
    fn at(x: usize, y: usize, response: f32) -> Self {
        Self {
            x: x as f32,
            y: y as f32,
            response,
            angle: 0.0,
        }
    }
}

/// Detector selected by the `feature_detector` category.
#[derive(Clone, Debug, PartialEq)]
pub enum Detector {
    /// FAST corners ranked by Harris response.
    Orb {
        n_features: usize,
        fast_threshold: u8,
        edge_threshold: usize,
    },
    /// Plain FAST-9 corners.
    Fast { threshold: u8, nonmax_suppression: bool },
    /// Minimum-eigenvalue corners ("good features to track").
    Gftt {
        max_corners: usize,
        quality_level: f64,
        min_distance: f64,
    },
    /// Harris corners with GFTT-style selection.
    Harris {
        max_corners: usize,
        quality_level: f64,
        min_distance: f64,
        k: f64,
    },
}

impl Detector {
    /// Detects keypoints in `plane`.
    pub fn detect(&self, plane: &LumaImage) -> Vec<Keypoint> {
        let view = plane.view();
        match *self {
            Detector::Orb {
                n_features,
                fast_threshold,
                edge_threshold,
            } => orb_keypoints(view, n_features, fast_threshold, edge_threshold),
            Detector::Fast {
                threshold,
                nonmax_suppression,
            } => fast_corners(view, threshold, nonmax_suppression),
            Detector::Gftt {
                max_corners,
                quality_level,
                min_distance,
            } => good_features(
                view,
                max_corners,
                quality_level,
                min_distance,
                CornerScore::MinEigen,
            ),
            Detector::Harris {
                max_corners,
                quality_level,
                min_distance,
                k,
            } => good_features(
                view,
                max_corners,
                quality_level,
                min_distance,
                CornerScore::Harris(k as f32),
            ),
        }
    }
}

/// Bresenham circle of radius 3 used by FAST.
const CIRCLE: [(isize, isize); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

const FAST_ARC: usize = 9;

fn pixel(view: ImageView<'_, u8>, x: isize, y: isize) -> i32 {
    let cx = x.clamp(0, view.width() as isize - 1) as usize;
    let cy = y.clamp(0, view.height() as isize - 1) as usize;
    view.get(cx, cy).copied().map_or(0, i32::from)
}

/// Returns the FAST score when `(x, y)` is a corner.
fn fast_score(view: ImageView<'_, u8>, x: usize, y: usize, threshold: u8) -> Option<f32> {
    let center = pixel(view, x as isize, y as isize);
    let t = i32::from(threshold);
    let mut states = [0i8; 16];
    let mut bright_sum = 0i32;
    let mut dark_sum = 0i32;
    for (state, &(dx, dy)) in states.iter_mut().zip(CIRCLE.iter()) {
        let p = pixel(view, x as isize + dx, y as isize + dy);
        if p > center + t {
            *state = 1;
            bright_sum += p - center - t;
        } else if p < center - t {
            *state = -1;
            dark_sum += center - t - p;
        }
    }

    let mut run = 0usize;
    let mut run_state = 0i8;
    for i in 0..2 * CIRCLE.len() {
        let state = states[i % CIRCLE.len()];
        if state != 0 && state == run_state {
            run += 1;
        } else {
            run_state = state;
            run = usize::from(state != 0);
        }
        if run >= FAST_ARC {
            return Some(bright_sum.max(dark_sum) as f32);
        }
    }
    None
}

/// Returns true when `score` beats its 8 neighbours. Equal neighbours that
/// come later in raster order lose to the current pixel.
fn is_local_max(scores: &[f32], width: usize, height: usize, x: usize, y: usize) -> bool {
    let score = scores[y * width + x];
    for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
        for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
            if (nx, ny) == (x, y) {
                continue;
            }
            let other = scores[ny * width + nx];
            let later = (ny, nx) > (y, x);
            if other > score || (other == score && !later) {
                return false;
            }
        }
    }
    true
}

/// FAST-9 corners in raster order.
pub(crate) fn fast_corners(view: ImageView<'_, u8>, threshold: u8, nonmax: bool) -> Vec<Keypoint> {
    let (width, height) = (view.width(), view.height());
    if width < 7 || height < 7 {
        return Vec::new();
    }
    let mut scores = vec![0.0f32; width * height];
    for y in 3..height - 3 {
        for x in 3..width - 3 {
            if let Some(score) = fast_score(view, x, y, threshold) {
                scores[y * width + x] = score;
            }
        }
    }

    let mut corners = Vec::new();
    for y in 3..height - 3 {
        for x in 3..width - 3 {
            let score = scores[y * width + x];
            if score <= 0.0 {
                continue;
            }
            if nonmax && !is_local_max(&scores, width, height, x, y) {
                continue;
            }
            corners.push(Keypoint::at(x, y, score));
        }
    }
    corners
}

#[derive(Copy, Clone, Debug)]
enum CornerScore {
    MinEigen,
    Harris(f32),
}

/// Sobel gradients with clamped borders.
struct Gradients {
    width: usize,
    height: usize,
    gx: Vec<f32>,
    gy: Vec<f32>,
}

impl Gradients {
    fn new(view: ImageView<'_, u8>) -> Self {
        let (width, height) = (view.width(), view.height());
        let mut gx = vec![0.0f32; width * height];
        let mut gy = vec![0.0f32; width * height];
        for y in 0..height {
            for x in 0..width {
                let (xi, yi) = (x as isize, y as isize);
                let p = |dx: isize, dy: isize| pixel(view, xi + dx, yi + dy) as f32;
                gx[y * width + x] = (p(1, -1) + 2.0 * p(1, 0) + p(1, 1))
                    - (p(-1, -1) + 2.0 * p(-1, 0) + p(-1, 1));
                gy[y * width + x] = (p(-1, 1) + 2.0 * p(0, 1) + p(1, 1))
                    - (p(-1, -1) + 2.0 * p(0, -1) + p(1, -1));
            }
        }
        Self {
            width,
            height,
            gx,
            gy,
        }
    }

    /// Structure-tensor corner score over a `(2 * radius + 1)^2` block.
    fn score(&self, x: usize, y: usize, radius: usize, kind: CornerScore) -> f32 {
        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        let r = radius as isize;
        for dy in -r..=r {
            for dx in -r..=r {
                let sx = (x as isize + dx).clamp(0, self.width as isize - 1) as usize;
                let sy = (y as isize + dy).clamp(0, self.height as isize - 1) as usize;
                let idx = sy * self.width + sx;
                let (ix, iy) = (self.gx[idx], self.gy[idx]);
                a += ix * ix;
                b += ix * iy;
                c += iy * iy;
            }
        }
        match kind {
            CornerScore::MinEigen => {
                let half_trace = 0.5 * (a + c);
                let diff = 0.5 * (a - c);
                half_trace - (diff * diff + b * b).sqrt()
            }
            CornerScore::Harris(k) => a * c - b * b - k * (a + c) * (a + c),
        }
    }
}

const HARRIS_K: f32 = 0.04;
const ORB_HARRIS_RADIUS: usize = 3;
const GFTT_BLOCK_RADIUS: usize = 1;

fn cmp_response_desc(a: &Keypoint, b: &Keypoint) -> Ordering {
    b.response
        .total_cmp(&a.response)
        .then_with(|| a.y.total_cmp(&b.y))
        .then_with(|| a.x.total_cmp(&b.x))
}

fn orb_keypoints(
    view: ImageView<'_, u8>,
    n_features: usize,
    fast_threshold: u8,
    edge_threshold: usize,
) -> Vec<Keypoint> {
    let (width, height) = (view.width(), view.height());
    let inside = |kp: &Keypoint| {
        let (x, y) = (kp.x as usize, kp.y as usize);
        x >= edge_threshold
            && y >= edge_threshold
            && x + edge_threshold < width
            && y + edge_threshold < height
    };
    let corners: Vec<Keypoint> = fast_corners(view, fast_threshold, true)
        .into_iter()
        .filter(inside)
        .collect();
    if corners.is_empty() {
        return corners;
    }

    let grads = Gradients::new(view);
    let mut ranked: Vec<Keypoint> = corners
        .into_iter()
        .map(|kp| Keypoint {
            response: grads.score(
                kp.x as usize,
                kp.y as usize,
                ORB_HARRIS_RADIUS,
                CornerScore::Harris(HARRIS_K),
            ),
            ..kp
        })
        .collect();
    ranked.sort_by(cmp_response_desc);
    ranked.truncate(n_features);
    ranked
}

fn good_features(
    view: ImageView<'_, u8>,
    max_corners: usize,
    quality_level: f64,
    min_distance: f64,
    kind: CornerScore,
) -> Vec<Keypoint> {
    let (width, height) = (view.width(), view.height());
    let margin = GFTT_BLOCK_RADIUS + 1;
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }
    let grads = Gradients::new(view);
    let mut scores = vec![0.0f32; width * height];
    let mut max_score = 0.0f32;
    for y in margin..height - margin {
        for x in margin..width - margin {
            let s = grads.score(x, y, GFTT_BLOCK_RADIUS, kind);
            scores[y * width + x] = s;
            max_score = max_score.max(s);
        }
    }
    if max_score <= 0.0 {
        return Vec::new();
    }

    let threshold = max_score * quality_level as f32;
    let mut candidates = Vec::new();
    for y in margin..height - margin {
        for x in margin..width - margin {
            let s = scores[y * width + x];
            if s > threshold && is_local_max(&scores, width, height, x, y) {
                candidates.push(Keypoint::at(x, y, s));
            }
        }
    }
    candidates.sort_by(cmp_response_desc);

    let min_dist_sq = (min_distance * min_distance) as f32;
    let mut kept: Vec<Keypoint> = Vec::new();
    for cand in candidates {
        if kept.len() >= max_corners {
            break;
        }
        let crowded = kept.iter().any(|k| {
            let (dx, dy) = (k.x - cand.x, k.y - cand.y);
            dx * dx + dy * dy < min_dist_sq
        });
        if !crowded {
            kept.push(cand);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::{fast_corners, Detector};
    use crate::image::LumaImage;

    fn square_image() -> LumaImage {
        let (w, h) = (32usize, 32usize);
        let mut data = vec![30u8; w * h];
        for y in 10..22 {
            for x in 10..22 {
                data[y * w + x] = 220;
            }
        }
        LumaImage::new(data, w, h).unwrap()
    }

    #[test]
    fn fast_finds_square_corners() {
        let img = square_image();
        let corners = fast_corners(img.view(), 20, true);
        assert!(!corners.is_empty());
        for kp in &corners {
            let near_corner = [(10.0, 10.0), (21.0, 10.0), (10.0, 21.0), (21.0, 21.0)]
                .iter()
                .any(|&(cx, cy): &(f32, f32)| (kp.x - cx).abs() <= 2.0 && (kp.y - cy).abs() <= 2.0);
            assert!(near_corner, "unexpected corner at ({}, {})", kp.x, kp.y);
        }
    }

    #[test]
    fn uniform_plane_has_no_keypoints() {
        let flat = LumaImage::new(vec![77u8; 40 * 40], 40, 40).unwrap();
        let detectors = [
            Detector::Orb {
                n_features: 500,
                fast_threshold: 20,
                edge_threshold: 16,
            },
            Detector::Fast {
                threshold: 20,
                nonmax_suppression: true,
            },
            Detector::Gftt {
                max_corners: 500,
                quality_level: 0.01,
                min_distance: 3.0,
            },
            Detector::Harris {
                max_corners: 500,
                quality_level: 0.01,
                min_distance: 3.0,
                k: 0.04,
            },
        ];
        for detector in detectors {
            assert!(detector.detect(&flat).is_empty(), "{detector:?}");
        }
    }

    #[test]
    fn gftt_respects_min_distance_and_cap() {
        let img = square_image();
        let detector = Detector::Gftt {
            max_corners: 2,
            quality_level: 0.01,
            min_distance: 5.0,
        };
        let kps = detector.detect(&img);
        assert!(kps.len() <= 2 && !kps.is_empty());
        if kps.len() == 2 {
            let (dx, dy) = (kps[0].x - kps[1].x, kps[0].y - kps[1].y);
            assert!(dx * dx + dy * dy >= 25.0);
        }
    }
}
