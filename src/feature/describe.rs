//! Binary descriptors (BRIEF and oriented BRIEF).
//!
//! Both extractors compare pairs of box-smoothed intensities at offsets drawn
//! from a fixed pseudo-random pattern inside the patch disc. The ORB variant
//! rotates the pattern by the intensity-centroid orientation of the keypoint.

use crate::feature::detect::Keypoint;
use crate::image::{ImageView, LumaImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const PATTERN_SEED: u64 = 0x5eed_b41e;
const SMOOTH_RADIUS: usize = 2;

/// Descriptor flavour selected by the `feature_extractor` category.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExtractorKind {
    /// Unoriented BRIEF.
    Brief,
    /// Rotation-aware BRIEF.
    Orb,
}

/// Row-major descriptor matrix; one row of `bytes` per keypoint.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Descriptors {
    bytes: usize,
    data: Vec<u8>,
}

impl Descriptors {
    /// Creates a matrix from rows of equal length.
    pub fn from_rows(bytes: usize, rows: &[Vec<u8>]) -> Self {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self { bytes, data }
    }

    /// Returns the number of descriptors.
    pub fn len(&self) -> usize {
        if self.bytes == 0 {
            0
        } else {
            self.data.len() / self.bytes
        }
    }

    /// Returns true when there are no descriptors.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns descriptor `idx`.
    pub fn row(&self, idx: usize) -> &[u8] {
        &self.data[idx * self.bytes..(idx + 1) * self.bytes]
    }
}

/// Descriptor extractor with its sampling pattern.
#[derive(Clone, Debug)]
pub struct Extractor {
    kind: ExtractorKind,
    patch_size: usize,
    pattern: Vec<[i32; 4]>,
}

impl Extractor {
    /// Builds an extractor producing `bytes`-long descriptors over a
    /// `patch_size` square patch.
    pub fn new(kind: ExtractorKind, bytes: usize, patch_size: usize) -> Self {
        Self {
            kind,
            patch_size,
            pattern: sampling_pattern(bytes, patch_size / 2),
        }
    }

    /// Returns the descriptor length in bytes.
    pub fn bytes(&self) -> usize {
        self.pattern.len() / 8
    }

    /// Minimum distance between a keypoint and the plane border.
    pub fn border(&self) -> usize {
        self.patch_size / 2 + SMOOTH_RADIUS
    }

    /// Computes descriptors, dropping keypoints too close to the border.
    ///
    /// Returns the surviving keypoints (with orientation for ORB) alongside
    /// their descriptor rows.
    pub fn compute(&self, plane: &LumaImage, keypoints: Vec<Keypoint>) -> (Vec<Keypoint>, Descriptors) {
        let view = plane.view();
        let border = self.border();
        let (width, height) = (view.width(), view.height());
        let smoothed = box_smooth(view, SMOOTH_RADIUS);
        let radius = (self.patch_size / 2) as i32;

        let mut kept = Vec::new();
        let mut data = Vec::new();
        for mut kp in keypoints {
            let (x, y) = (kp.x as usize, kp.y as usize);
            if x < border || y < border || x + border >= width || y + border >= height {
                continue;
            }
            let (sin, cos) = match self.kind {
                ExtractorKind::Brief => (0.0f32, 1.0f32),
                ExtractorKind::Orb => {
                    kp.angle = centroid_angle(view, x, y, radius);
                    kp.angle.sin_cos()
                }
            };
            let at = |dx: i32, dy: i32| -> u32 {
                let (rx, ry) = rotate(dx, dy, sin, cos);
                let sx = (x as i32 + rx).clamp(0, width as i32 - 1) as usize;
                let sy = (y as i32 + ry).clamp(0, height as i32 - 1) as usize;
                smoothed[sy * width + sx]
            };
            for tests in self.pattern.chunks(8) {
                let mut byte = 0u8;
                for (bit, &[x1, y1, x2, y2]) in tests.iter().enumerate() {
                    if at(x1, y1) < at(x2, y2) {
                        byte |= 1 << bit;
                    }
                }
                data.push(byte);
            }
            kept.push(kp);
        }
        let bytes = self.bytes();
        (kept, Descriptors { bytes, data })
    }
}

fn rotate(dx: i32, dy: i32, sin: f32, cos: f32) -> (i32, i32) {
    let (fx, fy) = (dx as f32, dy as f32);
    (
        (fx * cos - fy * sin).round() as i32,
        (fx * sin + fy * cos).round() as i32,
    )
}

/// Point pairs drawn uniformly from the disc of `radius`.
fn sampling_pattern(bytes: usize, radius: usize) -> Vec<[i32; 4]> {
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let r = radius as i32;
    let mut point = || loop {
        let dx = rng.random_range(-r..=r);
        let dy = rng.random_range(-r..=r);
        if dx * dx + dy * dy <= r * r {
            return (dx, dy);
        }
    };
    (0..bytes * 8)
        .map(|_| {
            let (x1, y1) = point();
            let (x2, y2) = point();
            [x1, y1, x2, y2]
        })
        .collect()
}

/// Sum over a `(2 * radius + 1)^2` box with clamped borders, via an
/// integral image.
fn box_smooth(view: ImageView<'_, u8>, radius: usize) -> Vec<u32> {
    let (width, height) = (view.width(), view.height());
    let stride = width + 1;
    let mut integral = vec![0u32; stride * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0u32;
        let row = view.row(y).unwrap_or(&[]);
        for (x, &v) in row.iter().enumerate() {
            row_sum += u32::from(v);
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }

    let mut out = vec![0u32; width * height];
    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            out[y * width + x] = integral[y1 * stride + x1] + integral[y0 * stride + x0]
                - integral[y0 * stride + x1]
                - integral[y1 * stride + x0];
        }
    }
    out
}

/// Orientation of the intensity centroid inside the disc of `radius`.
fn centroid_angle(view: ImageView<'_, u8>, x: usize, y: usize, radius: i32) -> f32 {
    let (mut m01, mut m10) = (0.0f32, 0.0f32);
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy > radius * radius {
                continue;
            }
            let sx = (x as i32 + dx) as usize;
            let sy = (y as i32 + dy) as usize;
            let v = view.get(sx, sy).copied().map_or(0.0, f32::from);
            m10 += dx as f32 * v;
            m01 += dy as f32 * v;
        }
    }
    m01.atan2(m10)
}
