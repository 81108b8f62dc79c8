//! Located candidates and their ordering.
//!
//! Strategies return candidates sorted by descending confidence, breaking
//! ties in row-major order (smaller `y`, then smaller `x`).

use std::cmp::Ordering;

pub(crate) mod nms;

/// Axis-aligned box in haystack pixels where the needle was found.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    /// Left edge.
    pub x: usize,
    /// Top edge.
    pub y: usize,
    /// Box width.
    pub width: usize,
    /// Box height.
    pub height: usize,
    /// Match confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Candidate {
    /// Returns the integer center of the box.
    pub fn center(&self) -> (i64, i64) {
        (
            (self.x + self.width / 2) as i64,
            (self.y + self.height / 2) as i64,
        )
    }

    /// Returns the action point: the center displaced by the needle's
    /// target offset.
    pub fn target(&self, offset: (i32, i32)) -> (i64, i64) {
        let (cx, cy) = self.center();
        (cx + i64::from(offset.0), cy + i64::from(offset.1))
    }

    /// Returns the box translated by `(dx, dy)`.
    pub(crate) fn shifted(self, dx: usize, dy: usize) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..self
        }
    }
}

fn candidate_cmp_desc(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence
        .total_cmp(&a.confidence)
        .then_with(|| a.y.cmp(&b.y))
        .then_with(|| a.x.cmp(&b.x))
}

/// Sorts candidates by descending confidence with deterministic ties.
pub(crate) fn sort_desc(candidates: &mut [Candidate]) {
    candidates.sort_by(candidate_cmp_desc);
}
