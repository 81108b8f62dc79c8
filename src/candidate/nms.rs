//! Non-maximum suppression for overlapping windows.

use crate::candidate::{sort_desc, Candidate};

/// Keeps the best window of every overlapping cluster.
///
/// Candidates are sorted by descending confidence; a candidate is dropped
/// when its top-left corner lies within half a window (per axis) of a window
/// that was already kept.
pub(crate) fn suppress_overlaps(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    sort_desc(&mut candidates);
    let mut kept: Vec<Candidate> = Vec::new();

    'outer: for cand in candidates {
        for keep in kept.iter() {
            let dx = cand.x.abs_diff(keep.x);
            let dy = cand.y.abs_diff(keep.y);
            if 2 * dx <= keep.width && 2 * dy <= keep.height {
                continue 'outer;
            }
        }
        kept.push(cand);
    }

    kept
}

#[cfg(test)]
mod tests {
    use super::suppress_overlaps;
    use crate::candidate::Candidate;

    fn window(x: usize, y: usize, confidence: f64) -> Candidate {
        Candidate {
            x,
            y,
            width: 10,
            height: 10,
            confidence,
        }
    }

    #[test]
    fn neighbours_of_a_peak_are_suppressed() {
        let kept = suppress_overlaps(vec![
            window(20, 20, 0.8),
            window(21, 20, 0.95),
            window(25, 25, 0.9),
            window(40, 20, 0.85),
        ]);
        let coords: Vec<_> = kept.iter().map(|c| (c.x, c.y)).collect();
        assert_eq!(coords, [(21, 20), (40, 20)]);
    }
}
