//! Position-consistency matcher ("in-house-region").
//!
//! Descriptor distance only proposes candidates. Every needle keypoint keeps
//! a short list of variants, and the match that disagrees most with the
//! relative layout of the others is repeatedly swapped for its cheapest
//! variant. The layout rule is a [`ConsensusPolicy`]; the default assumes a
//! scale + translation transform with no rotation.

use crate::feature::describe::Descriptors;
use crate::feature::matching::{knn_match, DMatch, Norm};
use crate::trace::trace_debug;

const DIST_EPS: f64 = 1e-7;
/// Floor used so that neither factor of the cost hides the other.
const COST_FLOOR: f64 = 0.001;
/// Matches disagreeing with more than this share of the final set are dropped.
const MAX_DISAGREEMENT: f64 = 0.5;

/// Decides whether two correspondences are geometrically compatible.
pub trait ConsensusPolicy {
    /// `needle_*` and `hay_*` are keypoint positions in original image pixels.
    fn agrees(
        &self,
        needle_a: [f64; 2],
        hay_a: [f64; 2],
        needle_b: [f64; 2],
        hay_b: [f64; 2],
    ) -> bool;
}

/// Two matches agree when the haystack keeps the needle's left/right and
/// up/down ordering on both axes. A coinciding coordinate agrees with
/// anything.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PairwiseOrderPolicy;

fn direction(from: f64, to: f64) -> i8 {
    if to < from {
        -1
    } else if to > from {
        1
    } else {
        0
    }
}

impl ConsensusPolicy for PairwiseOrderPolicy {
    fn agrees(
        &self,
        needle_a: [f64; 2],
        hay_a: [f64; 2],
        needle_b: [f64; 2],
        hay_b: [f64; 2],
    ) -> bool {
        (0..2).all(|axis| {
            let n = direction(needle_a[axis], needle_b[axis]);
            let h = direction(hay_a[axis], hay_b[axis]);
            n == h || n == 0 || h == 0
        })
    }
}

impl<F> ConsensusPolicy for F
where
    F: Fn([f64; 2], [f64; 2], [f64; 2], [f64; 2]) -> bool,
{
    fn agrees(
        &self,
        needle_a: [f64; 2],
        hay_a: [f64; 2],
        needle_b: [f64; 2],
        hay_b: [f64; 2],
    ) -> bool {
        self(needle_a, hay_a, needle_b, hay_b)
    }
}

/// Tuning of the refinement loop.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RegionOptions {
    /// Number of outlier replacements (at least one is performed).
    pub refinements: usize,
    /// Ratings are recomputed every this many refinements.
    pub recalc_interval: usize,
    /// Maximum variants per needle keypoint.
    pub variants_k: usize,
    /// The variant list stops at the first neighbour whose distance ratio to
    /// the previous one falls below this value.
    pub variants_ratio: f64,
}

impl Default for RegionOptions {
    fn default() -> Self {
        Self {
            refinements: 50,
            recalc_interval: 10,
            variants_k: 100,
            variants_ratio: 0.33,
        }
    }
}

struct Layout<'a, P> {
    needle: &'a [[f64; 2]],
    haystack: &'a [[f64; 2]],
    policy: &'a P,
}

impl<P: ConsensusPolicy> Layout<'_, P> {
    fn agree(&self, a: &DMatch, b: &DMatch) -> bool {
        self.policy.agrees(
            self.needle[a.query],
            self.haystack[a.train],
            self.needle[b.query],
            self.haystack[b.train],
        )
    }

    fn disagreement(&self, matches: &[DMatch], candidate: &DMatch) -> f64 {
        if matches.is_empty() {
            return 0.0;
        }
        let conflicts = matches
            .iter()
            .filter(|m| !self.agree(m, candidate))
            .count();
        conflicts as f64 / matches.len() as f64
    }

    /// Positional disagreement times descriptor distance.
    fn cost(&self, matches: &[DMatch], candidate: &DMatch) -> f64 {
        if matches.is_empty() {
            return 0.0;
        }
        let mut ratio = self.disagreement(matches, candidate);
        let mut distance = candidate.distance;
        if ratio == 0.0 && distance != 0.0 {
            ratio = COST_FLOOR;
        } else if distance == 0.0 && ratio != 0.0 {
            distance = COST_FLOOR;
        }
        ratio * distance
    }
}

/// Nearest neighbours of every query, cut where the distance jumps.
pub(crate) fn match_variants(
    query: &Descriptors,
    train: &Descriptors,
    norm: Norm,
    k: usize,
    autostop: f64,
) -> Vec<Vec<DMatch>> {
    let mut rows = knn_match(query, train, norm, k.max(1));
    if autostop > 0.0 {
        for row in &mut rows {
            let cut = (1..row.len()).find(|&ki| {
                (row[ki - 1].distance + DIST_EPS) / (row[ki].distance + DIST_EPS) < autostop
            });
            if let Some(cut) = cut {
                row.truncate(cut);
            }
        }
    }
    rows
}

/// Matches needle to haystack descriptors using relative keypoint layout.
///
/// `needle_points[i]` / `hay_points[j]` are the positions of descriptor rows
/// `i` / `j`. Returns matches sorted by descriptor distance.
pub fn region_match<P: ConsensusPolicy>(
    needle: &Descriptors,
    haystack: &Descriptors,
    needle_points: &[[f64; 2]],
    hay_points: &[[f64; 2]],
    options: &RegionOptions,
    policy: &P,
) -> Vec<DMatch> {
    let variants = match_variants(
        needle,
        haystack,
        Norm::Hamming,
        options.variants_k,
        options.variants_ratio,
    );
    let mut matches: Vec<DMatch> = variants.iter().map(|row| row[0]).collect();
    if matches.is_empty() {
        return matches;
    }
    let layout = Layout {
        needle: needle_points,
        haystack: hay_points,
        policy,
    };

    // Infinite marks a rating that was never computed.
    let mut ratings = vec![f64::INFINITY; matches.len()];
    let interval = options.recalc_interval.max(1);
    for round in 0..options.refinements.max(1) {
        if round % interval == 0 {
            for j in 0..matches.len() {
                // Zero ratings have no better variant left.
                if ratings[j] != 0.0 {
                    ratings[j] = layout.cost(&matches, &matches[j]);
                }
            }
            let quality: f64 = ratings.iter().sum();
            trace_debug!("region_quality", round = round, quality = quality);
            if quality == 0.0 {
                break;
            }
        }

        let mut outlier = 0;
        for (j, &rating) in ratings.iter().enumerate() {
            if rating > ratings[outlier] {
                outlier = j;
            }
        }
        let row = &variants[outlier];
        let current = row
            .iter()
            .position(|v| v.train == matches[outlier].train)
            .unwrap_or(0);

        let mut best: Option<(usize, f64)> = None;
        for (j, variant) in row.iter().enumerate() {
            if j > 0 && row[j - 1].train == variant.train {
                continue;
            }
            matches[outlier] = *variant;
            let cost = layout.cost(&matches, variant);
            if best.map_or(true, |(_, c)| cost < c) {
                best = Some((j, cost));
            }
        }
        if let Some((j, cost)) = best {
            matches[outlier] = row[j];
            ratings[outlier] = if j == current { 0.0 } else { cost };
        }
    }

    let mut kept: Vec<DMatch> = matches
        .iter()
        .filter(|m| layout.disagreement(&matches, m) <= MAX_DISAGREEMENT)
        .copied()
        .collect();
    kept.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    kept
}

#[cfg(test)]
mod tests {
    use super::{match_variants, region_match, ConsensusPolicy, PairwiseOrderPolicy, RegionOptions};
    use crate::feature::describe::Descriptors;
    use crate::feature::matching::Norm;

    #[test]
    fn coinciding_axis_is_a_wildcard() {
        let p = PairwiseOrderPolicy;
        assert!(p.agrees([0.0, 0.0], [5.0, 5.0], [1.0, 1.0], [9.0, 9.0]));
        assert!(p.agrees([0.0, 0.0], [5.0, 5.0], [0.0, 1.0], [1.0, 9.0]));
        assert!(!p.agrees([0.0, 0.0], [5.0, 5.0], [1.0, 1.0], [1.0, 9.0]));
    }

    #[test]
    fn variants_stop_at_distance_jump() {
        let query = Descriptors::from_rows(1, &[vec![0b0000_0000]]);
        let train = Descriptors::from_rows(1, &[vec![0b1111_1111], vec![0b0000_0000], vec![0b0000_0001]]);
        let rows = match_variants(&query, &train, Norm::Hamming, 10, 0.33);
        assert_eq!(rows[0].len(), 1);
        assert_eq!(rows[0][0].train, 1);

        let rows = match_variants(&query, &train, Norm::Hamming, 10, 0.0);
        assert_eq!(rows[0].len(), 3);
    }

    #[test]
    fn misplaced_match_is_replaced_by_consistent_variant() {
        let needle = Descriptors::from_rows(
            1,
            &[vec![0b0000_0000], vec![0b0000_1111], vec![0b1111_0000], vec![0b1111_1111]],
        );
        let haystack = Descriptors::from_rows(
            1,
            &[
                vec![0b0000_0000],
                vec![0b0000_1111],
                vec![0b1111_0000],
                vec![0b1111_1100],
                vec![0b1111_1110],
            ],
        );
        let needle_points = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 10.0]];
        let hay_points = [
            [100.0, 100.0],
            [110.0, 100.0],
            [100.0, 110.0],
            [110.0, 110.0],
            [50.0, 150.0],
        ];
        let matches = region_match(
            &needle,
            &haystack,
            &needle_points,
            &hay_points,
            &RegionOptions::default(),
            &PairwiseOrderPolicy,
        );
        let pairs: Vec<_> = matches.iter().map(|m| (m.query, m.train)).collect();
        assert_eq!(pairs, [(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn closures_act_as_policies() {
        let never = |_: [f64; 2], _: [f64; 2], _: [f64; 2], _: [f64; 2]| false;
        let desc = Descriptors::from_rows(1, &[vec![0], vec![1]]);
        let points = [[0.0, 0.0], [5.0, 5.0]];
        let matches = region_match(&desc, &desc, &points, &points, &RegionOptions::default(), &never);
        assert!(matches.is_empty());
    }
}
