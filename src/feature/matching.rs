//! Brute-force descriptor matching with ratio and symmetry filters.

use crate::equalizer::Category;
use crate::feature::describe::Descriptors;
use crate::util::{LocateError, LocateResult};

/// Smoothing added to both distances of the ratio test so that `0 / 0`
/// counts as a ratio of one.
const RATIO_EPS: f64 = 1e-7;

/// Descriptor distance.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Norm {
    /// Number of differing bits.
    Hamming,
    /// Number of differing 2-bit cells.
    Hamming2,
    /// Sum of absolute byte differences.
    L1,
    /// Euclidean distance over bytes.
    L2,
}

impl Norm {
    /// Returns the distance used by a `feature_matcher` algorithm.
    pub fn for_matcher(name: &str) -> LocateResult<Self> {
        match name {
            "BruteForce-Hamming" | "in-house-raw" | "in-house-region" => Ok(Norm::Hamming),
            "BruteForce-Hamming(2)" => Ok(Norm::Hamming2),
            "BruteForce-L1" => Ok(Norm::L1),
            "BruteForce" => Ok(Norm::L2),
            other => Err(LocateError::UnknownAlgorithm {
                category: Category::FeatureMatcher,
                name: other.to_owned(),
            }),
        }
    }

    /// Distance between two descriptors of equal length.
    pub fn distance(self, a: &[u8], b: &[u8]) -> f64 {
        let pairs = a.iter().zip(b);
        match self {
            Norm::Hamming => pairs.map(|(x, y)| (x ^ y).count_ones()).sum::<u32>() as f64,
            Norm::Hamming2 => pairs
                .map(|(x, y)| {
                    let d = x ^ y;
                    ((d | (d >> 1)) & 0x55).count_ones()
                })
                .sum::<u32>() as f64,
            Norm::L1 => pairs
                .map(|(&x, &y)| u32::from(x.abs_diff(y)))
                .sum::<u32>() as f64,
            Norm::L2 => pairs
                .map(|(&x, &y)| {
                    let d = f64::from(x) - f64::from(y);
                    d * d
                })
                .sum::<f64>()
                .sqrt(),
        }
    }
}

/// A correspondence from a query descriptor to a train descriptor.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DMatch {
    /// Index in the query (needle) set.
    pub query: usize,
    /// Index in the train (haystack) set.
    pub train: usize,
    /// Descriptor distance.
    pub distance: f64,
}

/// Returns up to `k` nearest train descriptors for every query descriptor,
/// closest first (ties by train index).
pub fn knn_match(query: &Descriptors, train: &Descriptors, norm: Norm, k: usize) -> Vec<Vec<DMatch>> {
    (0..query.len())
        .map(|q| {
            let mut row: Vec<DMatch> = (0..train.len())
                .map(|t| DMatch {
                    query: q,
                    train: t,
                    distance: norm.distance(query.row(q), train.row(t)),
                })
                .collect();
            row.sort_by(|a, b| {
                a.distance
                    .total_cmp(&b.distance)
                    .then_with(|| a.train.cmp(&b.train))
            });
            row.truncate(k);
            row
        })
        .filter(|row| !row.is_empty())
        .collect()
}

/// Keeps the best neighbour when it is clearly closer than the second one.
///
/// Lists with a single neighbour pass unchanged.
pub fn ratio_test(knn: &[Vec<DMatch>], threshold: f64) -> Vec<DMatch> {
    knn.iter()
        .filter_map(|row| match row.as_slice() {
            [best] => Some(*best),
            [best, second, ..] => {
                let ratio = (best.distance + RATIO_EPS) / (second.distance + RATIO_EPS);
                (ratio < threshold).then_some(*best)
            }
            [] => None,
        })
        .collect()
}

/// Keeps forward matches whose reciprocal match points back.
pub fn symmetry_test(forward: &[DMatch], backward: &[DMatch]) -> Vec<DMatch> {
    forward
        .iter()
        .filter(|f| {
            backward
                .iter()
                .any(|b| b.query == f.train && b.train == f.query)
        })
        .copied()
        .collect()
}

/// Options of the filtering matchers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FilterOptions {
    /// Distance used for matching.
    pub norm: Norm,
    /// Ratio test threshold.
    pub ratio_threshold: f64,
    /// Enables the ratio test.
    pub ratio_test: bool,
    /// Enables the symmetry test.
    pub symmetry_test: bool,
}

fn one_way(query: &Descriptors, train: &Descriptors, options: &FilterOptions) -> Vec<DMatch> {
    let knn = knn_match(query, train, options.norm, 2);
    if options.ratio_test {
        ratio_test(&knn, options.ratio_threshold)
    } else {
        knn.iter().filter_map(|row| row.first().copied()).collect()
    }
}

/// Matches needle descriptors to haystack descriptors, sorted by distance.
pub fn filtered_matches(
    needle: &Descriptors,
    haystack: &Descriptors,
    options: &FilterOptions,
) -> Vec<DMatch> {
    let mut matches = one_way(needle, haystack, options);
    if options.symmetry_test {
        let backward = one_way(haystack, needle, options);
        matches = symmetry_test(&matches, &backward);
    }
    matches.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    matches
}

#[cfg(test)]
mod tests {
    use super::{filtered_matches, knn_match, ratio_test, FilterOptions, Norm};
    use crate::feature::describe::Descriptors;

    #[test]
    fn norms_count_expected_units() {
        let a = [0b0000_0011u8, 10];
        let b = [0b0000_0000u8, 13];
        assert_eq!(Norm::Hamming.distance(&a, &b), 5.0);
        assert_eq!(Norm::Hamming2.distance(&a, &b), 3.0);
        assert_eq!(Norm::L1.distance(&a, &b), 6.0);
        assert!((Norm::L2.distance(&a, &b) - 18f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn ratio_test_rejects_ambiguous_matches() {
        let needle = Descriptors::from_rows(1, &[vec![0b0000_0000], vec![0b1111_0000]]);
        let hay = Descriptors::from_rows(1, &[vec![0b0000_0001], vec![0b0000_0010], vec![0b1111_0000]]);
        let knn = knn_match(&needle, &hay, Norm::Hamming, 2);
        let kept = ratio_test(&knn, 0.65);
        assert_eq!(kept.len(), 1);
        assert_eq!((kept[0].query, kept[0].train), (1, 2));
    }

    #[test]
    fn symmetry_keeps_reciprocal_pairs() {
        let needle = Descriptors::from_rows(1, &[vec![0], vec![1]]);
        let hay = Descriptors::from_rows(1, &[vec![1]]);
        let options = FilterOptions {
            norm: Norm::Hamming,
            ratio_threshold: 0.65,
            ratio_test: false,
            symmetry_test: true,
        };
        let matches = filtered_matches(&needle, &hay, &options);
        assert_eq!(matches.len(), 1);
        assert_eq!((matches[0].query, matches[0].train), (1, 0));
    }
}
