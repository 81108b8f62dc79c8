//! Keypoint feature matching strategy.
//!
//! The needle and haystack are converted to luma and optionally zoomed
//! (`nzoom` / `hzoom`). Keypoints are detected and described, matched either
//! by descriptor filters or by the position-consistency matcher, and
//! verified with a RANSAC homography. The projected needle outline must stay
//! a plausible convex quadrilateral; its bounding box is the candidate.

use crate::candidate::Candidate;
use crate::equalizer::{Category, Equalizer};
use crate::finder::Strategy;
use crate::image::zoom::resize_bilinear;
use crate::image::{Image, LumaImage};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::math::{is_convex, signed_area};
use crate::util::{LocateError, LocateResult};

pub mod describe;
pub mod detect;
pub mod homography;
pub mod matching;
pub mod region;

pub use describe::{Descriptors, Extractor, ExtractorKind};
pub use detect::{Detector, Keypoint};
pub use homography::{RansacConfig, RansacFit};
pub use matching::{DMatch, FilterOptions, Norm};
pub use region::{ConsensusPolicy, PairwiseOrderPolicy, RegionOptions};

/// Reprojection threshold used when the active localization method has no
/// `ransac_reproj_threshold` parameter.
const DEFAULT_REPROJ_THRESHOLD: f64 = 3.0;
/// Largest accepted change of the needle aspect ratio after projection.
const MAX_ASPECT_DISTORTION: f64 = 4.0;
const RANSAC_SEED: u64 = 0x7a46_e7c4;

/// Correspondence search configured by the `feature_matcher` category.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MatcherConfig {
    /// Nearest neighbour with optional ratio and symmetry filters.
    Filtering(FilterOptions),
    /// Position-consistency refinement.
    Region(RegionOptions),
}

impl MatcherConfig {
    fn from_equalizer(eq: &Equalizer) -> LocateResult<Self> {
        let cat = Category::FeatureMatcher;
        let name = eq.active(cat);
        if name == "in-house-region" {
            return Ok(MatcherConfig::Region(RegionOptions {
                refinements: count(eq, cat, "refinements")?,
                recalc_interval: count(eq, cat, "recalc_interval")?,
                variants_k: count(eq, cat, "variants_k")?,
                variants_ratio: eq.float(cat, "variants_ratio")?,
            }));
        }
        Ok(MatcherConfig::Filtering(FilterOptions {
            norm: Norm::for_matcher(name)?,
            ratio_threshold: eq.float(cat, "ratio_threshold")?,
            ratio_test: eq.flag(cat, "ratio_test")?,
            symmetry_test: eq.flag(cat, "symmetry_test")?,
        }))
    }
}

fn count(eq: &Equalizer, category: Category, name: &str) -> LocateResult<usize> {
    Ok(eq.int(category, name)?.max(0) as usize)
}

fn byte(eq: &Equalizer, category: Category, name: &str) -> LocateResult<u8> {
    Ok(eq.int(category, name)?.clamp(0, 255) as u8)
}

fn detector_from_equalizer(eq: &Equalizer) -> LocateResult<Detector> {
    let cat = Category::FeatureDetector;
    match eq.active(cat) {
        "ORB" => Ok(Detector::Orb {
            n_features: count(eq, cat, "nFeatures")?,
            fast_threshold: byte(eq, cat, "fastThreshold")?,
            edge_threshold: count(eq, cat, "edgeThreshold")?,
        }),
        "FAST" => Ok(Detector::Fast {
            threshold: byte(eq, cat, "threshold")?,
            nonmax_suppression: eq.flag(cat, "nonmaxSuppression")?,
        }),
        "GFTT" => Ok(Detector::Gftt {
            max_corners: count(eq, cat, "maxCorners")?,
            quality_level: eq.float(cat, "qualityLevel")?,
            min_distance: eq.float(cat, "minDistance")?,
        }),
        "HARRIS" => Ok(Detector::Harris {
            max_corners: count(eq, cat, "maxCorners")?,
            quality_level: eq.float(cat, "qualityLevel")?,
            min_distance: eq.float(cat, "minDistance")?,
            k: eq.float(cat, "k")?,
        }),
        other => Err(LocateError::UnknownAlgorithm {
            category: cat,
            name: other.to_owned(),
        }),
    }
}

fn extractor_from_equalizer(eq: &Equalizer) -> LocateResult<Extractor> {
    let cat = Category::FeatureExtractor;
    let kind = match eq.active(cat) {
        "BRIEF" => ExtractorKind::Brief,
        "ORB" => ExtractorKind::Orb,
        other => {
            return Err(LocateError::UnknownAlgorithm {
                category: cat,
                name: other.to_owned(),
            })
        }
    };
    Ok(Extractor::new(
        kind,
        count(eq, cat, "bytes")?,
        count(eq, cat, "patchSize")?,
    ))
}

/// Feature matching configured from the equalizer.
#[derive(Clone, Debug)]
pub struct FeatureStrategy<P = PairwiseOrderPolicy> {
    detector: Detector,
    extractor: Extractor,
    matcher: MatcherConfig,
    needle_zoom: f64,
    haystack_zoom: f64,
    ransac: RansacConfig,
    policy: P,
}

impl FeatureStrategy {
    /// Reads the active detector, extractor and matcher with their
    /// parameters.
    pub fn from_equalizer(eq: &Equalizer) -> LocateResult<Self> {
        let reproj = match eq.float(Category::Localization, "ransac_reproj_threshold") {
            Ok(value) => value,
            Err(LocateError::UnknownParameter { .. }) => DEFAULT_REPROJ_THRESHOLD,
            Err(err) => return Err(err),
        };
        Ok(Self {
            detector: detector_from_equalizer(eq)?,
            extractor: extractor_from_equalizer(eq)?,
            matcher: MatcherConfig::from_equalizer(eq)?,
            needle_zoom: eq.float(Category::FeatureDetector, "nzoom")?,
            haystack_zoom: eq.float(Category::FeatureDetector, "hzoom")?,
            ransac: RansacConfig {
                inlier_threshold: reproj,
                seed: RANSAC_SEED,
                ..RansacConfig::default()
            },
            policy: PairwiseOrderPolicy,
        })
    }
}

impl<P: ConsensusPolicy> FeatureStrategy<P> {
    /// Replaces the consensus rule of the `in-house-region` matcher.
    pub fn with_policy<Q: ConsensusPolicy>(self, policy: Q) -> FeatureStrategy<Q> {
        FeatureStrategy {
            detector: self.detector,
            extractor: self.extractor,
            matcher: self.matcher,
            needle_zoom: self.needle_zoom,
            haystack_zoom: self.haystack_zoom,
            ransac: self.ransac,
            policy,
        }
    }

    /// Returns the configured detector.
    pub fn detector(&self) -> &Detector {
        &self.detector
    }

    /// Returns the configured matcher.
    pub fn matcher(&self) -> &MatcherConfig {
        &self.matcher
    }

    fn features(&self, image: &Image, zoom: f64) -> LocateResult<(Vec<[f64; 2]>, Descriptors)> {
        let luma = image.pixels().luma();
        let plane: LumaImage = resize_bilinear(luma.view(), zoom)?;
        let keypoints = self.detector.detect(&plane);
        let (keypoints, descriptors) = self.extractor.compute(&plane, keypoints);
        let points = keypoints
            .iter()
            .map(|kp| {
                [
                    (f64::from(kp.x) + 0.5) / zoom,
                    (f64::from(kp.y) + 0.5) / zoom,
                ]
            })
            .collect();
        Ok((points, descriptors))
    }
}

/// Verifies correspondences with a homography and projects the needle
/// outline into the haystack.
///
/// Returns `None` for fewer than four pairs, a consensus below
/// `similarity`, or an implausible projected outline.
pub(crate) fn project_needle(
    needle_points: &[[f64; 2]],
    hay_points: &[[f64; 2]],
    needle_size: (usize, usize),
    hay_size: (usize, usize),
    similarity: f64,
    ransac: &RansacConfig,
) -> Option<Candidate> {
    if needle_points.len() < homography::MIN_CORRESPONDENCES {
        return None;
    }
    let fit = homography::fit_ransac(needle_points, hay_points, ransac)?;
    let confidence = fit.n_inliers as f64 / needle_points.len() as f64;
    trace_debug!("feature_ransac", inliers = fit.n_inliers, confidence = confidence);
    if confidence < similarity {
        return None;
    }

    let (w, h) = (needle_size.0 as f64, needle_size.1 as f64);
    let quad = [[0.0, 0.0], [w, 0.0], [w, h], [0.0, h]]
        .iter()
        .map(|&[x, y]| homography::project(&fit.h, x, y))
        .collect::<Option<Vec<[f64; 2]>>>()?;
    if !is_convex(&quad) || signed_area(&quad) <= 0.0 {
        return None;
    }

    let side = |a: [f64; 2], b: [f64; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
    let across = 0.5 * (side(quad[0], quad[1]) + side(quad[3], quad[2]));
    let down = 0.5 * (side(quad[0], quad[3]) + side(quad[1], quad[2]));
    let distortion = (across / down) / (w / h);
    if !(1.0 / MAX_ASPECT_DISTORTION..=MAX_ASPECT_DISTORTION).contains(&distortion) {
        return None;
    }

    let (hw, hh) = (hay_size.0 as f64, hay_size.1 as f64);
    let min_x = quad.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
    let max_x = quad.iter().map(|p| p[0]).fold(f64::NEG_INFINITY, f64::max);
    let min_y = quad.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
    let max_y = quad.iter().map(|p| p[1]).fold(f64::NEG_INFINITY, f64::max);
    let x0 = min_x.round().clamp(0.0, hw) as usize;
    let y0 = min_y.round().clamp(0.0, hh) as usize;
    let x1 = max_x.round().clamp(0.0, hw) as usize;
    let y1 = max_y.round().clamp(0.0, hh) as usize;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some(Candidate {
        x: x0,
        y: y0,
        width: x1 - x0,
        height: y1 - y0,
        confidence,
    })
}

impl<P: ConsensusPolicy> Strategy for FeatureStrategy<P> {
    fn name(&self) -> &'static str {
        "feature"
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        let _span = trace_span!("feature_locate").entered();
        let (needle_points, needle_desc) = self.features(needle, self.needle_zoom)?;
        let (hay_points, hay_desc) = self.features(haystack, self.haystack_zoom)?;
        trace_event!(
            "feature_keypoints",
            needle = needle_points.len(),
            haystack = hay_points.len()
        );
        if needle_desc.is_empty() || hay_desc.is_empty() {
            return Ok(Vec::new());
        }

        let matches = match &self.matcher {
            MatcherConfig::Filtering(options) => {
                matching::filtered_matches(&needle_desc, &hay_desc, options)
            }
            MatcherConfig::Region(options) => region::region_match(
                &needle_desc,
                &hay_desc,
                &needle_points,
                &hay_points,
                options,
                &self.policy,
            ),
        };
        trace_event!("feature_matches", count = matches.len());

        let src: Vec<[f64; 2]> = matches.iter().map(|m| needle_points[m.query]).collect();
        let dst: Vec<[f64; 2]> = matches.iter().map(|m| hay_points[m.train]).collect();
        let found = project_needle(
            &src,
            &dst,
            (needle.width(), needle.height()),
            (haystack.width(), haystack.height()),
            similarity,
            &self.ransac,
        );
        Ok(found.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{project_needle, FeatureStrategy, MatcherConfig, Norm};
    use crate::equalizer::{Category, Equalizer};
    use crate::feature::homography::RansacConfig;
    use crate::feature::Detector;

    fn grid(scale: f64, dx: f64, dy: f64) -> (Vec<[f64; 2]>, Vec<[f64; 2]>) {
        let src: Vec<[f64; 2]> = (0..16)
            .map(|i| [(i % 4) as f64 * 8.0 + 3.0, (i / 4) as f64 * 6.0 + 2.0])
            .collect();
        let dst = src.iter().map(|p| [p[0] * scale + dx, p[1] * scale + dy]).collect();
        (src, dst)
    }

    #[test]
    fn three_pairs_are_never_enough() {
        let (src, dst) = grid(1.0, 5.0, 5.0);
        let found = project_needle(&src[..3], &dst[..3], (32, 24), (100, 100), 0.0, &RansacConfig::default());
        assert!(found.is_none());
        assert!(project_needle(&src, &dst, (32, 24), (100, 100), 0.0, &RansacConfig::default()).is_some());
    }

    #[test]
    fn projected_box_follows_scale_and_translation() {
        let (src, dst) = grid(2.0, 10.0, 20.0);
        let found = project_needle(&src, &dst, (32, 24), (200, 200), 0.9, &RansacConfig::default()).unwrap();
        assert_eq!((found.x, found.y, found.width, found.height), (10, 20, 64, 48));
        assert!((found.confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn box_is_clipped_to_haystack() {
        let (src, dst) = grid(1.0, 80.0, 90.0);
        let found = project_needle(&src, &dst, (32, 24), (100, 100), 0.5, &RansacConfig::default()).unwrap();
        assert_eq!((found.x, found.y, found.width, found.height), (80, 90, 20, 10));
    }

    #[test]
    fn squashed_outline_is_rejected() {
        let (src, _) = grid(1.0, 0.0, 0.0);
        let dst: Vec<[f64; 2]> = src.iter().map(|p| [p[0] * 6.0, p[1]]).collect();
        assert!(project_needle(&src, &dst, (32, 24), (400, 400), 0.5, &RansacConfig::default()).is_none());
    }

    #[test]
    fn strategy_follows_equalizer() {
        let mut eq = Equalizer::new();
        eq.select(Category::FeatureDetector, "FAST").unwrap();
        eq.select(Category::FeatureMatcher, "BruteForce-L1").unwrap();
        let strategy = FeatureStrategy::from_equalizer(&eq).unwrap();
        assert!(matches!(strategy.detector(), Detector::Fast { threshold: 20, .. }));
        match strategy.matcher() {
            MatcherConfig::Filtering(options) => assert_eq!(options.norm, Norm::L1),
            other => panic!("unexpected matcher {other:?}"),
        }

        eq.select(Category::FeatureMatcher, "in-house-region").unwrap();
        let strategy = FeatureStrategy::from_equalizer(&eq).unwrap();
        assert!(matches!(strategy.matcher(), MatcherConfig::Region(_)));
    }
}
