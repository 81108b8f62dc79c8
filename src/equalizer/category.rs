//! Algorithm categories and their allowed algorithm names.

use crate::util::LocateError;
use std::fmt;
use std::str::FromStr;

/// A group of interchangeable algorithms with one active choice.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    /// Localization method (template, feature, hybrid).
    Localization,
    /// Correlation score used by template matching.
    TemplateMatcher,
    /// Keypoint detector.
    FeatureDetector,
    /// Keypoint descriptor extractor.
    FeatureExtractor,
    /// Descriptor matcher.
    FeatureMatcher,
}

impl Category {
    /// All categories in profile order.
    pub const ALL: [Category; 5] = [
        Category::Localization,
        Category::TemplateMatcher,
        Category::FeatureDetector,
        Category::FeatureExtractor,
        Category::FeatureMatcher,
    ];

    /// Returns the profile section key of the category.
    pub fn key(self) -> &'static str {
        match self {
            Category::Localization => "localization",
            Category::TemplateMatcher => "template_matcher",
            Category::FeatureDetector => "feature_detector",
            Category::FeatureExtractor => "feature_extractor",
            Category::FeatureMatcher => "feature_matcher",
        }
    }

    /// Returns the allowed algorithm names; the first one is the default.
    pub fn algorithms(self) -> &'static [&'static str] {
        match self {
            Category::Localization => &["template", "feature", "hybrid"],
            Category::TemplateMatcher => &["ccoeff_normed", "ccorr_normed", "sqdiff_normed"],
            Category::FeatureDetector => &["ORB", "FAST", "GFTT", "HARRIS"],
            Category::FeatureExtractor => &["BRIEF", "ORB"],
            Category::FeatureMatcher => &[
                "BruteForce-Hamming",
                "BruteForce",
                "BruteForce-L1",
                "BruteForce-Hamming(2)",
                "in-house-raw",
                "in-house-region",
            ],
        }
    }

    /// Returns the index of `name` in the allowed set.
    pub fn index_of(self, name: &str) -> Option<usize> {
        self.algorithms().iter().position(|&alg| alg == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Category {
    type Err = LocateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.key() == s)
            .ok_or_else(|| LocateError::MalformedConfig {
                line: 0,
                reason: format!("unknown category section '{s}'"),
            })
    }
}
