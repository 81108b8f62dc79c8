//! Static parameter schemas per algorithm.
//!
//! Every selection builds a fresh [`ParameterSet`] from these tables.

use crate::equalizer::param::{ParamValue, Parameter, ParameterSet};
use crate::equalizer::Category;

struct ParamSpec {
    name: &'static str,
    param: Parameter,
}

const fn int(name: &'static str, value: i64, min: Option<f64>, max: Option<f64>) -> ParamSpec {
    int_step(name, value, min, max, 1.0)
}

const fn int_step(
    name: &'static str,
    value: i64,
    min: Option<f64>,
    max: Option<f64>,
    delta: f64,
) -> ParamSpec {
    ParamSpec {
        name,
        param: Parameter::schema(ParamValue::Int(value), min, max, delta, 0.9),
    }
}

const fn float(
    name: &'static str,
    value: f64,
    min: f64,
    max: f64,
    delta: f64,
    tolerance: f64,
) -> ParamSpec {
    ParamSpec {
        name,
        param: Parameter::schema(
            ParamValue::Float(value),
            Some(min),
            Some(max),
            delta,
            tolerance,
        ),
    }
}

const fn flag(name: &'static str, value: bool) -> ParamSpec {
    ParamSpec {
        name,
        param: Parameter::schema(ParamValue::Bool(value), None, None, 0.0, 1.0),
    }
}

const TEMPLATE_LOCALIZATION: &[ParamSpec] = &[flag("ignore_color", false)];

const FEATURE_LOCALIZATION: &[ParamSpec] =
    &[float("ransac_reproj_threshold", 3.0, 0.0, 200.0, 10.0, 1.0)];

const HYBRID_LOCALIZATION: &[ParamSpec] = &[float("front_similarity", 0.7, 0.0, 1.0, 0.1, 0.1)];

const DETECTOR_COMMON: &[ParamSpec] = &[
    float("nzoom", 1.0, 1.0, 10.0, 1.0, 1.0),
    float("hzoom", 1.0, 1.0, 10.0, 1.0, 1.0),
];

const ORB_DETECTOR: &[ParamSpec] = &[
    int_step("nFeatures", 500, Some(1.0), None, 100.0),
    int("fastThreshold", 20, Some(1.0), Some(255.0)),
    int("edgeThreshold", 16, Some(0.0), Some(64.0)),
];

const FAST_DETECTOR: &[ParamSpec] = &[
    int("threshold", 20, Some(1.0), Some(255.0)),
    flag("nonmaxSuppression", true),
];

const GFTT_DETECTOR: &[ParamSpec] = &[
    int("maxCorners", 500, Some(1.0), None),
    float("qualityLevel", 0.01, 0.0001, 1.0, 0.01, 0.001),
    float("minDistance", 3.0, 0.0, 100.0, 1.0, 0.1),
];

const HARRIS_EXTRA: &[ParamSpec] = &[float("k", 0.04, 0.01, 0.2, 0.01, 0.001)];

const EXTRACTOR: &[ParamSpec] = &[
    int("bytes", 32, Some(16.0), Some(64.0)),
    int("patchSize", 31, Some(9.0), Some(63.0)),
];

const FILTERING_MATCHER: &[ParamSpec] = &[
    float("ratio_threshold", 0.65, 0.0, 1.0, 0.1, 0.1),
    flag("ratio_test", false),
    flag("symmetry_test", false),
];

const REGION_MATCHER: &[ParamSpec] = &[
    int("refinements", 50, Some(1.0), None),
    int("recalc_interval", 10, Some(1.0), None),
    int("variants_k", 100, Some(1.0), None),
    float("variants_ratio", 0.33, 0.0001, 1.0, 0.1, 0.01),
];

/// Parameters that stay fixed whatever `unlock` is asked to do.
pub(crate) const FORCE_FIXED: &[(Category, &str)] = &[(Category::FeatureExtractor, "bytes")];

pub(crate) fn is_force_fixed(category: Category, name: &str) -> bool {
    FORCE_FIXED
        .iter()
        .any(|&(c, n)| c == category && n == name)
}

fn tables(category: Category, algorithm: &str) -> Vec<&'static [ParamSpec]> {
    match (category, algorithm) {
        (Category::Localization, "template") => vec![TEMPLATE_LOCALIZATION],
        (Category::Localization, "feature") => vec![FEATURE_LOCALIZATION],
        (Category::Localization, "hybrid") => vec![
            TEMPLATE_LOCALIZATION,
            FEATURE_LOCALIZATION,
            HYBRID_LOCALIZATION,
        ],
        (Category::FeatureDetector, "ORB") => vec![DETECTOR_COMMON, ORB_DETECTOR],
        (Category::FeatureDetector, "FAST") => vec![DETECTOR_COMMON, FAST_DETECTOR],
        (Category::FeatureDetector, "GFTT") => vec![DETECTOR_COMMON, GFTT_DETECTOR],
        (Category::FeatureDetector, "HARRIS") => {
            vec![DETECTOR_COMMON, GFTT_DETECTOR, HARRIS_EXTRA]
        }
        (Category::FeatureExtractor, _) => vec![EXTRACTOR],
        (Category::FeatureMatcher, "in-house-region") => vec![REGION_MATCHER],
        (Category::FeatureMatcher, _) => vec![FILTERING_MATCHER],
        _ => Vec::new(),
    }
}

/// Builds the default parameter set of `algorithm` in `category`.
///
/// The caller guarantees the name is registered for the category.
pub(crate) fn default_parameters(category: Category, algorithm: &str) -> ParameterSet {
    let mut set = ParameterSet::new();
    for table in tables(category, algorithm) {
        for spec in table {
            let fixed = is_force_fixed(category, spec.name);
            set.insert(spec.name, spec.param.clone().with_fixed(fixed));
        }
    }
    set
}

#[cfg(test)]
mod tests {
    use super::default_parameters;
    use crate::equalizer::{Category, ParamValue};

    #[test]
    fn every_schema_entry_is_within_bounds() {
        for category in Category::ALL {
            for algorithm in category.algorithms() {
                for (name, param) in &default_parameters(category, algorithm) {
                    let mut copy = param.clone();
                    assert!(
                        copy.set_value(param.value()).is_ok(),
                        "{category}/{algorithm}/{name}"
                    );
                }
            }
        }
    }

    #[test]
    fn hybrid_is_union_of_template_and_feature() {
        let hybrid = default_parameters(Category::Localization, "hybrid");
        let names: Vec<_> = hybrid.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(
            names,
            ["front_similarity", "ignore_color", "ransac_reproj_threshold"]
        );
        assert_eq!(
            hybrid.get("front_similarity").unwrap().value(),
            ParamValue::Float(0.7)
        );
    }

    #[test]
    fn extractor_bytes_start_fixed() {
        let set = default_parameters(Category::FeatureExtractor, "ORB");
        assert!(set.get("bytes").unwrap().is_fixed());
        assert!(!set.get("patchSize").unwrap().is_fixed());
    }
}
