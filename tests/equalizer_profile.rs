use targetmatch::{Category, Equalizer, LocateError, ParamValue, Parameter, PROFILE_HEADER};

fn tuned() -> Equalizer {
    let mut eq = Equalizer::new();
    eq.select(Category::Localization, "hybrid").unwrap();
    eq.select(Category::TemplateMatcher, "sqdiff_normed").unwrap();
    eq.select(Category::FeatureDetector, "GFTT").unwrap();
    eq.select(Category::FeatureExtractor, "ORB").unwrap();
    eq.select(Category::FeatureMatcher, "in-house-region").unwrap();

    eq.set_parameter(Category::Localization, "front_similarity", 0.45)
        .unwrap();
    eq.set_parameter(Category::Localization, "ignore_color", true)
        .unwrap();
    eq.set_parameter(Category::FeatureDetector, "nzoom", 2)
        .unwrap();
    eq.set_parameter(Category::FeatureDetector, "maxCorners", 1200)
        .unwrap();
    eq.set_parameter(Category::FeatureMatcher, "variants_ratio", 0.125)
        .unwrap();
    eq.lock(Category::FeatureDetector, |name| name.ends_with("zoom"));
    eq
}

#[test]
fn tuned_profile_round_trips() {
    let eq = tuned();
    let text = eq.to_profile();
    assert!(text.starts_with(PROFILE_HEADER));
    assert!(text.contains("[feature_matcher]\nbackend = in-house-region\n"));
    assert!(text.contains(
        "nzoom = <value='2.0' min='1.0' max='10.0' delta='1.0' tolerance='1.0' fixed='True'>"
    ));

    let loaded = Equalizer::from_profile(&text).unwrap();
    assert_eq!(loaded, eq);
    assert_eq!(loaded.active(Category::FeatureDetector), "GFTT");
    assert_eq!(loaded.float(Category::Localization, "front_similarity").unwrap(), 0.45);
    assert_eq!(loaded.int(Category::FeatureDetector, "maxCorners").unwrap(), 1200);
    assert!(loaded.flag(Category::Localization, "ignore_color").unwrap());
    assert!(loaded
        .get_parameter(Category::FeatureDetector, "hzoom")
        .unwrap()
        .is_fixed());
    assert!(!loaded
        .get_parameter(Category::FeatureDetector, "minDistance")
        .unwrap()
        .is_fixed());
}

#[test]
fn missing_sections_keep_defaults() {
    let text = "# IMAGE MATCH DATA\n\n[template_matcher]\nbackend = ccorr_normed\n";
    let eq = Equalizer::from_profile(text).unwrap();
    assert_eq!(eq.active(Category::TemplateMatcher), "ccorr_normed");
    assert_eq!(eq.active(Category::Localization), "template");
    assert_eq!(eq.active(Category::FeatureMatcher), "BruteForce-Hamming");
}

#[test]
fn profile_keys_are_case_sensitive() {
    let text = "[feature_detector]\nbackend = ORB\nnfeatures = <value='900' min='1' max='None' delta='100.0' tolerance='0.9' fixed='False'>\n";
    let err = Equalizer::from_profile(text).unwrap_err();
    assert!(matches!(err, LocateError::MalformedConfig { line: 3, .. }));

    let fixed = text.replace("nfeatures", "nFeatures");
    let eq = Equalizer::from_profile(&fixed).unwrap();
    assert_eq!(eq.int(Category::FeatureDetector, "nFeatures").unwrap(), 900);
}

#[test]
fn parameter_bounds_are_enforced() {
    let err = Parameter::new(5i64, Some(0.0), Some(3.0)).unwrap_err();
    assert!(matches!(err, LocateError::OutOfRange { value, .. } if value == 5.0));

    let mut eq = Equalizer::new();
    let err = eq
        .set_parameter(Category::FeatureExtractor, "patchSize", 80)
        .unwrap_err();
    assert!(matches!(
        err,
        LocateError::OutOfRange { ref name, .. } if name == "patchSize"
    ));
    assert_eq!(
        eq.get_parameter(Category::FeatureExtractor, "patchSize")
            .unwrap()
            .value(),
        ParamValue::Int(31)
    );
}

#[test]
fn unknown_names_are_reported() {
    let mut eq = Equalizer::new();
    assert!(matches!(
        eq.select(Category::FeatureDetector, "SIFT"),
        Err(LocateError::UnknownAlgorithm {
            category: Category::FeatureDetector,
            ..
        })
    ));
    assert_eq!(eq.active(Category::FeatureDetector), "ORB");
    assert!(matches!(
        eq.set_parameter(Category::Localization, "front_similarity", 0.5),
        Err(LocateError::UnknownParameter { .. })
    ));
}

#[test]
fn descriptor_size_stays_fixed() {
    let mut eq = Equalizer::new();
    eq.lock(Category::FeatureExtractor, |_| true);
    eq.unlock(Category::FeatureExtractor, |_| true);
    let params = eq.parameters(Category::FeatureExtractor);
    assert!(params.get("bytes").unwrap().is_fixed());
    assert!(!params.get("patchSize").unwrap().is_fixed());
}
