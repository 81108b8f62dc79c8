use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use targetmatch::{Image, LocateError, Strategy, TemplateMethod, TemplateStrategy};

const METHODS: [TemplateMethod; 3] = [
    TemplateMethod::CcoeffNormed,
    TemplateMethod::CcorrNormed,
    TemplateMethod::SqdiffNormed,
];

/// Seeded noise, so every window of a haystack is unique.
fn texture(width: usize, height: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..width * height).map(|_| rng.random()).collect()
}

fn paste(dst: &mut [u8], dst_width: usize, src: &[u8], src_width: usize, x0: usize, y0: usize) {
    for (row, chunk) in src.chunks(src_width).enumerate() {
        let start = (y0 + row) * dst_width + x0;
        dst[start..start + src_width].copy_from_slice(chunk);
    }
}

#[test]
fn exact_crop_scores_one_at_its_origin() {
    let (width, height) = (40, 30);
    let haystack = Image::from_gray(&texture(width, height, 3), width, height).unwrap();
    let needle = haystack.crop(17, 9, 8, 6).unwrap();

    for method in METHODS {
        let strategy = TemplateStrategy::new(method, false);
        let found = strategy.locate(&needle, &haystack, 0.0).unwrap();
        assert_eq!(found.len(), 1, "{method:?}");
        let best = found[0];
        assert_eq!((best.x, best.y), (17, 9), "{method:?}");
        assert_eq!((best.width, best.height), (8, 6));
        assert!(best.confidence > 1.0 - 1e-9, "{method:?}: {}", best.confidence);
    }
}

#[test]
fn rgb_and_luma_planes_agree_on_gray_input() {
    let (width, height) = (24, 20);
    let gray = texture(width, height, 11);
    let rgb: Vec<u8> = gray.iter().flat_map(|&v| [v, v, v]).collect();
    let haystack = Image::from_rgb(rgb, width, height).unwrap();
    let needle = haystack.crop(5, 7, 6, 5).unwrap();

    let color = TemplateStrategy::new(TemplateMethod::CcoeffNormed, false);
    let luma = TemplateStrategy::new(TemplateMethod::CcoeffNormed, true);
    let a = color.locate(&needle, &haystack, 0.0).unwrap();
    let b = luma.locate(&needle, &haystack, 0.0).unwrap();
    assert_eq!((a[0].x, a[0].y), (b[0].x, b[0].y));
    assert!((a[0].confidence - b[0].confidence).abs() < 1e-9);
}

#[test]
fn confidence_does_not_grow_with_noise() {
    let (width, height) = (16, 12);
    let needle_data: Vec<u8> = texture(width, height, 5)
        .into_iter()
        .map(|v| 60 + v / 2)
        .collect();
    let needle = Image::from_gray(&needle_data, width, height).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    let signs: Vec<i32> = (0..width * height)
        .map(|_| rng.random_range(-1..=1))
        .collect();

    let strategy = TemplateStrategy::new(TemplateMethod::CcoeffNormed, false);
    let mut previous = f64::INFINITY;
    for amplitude in [0, 8, 20, 40] {
        let noisy: Vec<u8> = needle_data
            .iter()
            .zip(&signs)
            .map(|(&v, &s)| (i32::from(v) + s * amplitude) as u8)
            .collect();
        let haystack = Image::from_gray(&noisy, width, height).unwrap();
        let found = strategy.locate(&needle, &haystack, 0.0).unwrap();
        let confidence = found[0].confidence;
        assert!(
            confidence <= previous + 1e-12,
            "amplitude {amplitude}: {confidence} > {previous}"
        );
        previous = confidence;
    }
    assert!(previous < 0.95);
}

#[test]
fn repeated_occurrences_are_reported_once_each() {
    let (width, height) = (60, 30);
    let (nw, nh) = (10, 8);
    let needle_data = texture(nw, nh, 1);
    let mut hay = vec![128u8; width * height];
    paste(&mut hay, width, &needle_data, nw, 5, 5);
    paste(&mut hay, width, &needle_data, nw, 38, 17);
    let haystack = Image::from_gray(&hay, width, height).unwrap();
    let needle = Image::from_gray(&needle_data, nw, nh).unwrap();

    let strategy = TemplateStrategy::new(TemplateMethod::CcoeffNormed, false);
    let found = strategy.locate(&needle, &haystack, 0.9).unwrap();
    let mut origins: Vec<(usize, usize)> = found.iter().map(|c| (c.x, c.y)).collect();
    origins.sort_unstable();
    assert_eq!(origins, [(5, 5), (38, 17)]);
    assert!(found.windows(2).all(|w| w[0].confidence >= w[1].confidence));
}

#[test]
fn threshold_filters_everything_on_unrelated_content() {
    let (width, height) = (30, 20);
    let haystack = Image::from_gray(&texture(width, height, 90), width, height).unwrap();
    let needle = Image::from_gray(&[0, 255, 0, 255, 0, 255, 0, 255, 0], 3, 3).unwrap();
    let strategy = TemplateStrategy::new(TemplateMethod::SqdiffNormed, false);
    assert!(strategy.locate(&needle, &haystack, 0.999).unwrap().is_empty());
}

#[test]
fn oversize_needle_is_a_geometry_error() {
    let haystack = Image::from_gray(&[7; 20], 5, 4).unwrap();
    let needle = Image::from_gray(&[7; 30], 6, 5).unwrap();
    for method in METHODS {
        let err = TemplateStrategy::new(method, true)
            .locate(&needle, &haystack, 0.5)
            .unwrap_err();
        assert_eq!(
            err,
            LocateError::InvalidGeometry {
                needle_width: 6,
                needle_height: 5,
                area_width: 5,
                area_height: 4,
            }
        );
    }
}
