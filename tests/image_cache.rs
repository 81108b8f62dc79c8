use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use targetmatch::{
    Equalizer, Finder, Image, ImageCache, ImageSource, LocateError, LocateResult, PixelBuffer,
};

fn texture(width: usize, height: usize) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(17);
    (0..width * height).map(|_| rng.random()).collect()
}

#[test]
fn files_are_decoded_once() {
    let decodes = Cell::new(0usize);
    let loader = |path: &Path| -> LocateResult<PixelBuffer> {
        decodes.set(decodes.get() + 1);
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("button.png"));
        PixelBuffer::from_gray(&texture(6, 4), 6, 4)
    };
    let cache = ImageCache::new(loader);
    assert!(cache.is_empty());

    let path = Path::new("assets/button.png");
    let first = cache.get(path).unwrap();
    let second = cache.get(path).unwrap();
    assert_eq!(decodes.get(), 1);
    assert!(first.shares_pixels(&second));
    assert!(cache.contains(path));
    assert_eq!(cache.len(), 1);

    let source = ImageSource::from(PathBuf::from("assets/button.png"));
    let third = source.resolve(&cache).unwrap();
    assert!(third.shares_pixels(&first));
    assert_eq!(decodes.get(), 1);
}

#[test]
fn loader_errors_are_not_cached() {
    let attempts = Cell::new(0usize);
    let loader = |_: &Path| -> LocateResult<PixelBuffer> {
        attempts.set(attempts.get() + 1);
        Err(LocateError::ImageIo {
            reason: "missing".into(),
        })
    };
    let cache = ImageCache::new(loader);
    let path = Path::new("gone.png");
    assert!(matches!(cache.get(path), Err(LocateError::ImageIo { .. })));
    assert!(cache.get(path).is_err());
    assert_eq!(attempts.get(), 2);
    assert!(cache.is_empty());
}

#[test]
fn decoded_sources_pass_through() {
    let cache = ImageCache::new(|_: &Path| -> LocateResult<PixelBuffer> {
        panic!("decoded sources never hit the loader")
    });
    let image = Image::from_gray(&texture(5, 5), 5, 5)
        .unwrap()
        .with_target_offset(2, -1);
    let resolved = ImageSource::from(image.clone()).resolve(&cache).unwrap();
    assert!(resolved.shares_pixels(&image));
    assert_eq!(resolved.target_offset(), (2, -1));
    assert!(cache.is_empty());
}

#[test]
fn finder_resolves_needles_through_the_cache() {
    let haystack = Image::from_gray(&texture(30, 20), 30, 20).unwrap();
    let crop = haystack.crop(9, 6, 7, 5).unwrap();
    let pixels = crop.pixels().clone();
    let cache = ImageCache::new(move |_: &Path| -> LocateResult<PixelBuffer> { Ok(pixels.clone()) });

    let finder = Finder::from_equalizer(&Equalizer::new()).unwrap();
    let source = ImageSource::File(PathBuf::from("crop.png"));
    let found = finder.find_source(&source, &cache, &haystack).unwrap();
    assert_eq!((found[0].x, found[0].y), (9, 6));
    assert_eq!((found[0].width, found[0].height), (7, 5));
    assert!(cache.contains(Path::new("crop.png")));

    let best = finder.find_best(&cache.get(Path::new("crop.png")).unwrap(), &haystack).unwrap();
    assert_eq!(best.target((1, 1)), (13, 9));
}
