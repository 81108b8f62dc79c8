//! Content cache for decoded images and the needle input union.
//!
//! The cache is an explicitly owned object: create one per automation session
//! (or per test) and pass it to whoever resolves image files. Entries are
//! immutable once inserted and the map only grows. When two callers race to
//! decode the same path, the first insertion wins and later decodes are
//! discarded, which is harmless because decoding is deterministic.

use crate::image::{Image, PixelBuffer};
use crate::trace::trace_event;
use crate::util::LocateResult;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Decodes an image file into pixels.
pub trait ImageLoader {
    /// Loads and decodes the file at `path`.
    fn load(&self, path: &Path) -> LocateResult<PixelBuffer>;
}

impl<F> ImageLoader for F
where
    F: Fn(&Path) -> LocateResult<PixelBuffer>,
{
    fn load(&self, path: &Path) -> LocateResult<PixelBuffer> {
        self(path)
    }
}

/// Path-keyed cache of decoded pixel buffers.
pub struct ImageCache<L> {
    loader: L,
    entries: RwLock<HashMap<PathBuf, Arc<PixelBuffer>>>,
}

impl<L: ImageLoader> ImageCache<L> {
    /// Creates an empty cache backed by `loader`.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the image for `path`, decoding it on first use.
    ///
    /// Repeated calls for the same file return images sharing one buffer.
    pub fn get(&self, path: &Path) -> LocateResult<Image> {
        let key = cache_key(path);
        {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            if let Some(pixels) = entries.get(&key) {
                return Ok(Image::from_shared(Arc::clone(pixels)));
            }
        }

        let decoded = Arc::new(self.loader.load(&key)?);
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let pixels = Arc::clone(entries.entry(key).or_insert(decoded));
        trace_event!("image_cache_insert", entries = entries.len());
        Ok(Image::from_shared(pixels))
    }

    /// Returns true when `path` has already been decoded.
    pub fn contains(&self, path: &Path) -> bool {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(&cache_key(path))
    }

    /// Returns the number of cached files.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns true when nothing has been decoded yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn cache_key(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Needle input: either a file to resolve through a cache or decoded pixels.
#[derive(Clone, Debug)]
pub enum ImageSource {
    /// Image file, decoded through an [`ImageCache`].
    File(PathBuf),
    /// Already decoded image.
    Decoded(Image),
}

impl ImageSource {
    /// Resolves the source to an image, decoding files through `cache`.
    pub fn resolve<L: ImageLoader>(&self, cache: &ImageCache<L>) -> LocateResult<Image> {
        match self {
            ImageSource::File(path) => cache.get(path),
            ImageSource::Decoded(image) => Ok(image.clone()),
        }
    }
}

impl From<Image> for ImageSource {
    fn from(image: Image) -> Self {
        ImageSource::Decoded(image)
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        ImageSource::File(path)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageCache;
    use crate::image::PixelBuffer;
    use crate::util::LocateResult;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn racing_decodes_share_the_first_insert() {
        let decodes = AtomicUsize::new(0);
        let cache = ImageCache::new(|_: &Path| -> LocateResult<PixelBuffer> {
            decodes.fetch_add(1, Ordering::SeqCst);
            PixelBuffer::from_gray(&[7; 12], 4, 3)
        });
        let path = Path::new("shared.png");
        let images: Vec<_> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..4).map(|_| scope.spawn(|| cache.get(path))).collect();
            workers.into_iter().map(|w| w.join().unwrap().unwrap()).collect()
        });
        assert_eq!(cache.len(), 1);
        assert!(decodes.load(Ordering::SeqCst) >= 1);
        let stored = cache.get(path).unwrap();
        assert!(images.iter().all(|image| image.shares_pixels(&stored)));
    }
}
