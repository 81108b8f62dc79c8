//! Convenience helpers for loading images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::cache::ImageLoader;
use crate::image::{Image, PixelBuffer};
use crate::util::{LocateError, LocateResult};
use std::path::Path;

/// Creates an RGB pixel buffer from a dynamic image.
pub fn pixels_from_dynamic_image(img: &image::DynamicImage) -> LocateResult<PixelBuffer> {
    let rgb = img.to_rgb8();
    let width = rgb.width() as usize;
    let height = rgb.height() as usize;
    PixelBuffer::from_rgb(rgb.into_raw(), width, height)
}

/// Loads an image from disk and converts it to RGB pixels.
pub fn load_pixels<P: AsRef<Path>>(path: P) -> LocateResult<PixelBuffer> {
    let img = image::open(path).map_err(|err| LocateError::ImageIo {
        reason: err.to_string(),
    })?;
    pixels_from_dynamic_image(&img)
}

/// Loads an image from disk without caching.
pub fn load_image<P: AsRef<Path>>(path: P) -> LocateResult<Image> {
    Ok(Image::new(load_pixels(path)?))
}

/// File loader backed by the `image` crate decoders.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileLoader;

impl ImageLoader for FileLoader {
    fn load(&self, path: &Path) -> LocateResult<PixelBuffer> {
        load_pixels(path)
    }
}
