//! Strategy seam and the equalizer-driven finder.

use crate::candidate::Candidate;
use crate::equalizer::{Category, Equalizer};
use crate::feature::FeatureStrategy;
use crate::hybrid::HybridStrategy;
use crate::image::{Image, ImageCache, ImageLoader, ImageSource};
use crate::template::TemplateStrategy;
use crate::trace::{trace_event, trace_span};
use crate::util::{LocateError, LocateResult};

/// A way of locating a needle in a haystack.
pub trait Strategy {
    /// Short name used in logs and benchmark reports.
    fn name(&self) -> &'static str;

    /// Returns every candidate reaching `similarity`, best first.
    ///
    /// An empty list means "not found"; errors are reserved for
    /// configuration problems and impossible geometry.
    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>>;
}

impl<S: Strategy + ?Sized> Strategy for &S {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        (**self).locate(needle, haystack, similarity)
    }
}

impl<S: Strategy + ?Sized> Strategy for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        (**self).locate(needle, haystack, similarity)
    }
}

/// Strategy selected by the active `localization` algorithm.
#[derive(Clone, Debug)]
pub enum Finder {
    /// Dense template correlation.
    Template(TemplateStrategy),
    /// Keypoint matching with homography verification.
    Feature(FeatureStrategy),
    /// Template pass refined by feature matching.
    Hybrid(HybridStrategy),
}

impl Finder {
    /// Builds the strategy named by the equalizer's localization category.
    pub fn from_equalizer(eq: &Equalizer) -> LocateResult<Self> {
        match eq.active(Category::Localization) {
            "template" => Ok(Finder::Template(TemplateStrategy::from_equalizer(eq)?)),
            "feature" => Ok(Finder::Feature(FeatureStrategy::from_equalizer(eq)?)),
            "hybrid" => Ok(Finder::Hybrid(HybridStrategy::from_equalizer(eq)?)),
            other => Err(LocateError::UnknownAlgorithm {
                category: Category::Localization,
                name: other.to_owned(),
            }),
        }
    }

    fn strategy(&self) -> &dyn Strategy {
        match self {
            Finder::Template(s) => s,
            Finder::Feature(s) => s,
            Finder::Hybrid(s) => s,
        }
    }

    /// Finds every occurrence reaching the needle's similarity.
    pub fn find(&self, needle: &Image, haystack: &Image) -> LocateResult<Vec<Candidate>> {
        let _span = trace_span!("find", strategy = self.name()).entered();
        let found = self.locate(needle, haystack, needle.similarity())?;
        trace_event!(
            "find_done",
            count = found.len(),
            best = found.first().map_or(0.0, |c| c.confidence)
        );
        Ok(found)
    }

    /// Returns the best occurrence, or [`LocateError::NoMatch`].
    pub fn find_best(&self, needle: &Image, haystack: &Image) -> LocateResult<Candidate> {
        self.find(needle, haystack)?
            .into_iter()
            .next()
            .ok_or(LocateError::NoMatch {
                threshold: needle.similarity(),
            })
    }

    /// Resolves `needle` through `cache` and finds it in `haystack`.
    pub fn find_source<L: ImageLoader>(
        &self,
        needle: &ImageSource,
        cache: &ImageCache<L>,
        haystack: &Image,
    ) -> LocateResult<Vec<Candidate>> {
        let needle = needle.resolve(cache)?;
        self.find(&needle, haystack)
    }
}

impl Strategy for Finder {
    fn name(&self) -> &'static str {
        self.strategy().name()
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        self.strategy().locate(needle, haystack, similarity)
    }
}

#[cfg(test)]
mod tests {
    use super::{Finder, Strategy};
    use crate::equalizer::{Category, Equalizer};
    use crate::image::Image;
    use crate::util::LocateError;

    fn textured(w: usize, h: usize) -> Image {
        let data: Vec<u8> = (0..(w * h) as u32)
            .map(|v| ((v * v * 7 + v * 13) % 251) as u8)
            .collect();
        Image::from_gray(&data, w, h).unwrap()
    }

    #[test]
    fn localization_selects_strategy() {
        let mut eq = Equalizer::new();
        assert_eq!(Finder::from_equalizer(&eq).unwrap().name(), "template");
        eq.select(Category::Localization, "feature").unwrap();
        assert_eq!(Finder::from_equalizer(&eq).unwrap().name(), "feature");
        eq.select(Category::Localization, "hybrid").unwrap();
        assert_eq!(Finder::from_equalizer(&eq).unwrap().name(), "hybrid");
    }

    #[test]
    fn find_best_reports_no_match() {
        let haystack = textured(20, 12);
        let needle = Image::from_gray(&[0, 255, 0, 255, 0, 255, 0, 255, 0], 3, 3)
            .unwrap()
            .with_similarity(0.999)
            .unwrap();
        let finder = Finder::from_equalizer(&Equalizer::new()).unwrap();
        let err = finder.find_best(&needle, &haystack).unwrap_err();
        assert_eq!(err, LocateError::NoMatch { threshold: 0.999 });
        assert!(err.is_no_match());
    }

    #[test]
    fn find_best_uses_needle_similarity() {
        let haystack = textured(20, 12);
        let needle = haystack.crop(6, 4, 5, 5).unwrap();
        let finder = Finder::from_equalizer(&Equalizer::new()).unwrap();
        let best = finder.find_best(&needle, &haystack).unwrap();
        assert_eq!((best.x, best.y), (6, 4));
        assert!(best.confidence > 0.999);
    }
}
