//! Dense template matching strategy.
//!
//! Every equal-size window of the haystack is scored against the needle with
//! the active `template_matcher` kernel. Windows reaching the similarity
//! threshold are reduced to one per overlapping cluster; with a threshold of
//! zero only the single best window is reported.

use crate::candidate::nms::suppress_overlaps;
use crate::candidate::Candidate;
use crate::equalizer::{Category, Equalizer};
use crate::finder::Strategy;
use crate::image::{Image, LumaImage};
use crate::kernel::{scalar, CcoeffNormed, CcorrNormed, Kernel, ScoreMap, SqdiffNormed};
use crate::trace::{trace_event, trace_span};
use crate::util::{LocateError, LocateResult};

mod plan;

pub use plan::TemplatePlan;
pub use plan::search_planes;

/// Correlation score used to compare windows.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TemplateMethod {
    /// Zero-mean normalized cross-correlation.
    CcoeffNormed,
    /// Normalized cross-correlation.
    CcorrNormed,
    /// Normalized squared difference (as a similarity).
    SqdiffNormed,
}

impl TemplateMethod {
    /// Resolves a `template_matcher` algorithm name.
    pub fn from_name(name: &str) -> LocateResult<Self> {
        match name {
            "ccoeff_normed" => Ok(Self::CcoeffNormed),
            "ccorr_normed" => Ok(Self::CcorrNormed),
            "sqdiff_normed" => Ok(Self::SqdiffNormed),
            other => Err(LocateError::UnknownAlgorithm {
                category: Category::TemplateMatcher,
                name: other.to_owned(),
            }),
        }
    }
}

/// Template matching configured from the equalizer.
#[derive(Clone, Debug)]
pub struct TemplateStrategy {
    method: TemplateMethod,
    ignore_color: bool,
    #[cfg_attr(not(feature = "rayon"), allow(dead_code))]
    parallel: bool,
}

impl TemplateStrategy {
    /// Creates a strategy with an explicit method.
    pub fn new(method: TemplateMethod, ignore_color: bool) -> Self {
        Self {
            method,
            ignore_color,
            parallel: false,
        }
    }

    /// Reads the active template matcher and `ignore_color` (when the active
    /// localization method has it).
    pub fn from_equalizer(eq: &Equalizer) -> LocateResult<Self> {
        let method = TemplateMethod::from_name(eq.active(Category::TemplateMatcher))?;
        let ignore_color = match eq.flag(Category::Localization, "ignore_color") {
            Ok(value) => value,
            Err(LocateError::UnknownParameter { .. }) => false,
            Err(err) => return Err(err),
        };
        Ok(Self::new(method, ignore_color))
    }

    /// Scores windows on multiple threads when the `rayon` feature is on.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Returns the configured method.
    pub fn method(&self) -> TemplateMethod {
        self.method
    }

    /// Computes the score of every window placement.
    pub fn score_map(&self, needle: &Image, haystack: &Image) -> LocateResult<ScoreMap> {
        let needle_planes = search_planes(needle.pixels(), self.ignore_color);
        let haystack_planes = search_planes(haystack.pixels(), self.ignore_color);
        let plan = TemplatePlan::from_planes(&needle_planes);
        match self.method {
            TemplateMethod::CcoeffNormed => {
                self.dispatch::<CcoeffNormed>(&haystack_planes, &plan)
            }
            TemplateMethod::CcorrNormed => self.dispatch::<CcorrNormed>(&haystack_planes, &plan),
            TemplateMethod::SqdiffNormed => {
                self.dispatch::<SqdiffNormed>(&haystack_planes, &plan)
            }
        }
    }

    fn dispatch<K: Kernel>(
        &self,
        planes: &[LumaImage],
        plan: &TemplatePlan,
    ) -> LocateResult<ScoreMap> {
        #[cfg(feature = "rayon")]
        if self.parallel {
            return crate::kernel::rayon::score_map_par::<K>(planes, plan);
        }
        scalar::score_map::<K>(planes, plan)
    }
}

impl Strategy for TemplateStrategy {
    fn name(&self) -> &'static str {
        "template"
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        let _span = trace_span!("template_locate", method = ?self.method).entered();
        let map = self.score_map(needle, haystack)?;
        let (width, height) = (needle.width(), needle.height());
        let window = |x: usize, y: usize, confidence: f64| Candidate {
            x,
            y,
            width,
            height,
            confidence,
        };

        if similarity <= 0.0 {
            let best = map.best().map(|(x, y, score)| window(x, y, score));
            return Ok(best.into_iter().collect());
        }

        let hits: Vec<Candidate> = map
            .iter()
            .filter(|&(_, _, score)| score >= similarity)
            .map(|(x, y, score)| window(x, y, score))
            .collect();
        let kept = suppress_overlaps(hits);
        trace_event!("template_candidates", count = kept.len());
        Ok(kept)
    }
}
