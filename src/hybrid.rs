//! Template pass refined by feature matching.
//!
//! The coarse template pass runs at the relaxed `front_similarity`. Each
//! window it reports is grown by half the needle size, and the feature
//! strategy must confirm the needle inside that region at the final
//! similarity. Confirmed windows keep the template location and take the
//! feature confidence.
//!
//! A needle the feature stage cannot describe at all (no confidence in some
//! region) is feature-poor. Feature matching is then abandoned and the
//! coarse windows that reach the final similarity are reported with their
//! template confidence.

use crate::candidate::{sort_desc, Candidate};
use crate::equalizer::{Category, Equalizer};
use crate::feature::FeatureStrategy;
use crate::finder::Strategy;
use crate::image::Image;
use crate::template::TemplateStrategy;
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{LocateError, LocateResult};

const DEFAULT_FRONT_SIMILARITY: f64 = 0.7;

/// Two-stage strategy: `coarse` proposes, `fine` confirms.
#[derive(Clone, Debug)]
pub struct HybridStrategy<C = TemplateStrategy, F = FeatureStrategy> {
    coarse: C,
    fine: F,
    front_similarity: f64,
}

impl HybridStrategy {
    /// Builds both stages from the equalizer; `front_similarity` comes from
    /// the hybrid localization parameters.
    pub fn from_equalizer(eq: &Equalizer) -> LocateResult<Self> {
        let front_similarity = match eq.float(Category::Localization, "front_similarity") {
            Ok(value) => value,
            Err(LocateError::UnknownParameter { .. }) => DEFAULT_FRONT_SIMILARITY,
            Err(err) => return Err(err),
        };
        Ok(Self::new(
            TemplateStrategy::from_equalizer(eq)?,
            FeatureStrategy::from_equalizer(eq)?,
            front_similarity,
        ))
    }
}

impl<C: Strategy, F: Strategy> HybridStrategy<C, F> {
    /// Combines a coarse and a fine strategy.
    pub fn new(coarse: C, fine: F, front_similarity: f64) -> Self {
        Self {
            coarse,
            fine,
            front_similarity,
        }
    }

    /// Returns the threshold of the coarse pass.
    pub fn front_similarity(&self) -> f64 {
        self.front_similarity
    }
}

/// Region around `window` grown by half the needle on every side, clipped
/// to the haystack. Returns `(x, y, width, height)`.
fn search_region(window: &Candidate, needle: &Image, haystack: &Image) -> (usize, usize, usize, usize) {
    let (mx, my) = (needle.width() / 2, needle.height() / 2);
    let x0 = window.x.saturating_sub(mx);
    let y0 = window.y.saturating_sub(my);
    let x1 = (window.x + window.width + mx).min(haystack.width());
    let y1 = (window.y + window.height + my).min(haystack.height());
    (x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
}

impl<C: Strategy, F: Strategy> Strategy for HybridStrategy<C, F> {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn locate(
        &self,
        needle: &Image,
        haystack: &Image,
        similarity: f64,
    ) -> LocateResult<Vec<Candidate>> {
        let _span = trace_span!("hybrid_locate", front = self.front_similarity).entered();
        let coarse = self.coarse.locate(needle, haystack, self.front_similarity)?;
        trace_event!("hybrid_coarse", count = coarse.len());
        if coarse.is_empty() {
            return Ok(coarse);
        }

        let mut accepted = Vec::new();
        let mut feature_poor = false;
        for window in &coarse {
            let (x, y, width, height) = search_region(window, needle, haystack);
            let region = haystack.crop(x, y, width, height)?;
            let fine = self.fine.locate(needle, &region, 0.0)?;
            let confidence = fine.first().map_or(0.0, |c| c.confidence);
            trace_debug!("hybrid_refine", x = window.x, y = window.y, confidence = confidence);
            if confidence <= 0.0 {
                feature_poor = true;
            } else if confidence >= similarity {
                accepted.push(Candidate {
                    confidence,
                    ..*window
                });
            }
        }

        if feature_poor {
            trace_event!("hybrid_feature_poor", windows = coarse.len());
            accepted = coarse
                .into_iter()
                .filter(|window| window.confidence >= similarity)
                .collect();
        }
        sort_desc(&mut accepted);
        Ok(accepted)
    }
}
