//! TargetMatch locates a reference image ("needle") inside a captured screen
//! image ("haystack") for GUI automation.
//!
//! The [`Equalizer`] selects one algorithm per category and holds their
//! bounded parameters; it round-trips through the text match profile. A
//! [`Finder`] built from it runs dense template correlation, keypoint
//! feature matching with homography verification, or a hybrid of both. The
//! [`Calibrator`] tunes free parameters against sample cases.
//!
//! Template score maps can be computed in parallel with the `rayon` feature;
//! `image-io` adds file decoding and `tracing` emits spans and events for
//! every localization stage.

mod candidate;
pub mod calibrate;
pub mod equalizer;
pub mod feature;
pub mod finder;
pub mod hybrid;
pub mod image;
pub mod kernel;
pub mod lowlevel;
pub mod template;
mod trace;
pub mod util;

pub use calibrate::{
    BenchmarkEntry, BestConfidence, Calibration, CalibrationCase, Calibrator, Objective,
    PeakDiscrimination, Performance, Sampling, SearchOptions,
};
pub use candidate::Candidate;
pub use equalizer::{Category, Equalizer, ParamValue, Parameter, ParameterSet, PROFILE_HEADER};
pub use feature::{ConsensusPolicy, FeatureStrategy, PairwiseOrderPolicy};
pub use finder::{Finder, Strategy};
pub use hybrid::HybridStrategy;
pub use image::{Image, ImageCache, ImageLoader, ImageSource, ImageView, PixelBuffer};
pub use template::{TemplateMethod, TemplateStrategy};
pub use util::{LocateError, LocateResult};
