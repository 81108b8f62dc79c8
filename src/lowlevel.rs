//! Low-level building blocks for custom localization pipelines.
//!
//! These expose the template kernels and plans, keypoint detection and
//! description, descriptor matching and homography fitting used by the
//! strategies. Most users should prefer [`crate::Finder`].

pub use crate::feature::describe::{Descriptors, Extractor, ExtractorKind};
pub use crate::feature::detect::{Detector, Keypoint};
pub use crate::feature::homography::{estimate_dlt, fit_ransac, project, RansacConfig, RansacFit};
pub use crate::feature::matching::{
    filtered_matches, knn_match, ratio_test, symmetry_test, DMatch, FilterOptions, Norm,
};
pub use crate::feature::region::{region_match, RegionOptions};
pub use crate::image::zoom::resize_bilinear;
pub use crate::image::LumaImage;
pub use crate::kernel::scalar::score_map;
pub use crate::kernel::{CcoeffNormed, CcorrNormed, Kernel, ScoreMap, SqdiffNormed};
pub use crate::template::{search_planes, TemplatePlan};

#[cfg(feature = "rayon")]
pub use crate::kernel::rayon::score_map_par;
