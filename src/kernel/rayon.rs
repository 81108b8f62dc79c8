//! Rayon-parallel score map evaluation (feature-gated).
//!
//! Rows of placements are scored in parallel and concatenated in order, so
//! the result is identical to [`crate::kernel::scalar::score_map`].

use crate::image::LumaImage;
use crate::kernel::scalar::placements;
use crate::kernel::{Kernel, ScoreMap};
use crate::template::TemplatePlan;
use crate::util::LocateResult;
use rayon::prelude::*;

/// Scores every window placement with one task per row.
pub fn score_map_par<K: Kernel>(
    planes: &[LumaImage],
    plan: &TemplatePlan,
) -> LocateResult<ScoreMap> {
    let (width, height) = placements(planes, plan)?;
    let rows: Vec<Vec<f64>> = (0..height)
        .into_par_iter()
        .map(|y| (0..width).map(|x| K::score_at(planes, plan, x, y)).collect())
        .collect();
    Ok(ScoreMap::new(width, height, rows.concat()))
}
