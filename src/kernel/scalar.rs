//! Sequential score map evaluation.

use crate::image::LumaImage;
use crate::kernel::{Kernel, ScoreMap};
use crate::template::TemplatePlan;
use crate::util::{LocateError, LocateResult};

/// Returns the number of placements per axis, failing when the needle does
/// not fit into the haystack.
pub(crate) fn placements(planes: &[LumaImage], plan: &TemplatePlan) -> LocateResult<(usize, usize)> {
    let (area_width, area_height) = planes
        .first()
        .map_or((0, 0), |p| (p.width(), p.height()));
    if plan.width() > area_width || plan.height() > area_height || plan.count() == 0 {
        return Err(LocateError::InvalidGeometry {
            needle_width: plan.width(),
            needle_height: plan.height(),
            area_width,
            area_height,
        });
    }
    Ok((area_width - plan.width() + 1, area_height - plan.height() + 1))
}

/// Scores every window placement row by row.
pub fn score_map<K: Kernel>(planes: &[LumaImage], plan: &TemplatePlan) -> LocateResult<ScoreMap> {
    let (width, height) = placements(planes, plan)?;
    let mut scores = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            scores.push(K::score_at(planes, plan, x, y));
        }
    }
    Ok(ScoreMap::new(width, height, scores))
}
