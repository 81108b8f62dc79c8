//! Needle-to-haystack homography via DLT with Hartley normalization and a
//! seeded RANSAC loop.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Minimum number of correspondences for a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Projects a point through `h`; returns `None` at infinity.
pub fn project(h: &Matrix3<f64>, x: f64, y: f64) -> Option<[f64; 2]> {
    let p = h * Vector3::new(x, y, 1.0);
    if p[2].abs() < 1e-15 {
        return None;
    }
    Some([p[0] / p[2], p[1] / p[2]])
}

fn reprojection_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    match project(h, src[0], src[1]) {
        Some([u, v]) => ((u - dst[0]).powi(2) + (v - dst[1]).powi(2)).sqrt(),
        None => f64::INFINITY,
    }
}

/// Translates the centroid to the origin and scales the mean distance to
/// `sqrt(2)`.
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| [s * (p[0] - cx), s * (p[1] - cy)])
        .collect();
    (t, normalized)
}

/// Direct linear transform from at least four correspondences.
///
/// Returns `H` with `dst ~ H * src`, scaled so that `H[2,2] = 1` when
/// possible, or `None` for too few points or a degenerate normalization.
pub fn estimate_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Matrix3<f64>> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return None;
    }
    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for i in 0..n {
        let [sx, sy] = src_n[i];
        let [dx, dy] = dst_n[i];
        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // Null vector of A: eigenvector of the smallest eigenvalue of A^T A.
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let mut min_idx = 0;
    for i in 1..9 {
        if eig.eigenvalues[i].abs() < eig.eigenvalues[min_idx].abs() {
            min_idx = i;
        }
    }
    let v = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);

    let t_dst_inv = t_dst.try_inverse()?;
    let h = t_dst_inv * h_norm * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-15 {
        Some(h)
    } else {
        Some(h / scale)
    }
}

/// RANSAC settings.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RansacConfig {
    /// Maximum number of minimal-sample hypotheses.
    pub max_iters: usize,
    /// Inlier threshold on the reprojection error, in haystack pixels.
    pub inlier_threshold: f64,
    /// Sampling seed.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iters: 2000,
            inlier_threshold: 3.0,
            seed: 0,
        }
    }
}

/// Homography with its consensus set.
#[derive(Clone, Debug, PartialEq)]
pub struct RansacFit {
    /// Needle-to-haystack transform.
    pub h: Matrix3<f64>,
    /// `true` for correspondences within the inlier threshold.
    pub inlier_mask: Vec<bool>,
    /// Number of inliers.
    pub n_inliers: usize,
}

fn consensus(h: &Matrix3<f64>, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> Vec<bool> {
    src.iter()
        .zip(dst)
        .map(|(&s, &d)| reprojection_error(h, s, d) <= threshold)
        .collect()
}

/// Fits a homography robust to outlier correspondences.
///
/// Returns `None` with fewer than four correspondences or when no sample
/// produces a model.
pub fn fit_ransac(src: &[[f64; 2]], dst: &[[f64; 2]], config: &RansacConfig) -> Option<RansacFit> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return None;
    }
    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut best: Option<(Matrix3<f64>, Vec<bool>, usize)> = None;

    for _ in 0..config.max_iters {
        let sample = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s4: Vec<[f64; 2]> = sample.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = sample.iter().map(|i| dst[i]).collect();
        let Some(h) = estimate_dlt(&s4, &d4) else {
            continue;
        };
        let mask = consensus(&h, src, dst, config.inlier_threshold);
        let count = mask.iter().filter(|&&m| m).count();
        if best.as_ref().map_or(true, |(_, _, c)| count > *c) {
            best = Some((h, mask, count));
            if count * 10 > n * 9 {
                break;
            }
        }
    }

    let (best_h, best_mask, _) = best?;
    let inlier_src: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| src[i]).collect();
    let inlier_dst: Vec<[f64; 2]> = (0..n).filter(|&i| best_mask[i]).map(|i| dst[i]).collect();
    let h = estimate_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);

    let inlier_mask = consensus(&h, src, dst, config.inlier_threshold);
    let n_inliers = inlier_mask.iter().filter(|&&m| m).count();
    Some(RansacFit {
        h,
        inlier_mask,
        n_inliers,
    })
}

#[cfg(test)]
mod tests {
    use super::{estimate_dlt, fit_ransac, project, RansacConfig};
    use nalgebra::Matrix3;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn scale_translate() -> Matrix3<f64> {
        Matrix3::new(2.0, 0.0, 40.0, 0.0, 2.0, 24.0, 0.0, 0.0, 1.0)
    }

    #[test]
    fn dlt_recovers_exact_transform() {
        let h_true = Matrix3::new(1.5, 0.1, 20.0, -0.05, 1.3, 10.0, 0.0001, -0.00005, 1.0);
        let src = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0], [50.0, 30.0]];
        let dst: Vec<[f64; 2]> = src
            .iter()
            .map(|s| project(&h_true, s[0], s[1]).unwrap())
            .collect();
        let h = estimate_dlt(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = project(&h, s[0], s[1]).unwrap();
            assert!((p[0] - d[0]).abs() < 1e-6 && (p[1] - d[1]).abs() < 1e-6);
        }
    }

    #[test]
    fn too_few_points_have_no_model() {
        let pts = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        assert!(estimate_dlt(&pts, &pts).is_none());
        assert!(fit_ransac(&pts, &pts, &RansacConfig::default()).is_none());
    }

    #[test]
    fn ransac_ignores_outliers() {
        let h_true = scale_translate();
        let mut rng = StdRng::seed_from_u64(7);
        let mut src = Vec::new();
        let mut dst = Vec::new();
        for i in 0..24 {
            let s = [(i % 6) as f64 * 10.0, (i / 6) as f64 * 12.0];
            src.push(s);
            dst.push(project(&h_true, s[0], s[1]).unwrap());
        }
        for _ in 0..6 {
            src.push([rng.random_range(0.0..60.0), rng.random_range(0.0..60.0)]);
            dst.push([rng.random_range(0.0..300.0), rng.random_range(0.0..300.0)]);
        }
        let fit = fit_ransac(&src, &dst, &RansacConfig::default()).unwrap();
        assert!(fit.n_inliers >= 24);
        assert!(fit.inlier_mask[..24].iter().all(|&m| m));
        let corner = project(&fit.h, 64.0, 64.0).unwrap();
        assert!((corner[0] - 168.0).abs() < 1e-3 && (corner[1] - 152.0).abs() < 1e-3);
    }
}
