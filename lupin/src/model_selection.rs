use crate::lupin_common::*;

use matrix_util::mixture::{MixtureArgs, TiedGaussianMixture};
use rayon::prelude::*;

/// Information criteria of the tied mixtures with `1..=K` components
#[derive(Debug, Clone, serde::Serialize)]
pub struct BicCurve {
    pub components: Vec<usize>,
    pub bic: Vec<f64>,
    pub adjusted_bic: Vec<f64>,
}

impl BicCurve {
    /// Component count with the smallest adjusted BIC, the smaller
    /// count on ties
    pub fn best_components(&self) -> Option<usize> {
        argmin_first(&self.adjusted_bic).map(|i| self.components[i])
    }
}

/// `bic + ln(n) * k * latent_dim`
pub fn adjusted_bic(bic: f64, n: usize, k: usize, latent_dim: usize) -> f64 {
    bic + (n as f64).ln() * (k * latent_dim) as f64
}

/// Index of the first finite minimum
pub fn argmin_first(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        if !v.is_finite() {
            continue;
        }
        match best {
            Some((_, b)) if v >= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Fit tied Gaussian mixtures with `1..=max_components` components
///
/// Counts larger than the number of cells, and fits that fail, are
/// recorded as `+inf`.
pub fn compute_bic_curve(
    latent: &Mat,
    max_components: usize,
    num_init: usize,
    seed: u64,
) -> BicCurve {
    let (n, d) = latent.shape();
    let components: Vec<usize> = (1..=max_components).collect();

    let bic: Vec<f64> = components
        .par_iter()
        .map(|&k| {
            if k > n {
                return f64::INFINITY;
            }
            let args = MixtureArgs {
                num_init: num_init.max(1),
                seed,
                ..MixtureArgs::with_components(k)
            };
            match TiedGaussianMixture::fit(latent, &args) {
                Ok(gmm) => gmm.bic(latent),
                Err(e) => {
                    warn!("mixture with {} components failed: {}", k, e);
                    f64::INFINITY
                }
            }
        })
        .collect();

    let adjusted_bic = components
        .iter()
        .zip(bic.iter())
        .map(|(&k, &b)| adjusted_bic(b, n, k, d))
        .collect();

    BicCurve {
        components,
        bic,
        adjusted_bic,
    }
}

/// Refit a single-initialization tied mixture with `num_components`
/// and label each cell by its most responsible component
pub fn fit_final_labels(latent: &Mat, num_components: usize, seed: u64) -> anyhow::Result<Vec<usize>> {
    let args = MixtureArgs {
        num_init: 1,
        seed,
        ..MixtureArgs::with_components(num_components)
    };
    let gmm = TiedGaussianMixture::fit(latent, &args).context(LupinError::Clustering(format!(
        "final mixture with {} components",
        num_components
    )))?;

    if !gmm.converged {
        warn!(
            "final mixture did not converge in {} iterations",
            gmm.n_iter
        );
    }

    Ok(gmm.predict(latent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::clustering::adjusted_rand_index;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn three_blobs(n_per: usize) -> (Mat, Vec<usize>) {
        let centers = [[0., 0.], [6., 6.], [-6., 6.]];
        let n = n_per * 3;
        let truth: Vec<usize> = (0..n).map(|i| i / n_per).collect();
        let mut rng = StdRng::seed_from_u64(17);
        let noise = Normal::new(0_f32, 0.5).unwrap();
        let mut xx = Mat::zeros(n, 2);
        for i in 0..n {
            for j in 0..2 {
                xx[(i, j)] = centers[truth[i]][j] + noise.sample(&mut rng);
            }
        }
        (xx, truth)
    }

    #[test]
    fn argmin_takes_first_minimum() {
        assert_eq!(argmin_first(&[3., 1., 1., 2.]), Some(1));
        assert_eq!(argmin_first(&[f64::INFINITY, 5., f64::NAN, 5.]), Some(1));
        assert_eq!(argmin_first(&[f64::INFINITY]), None);
        assert_eq!(argmin_first(&[]), None);
    }

    #[test]
    fn penalty_grows_with_components() {
        let n = 100;
        let a1 = adjusted_bic(10., n, 1, 3);
        let a2 = adjusted_bic(10., n, 2, 3);
        approx::assert_abs_diff_eq!(a2 - a1, (100f64).ln() * 3., epsilon = 1e-12);
    }

    #[test]
    fn curve_selects_three_blobs() {
        let (xx, truth) = three_blobs(30);
        let curve = compute_bic_curve(&xx, 6, 3, 11);
        assert_eq!(curve.components, vec![1, 2, 3, 4, 5, 6]);
        assert!(curve.bic.iter().all(|b| b.is_finite()));
        assert_eq!(curve.best_components(), Some(3));

        let labels = fit_final_labels(&xx, 3, 11).unwrap();
        assert_eq!(labels.len(), 90);
        approx::assert_abs_diff_eq!(adjusted_rand_index(&truth, &labels), 1., epsilon = 1e-8);
    }

    #[test]
    fn too_many_components_are_skipped() {
        let (xx, _) = three_blobs(1);
        let curve = compute_bic_curve(&xx, 5, 1, 0);
        assert!(curve.bic[3].is_infinite());
        assert!(curve.adjusted_bic[4].is_infinite());
        assert!(curve.best_components().is_some());
    }

    #[test]
    fn final_fit_failure_is_a_clustering_error() {
        let xx = Mat::from_element(2, 2, 1.);
        let err = fit_final_labels(&xx, 3, 0).unwrap_err();
        let kind = err.downcast_ref::<LupinError>().map(|e| e.kind());
        assert_eq!(kind, Some("Clustering"));
    }
}
