//! Gaussian mixture with one covariance matrix shared by every
//! component, fitted by expectation-maximization

use crate::clustering::{kmeans_fit, KmeansArgs};
use nalgebra::{DMatrix, DVector};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

#[derive(Debug, Clone)]
pub struct MixtureArgs {
    pub num_components: usize,
    /// number of initializations; the best lower bound wins
    pub num_init: usize,
    pub max_iter: usize,
    /// convergence threshold on the per-sample lower bound
    pub tol: f64,
    /// added to the diagonal of the covariance
    pub reg_covar: f64,
    pub seed: u64,
}

impl Default for MixtureArgs {
    fn default() -> Self {
        Self {
            num_components: 1,
            num_init: 1,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: 42,
        }
    }
}

impl MixtureArgs {
    pub fn with_components(num_components: usize) -> Self {
        Self {
            num_components,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TiedGaussianMixture {
    /// mixing proportions (k)
    pub weights: DVector<f64>,
    /// component means (k x d)
    pub means: DMatrix<f64>,
    /// shared covariance (d x d)
    pub covariance: DMatrix<f64>,
    /// inverse of the lower Cholesky factor of `covariance`
    precision_cholesky: DMatrix<f64>,
    log_det_cholesky: f64,
    /// average log-likelihood per sample at the end of fitting
    pub lower_bound: f64,
    pub converged: bool,
    pub n_iter: usize,
}

fn to_f64_mat<T>(xx: &DMatrix<T>) -> DMatrix<f64>
where
    T: nalgebra::Scalar + Float,
{
    xx.map(|x| x.to_f64().unwrap_or(f64::NAN))
}

/// row-wise `log(sum(exp(.)))`
fn log_sum_exp_rows(xx: &DMatrix<f64>) -> DVector<f64> {
    DVector::from_iterator(
        xx.nrows(),
        xx.row_iter().map(|row| {
            let mx = row.max();
            if !mx.is_finite() {
                return mx;
            }
            mx + row.iter().map(|x| (x - mx).exp()).sum::<f64>().ln()
        }),
    )
}

impl TiedGaussianMixture {
    /// Fit a mixture to the rows of `xx`
    pub fn fit<T>(xx: &DMatrix<T>, args: &MixtureArgs) -> anyhow::Result<Self>
    where
        T: nalgebra::Scalar + Float,
    {
        let xx = to_f64_mat(xx);
        let (n, d) = (xx.nrows(), xx.ncols());
        let k = args.num_components;

        if k == 0 {
            return Err(anyhow::anyhow!("need at least one mixture component"));
        }
        if n < k {
            return Err(anyhow::anyhow!(
                "{} samples are fewer than {} components",
                n,
                k
            ));
        }
        if d == 0 {
            return Err(anyhow::anyhow!("no features to fit"));
        }
        if xx.iter().any(|x| !x.is_finite()) {
            return Err(anyhow::anyhow!("non-finite values in the data"));
        }

        let data: Vec<Vec<f64>> = xx
            .row_iter()
            .map(|x| x.iter().copied().collect())
            .collect();

        let mut rng = StdRng::seed_from_u64(args.seed);
        let seeds: Vec<u64> = (0..args.num_init.max(1)).map(|_| rng.random()).collect();

        let mut best: Option<Self> = None;

        for s in seeds {
            let kmeans_args = KmeansArgs {
                num_clusters: k,
                num_init: 1,
                seed: s,
                ..Default::default()
            };
            let labels = kmeans_fit(&data, d, &kmeans_args).membership;

            let mut resp = DMatrix::<f64>::zeros(n, k);
            for (i, &l) in labels.iter().enumerate() {
                resp[(i, l)] = 1.;
            }

            let fitted = Self::fit_from_responsibility(&xx, resp, args)?;

            let better = match &best {
                Some(b) => fitted.lower_bound > b.lower_bound,
                None => true,
            };
            if better {
                best = Some(fitted);
            }
        }

        best.ok_or_else(|| anyhow::anyhow!("no initialization"))
    }

    fn fit_from_responsibility(
        xx: &DMatrix<f64>,
        resp: DMatrix<f64>,
        args: &MixtureArgs,
    ) -> anyhow::Result<Self> {
        let mut model = Self::m_step(xx, &resp, args.reg_covar)?;
        let mut lower_bound = f64::NEG_INFINITY;

        for iter in 1..=args.max_iter.max(1) {
            let prev = lower_bound;
            let (log_norm, log_resp) = model.e_step(xx);
            lower_bound = log_norm.mean();

            model = Self::m_step(xx, &log_resp.map(f64::exp), args.reg_covar)?;
            model.n_iter = iter;

            if (lower_bound - prev).abs() < args.tol {
                model.converged = true;
                break;
            }
        }

        if !model.converged {
            log::debug!(
                "tied mixture with {} components did not converge in {} iterations",
                model.weights.len(),
                args.max_iter
            );
        }

        // bound of the parameters actually returned
        let (log_norm, _) = model.e_step(xx);
        model.lower_bound = log_norm.mean();
        Ok(model)
    }

    fn m_step(xx: &DMatrix<f64>, resp: &DMatrix<f64>, reg_covar: f64) -> anyhow::Result<Self> {
        let (n, d) = (xx.nrows(), xx.ncols());
        let k = resp.ncols();

        let nk: DVector<f64> = resp.row_sum().transpose().add_scalar(10. * f64::EPSILON);

        // k x d
        let mut means = resp.transpose() * xx;
        for (mut mu, &w) in means.row_iter_mut().zip(nk.iter()) {
            mu /= w;
        }

        let mut covariance = DMatrix::<f64>::zeros(d, d);
        for c in 0..k {
            let mut diff = xx.clone();
            for mut row in diff.row_iter_mut() {
                row -= means.row(c);
            }
            let mut weighted = diff.clone();
            for (mut row, &r) in weighted.row_iter_mut().zip(resp.column(c).iter()) {
                row *= r;
            }
            covariance += weighted.transpose() * diff;
        }
        covariance /= nk.sum();
        for j in 0..d {
            covariance[(j, j)] += reg_covar;
        }

        let chol = covariance.clone().cholesky().ok_or_else(|| {
            anyhow::anyhow!("ill-defined covariance; try a larger regularization")
        })?;

        let lower = chol.l();
        let log_det_cholesky = -lower.diagonal().iter().map(|x| x.ln()).sum::<f64>();
        let precision_cholesky = lower
            .solve_lower_triangular(&DMatrix::<f64>::identity(d, d))
            .ok_or_else(|| anyhow::anyhow!("singular Cholesky factor"))?;

        Ok(Self {
            weights: nk / n as f64,
            means,
            covariance,
            precision_cholesky,
            log_det_cholesky,
            lower_bound: f64::NEG_INFINITY,
            converged: false,
            n_iter: 0,
        })
    }

    /// per-sample log normaliser and log responsibilities
    fn e_step(&self, xx: &DMatrix<f64>) -> (DVector<f64>, DMatrix<f64>) {
        let weighted = self.weighted_log_prob(xx);
        let log_norm = log_sum_exp_rows(&weighted);
        let mut log_resp = weighted;
        for (mut row, &z) in log_resp.row_iter_mut().zip(log_norm.iter()) {
            row.add_scalar_mut(-z);
        }
        (log_norm, log_resp)
    }

    /// `log p(x_i | c) + log w_c` for each sample `i` and component `c`
    fn weighted_log_prob(&self, xx: &DMatrix<f64>) -> DMatrix<f64> {
        let (n, d) = (xx.nrows(), xx.ncols());
        let k = self.means.nrows();
        let log_2pi = (2. * std::f64::consts::PI).ln();

        let columns: Vec<Vec<f64>> = (0..k)
            .into_par_iter()
            .map(|c| {
                let mut diff = xx.clone();
                for mut row in diff.row_iter_mut() {
                    row -= self.means.row(c);
                }
                // (x - mu) L^{-T}
                let y = diff * self.precision_cholesky.transpose();
                let log_w = self.weights[c].ln();
                y.row_iter()
                    .map(|r| {
                        -0.5 * (d as f64 * log_2pi + r.norm_squared()) + self.log_det_cholesky
                            + log_w
                    })
                    .collect()
            })
            .collect();

        DMatrix::from_fn(n, k, |i, c| columns[c][i])
    }

    /// number of free parameters: means, one covariance and weights
    pub fn num_parameters(&self) -> usize {
        let (k, d) = (self.means.nrows(), self.means.ncols());
        k * d + d * (d + 1) / 2 + k - 1
    }

    /// log-likelihood of each sample
    pub fn score_samples<T>(&self, xx: &DMatrix<T>) -> DVector<f64>
    where
        T: nalgebra::Scalar + Float,
    {
        log_sum_exp_rows(&self.weighted_log_prob(&to_f64_mat(xx)))
    }

    /// total log-likelihood
    pub fn log_likelihood<T>(&self, xx: &DMatrix<T>) -> f64
    where
        T: nalgebra::Scalar + Float,
    {
        self.score_samples(xx).sum()
    }

    /// Bayesian information criterion; lower is better
    pub fn bic<T>(&self, xx: &DMatrix<T>) -> f64
    where
        T: nalgebra::Scalar + Float,
    {
        let n = xx.nrows() as f64;
        -2. * self.log_likelihood(xx) + self.num_parameters() as f64 * n.ln()
    }

    /// posterior membership probabilities (n x k)
    pub fn predict_proba<T>(&self, xx: &DMatrix<T>) -> DMatrix<f64>
    where
        T: nalgebra::Scalar + Float,
    {
        let (_, log_resp) = self.e_step(&to_f64_mat(xx));
        log_resp.map(f64::exp)
    }

    /// component with the largest posterior for each sample
    pub fn predict<T>(&self, xx: &DMatrix<T>) -> Vec<usize>
    where
        T: nalgebra::Scalar + Float,
    {
        let log_prob = self.weighted_log_prob(&to_f64_mat(xx));
        log_prob
            .row_iter()
            .map(|row| {
                let mut best = 0;
                for (c, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = c;
                    }
                }
                best
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::adjusted_rand_index;
    use approx::assert_abs_diff_eq;
    use rand_distr::{Distribution, Normal};

    fn blobs(centres: &[(f64, f64)], per_blob: usize, seed: u64) -> (DMatrix<f64>, Vec<usize>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0., 1.).unwrap();
        let n = centres.len() * per_blob;
        let mut xx = DMatrix::<f64>::zeros(n, 2);
        let mut labels = vec![];
        for (b, (cx, cy)) in centres.iter().enumerate() {
            for i in 0..per_blob {
                let r = b * per_blob + i;
                xx[(r, 0)] = cx + noise.sample(&mut rng);
                xx[(r, 1)] = cy + noise.sample(&mut rng);
                labels.push(b);
            }
        }
        (xx, labels)
    }

    #[test]
    fn single_component_matches_moments() -> anyhow::Result<()> {
        let xx = DMatrix::<f64>::from_row_slice(4, 2, &[0., 0., 2., 0., 0., 2., 2., 2.]);
        let gmm = TiedGaussianMixture::fit(&xx, &MixtureArgs::with_components(1))?;

        assert_abs_diff_eq!(gmm.means[(0, 0)], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gmm.means[(0, 1)], 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gmm.covariance[(0, 0)], 1.0 + 1e-6, epsilon = 1e-9);
        assert_abs_diff_eq!(gmm.covariance[(0, 1)], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(gmm.weights[0], 1.0, epsilon = 1e-9);
        assert_eq!(gmm.num_parameters(), 2 + 3);

        // standard bivariate normal at distance sqrt(2)
        let expected = 4. * (-(2. * std::f64::consts::PI).ln() - 1.);
        assert_abs_diff_eq!(gmm.log_likelihood(&xx), expected, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn recovers_separated_blobs() -> anyhow::Result<()> {
        let (xx, truth) = blobs(&[(0., 0.), (10., 0.), (0., 10.)], 60, 1);

        let args = MixtureArgs {
            num_components: 3,
            num_init: 5,
            ..Default::default()
        };
        let gmm = TiedGaussianMixture::fit(&xx, &args)?;
        let labels = gmm.predict(&xx);
        assert_abs_diff_eq!(adjusted_rand_index(&truth, &labels), 1.0, epsilon = 1e-9);

        let proba = gmm.predict_proba(&xx);
        for row in proba.row_iter() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
        assert_eq!(gmm.num_parameters(), 6 + 3 + 2);
        Ok(())
    }

    #[test]
    fn bic_prefers_true_count() -> anyhow::Result<()> {
        let (xx, _) = blobs(&[(0., 0.), (12., 12.)], 80, 7);

        let bic: Vec<f64> = (1..=4)
            .map(|k| {
                let args = MixtureArgs {
                    num_components: k,
                    num_init: 3,
                    ..Default::default()
                };
                TiedGaussianMixture::fit(&xx, &args).map(|g| g.bic(&xx))
            })
            .collect::<anyhow::Result<_>>()?;

        let best = (0..bic.len())
            .fold(0, |b, k| if bic[k] < bic[b] { k } else { b });
        assert_eq!(best + 1, 2, "bic {:?}", bic);
        Ok(())
    }

    #[test]
    fn seeded_fit_is_reproducible() -> anyhow::Result<()> {
        let (xx, _) = blobs(&[(0., 0.), (5., 5.)], 30, 3);
        let args = MixtureArgs {
            num_components: 2,
            num_init: 4,
            seed: 11,
            ..Default::default()
        };
        let a = TiedGaussianMixture::fit(&xx, &args)?;
        let b = TiedGaussianMixture::fit(&xx, &args)?;
        assert_eq!(a.predict(&xx), b.predict(&xx));
        assert_eq!(a.bic(&xx), b.bic(&xx));
        Ok(())
    }

    #[test]
    fn lower_bound_describes_returned_model() -> anyhow::Result<()> {
        let (xx, _) = blobs(&[(0., 0.), (4., 0.), (0., 4.)], 25, 5);
        let args = MixtureArgs {
            num_components: 3,
            num_init: 2,
            max_iter: 3,
            seed: 2,
            ..Default::default()
        };
        let gmm = TiedGaussianMixture::fit(&xx, &args)?;
        assert_abs_diff_eq!(gmm.lower_bound, gmm.score_samples(&xx).mean(), epsilon = 1e-9);
        assert_abs_diff_eq!(
            gmm.log_likelihood(&xx),
            gmm.lower_bound * xx.nrows() as f64,
            epsilon = 1e-8
        );
        Ok(())
    }

    #[test]
    fn too_many_components() {
        let xx = DMatrix::<f32>::zeros(3, 2);
        assert!(TiedGaussianMixture::fit(&xx, &MixtureArgs::with_components(4)).is_err());
        let nan = DMatrix::<f32>::from_element(3, 2, f32::NAN);
        assert!(TiedGaussianMixture::fit(&nan, &MixtureArgs::with_components(1)).is_err());
    }
}
