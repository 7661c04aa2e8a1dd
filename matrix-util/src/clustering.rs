//! K-means clustering and partition scores for matrices
//!
//! K-means uses k-means++ seeding and Lloyd iterations with several
//! restarts. All the randomness comes from `KmeansArgs::seed`, so the
//! same input always gives the same membership.

use nalgebra::DMatrix;
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::collections::HashMap;

/// Arguments for k-means clustering
#[derive(Debug, Clone)]
pub struct KmeansArgs {
    /// Number of clusters
    pub num_clusters: usize,
    /// Maximum number of Lloyd iterations per restart
    pub max_iter: usize,
    /// Number of restarts; the one with the smallest inertia is kept
    pub num_init: usize,
    /// Convergence tolerance relative to the average feature variance
    pub tol: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for KmeansArgs {
    fn default() -> Self {
        Self {
            num_clusters: 1,
            max_iter: 300,
            num_init: 10,
            tol: 1e-4,
            seed: 42,
        }
    }
}

impl KmeansArgs {
    /// Create args with specified number of clusters
    pub fn with_clusters(num_clusters: usize) -> Self {
        Self {
            num_clusters,
            ..Default::default()
        }
    }

    pub fn seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}

/// Fitted k-means model
#[derive(Debug, Clone)]
pub struct KmeansFit {
    /// cluster index of each data point
    pub membership: Vec<usize>,
    /// one centroid per row
    pub centroids: DMatrix<f64>,
    /// sum of squared distances to the closest centroid
    pub inertia: f64,
}

/// Trait for k-means clustering on matrices
pub trait Kmeans {
    /// Cluster rows and return the fitted model
    fn fit_kmeans_rows(&self, args: &KmeansArgs) -> KmeansFit;

    /// Cluster rows and return membership vector, one per row
    fn kmeans_rows(&self, args: KmeansArgs) -> Vec<usize> {
        self.fit_kmeans_rows(&args).membership
    }

    /// Cluster columns and return membership vector, one per column
    fn kmeans_columns(&self, args: KmeansArgs) -> Vec<usize>;
}

impl<T> Kmeans for DMatrix<T>
where
    T: nalgebra::Scalar + Float + Sync + Send,
{
    fn fit_kmeans_rows(&self, args: &KmeansArgs) -> KmeansFit {
        let data: Vec<Vec<f64>> = self
            .row_iter()
            .map(|x| x.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect())
            .collect();
        kmeans_fit(&data, self.ncols(), args)
    }

    fn kmeans_columns(&self, args: KmeansArgs) -> Vec<usize> {
        let data: Vec<Vec<f64>> = self
            .column_iter()
            .map(|x| x.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect())
            .collect();
        kmeans_fit(&data, self.nrows(), &args).membership
    }
}

fn sq_dist(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Closest centroid and the squared distance to it
fn closest(x: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (k, c) in centroids.iter().enumerate() {
        let d = sq_dist(x, c);
        if d < best.1 {
            best = (k, d);
        }
    }
    best
}

/// k-means++ seeding
fn kmeans_plus_plus(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let n = data.len();
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..n)].clone());

    let mut d2: Vec<f64> = data.iter().map(|x| sq_dist(x, &centroids[0])).collect();

    while centroids.len() < k {
        let tot: f64 = d2.iter().sum();
        let next = if tot > 0. && tot.is_finite() {
            let u = rng.random::<f64>() * tot;
            let mut acc = 0.;
            let mut pick = n - 1;
            for (i, &d) in d2.iter().enumerate() {
                acc += d;
                if acc >= u {
                    pick = i;
                    break;
                }
            }
            pick
        } else {
            // every point sits on a centroid already
            rng.random_range(0..n)
        };

        let c = data[next].clone();
        for (i, x) in data.iter().enumerate() {
            d2[i] = d2[i].min(sq_dist(x, &c));
        }
        centroids.push(c);
    }
    centroids
}

fn lloyd(
    data: &[Vec<f64>],
    dim: usize,
    mut centroids: Vec<Vec<f64>>,
    max_iter: usize,
    tol: f64,
) -> (Vec<usize>, Vec<Vec<f64>>, f64) {
    let k = centroids.len();
    let mut membership = vec![0; data.len()];

    for _iter in 0..max_iter.max(1) {
        membership = data
            .par_iter()
            .map(|x| closest(x, &centroids).0)
            .collect();

        let mut sums = vec![vec![0_f64; dim]; k];
        let mut sizes = vec![0_usize; k];
        for (x, &m) in data.iter().zip(membership.iter()) {
            sizes[m] += 1;
            for (s, v) in sums[m].iter_mut().zip(x.iter()) {
                *s += v;
            }
        }

        let mut shift = 0.;
        for c in 0..k {
            // an empty cluster keeps its centroid
            if sizes[c] == 0 {
                continue;
            }
            let denom = sizes[c] as f64;
            let new_c: Vec<f64> = sums[c].iter().map(|s| s / denom).collect();
            shift += sq_dist(&new_c, &centroids[c]);
            centroids[c] = new_c;
        }

        if shift <= tol {
            break;
        }
    }

    let (membership, inertia): (Vec<usize>, Vec<f64>) =
        data.par_iter().map(|x| closest(x, &centroids)).unzip();

    (membership, centroids, inertia.iter().sum())
}

/// Run k-means on the data points (`data[i]` has `dim` features)
pub fn kmeans_fit(data: &[Vec<f64>], dim: usize, args: &KmeansArgs) -> KmeansFit {
    let n = data.len();
    let k = args.num_clusters.clamp(1, n.max(1));

    if n == 0 {
        return KmeansFit {
            membership: vec![],
            centroids: DMatrix::zeros(0, dim),
            inertia: 0.,
        };
    }

    // tolerance scaled by the average per-feature variance
    let mean_var = if dim > 0 {
        (0..dim)
            .map(|j| {
                let mu = data.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                data.iter().map(|x| (x[j] - mu).powi(2)).sum::<f64>() / n as f64
            })
            .sum::<f64>()
            / dim as f64
    } else {
        0.
    };
    let tol = args.tol * mean_var;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let seeds: Vec<u64> = (0..args.num_init.max(1)).map(|_| rng.random()).collect();

    let fits: Vec<(Vec<usize>, Vec<Vec<f64>>, f64)> = seeds
        .iter()
        .map(|&s| {
            let mut rng = StdRng::seed_from_u64(s);
            let init = kmeans_plus_plus(data, k, &mut rng);
            lloyd(data, dim, init, args.max_iter, tol)
        })
        .collect();

    // first restart with the smallest inertia
    let mut best = 0;
    for (r, fit) in fits.iter().enumerate() {
        if fit.2 < fits[best].2 {
            best = r;
        }
    }

    let (membership, centroids, inertia) = fits.into_iter().nth(best).unwrap_or_default();

    KmeansFit {
        membership,
        centroids: DMatrix::from_row_iterator(k, dim, centroids.into_iter().flatten()),
        inertia,
    }
}

/// Mean silhouette coefficient of a partition of the rows of `xx`
///
/// Euclidean distance. Points in singleton clusters contribute 0. If
/// fewer than two or more than `n - 1` clusters are occupied, the score
/// is not defined and `0` is returned.
pub fn silhouette_score<T>(xx: &DMatrix<T>, labels: &[usize]) -> f64
where
    T: nalgebra::Scalar + Float + Sync + Send,
{
    let n = xx.nrows();
    if n == 0 || labels.len() != n {
        return 0.;
    }

    // relabel to 0..K
    let mut index: HashMap<usize, usize> = HashMap::new();
    let relabel: Vec<usize> = labels
        .iter()
        .map(|l| {
            let next = index.len();
            *index.entry(*l).or_insert(next)
        })
        .collect();
    let nk = index.len();

    if nk < 2 || nk > n - 1 {
        return 0.;
    }

    let mut sizes = vec![0_usize; nk];
    for &l in relabel.iter() {
        sizes[l] += 1;
    }

    let data: Vec<Vec<f64>> = xx
        .row_iter()
        .map(|x| x.iter().map(|v| v.to_f64().unwrap_or(f64::NAN)).collect())
        .collect();

    let total: f64 = (0..n)
        .into_par_iter()
        .map(|i| {
            let li = relabel[i];
            if sizes[li] <= 1 {
                return 0.;
            }
            let mut dist_sum = vec![0_f64; nk];
            for (j, x_j) in data.iter().enumerate() {
                if i != j {
                    dist_sum[relabel[j]] += sq_dist(&data[i], x_j).sqrt();
                }
            }
            let a = dist_sum[li] / (sizes[li] - 1) as f64;
            let b = (0..nk)
                .filter(|&k| k != li)
                .map(|k| dist_sum[k] / sizes[k] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0. {
                (b - a) / denom
            } else {
                0.
            }
        })
        .collect::<Vec<f64>>()
        .iter()
        .sum();

    total / n as f64
}

fn choose2(x: usize) -> f64 {
    let x = x as f64;
    x * (x - 1.) / 2.
}

/// Adjusted Rand index between two partitions of the same items
///
/// Returns 1 for identical partitions (up to relabelling); close to 0
/// for independent ones.
pub fn adjusted_rand_index(truth: &[usize], pred: &[usize]) -> f64 {
    let n = truth.len().min(pred.len());
    if n == 0 {
        return 1.;
    }

    let mut contingency: HashMap<(usize, usize), usize> = HashMap::new();
    let mut rows: HashMap<usize, usize> = HashMap::new();
    let mut cols: HashMap<usize, usize> = HashMap::new();

    for (&a, &b) in truth.iter().zip(pred.iter()) {
        *contingency.entry((a, b)).or_default() += 1;
        *rows.entry(a).or_default() += 1;
        *cols.entry(b).or_default() += 1;
    }

    let sum_comb: f64 = contingency.values().map(|&c| choose2(c)).sum();
    let sum_rows: f64 = rows.values().map(|&c| choose2(c)).sum();
    let sum_cols: f64 = cols.values().map(|&c| choose2(c)).sum();

    let expected = sum_rows * sum_cols / choose2(n).max(1.);
    let max_index = (sum_rows + sum_cols) / 2.;

    if (max_index - expected).abs() < 1e-12 {
        // both partitions trivial
        return 1.;
    }
    (sum_comb - expected) / (max_index - expected)
}
