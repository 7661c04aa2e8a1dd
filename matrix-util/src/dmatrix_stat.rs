use crate::traits::ColumnStatOps;
use nalgebra::DMatrix;
use num_traits::{Float, FromPrimitive};
use rayon::prelude::*;

/// Equal-width histogram counts over `[min, max]` of `xx`
///
/// Follows the usual convention: the last bin is closed on the right,
/// and a constant vector spans `[x - 0.5, x + 0.5]`.
pub fn histogram_counts<T>(xx: &[T], nbins: usize) -> Vec<usize>
where
    T: Float,
{
    let mut counts = vec![0_usize; nbins.max(1)];
    let finite = xx.iter().copied().filter(|x| x.is_finite());

    let (lo, hi) = finite.clone().fold((None, None), |(lo, hi): (Option<T>, Option<T>), x| {
        (
            Some(lo.map_or(x, |l| l.min(x))),
            Some(hi.map_or(x, |h| h.max(x))),
        )
    });

    let (lo, hi) = match (lo, hi) {
        (Some(lo), Some(hi)) => (lo, hi),
        _ => return counts,
    };

    let half = T::from(0.5).unwrap_or_else(T::zero);
    let (lo, hi) = if lo == hi { (lo - half, hi + half) } else { (lo, hi) };

    let nb = counts.len();
    let width = hi - lo;
    let nb_t = T::from(nb).unwrap_or_else(T::one);

    for x in finite {
        let b = ((x - lo) / width * nb_t).floor().to_usize().unwrap_or(0);
        counts[b.min(nb - 1)] += 1;
    }
    counts
}

/// Shannon entropy (natural log) of a count vector
pub fn entropy_of_counts(counts: &[usize]) -> f64 {
    let tot = counts.iter().sum::<usize>() as f64;
    if tot <= 0. {
        return 0.;
    }
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / tot;
            -p * p.ln()
        })
        .sum()
}

impl<T> ColumnStatOps for DMatrix<T>
where
    T: nalgebra::Scalar + Float + FromPrimitive + Send + Sync,
{
    type Scalar = T;

    fn column_mean_vec(&self) -> Vec<T> {
        let n = T::from_usize(self.nrows()).unwrap_or_else(T::zero);
        self.column_iter()
            .map(|x_j| x_j.iter().fold(T::zero(), |acc, &x| acc + x) / n)
            .collect()
    }

    fn column_cv_vec(&self) -> Vec<T> {
        let n = T::from_usize(self.nrows()).unwrap_or_else(T::zero);
        self.column_iter()
            .map(|x_j| {
                let mu = x_j.iter().fold(T::zero(), |acc, &x| acc + x) / n;
                let var = x_j
                    .iter()
                    .fold(T::zero(), |acc, &x| acc + (x - mu) * (x - mu))
                    / n;
                var.sqrt() / mu
            })
            .collect()
    }

    fn column_entropy_vec(&self, nbins: usize) -> Vec<T> {
        (0..self.ncols())
            .into_par_iter()
            .map(|j| {
                let x_j: Vec<T> = self.column(j).iter().copied().collect();
                let counts = histogram_counts(&x_j, nbins);
                T::from_f64(entropy_of_counts(&counts)).unwrap_or_else(T::nan)
            })
            .collect()
    }
}
