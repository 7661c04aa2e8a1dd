use crate::traits::MatOps;
pub use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive};

impl<T> MatOps for DMatrix<T>
where
    T: nalgebra::Scalar + Float + FromPrimitive,
{
    type Mat = Self;
    type Scalar = T;

    fn centre_rows_inplace(&mut self) {
        let ncols = T::from_usize(self.ncols().max(1)).unwrap_or_else(T::one);
        for mut x_i in self.row_iter_mut() {
            let mu = x_i.iter().fold(T::zero(), |acc, &x| acc + x) / ncols;
            x_i.apply(|x| *x = *x - mu);
        }
    }

    fn centre_rows(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_rows_inplace();
        ret
    }

    fn centre_columns_inplace(&mut self) {
        let nrows = T::from_usize(self.nrows().max(1)).unwrap_or_else(T::one);
        for mut x_j in self.column_iter_mut() {
            let mu = x_j.iter().fold(T::zero(), |acc, &x| acc + x) / nrows;
            x_j.apply(|x| *x = *x - mu);
        }
    }

    fn centre_columns(&self) -> Self::Mat {
        let mut ret = self.clone();
        ret.centre_columns_inplace();
        ret
    }
}

fn replace_if<T, F>(xx: &mut DMatrix<T>, value: T, hit: F) -> usize
where
    T: nalgebra::Scalar + Float,
    F: Fn(T) -> bool,
{
    let mut nreplaced = 0;
    for x in xx.iter_mut() {
        if hit(*x) {
            *x = value;
            nreplaced += 1;
        }
    }
    nreplaced
}

/// Replace every non-finite entry (`NaN`, `inf`) with `value`
///
/// Returns the number of replaced entries
pub fn replace_non_finite<T>(xx: &mut DMatrix<T>, value: T) -> usize
where
    T: nalgebra::Scalar + Float,
{
    replace_if(xx, value, |x| !x.is_finite())
}

/// Replace `NaN` entries with `value`; infinities are kept
pub fn replace_nan<T>(xx: &mut DMatrix<T>, value: T) -> usize
where
    T: nalgebra::Scalar + Float,
{
    replace_if(xx, value, |x| x.is_nan())
}

/// Whether every entry is finite
pub fn all_finite<T>(xx: &DMatrix<T>) -> bool
where
    T: nalgebra::Scalar + Float,
{
    xx.iter().all(|x| x.is_finite())
}
