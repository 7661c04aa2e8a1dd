use candle_core::{Result, Tensor, D};

/// probabilities are kept within `[EPS, 1 - EPS]` before taking logs
pub const BCE_EPSILON: f64 = 1e-7;

/// KL divergence loss between two Gaussian distributions
///
/// -0.5 * (1 + log(sigma^2) - mu^2 - sigma^2)
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
///
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// Binary cross entropy averaged over features
///
/// loss(i) = - mean_w [ x(i,w) log p(i,w) + (1 - x(i,w)) log(1 - p(i,w)) ]
///
/// * `x_nd` - data tensor (observed data)
/// * `p_nd` - probability tensor (reconstruction)
///
pub fn binary_cross_entropy(x_nd: &Tensor, p_nd: &Tensor) -> Result<Tensor> {
    let p_nd = p_nd.clamp(BCE_EPSILON, 1. - BCE_EPSILON)?;
    let log_p = p_nd.log()?;
    let log_1mp = p_nd.affine(-1., 1.)?.log()?;
    let x_1mx = x_nd.affine(-1., 1.)?;
    (x_nd.mul(&log_p)? + x_1mx.mul(&log_1mp)?)?
        .mean(D::Minus1)?
        .neg()
}

/// Reconstruction loss of a sigmoid decoder: the feature-averaged
/// binary cross entropy scaled by the number of features
///
/// loss(i) = d * bce(i)
///
pub fn scaled_binary_cross_entropy(x_nd: &Tensor, p_nd: &Tensor) -> Result<Tensor> {
    let d = x_nd.dim(D::Minus1)? as f64;
    binary_cross_entropy(x_nd, p_nd)? * d
}
