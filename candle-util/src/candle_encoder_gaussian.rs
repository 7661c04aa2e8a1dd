use crate::candle_aux_layers::StackLayers;
use crate::candle_loss_functions::gaussian_kl_loss;
use crate::candle_model_traits::*;
use crate::candle_random::GaussianNoise;
use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

/// Encoder `x -> (mu(x), log var(x))` with a Gaussian latent layer
pub struct GaussianEncoder {
    n_features: usize,
    n_latent: usize,
    fc: StackLayers<Linear>,
    z_mean: Linear,
    z_lnvar: Linear,
    noise: GaussianNoise,
}

impl EncoderModuleT for GaussianEncoder {
    fn forward_t(&self, x_nd: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let (z_mean_nk, z_lnvar_nk) = self.latent_gaussian_params(x_nd)?;
        let z_nk = self.reparameterize(&z_mean_nk, &z_lnvar_nk, train)?;
        Ok((z_nk, gaussian_kl_loss(&z_mean_nk, &z_lnvar_nk)?))
    }

    fn latent_mean(&self, x_nd: &Tensor) -> Result<Tensor> {
        let h_nl = self.fc.forward(x_nd)?;
        self.z_mean.forward(&h_nl)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl GaussianEncoder {
    ///
    /// Evaluate latent Gaussian parameters: mu and log_var
    /// z ~ (mu(x), log_var(x))
    pub fn latent_gaussian_params(&self, x_nd: &Tensor) -> Result<(Tensor, Tensor)> {
        let h_nl = self.fc.forward(x_nd)?;
        let z_mean_nk = self.z_mean.forward(&h_nl)?;
        let z_lnvar_nk = self.z_lnvar.forward(&h_nl)?;
        Ok((z_mean_nk, z_lnvar_nk))
    }

    ///
    /// z = mu + sigma * eps
    /// where eps ~ N(0, sd^2)
    ///
    /// # Arguments
    /// * `z_mean` - mean of Gaussian distribution
    /// * `z_lnvar` - log variance of Gaussian distribution
    pub fn reparameterize(&self, z_mean: &Tensor, z_lnvar: &Tensor, train: bool) -> Result<Tensor> {
        if train {
            let eps = self.noise.sample_like(z_mean)?;
            z_mean + (z_lnvar * 0.5)?.exp()? * eps
        } else {
            Ok(z_mean.clone())
        }
    }

    /// Will create a new Gaussian encoder module
    /// with these variables:
    ///
    /// * `nn.enc.fc.{}.weight` where {} is the layer index
    /// * `nn.enc.z.mean.weight`
    /// * `nn.enc.z.lnvar.weight`
    ///
    /// # Arguments
    /// * `n_features` - input dimension
    /// * `n_latent` - latent dimension
    /// * `layers` - hidden layer sizes, each followed by ReLU
    /// * `noise` - source of the reparameterization noise
    pub fn new(
        n_features: usize,
        n_latent: usize,
        layers: &[usize],
        noise: GaussianNoise,
        vs: VarBuilder,
    ) -> Result<Self> {
        // (1) data -> fc
        let (fc, prev_dim) = StackLayers::fully_connected(
            n_features,
            layers,
            candle_nn::Activation::Relu,
            "nn.enc.fc",
            vs.clone(),
        )?;

        // (2) fc -> K
        let z_mean = candle_nn::linear(prev_dim, n_latent, vs.pp("nn.enc.z.mean"))?;
        let z_lnvar = candle_nn::linear(prev_dim, n_latent, vs.pp("nn.enc.z.lnvar"))?;

        Ok(Self {
            n_features,
            n_latent,
            fc,
            z_mean,
            z_lnvar,
            noise,
        })
    }
}
