use candle_core::{Result, Tensor};

pub trait EncoderModuleT {
    /// An encoder that spits out two results (latent sample, KL loss)
    ///
    /// # Arguments
    /// * `x_nd` - input data (n x d)
    /// * `train` - sample the latent states (otherwise take the mean)
    ///
    /// # Returns `(z_nk, kl_loss_n)`
    /// * `z_nk` - latent states (n x k)
    /// * `kl_loss_n` - KL divergence to the standard normal (n)
    fn forward_t(&self, x_nd: &Tensor, train: bool) -> Result<(Tensor, Tensor)>;

    /// Mean of the latent Gaussian (n x k)
    fn latent_mean(&self, x_nd: &Tensor) -> Result<Tensor>;

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstruction
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// A decoder that spits out reconstruction and per-sample loss
    /// * `z_nk` - latent states
    /// * `x_nd` - observed data to validate with
    /// * `loss` - fn (observed, reconstruction) -> loss (n)
    fn forward_with_loss<LossFn>(
        &self,
        z_nk: &Tensor,
        x_nd: &Tensor,
        loss: &LossFn,
    ) -> Result<(Tensor, Tensor)>
    where
        LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let recon_nd = self.forward(z_nk)?;
        let loss_n = loss(x_nd, &recon_nd)?;
        Ok((recon_nd, loss_n))
    }

    fn dim_obs(&self) -> usize;

    fn dim_latent(&self) -> usize;
}
