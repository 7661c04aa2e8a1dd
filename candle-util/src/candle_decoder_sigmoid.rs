use crate::candle_aux_layers::StackLayers;
use crate::candle_model_traits::DecoderModuleT;
use candle_core::{Result, Tensor};
use candle_nn::{ops, Linear, Module, VarBuilder};

/// Decoder `z -> sigmoid(fc(z))` producing values in (0, 1)
pub struct SigmoidDecoder {
    n_features: usize,
    n_latent: usize,
    fc: StackLayers<Linear>,
    out: Linear,
}

impl DecoderModuleT for SigmoidDecoder {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        let h_nl = self.fc.forward(z_nk)?;
        ops::sigmoid(&self.out.forward(&h_nl)?)
    }

    fn dim_obs(&self) -> usize {
        self.n_features
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl SigmoidDecoder {
    /// Will create a new decoder module with these variables:
    ///
    /// * `nn.dec.fc.{}.weight` where {} is the layer index
    /// * `nn.dec.out.weight`
    ///
    /// # Arguments
    /// * `n_features` - output dimension
    /// * `n_latent` - latent dimension
    /// * `layers` - hidden layer sizes from the latent side, each followed by ReLU
    pub fn new(n_features: usize, n_latent: usize, layers: &[usize], vs: VarBuilder) -> Result<Self> {
        let (fc, prev_dim) = StackLayers::fully_connected(
            n_latent,
            layers,
            candle_nn::Activation::Relu,
            "nn.dec.fc",
            vs.clone(),
        )?;

        let out = candle_nn::linear(prev_dim, n_features, vs.pp("nn.dec.out"))?;

        Ok(Self {
            n_features,
            n_latent,
            fc,
            out,
        })
    }
}
