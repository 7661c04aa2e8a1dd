use crate::candle_data_loader::*;
use crate::candle_inference::TrainConfig;
use crate::candle_model_traits::{DecoderModuleT, EncoderModuleT};
use crate::candle_rmsprop::{ParamsRmsProp, RmsProp};

use candle_core::{Device, Result, Tensor};
use candle_nn::Optimizer;
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::SeedableRng;

pub struct Vae<'a, Enc, Dec>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
{
    pub encoder: &'a Enc,
    pub decoder: &'a Dec,
    pub variable_map: &'a candle_nn::VarMap,
}

pub trait VaeT<'a, Enc, Dec>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
{
    /// Train the VAE model by minimizing `recon_loss + KL`
    ///
    /// * `data` - data loader, reshuffled every epoch
    /// * `recon_loss` - fn (observed, reconstruction) -> loss per sample
    /// * `train_config` - training configuration
    ///
    /// Returns the average loss of each epoch
    fn train_encoder_decoder<DataL, LossFn>(
        &mut self,
        data: &mut DataL,
        recon_loss: &LossFn,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>;

    /// Latent means of the rows of `x_nd`, evaluated `batch_size` rows
    /// at a time
    fn evaluate_latent_mean(
        &self,
        x_nd: &DMatrix<f32>,
        batch_size: usize,
        device: &Device,
    ) -> anyhow::Result<DMatrix<f32>>;

    /// Build a VAE model
    /// * `encoder` - encoder module
    /// * `decoder` - decoder module
    fn build(encoder: &'a Enc, decoder: &'a Dec, variable_map: &'a candle_nn::VarMap) -> Self;
}

impl<'a, Enc, Dec> VaeT<'a, Enc, Dec> for Vae<'a, Enc, Dec>
where
    Enc: EncoderModuleT,
    Dec: DecoderModuleT,
{
    fn train_encoder_decoder<DataL, LossFn>(
        &mut self,
        data: &mut DataL,
        recon_loss: &LossFn,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: DataLoader,
        LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
    {
        let device = &train_config.device;
        let params = ParamsRmsProp {
            lr: train_config.learning_rate.into(),
            clip_norm: train_config.clip_norm.map(f64::from),
            ..ParamsRmsProp::default()
        };
        let mut rmsprop = RmsProp::new(self.variable_map.all_vars(), params)?;

        let pb = ProgressBar::new(train_config.num_epochs as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut rng = StdRng::seed_from_u64(train_config.seed);
        let mut loss_trace = vec![];

        for epoch in 0..train_config.num_epochs {
            data.shuffle_minibatch(train_config.batch_size, &mut rng)?;

            let mut loss_tot = 0f32;

            for b in 0..data.num_minibatch() {
                let x_nd = data.minibatch_data(b, device)?;

                let (z_nk, kl_n) = self.encoder.forward_t(&x_nd, true)?;
                let (_, recon_n) = self.decoder.forward_with_loss(&z_nk, &x_nd, recon_loss)?;

                let loss = (recon_n + kl_n)?.mean_all()?;
                rmsprop.backward_step(&loss)?;
                loss_tot += loss.to_scalar::<f32>()?;
            }

            loss_trace.push(loss_tot / data.num_minibatch().max(1) as f32);
            pb.inc(1);

            if train_config.verbose {
                info!(
                    "[{}] loss: {}",
                    epoch + 1,
                    loss_trace.last().ok_or(anyhow::anyhow!("loss"))?
                );
            }
        } // each epoch

        pb.finish_and_clear();
        Ok(loss_trace)
    }

    fn evaluate_latent_mean(
        &self,
        x_nd: &DMatrix<f32>,
        batch_size: usize,
        device: &Device,
    ) -> anyhow::Result<DMatrix<f32>> {
        if batch_size == 0 {
            return Err(anyhow::anyhow!("batch size must be positive"));
        }

        let x_nd = x_nd.to_tensor(device)?;
        let ntot = x_nd.dims2()?.0;

        let chunks = (0..ntot)
            .step_by(batch_size)
            .map(|lb| {
                let len = batch_size.min(ntot - lb);
                self.encoder.latent_mean(&x_nd.narrow(0, lb, len)?)
            })
            .collect::<Result<Vec<_>>>()?;

        if chunks.is_empty() {
            return Ok(DMatrix::zeros(0, self.encoder.dim_latent()));
        }

        Ok(tensor_to_mat(&Tensor::cat(&chunks, 0)?)?)
    }

    fn build(encoder: &'a Enc, decoder: &'a Dec, variable_map: &'a candle_nn::VarMap) -> Self {
        debug_assert_eq!(encoder.dim_latent(), decoder.dim_latent());
        debug_assert_eq!(encoder.dim_obs(), decoder.dim_obs());

        Self {
            encoder,
            decoder,
            variable_map,
        }
    }
}
