use crate::lupin_common::*;

use candle_util::candle_core::DType;
use candle_util::candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::InMemoryData;
use candle_util::candle_decoder_sigmoid::SigmoidDecoder;
use candle_util::candle_encoder_gaussian::GaussianEncoder;
use candle_util::candle_inference::TrainConfig;
use candle_util::candle_loss_functions::scaled_binary_cross_entropy;
use candle_util::candle_random::{reinitialize_glorot_uniform, GaussianNoise};
use candle_util::candle_vae_inference::{Vae, VaeT};
use matrix_util::clustering::{silhouette_score, Kmeans, KmeansArgs};
use matrix_util::dmatrix_util::all_finite;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Network and optimizer settings shared by every training run
#[derive(Debug, Clone)]
pub struct VaeSettings {
    /// encoder hidden layers; the decoder uses them in reverse
    pub encoder_layers: Vec<usize>,
    pub latent_dim: usize,
    pub epsilon_std: f64,
    pub learning_rate: f32,
    pub clip_norm: Option<f32>,
    pub batch_size: usize,
    pub epochs: usize,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}

/// Outcome of one training run
pub struct TrainedRun {
    /// latent means of every (padded) training row
    pub latent: Mat,
    /// average loss per epoch
    pub loss_trace: Vec<f32>,
}

/// Seeds for weight initialization, reparameterization noise and
/// minibatch shuffling, derived from one run seed
struct RunSeeds {
    weights: u64,
    noise: u64,
    shuffle: u64,
}

impl RunSeeds {
    fn derive(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            weights: rng.random(),
            noise: rng.random(),
            shuffle: rng.random(),
        }
    }
}

/// Train a fresh VAE on `x_padded` and embed every row by its latent
/// mean
///
/// * `x_padded` - cells x genes, rows already padded to a multiple of
///   the batch size
/// * `settings` - network and optimizer settings
/// * `seed` - seed of this run
pub fn train_vae_embedding(
    x_padded: &Mat,
    settings: &VaeSettings,
    seed: u64,
) -> anyhow::Result<TrainedRun> {
    let seeds = RunSeeds::derive(seed);
    let dev = &settings.device;
    let n_features = x_padded.ncols();
    let decoder_layers: Vec<usize> = settings.encoder_layers.iter().rev().copied().collect();

    let parameters = VarMap::new();
    let param_builder = VarBuilder::from_varmap(&parameters, DType::F32, dev);

    let noise = GaussianNoise::new(settings.epsilon_std, seeds.noise)?;

    let encoder = GaussianEncoder::new(
        n_features,
        settings.latent_dim,
        &settings.encoder_layers,
        noise,
        param_builder.clone(),
    )?;

    let decoder = SigmoidDecoder::new(
        n_features,
        settings.latent_dim,
        &decoder_layers,
        param_builder,
    )?;

    reinitialize_glorot_uniform(&parameters, seeds.weights)?;

    let mut vae = Vae::build(&encoder, &decoder, &parameters);
    let mut data = InMemoryData::new(x_padded)?;

    let train_config = TrainConfig {
        learning_rate: settings.learning_rate,
        clip_norm: settings.clip_norm,
        batch_size: settings.batch_size,
        num_epochs: settings.epochs,
        device: dev.clone(),
        verbose: settings.verbose,
        show_progress: settings.show_progress,
        seed: seeds.shuffle,
    };

    let loss_trace =
        vae.train_encoder_decoder(&mut data, &scaled_binary_cross_entropy, &train_config)?;

    let latent = vae.evaluate_latent_mean(x_padded, settings.batch_size, dev)?;

    Ok(TrainedRun { latent, loss_trace })
}

/// Silhouette score of a KMeans partition of the embedding. A
/// non-finite embedding scores 0.
pub fn cohesion_score(latent: &Mat, num_clusters: usize, seed: u64) -> f64 {
    if !all_finite(latent) {
        return 0.;
    }

    let args = KmeansArgs::with_clusters(num_clusters).seed(seed);
    let labels = latent.kmeans_rows(args);
    let score = silhouette_score(latent, &labels);

    if score.is_finite() {
        score
    } else {
        0.
    }
}

/// Index of the first maximum; `NaN` never wins. Returns `None` when
/// no score is comparable.
pub fn select_best_run(scores: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (r, &s) in scores.iter().enumerate() {
        if s.is_nan() {
            continue;
        }
        match best {
            Some((_, b)) if s <= b => {}
            _ => best = Some((r, s)),
        }
    }
    best.map(|(r, _)| r)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_maximum_wins() {
        assert_eq!(select_best_run(&[0.1, 0.5, 0.5, 0.2]), Some(1));
        assert_eq!(select_best_run(&[0.3]), Some(0));
        assert_eq!(select_best_run(&[f64::NAN, -0.2, -0.2]), Some(1));
        assert_eq!(select_best_run(&[0., 0., 0.]), Some(0));
        assert_eq!(select_best_run(&[]), None);
        assert_eq!(select_best_run(&[f64::NAN]), None);
    }

    #[test]
    fn non_finite_embedding_scores_zero() {
        let mut latent = Mat::from_fn(20, 2, |i, j| (i * 2 + j) as f32);
        latent[(3, 1)] = f32::NAN;
        assert_eq!(cohesion_score(&latent, 6, 0), 0.);
        latent[(3, 1)] = f32::INFINITY;
        assert_eq!(cohesion_score(&latent, 6, 0), 0.);
    }

    #[test]
    fn collapsed_embedding_scores_zero() {
        let latent = Mat::from_element(30, 3, 0.25);
        assert_eq!(cohesion_score(&latent, 6, 1), 0.);
    }

    #[test]
    fn separated_groups_score_high() {
        let latent = Mat::from_fn(60, 2, |i, j| {
            let g = (i % 3) as f32;
            let jitter = ((i * 7 + j * 3) % 5) as f32 * 0.01;
            g * 10. + jitter
        });
        let s = cohesion_score(&latent, 3, 7);
        assert!(s > 0.9, "{}", s);
    }

    #[test]
    fn training_yields_one_latent_row_per_input_row() -> anyhow::Result<()> {
        let xx = Mat::from_fn(12, 5, |i, j| ((i + j) % 2) as f32);
        let settings = VaeSettings {
            encoder_layers: vec![8, 4],
            latent_dim: 2,
            epsilon_std: 1.,
            learning_rate: 1e-3,
            clip_norm: Some(2.),
            batch_size: 4,
            epochs: 3,
            device: candle_core::Device::Cpu,
            verbose: false,
            show_progress: false,
        };
        let run = train_vae_embedding(&xx, &settings, 3)?;
        assert_eq!(run.latent.shape(), (12, 2));
        assert_eq!(run.loss_trace.len(), 3);
        Ok(())
    }
}
