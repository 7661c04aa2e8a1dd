//! Expression matrix to latent embedding and cluster labels
//!
//! 1. gene selection, centering and row padding
//! 2. several VAE trainings, each scored by the silhouette of a KMeans
//!    partition of its embedding
//! 3. tied Gaussian mixtures over a range of component counts on the
//!    best embedding; the count minimizing the adjusted BIC labels the
//!    cells

use crate::embedding::*;
use crate::lupin_common::*;
use crate::model_selection::*;
use crate::preprocess::*;

use matrix_util::dmatrix_util::{all_finite, replace_non_finite};

#[derive(Debug, Clone, serde::Serialize)]
pub struct PipelineConfig {
    pub latent_dim: usize,
    pub n_starts: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    /// `None` turns off gradient clipping
    pub clip_norm: Option<f32>,
    pub epochs: usize,
    pub encoder_layers: Vec<usize>,
    pub epsilon_std: f64,
    pub num_kmeans_clusters: usize,
    pub max_components: usize,
    pub gmm_inits: usize,
    pub to_cluster: bool,
    pub gene_selection: bool,
    pub n_genes: usize,
    pub selection_criteria: String,
    pub relative_expression: bool,
    pub center_axis: CenterAxis,
    pub seed: u64,
    pub device: ComputeDevice,
    pub verbose: bool,
    pub show_progress: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            latent_dim: 3,
            n_starts: 5,
            batch_size: 100,
            learning_rate: 1e-4,
            clip_norm: Some(2.),
            epochs: 10,
            encoder_layers: vec![1024, 512, 256],
            epsilon_std: 1.,
            num_kmeans_clusters: 6,
            max_components: 9,
            gmm_inits: 10,
            to_cluster: true,
            gene_selection: false,
            n_genes: 5000,
            selection_criteria: "average".into(),
            relative_expression: false,
            center_axis: CenterAxis::Cell,
            seed: 10,
            device: ComputeDevice::Cpu,
            verbose: false,
            show_progress: true,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        let invalid = |msg: &str| -> anyhow::Result<()> {
            Err(LupinError::InvalidConfig(msg.to_string()).into())
        };

        if self.batch_size == 0 {
            return invalid("batch size must be positive");
        }
        if self.latent_dim == 0 {
            return invalid("latent dimension must be positive");
        }
        if self.n_starts == 0 {
            return invalid("at least one training run is needed");
        }
        if self.encoder_layers.is_empty() || self.encoder_layers.contains(&0) {
            return invalid("encoder layers must be a non-empty list of positive sizes");
        }
        if self.num_kmeans_clusters == 0 {
            return invalid("KMeans cluster count must be positive");
        }
        if self.to_cluster && self.max_components == 0 {
            return invalid("at least one mixture component must be tested");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.) {
            return invalid("learning rate must be positive");
        }
        if !(self.epsilon_std.is_finite() && self.epsilon_std >= 0.) {
            return invalid("epsilon std must be non-negative");
        }
        Ok(())
    }

    fn vae_settings(&self, device: candle_core::Device) -> VaeSettings {
        VaeSettings {
            encoder_layers: self.encoder_layers.clone(),
            latent_dim: self.latent_dim,
            epsilon_std: self.epsilon_std,
            learning_rate: self.learning_rate,
            clip_norm: self.clip_norm,
            batch_size: self.batch_size,
            epochs: self.epochs,
            device,
            verbose: self.verbose,
            show_progress: self.show_progress,
        }
    }
}

pub struct ClusteringResult {
    pub bic: BicCurve,
    pub num_components: usize,
    /// one label per cell
    pub labels: Vec<usize>,
}

pub struct PipelineResult {
    pub cell_names: Vec<Box<str>>,
    /// genes used for training, in selection order
    pub gene_names: Vec<Box<str>>,
    /// embedding of the selected run, one row per original cell
    pub latent: Mat,
    /// cohesion score of each run
    pub silhouette: Vec<f64>,
    pub best_run: usize,
    pub loss_traces: Vec<Vec<f32>>,
    pub clustering: Option<ClusteringResult>,
    /// the selected embedding has non-finite values
    pub degenerate: bool,
    /// every cell of the selected embedding sits at the same point
    pub collapsed: bool,
}

/// Whether all rows of `latent` are identical
pub fn is_collapsed(latent: &Mat) -> bool {
    match latent.nrows() {
        0 => true,
        _ => {
            let first = latent.row(0);
            latent.row_iter().all(|row| row == first)
        }
    }
}

/// Gene selection and centering
pub fn preprocess_expression(
    data: MatWithNames<Mat>,
    config: &PipelineConfig,
) -> MatWithNames<Mat> {
    let mut data = if config.gene_selection {
        select_genes_by_name(data, config.n_genes, &config.selection_criteria)
    } else {
        data
    };

    if config.relative_expression {
        center_expression(&mut data.mat, config.center_axis);
        info!("centered expression per {:?}", config.center_axis);
    }
    data
}

pub fn run_pipeline(data: MatWithNames<Mat>, config: &PipelineConfig) -> anyhow::Result<PipelineResult> {
    config.validate()?;

    let MatWithNames {
        rows: cell_names,
        cols: gene_names,
        mat: xx,
    } = preprocess_expression(data, config);

    let ncells = xx.nrows();
    if ncells == 0 || xx.ncols() == 0 {
        return Err(LupinError::InvalidInput(format!(
            "{} cells x {} genes left after preprocessing",
            ncells,
            xx.ncols()
        ))
        .into());
    }

    let x_padded = pad_rows(&xx, config.batch_size)?;
    info!(
        "training on {} rows ({} padded) x {} genes",
        x_padded.nrows(),
        x_padded.nrows() - ncells,
        x_padded.ncols()
    );

    let device = config.device.open(0)?;
    let settings = config.vae_settings(device);

    let mut runs = Vec::with_capacity(config.n_starts);
    let mut silhouette = Vec::with_capacity(config.n_starts);

    for r in 0..config.n_starts {
        let run = train_vae_embedding(&x_padded, &settings, config.seed.wrapping_add(r as u64))
            .context(LupinError::Training(format!("training run {}", r)))?;

        let score = if all_finite(&run.latent) {
            cohesion_score(&run.latent, config.num_kmeans_clusters, config.seed)
        } else {
            warn!("run {} produced a non-finite embedding; its score is 0", r);
            0.
        };

        info!("run {}: silhouette {:.4}", r, score);
        silhouette.push(score);
        runs.push(run);
    }

    let best_run = select_best_run(&silhouette).unwrap_or(0);
    if silhouette.iter().all(|&s| s.is_nan() || s <= 0.) {
        warn!(
            "no run produced a cohesive embedding (every silhouette <= 0); keeping run {}",
            best_run
        );
    }
    info!("selected run {} of {}", best_run, config.n_starts);

    let loss_traces: Vec<Vec<f32>> = runs.iter().map(|r| r.loss_trace.clone()).collect();
    let latent = runs.swap_remove(best_run).latent.rows(0, ncells).into_owned();
    drop(runs);

    let degenerate = !all_finite(&latent);
    if degenerate {
        warn!(
            "the selected embedding has non-finite values; \
	     check the input scale, learning rate and clip norm"
        );
    }

    let collapsed = is_collapsed(&latent);
    if collapsed {
        warn!(
            "the selected embedding collapsed to a single point; \
	     check the input scale, learning rate and clip norm"
        );
    }

    let clustering = if config.to_cluster {
        Some(cluster_embedding(&latent, config)?)
    } else {
        None
    };

    Ok(PipelineResult {
        cell_names,
        gene_names,
        latent,
        silhouette,
        best_run,
        loss_traces,
        clustering,
        degenerate,
        collapsed,
    })
}

/// Choose the number of mixture components and label the cells
pub fn cluster_embedding(latent: &Mat, config: &PipelineConfig) -> anyhow::Result<ClusteringResult> {
    let mut zz = latent.clone();
    let nbad = replace_non_finite(&mut zz, 0.);
    if nbad > 0 {
        warn!("{} non-finite latent values set to 0 for clustering", nbad);
    }

    let bic = compute_bic_curve(&zz, config.max_components, config.gmm_inits, config.seed);

    let num_components = bic.best_components().ok_or_else(|| {
        LupinError::Clustering(format!(
            "no finite adjusted BIC for 1..={} components",
            config.max_components
        ))
    })?;
    info!("{} mixture components by adjusted BIC", num_components);

    let labels = fit_final_labels(&zz, num_components, config.seed)?;

    Ok(ClusteringResult {
        bic,
        num_components,
        labels,
    })
}
