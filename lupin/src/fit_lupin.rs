use crate::errors::ErrorReport;
use crate::input::read_expression;
use crate::lupin_common::*;
use crate::output::*;
use crate::pipeline::*;
use crate::preprocess::CenterAxis;
use crate::visualize::*;

use clap::Parser;
use serde_json::json;

#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    #[arg(
        required = true,
        help = "Expression matrix (cells x genes)",
        long_help = "Expression matrix with cells in rows and genes in columns.\n\n\
		     Supported formats:\n\
		     - .parquet: a leading cell name column and numeric gene columns\n\
		     - .tsv, .csv, .txt (optionally .gz): a header line of gene\n\
		       names and cell names in the first column\n\n\
		     Missing values (NA, NaN) are set to 0."
    )]
    pub data_file: Box<str>,

    #[arg(
        long,
        help = "Comma-separated gene columns to use",
        long_help = "Comma-separated names of the gene columns that hold the\n\
		     expression matrix. All numeric columns are used by default."
    )]
    pub field: Option<Box<str>>,

    #[arg(
        long,
        short = 'o',
        required = true,
        help = "Output file prefix",
        long_help = "Output file prefix.\n\n\
		     Generates:\n\
		     - {out}.latent.parquet: embedding of the selected run\n\
		     - {out}.clusters.parquet: cluster label of each cell\n\
		     - {out}.bic.parquet: BIC and adjusted BIC per component count\n\
		     - {out}.silhouette.parquet: cohesion score of each run\n\
		     - {out}.parameters.json: parameters and run summary\n\
		     - {out}.fig_projection.svg, {out}.fig_bic.svg, {out}.fig_cluster.svg"
    )]
    pub out: Box<str>,

    #[arg(long, short = 'k', default_value_t = 3, help = "Latent dimension")]
    pub latent_dim: usize,

    #[arg(
        long,
        short = 'n',
        default_value_t = 5,
        help = "Number of training runs",
        long_help = "Number of VAE trainings from different random initializations.\n\
		     The run whose embedding gives the highest silhouette score\n\
		     of a KMeans partition is kept."
    )]
    pub n_starts: usize,

    #[arg(
        long,
        default_value_t = 100,
        help = "Minibatch size",
        long_help = "Minibatch size for training and latent evaluation.\n\
		     Rows are padded with copies of the last rows so that the\n\
		     number of rows is a multiple of the batch size."
    )]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-4, help = "RMSProp learning rate")]
    pub learning_rate: f32,

    #[arg(
        long,
        default_value_t = 2.0,
        help = "Gradient norm clipping",
        long_help = "Largest L2 norm of each parameter's gradient.\n\
		     A non-positive value turns off clipping."
    )]
    pub clip_norm: f32,

    #[arg(long, short = 'i', default_value_t = 10, help = "Training epochs per run")]
    pub epochs: usize,

    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = vec![1024, 512, 256],
        help = "Encoder hidden layers",
        long_help = "Comma-separated sizes of the encoder hidden layers.\n\
		     The decoder uses the same sizes in reverse order."
    )]
    pub encoder_layers: Vec<usize>,

    #[arg(
        long,
        default_value_t = 1.0,
        help = "Standard deviation of the reparameterization noise"
    )]
    pub epsilon_std: f64,

    #[arg(
        long,
        default_value_t = 6,
        help = "KMeans clusters used to score each run"
    )]
    pub num_kmeans_clusters: usize,

    #[arg(
        long,
        default_value_t = 9,
        help = "Largest number of mixture components to test"
    )]
    pub max_components: usize,

    #[arg(
        long,
        default_value_t = 10,
        help = "Initializations of each mixture fit"
    )]
    pub gmm_inits: usize,

    #[arg(long, help = "Skip mixture clustering")]
    pub no_cluster: bool,

    #[arg(long, help = "Select genes before training")]
    pub gene_selection: bool,

    #[arg(
        long,
        default_value_t = 5000,
        help = "Number of genes kept by gene selection"
    )]
    pub n_genes: usize,

    #[arg(
        long,
        default_value = "average",
        help = "Gene selection score",
        long_help = "Gene selection score; genes with the lowest scores are kept.\n\n\
		     - average: mean expression\n\
		     - cv: coefficient of variation\n\
		     - entropy: entropy of a 100-bin histogram of the values\n\n\
		     An unknown value is reported and all genes are kept."
    )]
    pub selection_criteria: Box<str>,

    #[arg(long, help = "Skip figures")]
    pub no_plot: bool,

    #[arg(long, help = "Center expression before training (see --center-axis)")]
    pub relative_expression: bool,

    #[arg(
        long,
        value_enum,
        default_value = "cell",
        help = "Centering axis for --relative-expression",
        long_help = "Centering axis for --relative-expression.\n\n\
		     - cell: subtract each cell's mean\n\
		     - gene: subtract each gene's mean"
    )]
    pub center_axis: CenterAxis,

    #[arg(long, default_value_t = 10, help = "Random seed")]
    pub seed: u64,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    pub device: ComputeDevice,

    #[arg(long, help = "Number of threads (default: all logical CPUs)")]
    pub threads: Option<usize>,

    #[arg(long, short = 'v', help = "Log the loss of every epoch")]
    pub verbose: bool,

    #[arg(
        long,
        value_enum,
        default_value = "kind",
        help = "Detail of the error message",
        long_help = "Detail of the error message on failure.\n\n\
		     - generic: a single generic line\n\
		     - kind: error kind and context\n\
		     - full: error kind, context and all causes"
    )]
    pub error_report: ErrorReport,

    #[arg(long, hide = true)]
    pub no_progress: bool,
}

impl RunArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            latent_dim: self.latent_dim,
            n_starts: self.n_starts,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            clip_norm: (self.clip_norm > 0.).then_some(self.clip_norm),
            epochs: self.epochs,
            encoder_layers: self.encoder_layers.clone(),
            epsilon_std: self.epsilon_std,
            num_kmeans_clusters: self.num_kmeans_clusters,
            max_components: self.max_components,
            gmm_inits: self.gmm_inits,
            to_cluster: !self.no_cluster,
            gene_selection: self.gene_selection,
            n_genes: self.n_genes,
            selection_criteria: self.selection_criteria.to_string(),
            relative_expression: self.relative_expression,
            center_axis: self.center_axis,
            seed: self.seed,
            device: self.device,
            verbose: self.verbose,
            show_progress: !self.no_progress,
        }
    }
}

/// Run summary stored with the parameters
fn summarize(args: &RunArgs, config: &PipelineConfig, result: &PipelineResult) -> serde_json::Value {
    let clustering = result.clustering.as_ref().map(|c| {
        json!({
            "num_components": c.num_components,
            "components": c.bic.components,
            "bic": c.bic.bic.iter().map(|b| finite_or_null(*b)).collect::<Vec<_>>(),
            "adjusted_bic": c.bic.adjusted_bic.iter().map(|b| finite_or_null(*b)).collect::<Vec<_>>(),
        })
    });

    json!({
        "data_file": args.data_file,
        "field": args.field,
        "out": args.out,
        "config": config,
        "summary": {
            "num_cells": result.cell_names.len(),
            "num_genes": result.gene_names.len(),
            "best_run": result.best_run,
            "silhouette": result.silhouette,
            "final_loss": result.loss_traces.iter().map(|t| t.last().copied()).collect::<Vec<_>>(),
            "degenerate_embedding": result.degenerate,
            "collapsed_embedding": result.collapsed,
            "clustering": clustering,
        }
    })
}

fn finite_or_null(x: f64) -> Option<f64> {
    x.is_finite().then_some(x)
}

pub fn run_lupin(args: &RunArgs) -> anyhow::Result<()> {
    let config = args.pipeline_config();
    config.validate()?;

    let data = read_expression(&args.data_file, args.field.as_deref())?;
    let result = run_pipeline(data, &config)?;

    let out = args.out.as_ref();
    prepare_output_prefix(out)?;

    write_latent(out, &result.latent, &result.cell_names)?;
    write_silhouette(out, &result.silhouette)?;

    if let Some(clustering) = result.clustering.as_ref() {
        write_clusters(out, &clustering.labels, &result.cell_names)?;
        write_bic_curve(out, &clustering.bic)?;
    }

    if !args.no_plot {
        plot_projection(out, &result.latent)?;
        if let Some(clustering) = result.clustering.as_ref() {
            plot_bic_curve(out, &clustering.bic)?;
            plot_clusters(out, &result.latent, &clustering.labels)?;
        }
    }

    write_parameters(
        &(out.to_string() + ".parameters.json"),
        &summarize(args, &config, &result),
    )?;

    info!("Done");
    Ok(())
}
