use clap::{Parser, Subcommand};
use log::error;
use lupin::errors::{report_error, ErrorReport};
use lupin::fit_lupin::*;
use lupin::simulate::*;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPIN",
    long_about = "Latent sUbPopulation INference\n\
		  Embed single cells by a variational autoencoder trained\n\
		  several times, keep the embedding with the most cohesive\n\
		  KMeans partition and cluster it by a tied Gaussian mixture\n\
		  whose number of components minimizes an adjusted BIC."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Find cell subpopulations",
        long_about = "Find cell subpopulations in the three stages: \n\
		      (1) Select genes, center and pad the expression matrix\n\
		      (2) Train VAEs and keep the most cohesive embedding\n\
		      (3) Cluster the embedding by a tied Gaussian mixture.\n"
    )]
    Run(RunArgs),

    #[command(
        about = "Simulate expression data with Gaussian blobs",
        long_about = "Simulate a cells x genes matrix in [0, 1] made of\n\
		      well-separated Gaussian blobs, together with the\n\
		      true blob membership of each cell.\n"
    )]
    Simulate(SimulateArgs),
}

fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .try_init();
}

fn init_threads(threads: Option<usize>) {
    let num_threads = threads.unwrap_or_else(num_cpus::get).max(1);
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(num_threads)
        .build_global()
    {
        log::warn!("thread pool: {}", e);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let (result, report) = match &cli.commands {
        Commands::Run(args) => {
            init_logger(args.verbose);
            init_threads(args.threads);
            (run_lupin(args), args.error_report)
        }
        Commands::Simulate(args) => {
            init_logger(args.verbose);
            (run_simulate(args), ErrorReport::default())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", report_error(&err, report));
            ExitCode::FAILURE
        }
    }
}
