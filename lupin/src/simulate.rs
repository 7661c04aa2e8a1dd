use crate::lupin_common::*;
use crate::output::prepare_output_prefix;

use clap::Args;
use matrix_util::common_io::write_lines;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal, Uniform};

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long, default_value_t = 120, help = "Number of cells (rows)")]
    pub cells: usize,

    #[arg(long, default_value_t = 50, help = "Number of genes (columns)")]
    pub genes: usize,

    #[arg(
        long,
        default_value_t = 3,
        help = "Number of cell groups",
        long_help = "Number of Gaussian blobs.\n\
		     Cells are split into contiguous, nearly equal blocks,\n\
		     one block per blob."
    )]
    pub blobs: usize,

    #[arg(
        long,
        default_value_t = 0.05,
        help = "Standard deviation of the noise around each blob centre"
    )]
    pub noise_sd: f32,

    #[arg(long, default_value_t = 42, help = "Random seed")]
    pub seed: u64,

    #[arg(
        long,
        short = 'o',
        required = true,
        help = "Output file prefix",
        long_help = "Output file prefix.\n\n\
		     Generates:\n\
		     - {out}.expr.parquet: cells x genes expression in [0, 1]\n\
		     - {out}.membership.tsv.gz: true blob of each cell"
    )]
    pub out: Box<str>,

    #[arg(long, short = 'v', help = "Verbose logging")]
    pub verbose: bool,
}

/// Simulated expression with its true grouping
pub struct SimOut {
    /// cells x genes, values in `[0, 1]`
    pub expr: Mat,
    /// blob index of each cell
    pub membership: Vec<usize>,
}

/// Cells drawn around `blobs` random centres in `[0, 1]^genes`
///
/// ```text
/// x(i,j) = clamp( mu(b(i), j) + eps, 0, 1 ),  eps ~ N(0, noise_sd^2)
/// ```
pub fn simulate_blobs(
    cells: usize,
    genes: usize,
    blobs: usize,
    noise_sd: f32,
    seed: u64,
) -> anyhow::Result<SimOut> {
    if blobs == 0 || blobs > cells {
        return Err(LupinError::InvalidConfig(format!(
            "cannot split {} cells into {} blobs",
            cells, blobs
        ))
        .into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let runif = Uniform::new(0f32, 1f32)?;
    let rnorm = Normal::new(0f32, noise_sd)
        .map_err(|e| LupinError::InvalidConfig(format!("noise sd {}: {}", noise_sd, e)))?;

    let centres = Mat::from_fn(blobs, genes, |_, _| runif.sample(&mut rng));
    let membership: Vec<usize> = (0..cells).map(|i| i * blobs / cells).collect();

    let mut expr = Mat::zeros(cells, genes);
    for (i, &b) in membership.iter().enumerate() {
        for j in 0..genes {
            expr[(i, j)] = (centres[(b, j)] + rnorm.sample(&mut rng)).clamp(0., 1.);
        }
    }

    Ok(SimOut { expr, membership })
}

pub fn cell_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| format!("cell_{}", i).into_boxed_str()).collect()
}

pub fn gene_names(n: usize) -> Vec<Box<str>> {
    (0..n).map(|j| format!("gene_{}", j).into_boxed_str()).collect()
}

pub fn run_simulate(args: &SimulateArgs) -> anyhow::Result<()> {
    let sim = simulate_blobs(args.cells, args.genes, args.blobs, args.noise_sd, args.seed)?;

    prepare_output_prefix(&args.out)?;

    let rows = cell_names(args.cells);
    let cols = gene_names(args.genes);

    let expr_file = args.out.to_string() + ".expr.parquet";
    sim.expr
        .to_parquet_with_names(&expr_file, (Some(&rows), Some("cell")), Some(&cols))
        .context(LupinError::Output(expr_file.clone()))?;

    let membership_file = args.out.to_string() + ".membership.tsv.gz";
    let lines: Vec<String> = std::iter::once("cell\tblob".to_string())
        .chain(
            rows.iter()
                .zip(sim.membership.iter())
                .map(|(c, b)| format!("{}\t{}", c, b)),
        )
        .collect();
    write_lines(&lines, &membership_file).context(LupinError::Output(membership_file.clone()))?;

    info!(
        "simulated {} cells x {} genes in {} blobs: {}, {}",
        args.cells, args.genes, args.blobs, expr_file, membership_file
    );
    Ok(())
}
