use crate::lupin_common::*;
use std::cmp::Ordering;
use std::str::FromStr;

pub const ENTROPY_HISTOGRAM_BINS: usize = 100;

/// Gene ranking score for gene selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionCriterion {
    /// mean expression
    Average,
    /// coefficient of variation
    Cv,
    /// entropy of the 100-bin value histogram
    Entropy,
}

impl FromStr for SelectionCriterion {
    type Err = LupinError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "average" => Ok(Self::Average),
            "cv" => Ok(Self::Cv),
            "entropy" => Ok(Self::Entropy),
            _ => Err(LupinError::InvalidConfig(format!(
                "'{}' is not a valid selection criterion (average, cv, entropy)",
                s
            ))),
        }
    }
}

/// Explicit axis for relative expression
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, Default)]
#[clap(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CenterAxis {
    /// subtract each cell's (row's) mean
    #[default]
    Cell,
    /// subtract each gene's (column's) mean
    Gene,
}

/// One score per gene (column)
pub fn gene_scores(xx: &Mat, criterion: SelectionCriterion) -> Vec<f32> {
    match criterion {
        SelectionCriterion::Average => xx.column_mean_vec(),
        SelectionCriterion::Cv => xx.column_cv_vec(),
        SelectionCriterion::Entropy => xx.column_entropy_vec(ENTROPY_HISTOGRAM_BINS),
    }
}

/// ascending; `NaN` after everything else
fn cmp_nan_last(a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        _ => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Column indices sorted by ascending score; ties keep their order
pub fn sorted_gene_indices(scores: &[f32]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| cmp_nan_last(scores[a], scores[b]));
    indices
}

/// Keep the `min(n_genes, ncols)` genes with the lowest scores,
/// ordered by score
pub fn select_genes(
    data: &MatWithNames<Mat>,
    n_genes: usize,
    criterion: SelectionCriterion,
) -> MatWithNames<Mat> {
    let scores = gene_scores(&data.mat, criterion);
    let mut indices = sorted_gene_indices(&scores);
    indices.truncate(n_genes.min(data.mat.ncols()));

    MatWithNames {
        rows: data.rows.clone(),
        cols: indices.iter().map(|&j| data.cols[j].clone()).collect(),
        mat: data.mat.select_columns(indices.iter()),
    }
}

/// Gene selection by a criterion given as text. An unknown criterion
/// is reported and the data are returned unchanged.
pub fn select_genes_by_name(
    data: MatWithNames<Mat>,
    n_genes: usize,
    criterion: &str,
) -> MatWithNames<Mat> {
    match criterion.parse::<SelectionCriterion>() {
        Ok(criterion) => {
            let selected = select_genes(&data, n_genes, criterion);
            info!(
                "selected {} of {} genes by {:?}",
                selected.mat.ncols(),
                data.mat.ncols(),
                criterion
            );
            selected
        }
        Err(e) => {
            warn!("{}; keeping all {} genes", e, data.mat.ncols());
            data
        }
    }
}

/// Subtract the mean along `axis`
pub fn center_expression(xx: &mut Mat, axis: CenterAxis) {
    match axis {
        CenterAxis::Cell => xx.centre_rows_inplace(),
        CenterAxis::Gene => xx.centre_columns_inplace(),
    }
}

/// Number of rows to append so that `nrows` becomes a multiple of
/// `batch_size`
pub fn num_padding_rows(nrows: usize, batch_size: usize) -> usize {
    if batch_size == 0 {
        return 0;
    }
    (batch_size - nrows % batch_size) % batch_size
}

/// Append copies of the last rows so that the number of rows is a
/// multiple of `batch_size`. When more rows are needed than there are,
/// the tail is repeated cyclically.
pub fn pad_rows(xx: &Mat, batch_size: usize) -> anyhow::Result<Mat> {
    let n = xx.nrows();
    if batch_size == 0 {
        return Err(LupinError::InvalidConfig("batch size must be positive".into()).into());
    }
    if n == 0 {
        return Err(LupinError::InvalidInput("no cells to pad".into()).into());
    }

    let npad = num_padding_rows(n, batch_size);
    let rows: Vec<usize> = (0..n)
        .chain((0..npad).map(|j| (n as i64 - npad as i64 + j as i64).rem_euclid(n as i64) as usize))
        .collect();

    Ok(xx.select_rows(rows.iter()))
}
