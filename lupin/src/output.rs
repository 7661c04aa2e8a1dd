use crate::lupin_common::*;
use crate::model_selection::BicCurve;
use matrix_util::common_io::ensure_parent_dir;

fn numbered_names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n).map(|i| format!("{}{}", prefix, i).into_boxed_str()).collect()
}

fn output_context(file: &str) -> LupinError {
    LupinError::Output(file.to_string())
}

/// Create the directory that holds the `{out}.*` files
pub fn prepare_output_prefix(out: &str) -> anyhow::Result<()> {
    ensure_parent_dir(out).context(output_context(out))
}

/// `{out}.latent.parquet`: one row per cell, columns `z0, z1, ...`
pub fn write_latent(out: &str, latent: &Mat, cell_names: &[Box<str>]) -> anyhow::Result<String> {
    let file = out.to_string() + ".latent.parquet";
    let columns = numbered_names("z", latent.ncols());
    latent
        .to_parquet_with_names(&file, (Some(cell_names), Some("cell")), Some(&columns))
        .context(output_context(&file))?;
    Ok(file)
}

/// `{out}.clusters.parquet`: hard label of each cell
pub fn write_clusters(out: &str, labels: &[usize], cell_names: &[Box<str>]) -> anyhow::Result<String> {
    let file = out.to_string() + ".clusters.parquet";
    let labels = Mat::from_iterator(labels.len(), 1, labels.iter().map(|&k| k as f32));
    let columns: Vec<Box<str>> = vec!["cluster".into()];
    labels
        .to_parquet_with_names(&file, (Some(cell_names), Some("cell")), Some(&columns))
        .context(output_context(&file))?;
    Ok(file)
}

/// `{out}.bic.parquet`: `bic` and `adjusted_bic` per component count
pub fn write_bic_curve(out: &str, curve: &BicCurve) -> anyhow::Result<String> {
    let file = out.to_string() + ".bic.parquet";
    let nk = curve.components.len();
    let scores = nalgebra::DMatrix::<f64>::from_fn(nk, 2, |i, j| match j {
        0 => curve.bic[i],
        _ => curve.adjusted_bic[i],
    });
    let rows: Vec<Box<str>> = curve
        .components
        .iter()
        .map(|k| k.to_string().into_boxed_str())
        .collect();
    let columns: Vec<Box<str>> = vec!["bic".into(), "adjusted_bic".into()];
    scores
        .to_parquet_with_names(&file, (Some(&rows), Some("components")), Some(&columns))
        .context(output_context(&file))?;
    Ok(file)
}

/// `{out}.silhouette.parquet`: cohesion score of each training run
pub fn write_silhouette(out: &str, scores: &[f64]) -> anyhow::Result<String> {
    let file = out.to_string() + ".silhouette.parquet";
    let scores = nalgebra::DMatrix::<f64>::from_column_slice(scores.len(), 1, scores);
    let columns: Vec<Box<str>> = vec!["silhouette".into()];
    scores
        .to_parquet_with_names(&file, (None, Some("run")), Some(&columns))
        .context(output_context(&file))?;
    Ok(file)
}

/// Record parameters and the run summary as pretty-printed JSON
pub fn write_parameters(param_file: &str, params: &serde_json::Value) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(params).context(output_context(param_file))?;
    std::fs::write(param_file, text).context(output_context(param_file))?;
    info!("Wrote parameters: {}", param_file);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::create_temp_dir_file;

    fn temp_prefix() -> anyhow::Result<String> {
        let file = create_temp_dir_file("")?;
        Ok(file.to_string_lossy().into_owned() + "/sub/result")
    }

    #[test]
    fn latent_and_clusters_round_trip() -> anyhow::Result<()> {
        let out = temp_prefix()?;
        prepare_output_prefix(&out)?;

        let cells = numbered_names("cell_", 4);
        let latent = Mat::from_fn(4, 3, |i, j| (i * 3 + j) as f32 * 0.5);
        let file = write_latent(&out, &latent, &cells)?;

        let back = Mat::from_parquet_with_names(&file, None, None)?;
        assert_eq!(back.cols, numbered_names("z", 3));
        assert_eq!(back.rows, cells);
        approx::assert_abs_diff_eq!(back.mat, latent, epsilon = 1e-6);

        let file = write_clusters(&out, &[0, 2, 1, 0], &cells)?;
        let back = Mat::from_parquet_with_names(&file, None, None)?;
        assert_eq!(back.cols[0].as_ref(), "cluster");
        assert_eq!(back.mat.as_slice(), &[0., 2., 1., 0.]);
        Ok(())
    }

    #[test]
    fn bic_curve_keeps_infinite_entries() -> anyhow::Result<()> {
        let out = temp_prefix()?;
        prepare_output_prefix(&out)?;

        let curve = BicCurve {
            components: vec![1, 2, 3],
            bic: vec![10., 5., f64::INFINITY],
            adjusted_bic: vec![11., 7., f64::INFINITY],
        };
        let file = write_bic_curve(&out, &curve)?;
        let back = nalgebra::DMatrix::<f64>::from_parquet_with_names(&file, None, None)?;
        assert_eq!(back.rows[2].as_ref(), "3");
        assert_eq!(back.mat[(1, 1)], 7.);
        assert!(back.mat[(2, 0)].is_infinite());
        Ok(())
    }

    #[test]
    fn parameters_are_json() -> anyhow::Result<()> {
        let out = temp_prefix()?;
        prepare_output_prefix(&out)?;
        let file = out + ".parameters.json";
        write_parameters(&file, &serde_json::json!({ "latent_dim": 3 }))?;
        let text = std::fs::read_to_string(&file)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        assert_eq!(value["latent_dim"], 3);
        Ok(())
    }

    #[test]
    fn unwritable_output_is_classified() {
        let err = write_silhouette("/nonexistent/dir/result", &[0.5]).unwrap_err();
        let kind = err.downcast_ref::<LupinError>().map(|e| e.kind());
        assert_eq!(kind, Some("Output"));
    }
}
