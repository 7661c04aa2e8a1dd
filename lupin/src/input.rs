use crate::lupin_common::*;
use matrix_util::common_io::file_ext;
use matrix_util::dmatrix_util::replace_nan;

/// Split a comma-separated `--field` value into column names
pub fn parse_field_names(field: Option<&str>) -> Option<Vec<Box<str>>> {
    field.map(|f| {
        f.split(',')
            .map(|x| x.trim())
            .filter(|x| !x.is_empty())
            .map(Box::from)
            .collect()
    })
}

/// Read a cells x genes expression matrix
///
/// * `.parquet`: a leading string column holds cell names, the other
///   numeric columns are genes
/// * `.tsv`, `.csv`, `.txt` (optionally gzipped): a header line with
///   gene names and cell names in the first column
///
/// `field` restricts the genes to the named columns. Missing values
/// (`NaN`) are replaced with zero; infinities pass through.
pub fn read_expression(data_file: &str, field: Option<&str>) -> anyhow::Result<MatWithNames<Mat>> {
    let columns = parse_field_names(field);
    let columns = columns.as_deref();

    let ext = file_ext(data_file)
        .context(LupinError::InvalidInput(format!("unknown format: {}", data_file)))?;

    let MatWithNames {
        rows,
        cols,
        mut mat,
    } = match ext.as_ref() {
        "parquet" => Mat::from_parquet_with_names(data_file, None, columns),
        "tsv" | "txt" => Mat::read_data(data_file, &['\t'], Some(0), Some(0), columns),
        "csv" => Mat::read_data(data_file, &[','], Some(0), Some(0), columns),
        _ => Err(anyhow::anyhow!("unsupported file extension: {}", ext)),
    }
    .context(LupinError::InvalidInput(format!("failed to read {}", data_file)))?;

    if mat.nrows() == 0 || mat.ncols() == 0 {
        return Err(LupinError::InvalidInput(format!(
            "{} has {} cells and {} genes",
            data_file,
            mat.nrows(),
            mat.ncols()
        ))
        .into());
    }

    let nmissing = replace_nan(&mut mat, 0.);
    if nmissing > 0 {
        info!("replaced {} missing values with zero", nmissing);
    }

    info!(
        "read {}: {} cells x {} genes",
        data_file,
        mat.nrows(),
        mat.ncols()
    );

    Ok(MatWithNames { rows, cols, mat })
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::{create_temp_dir_file, write_lines};

    #[test]
    fn field_names() {
        assert!(parse_field_names(None).is_none());
        let names = parse_field_names(Some("g1, g2,,g3")).unwrap();
        assert_eq!(names.len(), 3);
        assert_eq!(names[1].as_ref(), "g2");
    }

    #[test]
    fn missing_values_become_zero() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".csv.gz")?;
        let file = file.to_str().unwrap();
        write_lines(&["cell,g1,g2", "c1,NA,1", "c2,0.5,nan"], file)?;

        let data = read_expression(file, None)?;
        assert_eq!(data.mat.shape(), (2, 2));
        assert_eq!(data.mat[(0, 0)], 0.);
        assert_eq!(data.mat[(1, 1)], 0.);
        assert_eq!(data.mat[(1, 0)], 0.5);
        assert_eq!(data.rows[1].as_ref(), "c2");

        let g2 = read_expression(file, Some("g2"))?;
        assert_eq!(g2.mat.ncols(), 1);
        assert_eq!(g2.cols[0].as_ref(), "g2");
        Ok(())
    }

    #[test]
    fn only_nan_is_replaced() -> anyhow::Result<()> {
        let file = create_temp_dir_file(".tsv")?;
        let file = file.to_str().unwrap();
        write_lines(&["cell\tg1\tg2", "c1\tNaN\tinf"], file)?;

        let data = read_expression(file, None)?;
        assert_eq!(data.mat[(0, 0)], 0.);
        assert!(data.mat[(0, 1)].is_infinite());
        Ok(())
    }

    #[test]
    fn unreadable_input_is_classified() {
        let err = read_expression("/nonexistent/expr.tsv", None).unwrap_err();
        let kind = err.downcast_ref::<LupinError>().map(|e| e.kind());
        assert_eq!(kind, Some("InvalidInput"));

        let err = read_expression("expr.xyz", None).unwrap_err();
        assert!(err.downcast_ref::<LupinError>().is_some());
    }
}
