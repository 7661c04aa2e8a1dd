use matrix_util::common_io::{create_temp_dir_file, write_lines};
use matrix_util::parquet::peek_parquet_field_names;
use matrix_util::traits::IoOps;
use nalgebra::DMatrix;

fn names(prefix: &str, n: usize) -> Vec<Box<str>> {
    (0..n)
        .map(|i| format!("{}{}", prefix, i).into_boxed_str())
        .collect()
}

fn boxed(xs: &[&str]) -> Vec<Box<str>> {
    xs.iter().map(|&x| x.into()).collect()
}

#[test]
fn dmatrix_tsv_test() -> anyhow::Result<()> {
    let xx = DMatrix::<f32>::from_fn(20, 7, |i, j| (i * 7 + j) as f32 / 10.);

    let tsv_file = create_temp_dir_file("txt.gz")?;
    let tsv_file = tsv_file.to_str().unwrap();
    xx.to_tsv(tsv_file)?;

    let yy = DMatrix::<f32>::read_data(tsv_file, "\t", None, None, None)?;

    approx::assert_abs_diff_eq!(xx, yy.mat, epsilon = 1e-6);
    assert_eq!(yy.rows.len(), 20);
    assert_eq!(yy.cols[6].as_ref(), "6");
    Ok(())
}

#[test]
fn named_tsv_with_missing_values() -> anyhow::Result<()> {
    let file = create_temp_dir_file(".tsv")?;
    let file = file.to_str().unwrap();

    let lines = vec![
        "cell\tg1\tg2\tg3",
        "c1\t1.0\tNA\t3",
        "c2\tnan\t0.5\t",
        "c3\t2\t2\t2",
    ];
    write_lines(&lines, file)?;

    let out = DMatrix::<f32>::read_data(file, "\t", Some(0), Some(0), None)?;
    assert_eq!(out.rows, boxed(&["c1", "c2", "c3"]));
    assert_eq!(out.cols, boxed(&["g1", "g2", "g3"]));
    assert!(out.mat[(0, 1)].is_nan());
    assert!(out.mat[(1, 0)].is_nan());
    assert!(out.mat[(1, 2)].is_nan());
    assert_eq!(out.mat[(2, 2)], 2.);

    let select = boxed(&["g3", "g1"]);
    let sub = DMatrix::<f32>::read_data(file, "\t", Some(0), Some(0), Some(select.as_slice()))?;
    assert_eq!(sub.cols, boxed(&["g1", "g3"]));
    assert_eq!(sub.mat.ncols(), 2);
    Ok(())
}

#[test]
fn header_without_row_name_column() -> anyhow::Result<()> {
    let file = create_temp_dir_file(".csv")?;
    let file = file.to_str().unwrap();

    write_lines(&["a,b", "r1,1,2", "r2,3,4"], file)?;
    let out = DMatrix::<f64>::read_data(file, ",", Some(0), Some(0), None)?;
    assert_eq!(out.cols, boxed(&["a", "b"]));
    assert_eq!(out.mat[(1, 1)], 4.);
    Ok(())
}

#[test]
fn ragged_lines_are_rejected() -> anyhow::Result<()> {
    let file = create_temp_dir_file(".tsv")?;
    let file = file.to_str().unwrap();
    write_lines(&["x\ty", "r1\t1\t2", "r2\t3"], file)?;
    assert!(DMatrix::<f32>::read_data(file, "\t", Some(0), Some(0), None).is_err());
    Ok(())
}

#[test]
fn dmatrix_parquet_test() -> anyhow::Result<()> {
    let xx = DMatrix::<f32>::from_fn(15, 4, |i, j| (i as f32) - (j as f32) * 0.25);
    let rows = names("cell_", 15);
    let cols = names("z", 4);

    let file = create_temp_dir_file(".parquet")?;
    let file = file.to_str().unwrap();
    xx.to_parquet_with_names(file, (Some(rows.as_slice()), Some("cell")), Some(cols.as_slice()))?;

    let fields = peek_parquet_field_names(file)?;
    assert_eq!(fields[0].as_ref(), "cell");
    assert_eq!(fields[1].as_ref(), "z0");

    let yy = DMatrix::<f32>::from_parquet_with_names(file, None, None)?;
    approx::assert_abs_diff_eq!(xx, yy.mat, epsilon = 1e-6);
    assert_eq!(yy.rows, rows);
    assert_eq!(yy.cols, cols);

    let select = boxed(&["z2"]);
    let zz = DMatrix::<f32>::from_parquet_with_names(file, None, Some(select.as_slice()))?;
    assert_eq!(zz.mat.ncols(), 1);
    approx::assert_abs_diff_eq!(zz.mat[(3, 0)], 2.5);
    Ok(())
}
