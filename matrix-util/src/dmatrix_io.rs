use crate::common_io::{read_lines_of_words_delim, write_lines, Delimiter, ReadLinesOut};
use crate::parquet::*;
use crate::traits::*;
pub use nalgebra::{DMatrix, DVector};
use num_traits::{Float, FromPrimitive, ToPrimitive};
use rayon::prelude::*;

use std::fmt::Display;
use std::str::FromStr;

/// Parse a numeric token; missing-value markers become `NaN`
fn parse_value<T>(word: &str) -> anyhow::Result<T>
where
    T: Float + FromStr,
{
    match word.parse::<T>() {
        Ok(x) => Ok(x),
        Err(_) => match word {
            "" | "NA" | "na" | "N/A" | "null" | "NULL" => Ok(T::nan()),
            _ => Err(anyhow::anyhow!("failed to parse a number: '{}'", word)),
        },
    }
}

impl<T> IoOps for DMatrix<T>
where
    T: nalgebra::Scalar + Float + FromPrimitive + ToPrimitive + FromStr + Display + Send + Sync,
{
    type Scalar = T;
    type Mat = Self;

    fn read_data(
        file_path: &str,
        delim: impl Into<Delimiter>,
        hdr_line: Option<usize>,
        row_name_index: Option<usize>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let ReadLinesOut { lines, header } = read_lines_of_words_delim(file_path, delim, hdr_line)?;

        if lines.is_empty() {
            return Err(anyhow::anyhow!("No data in file {}", file_path));
        }

        let nwords = lines[0].len();
        if let Some(i) = lines.iter().position(|words| words.len() != nwords) {
            return Err(anyhow::anyhow!(
                "line {} has {} fields vs. {} expected",
                i + 1,
                lines[i].len(),
                nwords
            ));
        }

        let value_indices: Vec<usize> = (0..nwords).filter(|&j| Some(j) != row_name_index).collect();

        // the header may or may not name the row name column
        let all_cols: Vec<Box<str>> = if header.len() == nwords {
            value_indices.iter().map(|&j| header[j].clone()).collect()
        } else if header.len() == value_indices.len() {
            header
        } else if header.is_empty() {
            (0..value_indices.len())
                .map(|j| j.to_string().into_boxed_str())
                .collect()
        } else {
            return Err(anyhow::anyhow!(
                "{} column names vs. {} data columns",
                header.len(),
                value_indices.len()
            ));
        };

        let selected: Vec<(usize, Box<str>)> = value_indices
            .into_iter()
            .zip(all_cols)
            .filter(|(_, name)| match column_names {
                Some(names) => names.contains(name),
                None => true,
            })
            .collect();

        if selected.is_empty() {
            return Err(anyhow::anyhow!("no columns selected in {}", file_path));
        }

        let rows: Vec<Box<str>> = match row_name_index {
            Some(r) => lines.iter().map(|words| words[r].clone()).collect(),
            None => (0..lines.len())
                .map(|i| i.to_string().into_boxed_str())
                .collect(),
        };

        let data = lines
            .par_iter()
            .map(|words| {
                selected
                    .iter()
                    .map(|(j, _)| parse_value::<T>(&words[*j]))
                    .collect::<anyhow::Result<Vec<T>>>()
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let nrows = rows.len();
        let ncols = selected.len();
        let cols = selected.into_iter().map(|(_, name)| name).collect();

        Ok(MatWithNames {
            rows,
            cols,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data.into_iter().flatten()),
        })
    }

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()> {
        let lines: Vec<String> = self
            .row_iter()
            .map(|row| {
                let words: Vec<String> = row.iter().map(|x| x.to_string()).collect();
                words.join(delim)
            })
            .collect();
        write_lines(&lines, file)
    }

    fn to_parquet_with_names(
        &self,
        file_path: &str,
        row_names: (Option<&[Box<str>]>, Option<&str>),
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()> {
        let (names, row_column_name) = row_names;
        let values = self.iter().map(|x| x.to_f64().unwrap_or(f64::NAN)).collect();
        NamedColumnsTable::new(self.shape(), names, column_names, row_column_name, values)?
            .write(file_path)
    }

    fn from_parquet_with_names(
        file_path: &str,
        row_name_index: Option<usize>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>> {
        let parquet = ParquetReader::new(file_path, row_name_index, column_names)?;

        let data: Vec<T> = parquet
            .row_major_data
            .into_iter()
            .map(|x| T::from_f64(x).unwrap_or_else(T::nan))
            .collect();

        let nrows = parquet.row_names.len();
        let ncols = parquet.column_names.len();

        Ok(MatWithNames {
            rows: parquet.row_names,
            cols: parquet.column_names,
            mat: DMatrix::<T>::from_row_iterator(nrows, ncols, data),
        })
    }
}
