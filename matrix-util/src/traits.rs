use crate::common_io::Delimiter;

/// A matrix with its row and column names
#[derive(Debug, Clone)]
pub struct MatWithNames<M> {
    pub rows: Vec<Box<str>>,
    pub cols: Vec<Box<str>>,
    pub mat: M,
}

/// Centre rows or columns
pub trait MatOps {
    type Mat;
    type Scalar;

    /// subtract each row's mean from that row
    fn centre_rows_inplace(&mut self);
    fn centre_rows(&self) -> Self::Mat;

    /// subtract each column's mean from that column
    fn centre_columns_inplace(&mut self);
    fn centre_columns(&self) -> Self::Mat;
}

/// Per-column summary statistics
pub trait ColumnStatOps {
    type Scalar;

    /// average of each column
    fn column_mean_vec(&self) -> Vec<Self::Scalar>;

    /// coefficient of variation `sd / mean` of each column (`sd`
    /// without degree-of-freedom correction)
    fn column_cv_vec(&self) -> Vec<Self::Scalar>;

    /// Shannon entropy (natural log) of each column's value
    /// histogram with `nbins` equal-width bins
    fn column_entropy_vec(&self, nbins: usize) -> Vec<Self::Scalar>;
}

/// Read and write matrices from and to files
pub trait IoOps {
    type Scalar;
    type Mat;

    /// Read a delimited text file with row and column names
    ///
    /// * `file_path` - file name--either gzipped or not
    /// * `delim` - delimiter(s)
    /// * `hdr_line` - location of the column name line (`None` = no header)
    /// * `row_name_index` - column holding row names (`None` = no row names)
    /// * `column_names` - keep these columns only (`None` = keep all)
    fn read_data(
        file_path: &str,
        delim: impl Into<Delimiter>,
        hdr_line: Option<usize>,
        row_name_index: Option<usize>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;

    fn write_file_delim(&self, file: &str, delim: &str) -> anyhow::Result<()>;

    fn to_tsv(&self, tsv_file: &str) -> anyhow::Result<()> {
        self.write_file_delim(tsv_file, "\t")
    }

    /// Write a parquet file; the first column holds row names
    ///
    /// * `row_names` - (names, name of the row name column)
    /// * `column_names` - column names (`None` = `0, 1, ...`)
    fn to_parquet_with_names(
        &self,
        file_path: &str,
        row_names: (Option<&[Box<str>]>, Option<&str>),
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<()>;

    /// Read a parquet file
    ///
    /// * `row_name_index` - column holding row names (`None` = detect a
    ///   leading string column)
    /// * `column_names` - keep these columns only (`None` = keep all)
    fn from_parquet_with_names(
        file_path: &str,
        row_name_index: Option<usize>,
        column_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<MatWithNames<Self::Mat>>;
}
