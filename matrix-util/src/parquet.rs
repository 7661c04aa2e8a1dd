use parquet::basic::Type as ParquetType;
use parquet::basic::{Compression, ConvertedType, Repetition, ZstdLevel};
use parquet::data_type::{ByteArray, ByteArrayType, DoubleType};
use parquet::file::properties::WriterProperties;
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::file::writer::SerializedFileWriter;
use parquet::record::RowAccessor;
use parquet::schema::types::Type;
use std::fs::File;
use std::sync::Arc;

/// get field names by peeking into `file_path`
pub fn peek_parquet_field_names(file_path: &str) -> anyhow::Result<Vec<Box<str>>> {
    let file = File::open(file_path)?;
    let reader = SerializedFileReader::new(file)?;
    let metadata = reader.metadata();
    let fields = metadata.file_metadata().schema().get_fields();

    Ok(fields
        .iter()
        .map(|f| f.name().to_string().into_boxed_str())
        .collect())
}

pub struct ParquetReader {
    pub row_major_data: Vec<f64>,
    pub row_names: Vec<Box<str>>,
    pub column_names: Vec<Box<str>>,
}

impl ParquetReader {
    /// Create a new parquet reader for a matrix with row and column
    /// names.
    ///
    /// * `row_name_index`: if `None`, the column `0` will be so if it
    ///   holds strings; otherwise rows are named `0, 1, ...`
    ///
    /// * `select_columns_names`: if `None`, use all the other numeric columns
    pub fn new(
        file_path: &str,
        row_name_index: Option<usize>,
        select_columns_names: Option<&[Box<str>]>,
    ) -> anyhow::Result<Self> {
        let file = File::open(file_path)?;
        let reader = SerializedFileReader::new(file)?;
        let metadata = reader.metadata();
        let nrows = metadata.file_metadata().num_rows() as usize;

        let fields = metadata.file_metadata().schema().get_fields();

        let physical = |j: usize| -> Option<ParquetType> {
            fields
                .get(j)
                .filter(|f| f.is_primitive())
                .map(|f| f.get_physical_type())
        };

        let row_name_index = match row_name_index {
            Some(j) => Some(j),
            None if physical(0) == Some(ParquetType::BYTE_ARRAY) => Some(0),
            None => None,
        };

        let select_indices = fields
            .iter()
            .enumerate()
            .filter(|(j, _)| Some(*j) != row_name_index)
            .filter(|(_, f)| match select_columns_names {
                Some(names) => names.iter().any(|name| name.as_ref() == f.name()),
                None => true,
            })
            .filter_map(|(j, _)| match physical(j) {
                Some(
                    tt @ (ParquetType::FLOAT
                    | ParquetType::DOUBLE
                    | ParquetType::INT32
                    | ParquetType::INT64),
                ) => Some((tt, j)),
                _ => None,
            })
            .collect::<Vec<_>>();

        if select_indices.is_empty() {
            return Err(anyhow::anyhow!(
                "no available numeric columns in {}",
                file_path
            ));
        }

        let ncols = select_indices.len();

        let column_names: Vec<Box<str>> = select_indices
            .iter()
            .map(|&(_, j)| fields[j].name().to_string().into_boxed_str())
            .collect();

        let row_iter = reader.get_row_iter(None)?;
        let mut row_names: Vec<Box<str>> = Vec::with_capacity(nrows);
        let mut row_major_data: Vec<f64> = Vec::with_capacity(nrows * ncols);

        for (i, record) in row_iter.enumerate() {
            let row = record?;
            match row_name_index {
                Some(r) => row_names.push(row.get_string(r)?.clone().into_boxed_str()),
                None => row_names.push(i.to_string().into_boxed_str()),
            }

            for &(tt, j) in select_indices.iter() {
                let x = match tt {
                    ParquetType::FLOAT => row.get_float(j)? as f64,
                    ParquetType::DOUBLE => row.get_double(j)?,
                    ParquetType::INT32 => row.get_int(j)? as f64,
                    _ => row.get_long(j)? as f64,
                };
                row_major_data.push(x);
            }
        }

        Ok(Self {
            row_major_data,
            row_names,
            column_names,
        })
    }
}

/// A table with one string column of row names followed by `DOUBLE`
/// value columns, written as a single zstd-compressed row group
pub struct NamedColumnsTable<'a> {
    /// name of the row name column (default: `row`)
    pub row_column_name: Option<&'a str>,
    pub row_names: Vec<ByteArray>,
    pub column_names: Vec<Box<str>>,
    /// column-major values, `row_names.len()` per column
    pub values: Vec<f64>,
}

impl<'a> NamedColumnsTable<'a> {
    /// * `shape` - number of rows and columns
    /// * `row_names` - `None` = `0, 1, ...`
    /// * `column_names` - `None` = `0, 1, ...`
    pub fn new(
        shape: (usize, usize),
        row_names: Option<&[Box<str>]>,
        column_names: Option<&[Box<str>]>,
        row_column_name: Option<&'a str>,
        values: Vec<f64>,
    ) -> anyhow::Result<Self> {
        let (nrows, ncols) = shape;
        let numbered = |n: usize| -> Vec<Box<str>> {
            (0..n).map(|i| i.to_string().into_boxed_str()).collect()
        };

        let row_names: Vec<ByteArray> = row_names
            .map(|r| r.to_vec())
            .unwrap_or_else(|| numbered(nrows))
            .iter()
            .map(|r| ByteArray::from(r.as_ref()))
            .collect();

        let column_names = column_names
            .map(|c| c.to_vec())
            .unwrap_or_else(|| numbered(ncols));

        if row_names.len() != nrows || column_names.len() != ncols {
            return Err(anyhow::anyhow!(
                "{} x {} names for a {} x {} table",
                row_names.len(),
                column_names.len(),
                nrows,
                ncols
            ));
        }
        if values.len() != nrows * ncols {
            return Err(anyhow::anyhow!(
                "{} values for a {} x {} table",
                values.len(),
                nrows,
                ncols
            ));
        }

        Ok(Self {
            row_column_name,
            row_names,
            column_names,
            values,
        })
    }

    fn schema(&self) -> anyhow::Result<Arc<Type>> {
        let row_field = Type::primitive_type_builder(
            self.row_column_name.unwrap_or("row"),
            ParquetType::BYTE_ARRAY,
        )
        .with_repetition(Repetition::REQUIRED)
        .with_converted_type(ConvertedType::UTF8)
        .build()?;

        let mut fields = vec![Arc::new(row_field)];
        for name in self.column_names.iter() {
            let field = Type::primitive_type_builder(name, ParquetType::DOUBLE)
                .with_repetition(Repetition::REQUIRED)
                .build()?;
            fields.push(Arc::new(field));
        }

        Ok(Arc::new(
            Type::group_type_builder("matrix")
                .with_fields(fields)
                .build()?,
        ))
    }

    pub fn write(&self, file_path: &str) -> anyhow::Result<()> {
        let properties = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::try_new(5)?))
            .build();

        let file = File::create(file_path)?;
        let mut writer = SerializedFileWriter::new(file, self.schema()?, Arc::new(properties))?;
        let mut row_group = writer.next_row_group()?;

        let mut column = row_group
            .next_column()?
            .ok_or_else(|| anyhow::anyhow!("missing row name column"))?;
        column
            .typed::<ByteArrayType>()
            .write_batch(&self.row_names, None, None)?;
        column.close()?;

        let nrows = self.row_names.len().max(1);
        for (name, values) in self.column_names.iter().zip(self.values.chunks(nrows)) {
            let mut column = row_group
                .next_column()?
                .ok_or_else(|| anyhow::anyhow!("missing column {}", name))?;
            column
                .typed::<DoubleType>()
                .write_batch(values, None, None)?;
            column.close()?;
        }

        row_group.close()?;
        writer.close()?;
        Ok(())
    }
}
