pub mod clustering;
pub mod common_io;
pub mod dmatrix_io;
pub mod dmatrix_stat;
pub mod dmatrix_util;
pub mod mixture;
pub mod parquet;
pub mod traits;
