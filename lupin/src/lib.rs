pub mod embedding;
pub mod errors;
pub mod fit_lupin;
pub mod input;
pub mod lupin_common;
pub mod model_selection;
pub mod output;
pub mod pipeline;
pub mod preprocess;
pub mod simulate;
pub mod visualize;
