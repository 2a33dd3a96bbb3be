pub mod price_matrix;

pub use price_matrix::{ColumnSelection, PriceMatrix};
