//! Storage layer: DuckDB-backed user directory and prediction records.

mod error;
pub use error::StoreError;

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::{DuckStore, NewUser};
