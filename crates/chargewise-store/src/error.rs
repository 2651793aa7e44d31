use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no results for query")]
    NoResults,

    #[error("user with email {0} already exists")]
    DuplicateUser(String),

    #[error("invalid stored value in {column}: {reason}")]
    InvalidValue { column: &'static str, reason: String },

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}
