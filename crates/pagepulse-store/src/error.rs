use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("source file not found: {0}")]
    SourceNotFound(std::path::PathBuf),

    #[error("unsupported file format: {0} (expected .csv or .parquet)")]
    UnsupportedFormat(std::path::PathBuf),

    #[error("no results for query")]
    NoResults,

    #[error("table {table} does not match the expected header: {detail}")]
    Schema { table: String, detail: String },

    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("{0}")]
    Other(String),
}
