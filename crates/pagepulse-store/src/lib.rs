//! Storage layer: DuckDB tables for the worklist input and the metrics output.

mod duck;
mod error;

pub use duck::{DuckStore, RejectedRow, WriteMode, Worklist};
pub use error::StoreError;

/// Default name of the worklist table.
pub const WORKLIST_TABLE: &str = "Options";
/// Default name of the metrics output table.
pub const METRICS_TABLE: &str = "Base";
