use thiserror::Error;

/// Error taxonomy for the staging pipeline.
///
/// The first five variants are the fatal stage-level failures; any of them
/// halts the current phase and skips everything downstream. Join cardinality
/// drift is deliberately *not* here: it is logged by the merge stage and
/// never fails a run.
#[derive(Debug, Error)]
pub enum Error {
    #[error("catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("extraction of '{table}' failed: {reason}")]
    Extraction { table: String, reason: String },

    #[error("column '{column}' missing from '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("normalization of '{table}' failed: {reason}")]
    Normalization { table: String, reason: String },

    #[error("merge into '{table}' failed: {reason}")]
    Merge { table: String, reason: String },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
