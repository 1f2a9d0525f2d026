//! Error types for loading and aggregating traffic data.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the aggregation operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalysisError {
    /// A caller named a field that is not part of the record schema.
    #[error("field not found in record schema: '{0}'")]
    MissingField(String),

    /// The operation needs at least one record.
    #[error("dataset is empty: {operation} requires at least one record")]
    EmptyDataset { operation: &'static str },

    /// The grouping function produced no usable key for a record.
    #[error("invalid group key for record #{index}: {reason}")]
    InvalidGroupKey { index: usize, reason: String },
}

/// Errors raised while turning a file into a typed dataset.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {row}: unparseable timestamp '{value}'")]
    InvalidTimestamp { row: usize, value: String },

    #[error("row {row}: {reason}")]
    InvalidRecord { row: usize, reason: String },

    #[error("cannot infer input format from '{0}' (use --input-format csv|json)")]
    UnknownFormat(PathBuf),
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
