//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Unknown enum variant in stored or user supplied text
    #[error(transparent)]
    UnknownVariant(#[from] UnknownVariant),

    /// A (statement, line item) pair outside the canonical schema
    #[error("Line item {line_item} is not allowed on {statement}")]
    DisallowedFact {
        /// Statement the fact was tagged with
        statement: String,
        /// Line item the fact was tagged with
        line_item: String,
    },

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Store error that is not a database error
    #[error("Store error: {0}")]
    Store(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CIK not found for ticker
    #[error("CIK not found for ticker: {0}")]
    CikNotFound(String),

    /// Filing not found
    #[error("Filing not found: {0}")]
    FilingNotFound(String),
}

/// A string that does not name any variant of a closed enum.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the enum being parsed
    pub kind: &'static str,
    /// The offending text
    pub value: String,
}

impl UnknownVariant {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}
