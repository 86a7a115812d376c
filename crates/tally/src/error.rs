//! Error types for pipeline operations.

use tally_canonical::CanonicalError;
use tally_data::DataError;
use tally_output::{ExportError, QualityError};
use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors surfaced by the pipeline and its configuration.
#[derive(Debug, Error)]
pub enum TallyError {
    /// Extraction or store failure
    #[error(transparent)]
    Data(#[from] DataError),

    /// Canonical materialization failure, including enforced tie violations
    #[error(transparent)]
    Canonical(#[from] CanonicalError),

    /// Backtest input failure
    #[error(transparent)]
    Quality(#[from] QualityError),

    /// Export failure
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Configuration could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Ticker is not in any ticker source
    #[error("CIK not found for ticker: {0}")]
    CikNotFound(String),
}
