//! Error types for quality diagnostics.

use thiserror::Error;

/// Errors raised while scoring forecasts.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum QualityError {
    /// Input series of different lengths
    #[error("length mismatch: {name} has {actual} entries, expected {expected}")]
    LengthMismatch {
        /// Offending series
        name: &'static str,
        /// Its length
        actual: usize,
        /// Length of the actuals
        expected: usize,
    },
}

/// Result type for quality diagnostics.
pub type Result<T> = std::result::Result<T, QualityError>;
