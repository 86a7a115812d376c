//! Error types for canonical aggregation.

use crate::ties::TieViolation;
use tally_data::DataError;
use thiserror::Error;

/// Errors raised while materializing canonical facts.
#[derive(Debug, Error)]
pub enum CanonicalError {
    /// Store or data model failure
    #[error("Data error: {0}")]
    Data(#[from] DataError),

    /// Tie checks failed under an enforcing policy
    #[error("{count} tie check violation(s), first at {first}", count = .0.len(), first = first_period(.0))]
    TieViolations(Vec<TieViolation>),
}

fn first_period(violations: &[TieViolation]) -> String {
    violations
        .first()
        .map_or_else(|| "-".to_string(), |v| v.period_end.to_string())
}

/// Result type for canonical operations.
pub type Result<T> = std::result::Result<T, CanonicalError>;
