//! Aggregator configuration.

use serde::{Deserialize, Serialize};

/// Tolerances used by derivations and tie checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// Balance sheet and cash flow residuals at or below this size are not emitted
    pub residual_tolerance: f64,
    /// Absolute delta at or below which a tie is `ok`
    pub tie_tolerance: f64,
    /// Delta relative to the tie's scale at or below which a tie is `warn`
    /// rather than `fail`
    pub warn_ratio: f64,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            residual_tolerance: 0.01,
            tie_tolerance: 0.01,
            warn_ratio: 0.01,
        }
    }
}
