#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tally/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod align;
pub mod config;
pub mod derive;
pub mod error;
pub mod group;
pub mod materialize;
pub mod ties;

pub use config::AggregatorConfig;
pub use error::{CanonicalError, Result};
pub use group::compare_accession;
pub use materialize::{CanonicalAggregator, MaterializeOutcome, materialize_canonical_for_ticker};
pub use ties::{TieCheck, TieKind, TiePolicy, TieStatus, TieViolation, check_ties};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
