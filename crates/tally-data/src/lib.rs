#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tally/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod edgar;
pub mod error;
pub mod facts;
pub mod schema;
pub mod store;

pub use error::{DataError, Result, UnknownVariant};
pub use facts::{CanonicalFact, Filing, PeriodType, RawFact, Statement, normalize_cik};
pub use store::{FactStore, MemoryStore, PersistOutcome, SqliteStore};

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
