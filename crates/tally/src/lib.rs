#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tally/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export main types from sub-crates
pub use tally_canonical as canonical;
pub use tally_data as data;
pub use tally_forecast as forecast;
pub use tally_output as output;

pub use config::TallyConfig;
pub use error::{Result, TallyError};
pub use pipeline::{BacktestReport, IngestOutcome, Pipeline, Summary, SummaryPeriod};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
