#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tally/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod backtest;
pub mod coverage;
pub mod error;
pub mod export;
pub mod model;
pub mod quality;
pub mod statements;

pub use backtest::{
    BacktestMetrics, BacktestMode, Interval, compute_backtest_metrics, revenue_backtest,
};
pub use coverage::{
    ApplicableItems, PeriodCoverage, StatementCoverage, applicable_from_raw, compute_coverage,
};
pub use error::{QualityError, Result};
pub use export::{ExportError, ExportFormat, Exporter, ForecastRow, forecast_rows};
pub use model::{DEFAULT_ACTUALS_LIMIT, ModelView, build_model};
pub use quality::{
    compute_tie_checks, coverage_mismatches, period_start_consistent, statement_counts,
};
pub use statements::{
    DEFAULT_STATEMENT_PERIODS, StatementLine, StatementPeriod, StatementsView, build_statements,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
