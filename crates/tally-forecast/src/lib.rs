#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/tally/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod drivers;
pub mod forecast;
pub mod scenario;
pub mod series;
pub mod summary;

pub use config::{DriverDefaults, ForecastOptions, ScenarioConfig, ScenarioShift};
pub use drivers::{Driver, DriverKind, DriverSource, Drivers, compute_drivers};
pub use forecast::{ForecastPeriod, ForecastValue, build_forecast};
pub use scenario::{Scenario, apply_scenario};
pub use series::{MetricSeries, MetricSource, MetricValue, PeriodMetrics};
pub use summary::{ForecastSummary, SummaryBand, build_forecast_summary};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
