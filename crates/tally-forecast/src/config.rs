//! Driver defaults, scenario transforms and forecast options.

use serde::{Deserialize, Serialize};

/// Fallback values and windows for driver computation.
///
/// The fallbacks are US-market assumptions; override them for other markets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverDefaults {
    /// Growth applied when fewer than two revenue observations exist
    pub revenue_growth: f64,
    /// Tax rate used when the observed rate is missing or implausible
    pub tax_rate: f64,
    /// Interest rate on debt used when interest expense is not reported
    pub interest_rate: f64,
    /// Number of recent periods averaged
    pub trailing_periods: usize,
    /// Ratios with an absolute value at or above this bound are ignored
    pub outlier_bound: f64,
    /// Inclusive range of plausible effective tax rates
    pub tax_rate_bounds: (f64, f64),
}

impl Default for DriverDefaults {
    fn default() -> Self {
        Self {
            revenue_growth: 0.02,
            tax_rate: 0.21,
            interest_rate: 0.05,
            trailing_periods: 4,
            outlier_bound: 10.0,
            tax_rate_bounds: (0.0, 0.5),
        }
    }
}

/// Growth multiplier and margin shift of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenarioShift {
    /// Factor applied to revenue growth
    pub growth_multiplier: f64,
    /// Amount added to every margin driver before clamping to `[0, 1]`
    pub margin_shift: f64,
}

/// Scenario transforms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Upside case
    pub bull: ScenarioShift,
    /// Downside case
    pub bear: ScenarioShift,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            bull: ScenarioShift {
                growth_multiplier: 1.5,
                margin_shift: 0.02,
            },
            bear: ScenarioShift {
                growth_multiplier: 0.5,
                margin_shift: -0.02,
            },
        }
    }
}

/// Forecast horizon settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastOptions {
    /// Periods projected per scenario
    pub num_periods: usize,
    /// Project bull and bear alongside base
    pub include_scenarios: bool,
    /// Days between projected period ends
    pub step_days: i64,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            num_periods: 4,
            include_scenarios: true,
            step_days: 91,
        }
    }
}

impl ForecastOptions {
    /// Base case only, `num_periods` ahead.
    pub fn base_only(num_periods: usize) -> Self {
        Self {
            num_periods,
            include_scenarios: false,
            ..Self::default()
        }
    }
}
