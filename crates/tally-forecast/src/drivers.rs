//! Forecast drivers.
//!
//! Ratio drivers average up to `trailing_periods` recent observations,
//! ignoring ratios whose magnitude reaches `outlier_bound`. When no
//! observation survives, the latest period's ratio is used as is, and failing
//! that the configured default (only growth, tax and interest have one).

use crate::config::DriverDefaults;
use crate::series::{MetricSeries, PeriodMetrics};
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Note attached to growth sources when the default growth applies.
pub const FALLBACK_GROWTH_NOTE: &str = "fallback_growth";

/// Note attached to tax sources when the observed rate was out of bounds.
pub const TAX_OUT_OF_BOUNDS_NOTE: &str = "tax_rate_out_of_bounds";

/// A forecasting assumption.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// Period-over-period revenue growth
    #[display("revenue_growth")]
    RevenueGrowth,
    /// Gross profit over revenue
    #[display("gross_margin")]
    GrossMargin,
    /// Operating income over revenue
    #[display("operating_margin")]
    OperatingMargin,
    /// Net income over revenue
    #[display("net_margin")]
    NetMargin,
    /// Free cash flow over revenue
    #[display("fcf_margin")]
    FcfMargin,
    /// Cost of revenue over revenue
    #[display("cogs_pct")]
    CogsPct,
    /// Research and development over revenue
    #[display("r_and_d_pct")]
    RAndDPct,
    /// Selling, general and administrative over revenue
    #[display("sga_pct")]
    SgaPct,
    /// Depreciation and amortization over revenue
    #[display("da_pct")]
    DaPct,
    /// Capital expenditure magnitude over revenue
    #[display("capex_pct")]
    CapexPct,
    /// Net working capital over revenue
    #[display("nwc_pct")]
    NwcPct,
    /// Income tax over pre-tax income
    #[display("tax_rate")]
    TaxRate,
    /// Interest expense over total debt
    #[display("interest_rate")]
    InterestRate,
    /// Share count used for per-share values
    #[display("shares")]
    Shares,
}

impl DriverKind {
    /// Margin drivers moved by scenario shifts.
    pub const MARGINS: [Self; 4] = [
        Self::GrossMargin,
        Self::OperatingMargin,
        Self::NetMargin,
        Self::FcfMargin,
    ];

    /// Human readable description.
    pub const fn description(self) -> &'static str {
        match self {
            Self::RevenueGrowth => "Average period-over-period revenue growth",
            Self::GrossMargin => "Gross profit as a share of revenue",
            Self::OperatingMargin => "Operating income as a share of revenue",
            Self::NetMargin => "Net income as a share of revenue",
            Self::FcfMargin => "Free cash flow as a share of revenue",
            Self::CogsPct => "Cost of revenue as a share of revenue",
            Self::RAndDPct => "Research and development as a share of revenue",
            Self::SgaPct => "SG&A as a share of revenue",
            Self::DaPct => "Depreciation and amortization as a share of revenue",
            Self::CapexPct => "Capital expenditure as a share of revenue",
            Self::NwcPct => "Net working capital as a share of revenue",
            Self::TaxRate => "Effective tax rate",
            Self::InterestRate => "Interest expense relative to total debt",
            Self::Shares => "Diluted share count",
        }
    }
}

/// One input behind a driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverSource {
    /// Line item read
    pub line_item: String,
    /// Period it was read from
    pub period_end: NaiveDate,
    /// Why the input is notable, e.g. a fallback
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl DriverSource {
    fn new(line_item: &str, period_end: NaiveDate) -> Self {
        Self {
            line_item: line_item.to_string(),
            period_end,
            note: None,
        }
    }

    fn noted(line_item: &str, period_end: NaiveDate, note: &str) -> Self {
        Self {
            note: Some(note.to_string()),
            ..Self::new(line_item, period_end)
        }
    }
}

/// A computed driver and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Value, `None` when nothing supports it
    pub value: Option<f64>,
    /// Inputs that fed the value
    pub sources: Vec<DriverSource>,
    /// What the driver measures
    pub description: String,
    /// True when the value is an assumption rather than an observation
    pub is_default: bool,
}

impl Driver {
    fn observed(kind: DriverKind, value: f64, sources: Vec<DriverSource>) -> Self {
        Self {
            value: Some(value),
            sources,
            description: kind.description().to_string(),
            is_default: false,
        }
    }

    fn assumed(kind: DriverKind, value: f64, sources: Vec<DriverSource>) -> Self {
        Self {
            is_default: true,
            ..Self::observed(kind, value, sources)
        }
    }

    fn missing(kind: DriverKind) -> Self {
        Self {
            value: None,
            sources: Vec::new(),
            description: kind.description().to_string(),
            is_default: false,
        }
    }
}

/// Drivers by kind.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Drivers(BTreeMap<DriverKind, Driver>);

impl Drivers {
    /// Driver of one kind.
    pub fn get(&self, kind: DriverKind) -> Option<&Driver> {
        self.0.get(&kind)
    }

    /// Value of one driver.
    pub fn value(&self, kind: DriverKind) -> Option<f64> {
        self.get(kind).and_then(|driver| driver.value)
    }

    /// Replaces the value of an existing driver, keeping its provenance.
    pub fn set_value(&mut self, kind: DriverKind, value: f64) {
        if let Some(driver) = self.0.get_mut(&kind) {
            driver.value = Some(value);
        }
    }

    /// Sets a driver.
    pub fn insert(&mut self, kind: DriverKind, driver: Driver) {
        self.0.insert(kind, driver);
    }

    /// Builder for tests and callers supplying their own assumptions.
    pub fn with_value(mut self, kind: DriverKind, value: f64) -> Self {
        self.insert(kind, Driver::assumed(kind, value, Vec::new()));
        self
    }

    /// Drivers in kind order.
    pub fn iter(&self) -> impl Iterator<Item = (DriverKind, &Driver)> {
        self.0.iter().map(|(kind, driver)| (*kind, driver))
    }

    /// Number of drivers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no driver was computed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

fn per_revenue(period: &PeriodMetrics, numerator: Option<f64>) -> Option<f64> {
    ratio(numerator, period.value("revenue"))
}

/// Free cash flow of a period: `cfo - |capex|`, or `cfo + cfi` when capex is
/// not reported.
pub fn free_cash_flow(period: &PeriodMetrics) -> Option<f64> {
    match (period.value("cfo"), period.value("capex")) {
        (Some(cfo), Some(capex)) => Some(cfo - capex.abs()),
        _ => period.sum_present(&["cfo", "cfi"]),
    }
}

/// Net working capital of a period: receivables plus inventory less payables.
pub fn net_working_capital(period: &PeriodMetrics) -> Option<f64> {
    let assets = period.sum_present(&["accounts_receivable", "inventory"]);
    let payables = period.value("accounts_payable");
    if assets.is_none() && payables.is_none() {
        return None;
    }
    Some(assets.unwrap_or(0.0) - payables.unwrap_or(0.0))
}

/// Total debt of a period.
pub fn total_debt(period: &PeriodMetrics) -> Option<f64> {
    period.sum_present(&["debt_long_term", "debt_current"])
}

struct RatioDriver {
    kind: DriverKind,
    inputs: &'static [&'static str],
    compute: fn(&PeriodMetrics) -> Option<f64>,
}

const RATIO_DRIVERS: &[RatioDriver] = &[
    RatioDriver {
        kind: DriverKind::GrossMargin,
        inputs: &["gross_profit", "revenue"],
        compute: |p| per_revenue(p, p.value("gross_profit")),
    },
    RatioDriver {
        kind: DriverKind::OperatingMargin,
        inputs: &["operating_income", "revenue"],
        compute: |p| per_revenue(p, p.value("operating_income")),
    },
    RatioDriver {
        kind: DriverKind::NetMargin,
        inputs: &["net_income", "revenue"],
        compute: |p| per_revenue(p, p.value("net_income")),
    },
    RatioDriver {
        kind: DriverKind::FcfMargin,
        inputs: &["cfo", "capex", "revenue"],
        compute: |p| per_revenue(p, free_cash_flow(p)),
    },
    RatioDriver {
        kind: DriverKind::CogsPct,
        inputs: &["cogs", "revenue"],
        compute: |p| per_revenue(p, p.value("cogs")),
    },
    RatioDriver {
        kind: DriverKind::RAndDPct,
        inputs: &["r_and_d", "revenue"],
        compute: |p| per_revenue(p, p.value("r_and_d")),
    },
    RatioDriver {
        kind: DriverKind::SgaPct,
        inputs: &["sga", "revenue"],
        compute: |p| per_revenue(p, p.value("sga")),
    },
    RatioDriver {
        kind: DriverKind::DaPct,
        inputs: &["depreciation_amortization", "revenue"],
        compute: |p| per_revenue(p, p.value("depreciation_amortization")),
    },
    RatioDriver {
        kind: DriverKind::CapexPct,
        inputs: &["capex", "revenue"],
        compute: |p| per_revenue(p, p.value("capex").map(f64::abs)),
    },
    RatioDriver {
        kind: DriverKind::NwcPct,
        inputs: &["accounts_receivable", "inventory", "accounts_payable", "revenue"],
        compute: |p| per_revenue(p, net_working_capital(p)),
    },
    RatioDriver {
        kind: DriverKind::TaxRate,
        inputs: &["income_tax_expense", "pre_tax_income"],
        compute: |p| ratio(p.value("income_tax_expense"), p.value("pre_tax_income")),
    },
    RatioDriver {
        kind: DriverKind::InterestRate,
        inputs: &["interest_expense", "debt_long_term", "debt_current"],
        compute: |p| ratio(p.value("interest_expense").map(f64::abs), total_debt(p)),
    },
];

/// Averages observations below the outlier bound, falling back to the first
/// (most recent) raw observation. Returns the value and the periods used.
fn trailing_average(
    observations: &[(NaiveDate, Option<f64>)],
    defaults: &DriverDefaults,
) -> Option<(f64, Vec<NaiveDate>)> {
    let kept: Vec<(NaiveDate, f64)> = observations
        .iter()
        .filter_map(|(date, value)| value.map(|v| (*date, v)))
        .filter(|(_, v)| v.is_finite() && v.abs() < defaults.outlier_bound)
        .collect();
    if !kept.is_empty() {
        let mean = kept.iter().map(|(_, v)| v).sum::<f64>() / kept.len() as f64;
        return Some((mean, kept.into_iter().map(|(date, _)| date).collect()));
    }
    match observations.first() {
        Some((date, Some(value))) if value.is_finite() => Some((*value, vec![*date])),
        _ => None,
    }
}

fn revenue_growth(series: &MetricSeries, defaults: &DriverDefaults) -> Driver {
    let kind = DriverKind::RevenueGrowth;
    let revenues: Vec<(NaiveDate, Option<f64>)> = series
        .newest_first()
        .take(defaults.trailing_periods + 1)
        .map(|(date, period)| (date, period.value("revenue")))
        .collect();
    let growth: Vec<(NaiveDate, Option<f64>)> = revenues
        .windows(2)
        .map(|pair| {
            let (date, current) = pair[0];
            let (_, prior) = pair[1];
            let value = match (current, prior) {
                (Some(current), Some(prior)) if prior != 0.0 => Some((current - prior) / prior),
                _ => None,
            };
            (date, value)
        })
        .collect();

    if let Some((value, dates)) = trailing_average(&growth, defaults) {
        let mut sources: Vec<DriverSource> =
            dates.iter().map(|date| DriverSource::new("revenue", *date)).collect();
        // Each growth observation also reads the period before it.
        if let Some(prior) = dates
            .last()
            .and_then(|last| revenues.iter().position(|(date, _)| date == last))
            .and_then(|index| revenues.get(index + 1))
        {
            sources.push(DriverSource::new("revenue", prior.0));
        }
        return Driver::observed(kind, value, sources);
    }

    match revenues.first() {
        Some((date, Some(_))) => Driver::assumed(
            kind,
            defaults.revenue_growth,
            vec![DriverSource::noted("revenue", *date, FALLBACK_GROWTH_NOTE)],
        ),
        _ => Driver::missing(kind),
    }
}

fn ratio_driver(series: &MetricSeries, ratio: &RatioDriver, defaults: &DriverDefaults) -> Driver {
    let observations: Vec<(NaiveDate, Option<f64>)> = series
        .newest_first()
        .take(defaults.trailing_periods)
        .map(|(date, period)| (date, (ratio.compute)(period)))
        .collect();
    let Some((value, dates)) = trailing_average(&observations, defaults) else {
        return match ratio.kind {
            DriverKind::TaxRate => Driver::assumed(ratio.kind, defaults.tax_rate, Vec::new()),
            DriverKind::InterestRate => {
                Driver::assumed(ratio.kind, defaults.interest_rate, Vec::new())
            }
            _ => Driver::missing(ratio.kind),
        };
    };
    let sources: Vec<DriverSource> = dates
        .iter()
        .flat_map(|date| ratio.inputs.iter().map(|item| DriverSource::new(item, *date)))
        .collect();

    let (low, high) = defaults.tax_rate_bounds;
    if ratio.kind == DriverKind::TaxRate && !(low..=high).contains(&value) {
        debug!(observed = value, "tax rate out of bounds, using default");
        let sources = sources
            .into_iter()
            .map(|source| DriverSource {
                note: Some(TAX_OUT_OF_BOUNDS_NOTE.to_string()),
                ..source
            })
            .collect();
        return Driver::assumed(ratio.kind, defaults.tax_rate, sources);
    }
    Driver::observed(ratio.kind, value, sources)
}

const SHARE_PRECEDENCE: [&str; 3] = ["shares_diluted", "shares_outstanding", "shares_basic"];

fn shares(series: &MetricSeries) -> Driver {
    let kind = DriverKind::Shares;
    series
        .latest()
        .and_then(|(date, period)| {
            SHARE_PRECEDENCE.iter().find_map(|item| {
                period
                    .value(item)
                    .filter(|v| *v > 0.0)
                    .map(|v| Driver::observed(kind, v, vec![DriverSource::new(item, date)]))
            })
        })
        .unwrap_or_else(|| Driver::missing(kind))
}

/// Computes every driver from a metric series.
///
/// An empty series yields no drivers at all.
pub fn compute_drivers(series: &MetricSeries, defaults: &DriverDefaults) -> Drivers {
    let mut drivers = Drivers::default();
    if series.is_empty() {
        return drivers;
    }
    drivers.insert(DriverKind::RevenueGrowth, revenue_growth(series, defaults));
    for ratio in RATIO_DRIVERS {
        drivers.insert(ratio.kind, ratio_driver(series, ratio, defaults));
    }
    drivers.insert(DriverKind::Shares, shares(series));
    debug!(
        periods = series.len(),
        computed = drivers.iter().filter(|(_, d)| d.value.is_some()).count(),
        "computed drivers"
    );
    drivers
}
