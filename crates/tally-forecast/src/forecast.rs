//! Multi-period forecasts.
//!
//! Revenue compounds from the previous projected period. Income statement
//! lines come from margins, falling back to cost ratios. Net income and free
//! cash flow use their own margins when those drivers exist; otherwise net
//! income is pre-tax income less tax and free cash flow is built from net
//! income, D&A, capex and the change in working capital. Cash and PP&E roll forward from
//! the anchor period.

use crate::config::{ForecastOptions, ScenarioConfig};
use crate::drivers::{DriverKind, DriverSource, Drivers, net_working_capital, total_debt};
use crate::scenario::{Scenario, apply_scenario};
use crate::series::PeriodMetrics;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A projected value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastValue {
    /// Value
    pub value: f64,
    /// Unit code
    pub unit: String,
}

/// One projected period of one scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPeriod {
    /// Projected period end
    pub period_end: NaiveDate,
    /// 1-based distance from the anchor
    pub period_index: usize,
    /// Scenario
    pub scenario: Scenario,
    /// Projected line items
    pub values: BTreeMap<String, ForecastValue>,
    /// Driver values the projection used, after the scenario transform
    pub assumptions: BTreeMap<DriverKind, f64>,
    /// Provenance of each assumption
    pub driver_sources: BTreeMap<DriverKind, Vec<DriverSource>>,
}

impl ForecastPeriod {
    /// Value of a projected line item.
    pub fn value(&self, line_item: &str) -> Option<f64> {
        self.values.get(line_item).map(|v| v.value)
    }
}

/// Balances carried from one projected period to the next.
#[derive(Debug, Clone, Copy)]
struct Carry {
    revenue: f64,
    cash: Option<f64>,
    ppe: Option<f64>,
    nwc: Option<f64>,
}

#[derive(Debug, Default)]
struct Projection(BTreeMap<String, ForecastValue>);

impl Projection {
    fn set(&mut self, line_item: &str, value: Option<f64>, unit: &str) -> Option<f64> {
        let value = value.filter(|v| v.is_finite())?;
        self.0.insert(
            line_item.to_string(),
            ForecastValue {
                value,
                unit: unit.to_string(),
            },
        );
        Some(value)
    }

    fn usd(&mut self, line_item: &str, value: Option<f64>) -> Option<f64> {
        self.set(line_item, value, "USD")
    }
}

fn project_period(
    drivers: &Drivers,
    carry: &mut Carry,
    debt: Option<f64>,
) -> BTreeMap<String, ForecastValue> {
    let driver = |kind: DriverKind| drivers.value(kind);
    let mut out = Projection::default();

    let revenue = carry.revenue * (1.0 + driver(DriverKind::RevenueGrowth).unwrap_or(0.0));
    out.usd("revenue", Some(revenue));
    let of_revenue = |kind: DriverKind| driver(kind).map(|ratio| revenue * ratio);

    let cost_of_revenue = of_revenue(DriverKind::CogsPct);
    let gross_profit = out.usd(
        "gross_profit",
        of_revenue(DriverKind::GrossMargin).or_else(|| cost_of_revenue.map(|c| revenue - c)),
    );
    out.usd(
        "cogs",
        gross_profit.map(|gp| revenue - gp).or(cost_of_revenue),
    );
    let r_and_d = out.usd("r_and_d", of_revenue(DriverKind::RAndDPct));
    let sga = out.usd("sga", of_revenue(DriverKind::SgaPct));

    let backed_out = match (gross_profit, r_and_d, sga) {
        (Some(gp), rd, sga) if rd.is_some() || sga.is_some() => {
            Some(gp - rd.unwrap_or(0.0) - sga.unwrap_or(0.0))
        }
        _ => None,
    };
    let operating_income = out.usd(
        "operating_income",
        of_revenue(DriverKind::OperatingMargin).or(backed_out),
    );

    let interest = out.usd(
        "interest_expense",
        debt.zip(driver(DriverKind::InterestRate))
            .map(|(debt, rate)| debt * rate),
    );
    let pre_tax = out.usd(
        "pre_tax_income",
        operating_income.map(|oi| oi - interest.unwrap_or(0.0)),
    );
    let tax = out.usd(
        "income_tax_expense",
        pre_tax.zip(driver(DriverKind::TaxRate)).map(|(p, rate)| p * rate),
    );
    let net_income = out.usd(
        "net_income",
        of_revenue(DriverKind::NetMargin).or_else(|| pre_tax.map(|p| p - tax.unwrap_or(0.0))),
    );

    let da = out.usd(
        "depreciation_amortization",
        of_revenue(DriverKind::DaPct),
    );
    out.usd("ebitda", operating_income.zip(da).map(|(oi, da)| oi + da));
    let capex = out.usd("capex", of_revenue(DriverKind::CapexPct).map(|c| -c));

    let nwc = of_revenue(DriverKind::NwcPct);
    let nwc_change = match (nwc, carry.nwc) {
        (Some(current), Some(prior)) => Some(current - prior),
        _ => None,
    };
    out.usd("change_working_capital", nwc_change.map(|delta| -delta));

    let fcf = out.usd(
        "fcf",
        of_revenue(DriverKind::FcfMargin).or_else(|| {
            net_income.map(|ni| {
                ni + da.unwrap_or(0.0) + capex.unwrap_or(0.0) - nwc_change.unwrap_or(0.0)
            })
        }),
    );
    let cash = out.usd("cash", carry.cash.zip(fcf).map(|(cash, fcf)| cash + fcf));
    let ppe = out.usd(
        "ppe",
        carry
            .ppe
            .map(|ppe| ppe - capex.unwrap_or(0.0) - da.unwrap_or(0.0)),
    );

    let shares = driver(DriverKind::Shares).filter(|s| *s > 0.0);
    out.set(
        "eps_diluted",
        net_income.zip(shares).map(|(ni, shares)| ni / shares),
        "USDPERSHARE",
    );

    *carry = Carry {
        revenue,
        cash: cash.or(carry.cash),
        ppe: ppe.or(carry.ppe),
        nwc: nwc.or(carry.nwc),
    };
    out.0
}

/// Projects `options.num_periods` periods past the anchor for each scenario.
///
/// Periods are ordered by scenario, then by index. Values that cannot be
/// projected are omitted. Without anchor revenue there is nothing to project
/// and the result is empty.
pub fn build_forecast(
    anchor_date: NaiveDate,
    anchor: &PeriodMetrics,
    drivers: &Drivers,
    options: &ForecastOptions,
    scenarios: &ScenarioConfig,
) -> Vec<ForecastPeriod> {
    let Some(revenue) = anchor.value("revenue") else {
        debug!(%anchor_date, "no anchor revenue, skipping forecast");
        return Vec::new();
    };
    let cases = if options.include_scenarios {
        Scenario::ALL.len()
    } else {
        1
    };
    let debt = total_debt(anchor);

    let mut periods = Vec::with_capacity(cases * options.num_periods);
    for &scenario in &Scenario::ALL[..cases] {
        let adjusted = apply_scenario(drivers, scenario, scenarios);
        let assumptions: BTreeMap<DriverKind, f64> = adjusted
            .iter()
            .filter_map(|(kind, driver)| driver.value.map(|value| (kind, value)))
            .collect();
        let driver_sources: BTreeMap<DriverKind, Vec<DriverSource>> = adjusted
            .iter()
            .filter(|(kind, _)| assumptions.contains_key(kind))
            .map(|(kind, driver)| (kind, driver.sources.clone()))
            .collect();

        let mut carry = Carry {
            revenue,
            cash: anchor.value("cash"),
            ppe: anchor.value("ppe"),
            nwc: net_working_capital(anchor),
        };
        let mut period_end = anchor_date;
        for period_index in 1..=options.num_periods {
            period_end += Duration::days(options.step_days);
            periods.push(ForecastPeriod {
                period_end,
                period_index,
                scenario,
                values: project_period(&adjusted, &mut carry, debt),
                assumptions: assumptions.clone(),
                driver_sources: driver_sources.clone(),
            });
        }
    }
    periods
}
