//! Model view: recent actuals and forecast periods grouped per statement.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tally_data::{Statement, schema};
use tally_forecast::{
    DriverKind, Drivers, ForecastPeriod, ForecastSummary, ForecastValue, MetricSeries,
    MetricSource, Scenario, build_forecast_summary,
};

/// Actual periods shown when no limit is given.
pub const DEFAULT_ACTUALS_LIMIT: usize = 4;

/// Statements a line item is shown under. Projected `fcf` belongs to the
/// cash flow statement.
fn model_statements(line_item: &str) -> Vec<Statement> {
    if line_item == "fcf" {
        vec![Statement::CashFlow]
    } else {
        schema::statements_for(line_item)
    }
}

/// An actual value with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelLine {
    /// Value
    pub value: f64,
    /// Unit code
    pub unit: String,
    /// Where the value came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<MetricSource>,
}

/// Actual values of one statement in one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelActual {
    /// Period end
    pub period_end: NaiveDate,
    /// Values by line item
    pub values: BTreeMap<String, ModelLine>,
}

/// Projected values of one statement in one forecast period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelForecast {
    /// Projected period end
    pub period_end: NaiveDate,
    /// Scenario
    pub scenario: Scenario,
    /// 1-based distance from the anchor
    pub period_index: usize,
    /// Values by line item
    pub values: BTreeMap<String, ForecastValue>,
    /// Driver values used
    pub assumptions: BTreeMap<DriverKind, f64>,
}

/// Actuals and forecast of one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStatement {
    /// Recent actual periods, oldest first
    pub actuals: Vec<ModelActual>,
    /// Forecast periods ordered by scenario, then index
    pub forecast: Vec<ModelForecast>,
}

/// Three-statement model of one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelView {
    /// Ticker symbol
    pub ticker: String,
    /// Latest actual period
    pub as_of: Option<NaiveDate>,
    /// Drivers behind the forecast
    pub drivers: Drivers,
    /// Scenarios present in the forecast
    pub scenarios: Vec<Scenario>,
    /// Actuals and forecast per statement
    pub statements: BTreeMap<Statement, ModelStatement>,
    /// Bands across scenarios
    pub forecast_summary: ForecastSummary,
}

/// Builds the model view from actuals, drivers and a forecast.
pub fn build_model(
    ticker: &str,
    series: &MetricSeries,
    drivers: &Drivers,
    forecast: &[ForecastPeriod],
    actuals_limit: usize,
) -> ModelView {
    let mut statements: BTreeMap<Statement, ModelStatement> = Statement::ALL
        .into_iter()
        .map(|statement| (statement, ModelStatement::default()))
        .collect();

    let recent: Vec<_> = series.newest_first().take(actuals_limit).collect();
    for (period_end, metrics) in recent.into_iter().rev() {
        let mut grouped: BTreeMap<Statement, BTreeMap<String, ModelLine>> = BTreeMap::new();
        for (line_item, value) in &metrics.values {
            for statement in model_statements(line_item) {
                grouped.entry(statement).or_default().insert(
                    line_item.clone(),
                    ModelLine {
                        value: value.value,
                        unit: value.unit.clone(),
                        source: metrics.sources.get(line_item).cloned(),
                    },
                );
            }
        }
        for (statement, model) in &mut statements {
            model.actuals.push(ModelActual {
                period_end,
                values: grouped.remove(statement).unwrap_or_default(),
            });
        }
    }

    let mut ordered: Vec<&ForecastPeriod> = forecast.iter().collect();
    ordered.sort_by_key(|period| (period.scenario, period.period_index));
    for period in ordered {
        for (statement, model) in &mut statements {
            let values = period
                .values
                .iter()
                .filter(|(line_item, _)| model_statements(line_item).contains(statement))
                .map(|(line_item, value)| (line_item.clone(), value.clone()))
                .collect();
            model.forecast.push(ModelForecast {
                period_end: period.period_end,
                scenario: period.scenario,
                period_index: period.period_index,
                values,
                assumptions: period.assumptions.clone(),
            });
        }
    }

    let scenarios: BTreeSet<Scenario> = forecast.iter().map(|period| period.scenario).collect();
    ModelView {
        ticker: ticker.to_ascii_uppercase(),
        as_of: series.latest().map(|(date, _)| date),
        drivers: drivers.clone(),
        scenarios: scenarios.into_iter().collect(),
        statements,
        forecast_summary: build_forecast_summary(forecast),
    }
}
