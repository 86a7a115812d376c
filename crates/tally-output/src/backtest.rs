//! Revenue backtests.
//!
//! Both modes forecast each period's revenue from the previous period's
//! revenue and a growth driver, then score the forecasts against the actuals.
//! The rolling mode derives growth from the two periods before the target; the
//! time-travel mode recomputes every driver from the full history available
//! at that point, never reading later periods.

use crate::error::{QualityError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_forecast::{DriverDefaults, DriverKind, MetricSeries, compute_drivers};
use tracing::debug;

/// Forecast accuracy scores.
///
/// Scores are `None` when no pair of actual and forecast was available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// Mean absolute error
    pub mae: Option<f64>,
    /// Mean absolute percentage error over non-zero actuals
    pub mape: Option<f64>,
    /// Share of pairs whose signs agree, zero counting as non-negative
    pub directional_accuracy: Option<f64>,
    /// Share of actuals inside the supplied interval
    pub interval_coverage: Option<f64>,
    /// Number of scored pairs
    pub samples: usize,
}

/// Optional lower and upper forecast bounds.
#[derive(Debug, Clone, Copy)]
pub struct Interval<'a> {
    /// Lower bounds
    pub low: &'a [Option<f64>],
    /// Upper bounds
    pub high: &'a [Option<f64>],
}

fn check_len(name: &'static str, actual: usize, expected: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(QualityError::LengthMismatch {
            name,
            actual,
            expected,
        })
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Scores forecasts against actuals.
///
/// Entries where either side is missing are skipped.
///
/// # Errors
///
/// Returns [`QualityError::LengthMismatch`] if the forecasts or interval
/// bounds differ in length from the actuals.
pub fn compute_backtest_metrics(
    actuals: &[Option<f64>],
    forecasts: &[Option<f64>],
    interval: Option<Interval<'_>>,
) -> Result<BacktestMetrics> {
    check_len("forecasts", forecasts.len(), actuals.len())?;
    if let Some(interval) = interval {
        check_len("interval_low", interval.low.len(), actuals.len())?;
        check_len("interval_high", interval.high.len(), actuals.len())?;
    }

    let paired: Vec<(usize, f64, f64)> = actuals
        .iter()
        .zip(forecasts)
        .enumerate()
        .filter_map(|(i, (a, f))| Some((i, (*a)?, (*f)?)))
        .collect();
    if paired.is_empty() {
        return Ok(BacktestMetrics::default());
    }

    let mae = mean(paired.iter().map(|(_, a, f)| (a - f).abs()));
    let mape = mean(
        paired
            .iter()
            .filter(|(_, a, _)| *a != 0.0)
            .map(|(_, a, f)| (a - f).abs() / a.abs()),
    );
    let directional_accuracy = mean(
        paired
            .iter()
            .map(|(_, a, f)| if (*a >= 0.0) == (*f >= 0.0) { 1.0 } else { 0.0 }),
    );
    let interval_coverage = interval.and_then(|interval| {
        mean(paired.iter().filter_map(|(i, a, _)| {
            let low = interval.low[*i]?;
            let high = interval.high[*i]?;
            Some(if (low..=high).contains(a) { 1.0 } else { 0.0 })
        }))
    });

    Ok(BacktestMetrics {
        mae,
        mape,
        directional_accuracy,
        interval_coverage,
        samples: paired.len(),
    })
}

/// How much history each step may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktestMode {
    /// The two periods before the target
    Rolling,
    /// Every period before the target
    TimeTravel,
}

/// Backtests one-period-ahead revenue forecasts over a series.
///
/// Returns `None` when fewer than two periods exist or no forecast could be
/// paired with an actual.
pub fn revenue_backtest(
    series: &MetricSeries,
    mode: BacktestMode,
    defaults: &DriverDefaults,
) -> Option<BacktestMetrics> {
    if series.len() < 2 {
        return None;
    }
    let periods: Vec<NaiveDate> = series.chronological().map(|(date, _)| date).collect();
    let mut actuals = Vec::new();
    let mut forecasts = Vec::new();

    for (index, target) in periods.iter().enumerate().skip(1) {
        let history = series.head(index);
        let history = match mode {
            BacktestMode::TimeTravel => history,
            BacktestMode::Rolling => history
                .newest_first()
                .take(2)
                .map(|(date, metrics)| (date, metrics.clone()))
                .collect(),
        };
        let Some(prior_revenue) = history.latest().and_then(|(_, p)| p.value("revenue")) else {
            continue;
        };
        let Some(actual) = series.get(*target).and_then(|p| p.value("revenue")) else {
            continue;
        };
        let growth = compute_drivers(&history, defaults)
            .value(DriverKind::RevenueGrowth)
            .unwrap_or(0.0);
        actuals.push(Some(actual));
        forecasts.push(Some(prior_revenue * (1.0 + growth)));
    }
    if actuals.is_empty() {
        return None;
    }
    debug!(?mode, samples = actuals.len(), "revenue backtest");
    compute_backtest_metrics(&actuals, &forecasts, None).ok()
}
