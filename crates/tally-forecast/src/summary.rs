//! Scenario bands per projected period.

use crate::forecast::ForecastPeriod;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spread of one line item across scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SummaryBand {
    /// Median across scenarios
    pub point: f64,
    /// Lowest scenario value
    pub low: f64,
    /// Highest scenario value
    pub high: f64,
    /// Number of scenarios that projected the line item
    pub scenarios: usize,
}

impl SummaryBand {
    fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);
        let mid = values.len() / 2;
        let point = if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        };
        Some(Self {
            point,
            low: values[0],
            high: values[values.len() - 1],
            scenarios: values.len(),
        })
    }
}

/// Bands keyed by period end, then line item.
pub type ForecastSummary = BTreeMap<NaiveDate, BTreeMap<String, SummaryBand>>;

/// Collapses every scenario's projection into a band per period end and line
/// item.
pub fn build_forecast_summary(forecast: &[ForecastPeriod]) -> ForecastSummary {
    let mut collected: BTreeMap<NaiveDate, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for period in forecast {
        let items = collected.entry(period.period_end).or_default();
        for (line_item, value) in &period.values {
            items.entry(line_item.as_str()).or_default().push(value.value);
        }
    }
    collected
        .into_iter()
        .map(|(period_end, items)| {
            let bands = items
                .into_iter()
                .filter_map(|(item, values)| {
                    SummaryBand::from_values(values).map(|band| (item.to_string(), band))
                })
                .collect();
            (period_end, bands)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastValue;
    use crate::scenario::Scenario;
    use approx::assert_relative_eq;

    fn period(scenario: Scenario, revenue: f64) -> ForecastPeriod {
        ForecastPeriod {
            period_end: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            period_index: 1,
            scenario,
            values: BTreeMap::from([(
                "revenue".to_string(),
                ForecastValue {
                    value: revenue,
                    unit: "USD".into(),
                },
            )]),
            assumptions: BTreeMap::new(),
            driver_sources: BTreeMap::new(),
        }
    }

    #[test]
    fn test_band() {
        let summary = build_forecast_summary(&[
            period(Scenario::Base, 110.0),
            period(Scenario::Bull, 120.0),
            period(Scenario::Bear, 100.0),
        ]);
        let band = summary.values().next().unwrap()["revenue"];
        assert_relative_eq!(band.point, 110.0);
        assert_relative_eq!(band.low, 100.0);
        assert_relative_eq!(band.high, 120.0);
        assert_eq!(band.scenarios, 3);
    }

    #[test]
    fn test_even_count_median() {
        let summary =
            build_forecast_summary(&[period(Scenario::Base, 100.0), period(Scenario::Bull, 120.0)]);
        assert_relative_eq!(summary.values().next().unwrap()["revenue"].point, 110.0);
    }

    #[test]
    fn test_empty() {
        assert!(build_forecast_summary(&[]).is_empty());
    }
}
