//! Canonical facts arranged as a per-period metric series.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_data::{CanonicalFact, Statement, schema};

/// One line item value within a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Value
    pub value: f64,
    /// Unit code
    pub unit: String,
    /// Period start for duration facts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveDate>,
}

impl MetricValue {
    /// A `USD` value without a period start.
    pub fn usd(value: f64) -> Self {
        Self {
            value,
            unit: "USD".to_string(),
            start: None,
        }
    }
}

/// Where a metric came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSource {
    /// Statement the value was taken from
    pub statement: Statement,
    /// Accession of the filing
    pub accession: Option<String>,
    /// XBRL concept
    pub source_xbrl_tag: Option<String>,
    /// XBRL context
    pub source_context_ref: Option<String>,
    /// True for values computed from accounting identities
    pub derived: bool,
}

/// Metric values for one period end.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PeriodMetrics {
    /// Line item values
    pub values: BTreeMap<String, MetricValue>,
    /// Provenance per line item
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sources: BTreeMap<String, MetricSource>,
}

impl PeriodMetrics {
    /// Value of a line item.
    pub fn value(&self, line_item: &str) -> Option<f64> {
        self.values.get(line_item).map(|v| v.value)
    }

    /// Period start of a line item.
    pub fn start(&self, line_item: &str) -> Option<NaiveDate> {
        self.values.get(line_item).and_then(|v| v.start)
    }

    /// Sum of the present line items, `None` when none are present.
    pub fn sum_present(&self, line_items: &[&str]) -> Option<f64> {
        let present: Vec<f64> = line_items.iter().filter_map(|item| self.value(item)).collect();
        (!present.is_empty()).then(|| present.iter().sum())
    }
}

/// Metrics keyed by period end.
///
/// Iteration helpers expose both chronological and newest-first order; drivers
/// and backtests read newest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricSeries {
    periods: BTreeMap<NaiveDate, PeriodMetrics>,
}

impl MetricSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arranges canonical facts by period end.
    ///
    /// Facts outside the canonical schema are skipped. A line item carried on
    /// several statements (such as `net_income`) keeps the income statement
    /// value, then the balance sheet, then the cash flow statement.
    pub fn from_canonical(facts: &[CanonicalFact]) -> Self {
        let mut series = Self::new();
        for fact in facts {
            if !schema::is_allowed(fact.statement, &fact.line_item) {
                continue;
            }
            let period = series.periods.entry(fact.period_end).or_default();
            let replace = period
                .sources
                .get(&fact.line_item)
                .is_none_or(|existing| fact.statement < existing.statement);
            if !replace {
                continue;
            }
            period.values.insert(
                fact.line_item.clone(),
                MetricValue {
                    value: fact.value,
                    unit: fact.unit.clone(),
                    start: fact.period_start,
                },
            );
            period.sources.insert(
                fact.line_item.clone(),
                MetricSource {
                    statement: fact.statement,
                    accession: fact.accession.clone(),
                    source_xbrl_tag: fact.source_xbrl_tag.clone(),
                    source_context_ref: fact.source_context_ref.clone(),
                    derived: fact.is_derived(),
                },
            );
        }
        series
    }

    /// Sets one value, creating the period if needed.
    pub fn insert(&mut self, period_end: NaiveDate, line_item: &str, value: MetricValue) {
        self.periods
            .entry(period_end)
            .or_default()
            .values
            .insert(line_item.to_string(), value);
    }

    /// Builder form of [`MetricSeries::insert`] for `USD` values.
    pub fn with(mut self, period_end: NaiveDate, line_item: &str, value: f64) -> Self {
        self.insert(period_end, line_item, MetricValue::usd(value));
        self
    }

    /// Number of periods.
    pub fn len(&self) -> usize {
        self.periods.len()
    }

    /// Returns true if the series has no periods.
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Metrics for one period end.
    pub fn get(&self, period_end: NaiveDate) -> Option<&PeriodMetrics> {
        self.periods.get(&period_end)
    }

    /// Periods oldest first.
    pub fn chronological(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, &PeriodMetrics)> {
        self.periods.iter().map(|(date, metrics)| (*date, metrics))
    }

    /// Periods newest first.
    pub fn newest_first(&self) -> impl Iterator<Item = (NaiveDate, &PeriodMetrics)> {
        self.chronological().rev()
    }

    /// Most recent period.
    pub fn latest(&self) -> Option<(NaiveDate, &PeriodMetrics)> {
        self.newest_first().next()
    }

    /// The `count` oldest periods.
    pub fn head(&self, count: usize) -> Self {
        Self {
            periods: self
                .periods
                .iter()
                .take(count)
                .map(|(date, metrics)| (*date, metrics.clone()))
                .collect(),
        }
    }
}

impl FromIterator<(NaiveDate, PeriodMetrics)> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = (NaiveDate, PeriodMetrics)>>(iter: I) -> Self {
        Self {
            periods: iter.into_iter().collect(),
        }
    }
}
