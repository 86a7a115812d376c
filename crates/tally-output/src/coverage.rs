//! Line item coverage per period.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tally_data::{RawFact, Statement, schema};
use tally_forecast::MetricSeries;

/// Line items expected per statement, per period end.
pub type ApplicableItems = BTreeMap<NaiveDate, BTreeMap<Statement, BTreeSet<String>>>;

/// Found and expected counts for one statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementCoverage {
    /// Expected line items
    pub expected: usize,
    /// Expected line items that are present
    pub found: usize,
}

/// Coverage of one period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodCoverage {
    /// Counts per statement
    pub by_statement: BTreeMap<Statement, StatementCoverage>,
    /// Expected line items that are absent, per statement
    pub missing: BTreeMap<Statement, Vec<String>>,
    /// Sum of the expected counts
    pub total_expected: usize,
    /// Sum of the found counts
    pub total_found: usize,
}

/// Line items reported anywhere in raw facts, by period end and statement.
///
/// Facts that lost deduplication still count, so a period is only expected to
/// carry what its filings actually reported.
pub fn applicable_from_raw(raw: &[RawFact]) -> ApplicableItems {
    let mut applicable = ApplicableItems::new();
    for fact in raw {
        let Some(period_end) = fact.period_end else {
            continue;
        };
        if !schema::is_allowed(fact.statement, &fact.line_item) {
            continue;
        }
        applicable
            .entry(period_end)
            .or_default()
            .entry(fact.statement)
            .or_default()
            .insert(fact.line_item.clone());
    }
    applicable
}

/// Counts found against expected line items for every period of the series.
///
/// Without an applicable set for a period, the full canonical schema is
/// expected. Items carried by several statements count toward each of them.
pub fn compute_coverage(
    series: &MetricSeries,
    applicable: Option<&ApplicableItems>,
) -> BTreeMap<NaiveDate, PeriodCoverage> {
    series
        .chronological()
        .map(|(period_end, metrics)| {
            let scoped = applicable.and_then(|items| items.get(&period_end));
            let mut coverage = PeriodCoverage::default();
            for statement in Statement::ALL {
                let expected: Vec<&str> = match scoped {
                    Some(scoped) => scoped
                        .get(&statement)
                        .map(|items| items.iter().map(String::as_str).collect())
                        .unwrap_or_default(),
                    None => statement.line_items().to_vec(),
                };
                let (found, missing): (Vec<&str>, Vec<&str>) = expected
                    .iter()
                    .partition(|item| metrics.values.contains_key(**item));
                coverage.by_statement.insert(
                    statement,
                    StatementCoverage {
                        expected: expected.len(),
                        found: found.len(),
                    },
                );
                coverage
                    .missing
                    .insert(statement, missing.into_iter().map(str::to_string).collect());
                coverage.total_expected += expected.len();
                coverage.total_found += found.len();
            }
            (period_end, coverage)
        })
        .collect()
}
