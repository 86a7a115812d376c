//! Quality diagnostics over metric series and statement views.
//!
//! Tie checks here run on reported periods, where cash flow values are often
//! year-to-date cumulatives. Flows are quarterized against the previous period
//! before the identity is evaluated.

use crate::coverage::PeriodCoverage;
use crate::statements::StatementPeriod;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tally_canonical::derive::CASH_FLOW_ADDENDS;
use tally_canonical::ties::{balance_sheet_delta, cash_flow_sum};
use tally_canonical::{AggregatorConfig, TieCheck};
use tally_data::Statement;
use tally_forecast::{MetricSeries, PeriodMetrics};

/// Value for the period alone: a cumulative sharing its start with the prior
/// period has the prior value removed.
fn quarterized(
    current: &PeriodMetrics,
    prior: Option<&PeriodMetrics>,
    line_item: &str,
) -> Option<f64> {
    let value = current.value(line_item)?;
    let cumulative_prior = prior.and_then(|prior| {
        let start = current.start(line_item)?;
        (prior.start(line_item) == Some(start))
            .then(|| prior.value(line_item))
            .flatten()
    });
    Some(value - cumulative_prior.unwrap_or(0.0))
}

/// Tie checks for every period of the series.
///
/// `cash_delta` is the quarterized `change_in_cash`, or the change in `cash`
/// from the previous period when it is not reported. Periods where neither
/// identity can be evaluated are left out.
pub fn compute_tie_checks(
    series: &MetricSeries,
    config: &AggregatorConfig,
) -> BTreeMap<NaiveDate, TieCheck> {
    let mut checks = BTreeMap::new();
    let mut prior: Option<&PeriodMetrics> = None;
    for (period_end, current) in series.chronological() {
        let balance: BTreeMap<&str, f64> = current
            .values
            .iter()
            .map(|(item, value)| (item.as_str(), value.value))
            .collect();
        let flows: BTreeMap<&str, f64> = CASH_FLOW_ADDENDS
            .iter()
            .filter_map(|item| quarterized(current, prior, item).map(|v| (*item, v)))
            .collect();
        let cash_delta = quarterized(current, prior, "change_in_cash").or_else(|| {
            let before = prior?.value("cash")?;
            Some(current.value("cash")? - before)
        });
        let cf = cash_flow_sum(&flows).zip(cash_delta);
        if let Some(check) = TieCheck::new(period_end, balance_sheet_delta(&balance), cf, config) {
            checks.insert(period_end, check);
        }
        prior = Some(current);
    }
    checks
}

/// Line counts per statement and in total.
pub fn statement_counts(period: &StatementPeriod) -> (BTreeMap<Statement, usize>, usize) {
    let counts: BTreeMap<Statement, usize> = period
        .lines
        .iter()
        .map(|(statement, lines)| (*statement, lines.len()))
        .collect();
    let total = counts.values().sum();
    (counts, total)
}

/// Differences between summary coverage and the statements view of a period.
///
/// An empty result means both agree.
pub fn coverage_mismatches(
    summary_period_end: Option<NaiveDate>,
    coverage: Option<&PeriodCoverage>,
    statement_period: Option<&StatementPeriod>,
) -> Vec<String> {
    let (Some(summary_end), Some(coverage), Some(statement_period)) =
        (summary_period_end, coverage, statement_period)
    else {
        return vec!["missing periods".to_string()];
    };
    if summary_end != statement_period.period_end {
        return vec![format!(
            "period mismatch summary={summary_end} statements={}",
            statement_period.period_end
        )];
    }

    let (counts, total) = statement_counts(statement_period);
    let mut mismatches = Vec::new();
    if total != coverage.total_found {
        mismatches.push(format!(
            "total mismatch summary={} statements={total}",
            coverage.total_found
        ));
    }
    for (statement, stats) in &coverage.by_statement {
        let lines = counts.get(statement).copied().unwrap_or(0);
        if lines != stats.found {
            mismatches.push(format!(
                "{statement} mismatch summary={} statements={lines}",
                stats.found
            ));
        }
    }
    mismatches
}

/// Whether the given line items share one period start.
///
/// Returns the starts found alongside the verdict. Items without a start do
/// not count against consistency.
pub fn period_start_consistent(
    period: &PeriodMetrics,
    line_items: &[&str],
) -> (bool, BTreeMap<String, Option<NaiveDate>>) {
    let starts: BTreeMap<String, Option<NaiveDate>> = line_items
        .iter()
        .map(|item| (item.to_string(), period.start(item)))
        .collect();
    let mut distinct: Vec<NaiveDate> = starts.values().flatten().copied().collect();
    distinct.sort();
    distinct.dedup();
    (distinct.len() <= 1, starts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::StatementCoverage;
    use crate::statements::StatementLine;
    use approx::assert_relative_eq;
    use tally_canonical::TieStatus;
    use tally_forecast::MetricValue;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flow(value: f64, start: NaiveDate) -> MetricValue {
        MetricValue {
            value,
            unit: "USD".into(),
            start: Some(start),
        }
    }

    fn ytd_series(with_change: bool) -> MetricSeries {
        let start = date(2024, 1, 29);
        let q1 = date(2024, 4, 27);
        let q2 = date(2024, 7, 27);
        let mut series = MetricSeries::new()
            .with(q1, "cash", 100.0)
            .with(q2, "cash", 140.0);
        for (end, cfo, cfi, cff) in [(q1, 60.0, -20.0, -5.0), (q2, 100.0, -30.0, -10.0)] {
            series.insert(end, "cfo", flow(cfo, start));
            series.insert(end, "cfi", flow(cfi, start));
            series.insert(end, "cff", flow(cff, start));
        }
        if with_change {
            series = series.with(q1, "change_in_cash", 10.0).with(q2, "change_in_cash", 25.0);
        }
        series
    }

    #[test]
    fn test_ytd_flows_are_quarterized() {
        let checks = compute_tie_checks(&ytd_series(true), &AggregatorConfig::default());
        let latest = &checks[&date(2024, 7, 27)];
        assert_relative_eq!(latest.cf_sum.unwrap(), 25.0);
        assert_relative_eq!(latest.cash_delta.unwrap(), 25.0);
        assert_relative_eq!(latest.cf_tie.unwrap(), 0.0);
        assert_eq!(latest.status, TieStatus::Ok);
    }

    #[test]
    fn test_cash_delta_falls_back_to_cash_change() {
        let checks = compute_tie_checks(&ytd_series(false), &AggregatorConfig::default());
        let latest = &checks[&date(2024, 7, 27)];
        assert_relative_eq!(latest.cash_delta.unwrap(), 40.0);
        assert_relative_eq!(latest.cf_tie.unwrap(), -15.0);
        assert!(!checks.contains_key(&date(2024, 4, 27)));
    }

    fn statement_period(end: NaiveDate, income_lines: usize) -> StatementPeriod {
        let line = StatementLine {
            line_item: "revenue".into(),
            value: 1.0,
            unit: "USD".into(),
            source_accession: None,
            source_path: None,
            source_xbrl_tag: None,
            source_context_ref: None,
            source_form: None,
            source_filed_at: None,
        };
        StatementPeriod {
            period_end: end,
            period_start: None,
            statement_starts: BTreeMap::new(),
            lines: BTreeMap::from([
                (Statement::IncomeStatement, vec![line; income_lines]),
                (Statement::BalanceSheet, Vec::new()),
            ]),
        }
    }

    fn coverage(found: usize) -> PeriodCoverage {
        PeriodCoverage {
            by_statement: BTreeMap::from([(
                Statement::IncomeStatement,
                StatementCoverage { expected: 3, found },
            )]),
            missing: BTreeMap::new(),
            total_expected: 3,
            total_found: found,
        }
    }

    #[test]
    fn test_coverage_parity() {
        let end = date(2024, 12, 31);
        let period = statement_period(end, 2);
        assert_eq!(statement_counts(&period).1, 2);
        assert!(coverage_mismatches(Some(end), Some(&coverage(2)), Some(&period)).is_empty());

        let mismatches = coverage_mismatches(Some(end), Some(&coverage(3)), Some(&period));
        assert_eq!(mismatches.len(), 2);
        assert!(mismatches[1].starts_with("income_statement mismatch"));

        let other = coverage_mismatches(Some(date(2024, 9, 30)), Some(&coverage(2)), Some(&period));
        assert!(other[0].starts_with("period mismatch"));
        assert_eq!(coverage_mismatches(None, None, Some(&period)), vec!["missing periods"]);
    }

    #[test]
    fn test_period_start_consistency() {
        let series = ytd_series(false);
        let (_, period) = series.latest().unwrap();
        let (consistent, starts) = period_start_consistent(period, &["cfo", "cfi", "cash"]);
        assert!(consistent);
        assert_eq!(starts["cash"], None);

        let mut mixed = period.clone();
        mixed.values.insert("cff".into(), flow(1.0, date(2024, 4, 28)));
        assert!(!period_start_consistent(&mixed, &["cfo", "cff"]).0);
    }
}
