//! Views built from a materialized store agree with each other

use chrono::NaiveDate;
use tally_canonical::{AggregatorConfig, TiePolicy, materialize_canonical_for_ticker};
use tally_data::{FactStore, MemoryStore, PeriodType, RawFact, Statement};
use tally_forecast::MetricSeries;
use tally_output::{
    ExportFormat, Exporter, applicable_from_raw, build_statements, compute_coverage,
    coverage_mismatches,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn fact(statement: Statement, line_item: &str, value: f64, end: NaiveDate) -> RawFact {
    let instant = statement == Statement::BalanceSheet;
    RawFact {
        id: None,
        ticker: "ACME".into(),
        cik: "0000000042".into(),
        accession: Some("0000000042-24-000010".into()),
        line_item: line_item.into(),
        statement,
        value,
        unit: "USD".into(),
        period_start: (!instant).then(|| end - chrono::Duration::days(90)),
        period_end: Some(end),
        period_type: if instant {
            PeriodType::Instant
        } else {
            PeriodType::Duration
        },
        source_xbrl_tag: Some(format!("us-gaap:{line_item}")),
        source_context_ref: Some("ctx".into()),
        source_path: None,
    }
}

#[test]
fn test_statements_match_coverage() {
    let store = MemoryStore::new();
    let mut raw = Vec::new();
    for (end, revenue) in [(date(2024, 3, 31), 100.0), (date(2024, 6, 30), 110.0)] {
        raw.push(fact(Statement::IncomeStatement, "revenue", revenue, end));
        raw.push(fact(Statement::IncomeStatement, "net_income", 10.0, end));
        raw.push(fact(Statement::CashFlow, "net_income", 10.0, end));
        raw.push(fact(Statement::BalanceSheet, "cash", 50.0, end));
    }
    store.persist_facts(&raw).unwrap();
    materialize_canonical_for_ticker(
        &store,
        "ACME",
        &AggregatorConfig::default(),
        TiePolicy::Advisory,
    )
    .unwrap();

    let canonical = store.list_canonical("ACME").unwrap();
    let series = MetricSeries::from_canonical(&canonical);
    let applicable = applicable_from_raw(&store.list_facts("ACME").unwrap());
    let coverage = compute_coverage(&series, Some(&applicable));
    let view = build_statements("ACME", &canonical, &store.list_filings("ACME").unwrap(), 8);

    assert_eq!(view.periods.len(), 2);
    for period in &view.periods {
        let mismatches = coverage_mismatches(
            Some(period.period_end),
            coverage.get(&period.period_end),
            Some(period),
        );
        assert!(mismatches.is_empty(), "{mismatches:?}");
    }
    assert_eq!(coverage[&date(2024, 6, 30)].total_found, 4);

    let csv = canonical.export_to_string(ExportFormat::Csv).unwrap();
    assert_eq!(csv.lines().count(), canonical.len() + 1);
}
