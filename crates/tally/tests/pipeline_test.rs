//! End-to-end tests: inline XBRL documents through extraction, materialization
//! and the read views

use approx::assert_relative_eq;
use chrono::NaiveDate;
use tally::canonical::{TiePolicy, TieStatus};
use tally::data::edgar::{CikLookup, TagMap};
use tally::data::{FactStore, Filing, MemoryStore, SqliteStore, Statement};
use tally::forecast::{DriverKind, Scenario};
use tally::{Pipeline, TallyConfig, TallyError};

const CONTEXT: &str = r#"<xbrli:context id="{id}"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000000042</xbrli:identifier></xbrli:entity>
    <xbrli:period>{period}</xbrli:period></xbrli:context>"#;

fn context(id: &str, period: &str) -> String {
    CONTEXT.replace("{id}", id).replace("{period}", period)
}

fn duration(start: &str, end: &str) -> String {
    format!("<xbrli:startDate>{start}</xbrli:startDate><xbrli:endDate>{end}</xbrli:endDate>")
}

fn instant(date: &str) -> String {
    format!("<xbrli:instant>{date}</xbrli:instant>")
}

fn fact(tag: &str, context: &str, value: &str) -> String {
    format!(
        r#"<tr><td><ix:nonFraction name="us-gaap:{tag}" contextRef="{context}" unitRef="usd">{value}</ix:nonFraction></td></tr>"#
    )
}

fn document(contexts: &[String], facts: &[String]) -> String {
    format!(
        r#"<html xmlns:ix="http://www.xbrl.org/2013/inlineXBRL"><body>
<ix:header><ix:resources>
{}
</ix:resources></ix:header>
<table>
{}
</table>
</body></html>"#,
        contexts.join("\n"),
        facts.join("\n")
    )
}

/// First quarter 10-Q.
fn first_quarter() -> String {
    document(
        &[
            context("Q1", &duration("2024-01-01", "2024-03-31")),
            context("I1", &instant("2024-03-31")),
        ],
        &[
            fact("Revenues", "Q1", "100"),
            fact("CostOfRevenue", "Q1", "60"),
            fact("NetIncomeLoss", "Q1", "10"),
            fact("Assets", "I1", "500"),
            fact("Liabilities", "I1", "300"),
            fact("StockholdersEquity", "I1", "200"),
            fact("CashAndCashEquivalentsAtCarryingValue", "I1", "50"),
        ],
    )
}

/// Second quarter 10-Q with a year-to-date figure and a restated comparative.
fn second_quarter() -> String {
    document(
        &[
            context("Q2", &duration("2024-04-01", "2024-06-30")),
            context("H1", &duration("2024-01-01", "2024-06-30")),
            context("Q1", &duration("2024-01-01", "2024-03-31")),
            context("I2", &instant("2024-06-30")),
        ],
        &[
            fact("Revenues", "Q2", "120"),
            fact("Revenues", "H1", "225"),
            fact("Revenues", "Q1", "105"),
            fact("CostOfRevenue", "Q2", "70"),
            fact("NetIncomeLoss", "Q2", "12"),
            fact("Assets", "I2", "540"),
            fact("Liabilities", "I2", "320"),
            fact("StockholdersEquity", "I2", "220"),
            fact("CashAndCashEquivalentsAtCarryingValue", "I2", "70"),
        ],
    )
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn pipeline<S: FactStore>(store: S) -> Pipeline<S> {
    Pipeline::with_lookup(
        store,
        TagMap::standard(),
        CikLookup::from_entries([("ACME", "0000000042")]),
        TallyConfig::default(),
    )
}

fn filing<S: FactStore>(
    pipeline: &Pipeline<S>,
    accession: &str,
    filed_at: NaiveDate,
) -> Filing {
    Filing {
        form: Some("10-Q".into()),
        filed_at: Some(filed_at),
        ..pipeline.filing("acme", accession).unwrap()
    }
}

fn ingested<S: FactStore>(store: S) -> Pipeline<S> {
    let pipeline = pipeline(store);
    let q1 = filing(&pipeline, "0000000042-24-000010", date(2024, 5, 1));
    let q2 = filing(&pipeline, "0000000042-24-000020", date(2024, 8, 1));

    let outcome = pipeline.ingest_filing(&q1, first_quarter().as_bytes()).unwrap();
    // net income lands on both the income and cash flow statements
    assert_eq!(outcome.extracted, 8);
    assert_eq!(outcome.inserted, 8);
    assert_eq!(outcome.dropped, 0);
    let outcome = pipeline.ingest_filing(&q2, second_quarter().as_bytes()).unwrap();
    assert_eq!(outcome.extracted, 10);

    pipeline.materialize("ACME", TiePolicy::Enforcing).unwrap();
    pipeline
}

fn canonical_value<S: FactStore>(
    pipeline: &Pipeline<S>,
    end: NaiveDate,
    statement: Statement,
    line_item: &str,
) -> Option<f64> {
    pipeline
        .canonical("ACME")
        .unwrap()
        .iter()
        .find(|f| f.period_end == end && f.statement == statement && f.line_item == line_item)
        .map(|f| f.value)
}

fn assert_round_trip<S: FactStore>(store: S) {
    let pipeline = ingested(store);
    let q1 = date(2024, 3, 31);
    let q2 = date(2024, 6, 30);

    let value = |end, statement, line_item| canonical_value(&pipeline, end, statement, line_item);
    // restated comparative from the newer filing
    assert_eq!(value(q1, Statement::IncomeStatement, "revenue"), Some(105.0));
    // quarterly figure beats year-to-date
    assert_eq!(value(q2, Statement::IncomeStatement, "revenue"), Some(120.0));
    assert_eq!(value(q1, Statement::IncomeStatement, "gross_profit"), Some(45.0));
    assert_eq!(value(q2, Statement::IncomeStatement, "gross_profit"), Some(50.0));
    assert_eq!(value(q2, Statement::CashFlow, "net_income"), Some(12.0));
    assert_eq!(value(q2, Statement::BalanceSheet, "cash"), Some(70.0));

    let revenue = pipeline
        .canonical("ACME")
        .unwrap()
        .into_iter()
        .find(|f| f.period_end == q2 && f.line_item == "revenue")
        .unwrap();
    assert_eq!(revenue.period_start, Some(date(2024, 4, 1)));
    assert_eq!(revenue.accession.as_deref(), Some("0000000042-24-000020"));
}

#[test]
fn test_round_trip_memory() {
    assert_round_trip(MemoryStore::new());
}

#[test]
fn test_round_trip_sqlite() {
    assert_round_trip(SqliteStore::in_memory().unwrap());
}

#[test]
fn test_materialization_is_idempotent() {
    let pipeline = ingested(MemoryStore::new());
    let before = pipeline.canonical("ACME").unwrap();
    pipeline.materialize("ACME", TiePolicy::Advisory).unwrap();
    assert_eq!(pipeline.canonical("ACME").unwrap(), before);
}

#[test]
fn test_summary_contract() {
    let pipeline = ingested(MemoryStore::new());
    let summary = pipeline.summary("acme").unwrap();

    assert_eq!(summary.ticker, "ACME");
    assert!(summary.resolvable);
    assert!(summary.covered);
    assert_eq!(summary.cik.as_deref(), Some("0000000042"));
    assert_eq!(summary.dropped_facts, 0);

    assert_eq!(summary.periods.len(), 2);
    assert_eq!(summary.periods[0].period_end, date(2024, 6, 30));
    assert_relative_eq!(summary.periods[0].values["revenue"].value, 120.0);
    assert_eq!(summary.filings[0].accession, "0000000042-24-000020");

    assert_relative_eq!(
        summary.drivers.value(DriverKind::RevenueGrowth).unwrap(),
        120.0 / 105.0 - 1.0,
        epsilon = 1e-12
    );
    assert_eq!(summary.forecast.len(), 12);
    for period in &summary.forecast {
        for kind in period.assumptions.keys() {
            assert!(summary.drivers.get(*kind).is_some(), "{kind} missing");
        }
    }
    let first = |scenario: Scenario| {
        summary
            .forecast
            .iter()
            .find(|p| p.scenario == scenario && p.period_index == 1)
            .and_then(|p| p.value("revenue"))
            .unwrap()
    };
    assert!(first(Scenario::Bull) > first(Scenario::Base));
    assert!(first(Scenario::Base) > first(Scenario::Bear));
    assert_eq!(summary.forecast_summary.len(), 4);

    assert_eq!(summary.coverage.len(), 2);
    assert_eq!(summary.ties[&date(2024, 6, 30)].status, TieStatus::Ok);

    // one step, forecast from the fallback growth
    let backtest = summary.backtest.unwrap();
    assert_eq!(backtest.samples, 1);
    assert_relative_eq!(backtest.mae.unwrap(), 120.0 - 105.0 * 1.02, epsilon = 1e-9);
    assert_eq!(summary.backtest_time_travel.unwrap().samples, 1);
}

#[test]
fn test_unknown_ticker() {
    let pipeline = pipeline(MemoryStore::new());
    assert!(matches!(
        pipeline.filing("nope", "0001"),
        Err(TallyError::CikNotFound(ticker)) if ticker == "NOPE"
    ));

    let summary = pipeline.summary("nope").unwrap();
    assert!(!summary.resolvable);
    assert!(summary.cik.is_none());
    assert!(summary.periods.is_empty());
    assert!(summary.backtest.is_none());
}

#[test]
fn test_views_and_backtest_as_of() {
    let pipeline = ingested(MemoryStore::new());

    let statements = pipeline.statements("ACME", 1).unwrap();
    assert_eq!(statements.periods.len(), 1);
    let income = &statements.periods[0].lines[&Statement::IncomeStatement];
    assert_eq!(income[0].line_item, "revenue");
    assert_eq!(income[0].source_form.as_deref(), Some("10-Q"));
    assert_eq!(income[0].source_filed_at, Some(date(2024, 8, 1)));

    let model = pipeline.model("ACME", 4).unwrap();
    assert_eq!(model.as_of, Some(date(2024, 6, 30)));
    assert_eq!(model.statements[&Statement::IncomeStatement].actuals.len(), 2);

    let early = pipeline.backtest_as_of("ACME", date(2024, 3, 31)).unwrap();
    assert!(early.backtest.is_none());
    let late = pipeline.backtest_as_of("ACME", date(2024, 6, 30)).unwrap();
    assert_eq!(late.backtest.unwrap().samples, 1);
}

#[test]
fn test_ingest_path_records_location() {
    let pipeline = pipeline(MemoryStore::new());
    let path = std::env::temp_dir().join(format!("tally-{}-q1.htm", std::process::id()));
    std::fs::write(&path, first_quarter()).unwrap();

    let filing = pipeline.filing("ACME", "0000000042-24-000010").unwrap();
    let outcome = pipeline.ingest_path(&filing, &path).unwrap();
    assert_eq!(outcome.inserted, 8);

    let stored = pipeline.store().list_facts("ACME").unwrap();
    let recorded = path.display().to_string();
    assert!(stored.iter().all(|f| f.source_path.as_deref() == Some(recorded.as_str())));
    let registered = pipeline.store().get_filing("0000000042-24-000010").unwrap().unwrap();
    assert_eq!(registered.path.as_deref(), Some(recorded.as_str()));
    std::fs::remove_file(path).ok();
}
