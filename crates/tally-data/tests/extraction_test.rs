//! Integration tests for inline XBRL extraction and fact persistence

use approx::assert_relative_eq;
use chrono::NaiveDate;
use rstest::rstest;
use tally_data::edgar::{ExtractorConfig, FilingMeta, TagMap, XbrlExtractor};
use tally_data::{FactStore, Filing, MemoryStore, PeriodType, SqliteStore, Statement};

const QUARTERLY_FILING: &str = r#"<html xmlns:ix="http://www.xbrl.org/2013/inlineXBRL">
<body>
<ix:header><ix:hidden>
  <ix:nonNumeric name="dei:DocumentType" contextRef="Q3">10-Q</ix:nonNumeric>
</ix:hidden><ix:resources>
  <xbrli:context id="Q3"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:startDate>2024-03-31</xbrli:startDate><xbrli:endDate>2024-06-29</xbrli:endDate></xbrli:period></xbrli:context>
  <xbrli:context id="YTD"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:startDate>2023-10-01</xbrli:startDate><xbrli:endDate>2024-06-29</xbrli:endDate></xbrli:period></xbrli:context>
  <xbrli:context id="END"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier></xbrli:entity>
    <xbrli:period><xbrli:instant>2024-06-29</xbrli:instant></xbrli:period></xbrli:context>
  <xbrli:context id="SEG"><xbrli:entity><xbrli:identifier scheme="http://www.sec.gov/CIK">0000320193</xbrli:identifier>
    <xbrli:segment><xbrldi:explicitMember dimension="srt:ProductOrServiceAxis">us-gaap:ProductMember</xbrldi:explicitMember></xbrli:segment></xbrli:entity>
    <xbrli:period><xbrli:startDate>2024-03-31</xbrli:startDate><xbrli:endDate>2024-06-29</xbrli:endDate></xbrli:period></xbrli:context>
</ix:resources></ix:header>
<table>
<tr><td><ix:nonFraction name="us-gaap:Revenues" contextRef="Q3" unitRef="usd" scale="6" decimals="-6">85,777</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:Revenues" contextRef="SEG" unitRef="usd" scale="6" decimals="-6">61,564</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:CostOfRevenue" contextRef="Q3" unitRef="usd" scale="6">46,099</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:NetIncomeLoss" contextRef="Q3" unitRef="usd" scale="6">21,448</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:NetCashProvidedByUsedInOperatingActivities" contextRef="YTD" unitRef="usd" scale="6">91,443</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:PaymentsToAcquirePropertyPlantAndEquipment" contextRef="YTD" unitRef="usd" scale="6" sign="-">6,539</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:Assets" contextRef="END" unitRef="usd" scale="6">331,612</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:StockholdersEquity" contextRef="END" unitRef="usd" scale="6">66,708</ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="us-gaap:Goodwill" contextRef="END" unitRef="usd" scale="6" xsi:nil="true"></ix:nonFraction></td></tr>
<tr><td><ix:nonFraction name="custom:SomethingElse" contextRef="END" unitRef="usd">5</ix:nonFraction></td></tr>
</table>
</body></html>"#;

fn meta() -> FilingMeta {
    FilingMeta::new("aapl", "0000320193", "0000320193-24-000081")
        .with_source_path("filings/0000320193-24-000081.htm")
}

fn extract() -> tally_data::edgar::Extraction {
    let tags = TagMap::standard();
    let config = ExtractorConfig::default();
    XbrlExtractor::new(&tags, &config).extract(QUARTERLY_FILING.as_bytes(), &meta())
}

#[test]
fn test_quarterly_filing_extraction() {
    let extraction = extract();
    assert_eq!(extraction.contexts, 4);
    assert_eq!(extraction.rejected_contexts, 1);
    assert_eq!(extraction.unmapped, 1);

    let revenue: Vec<_> = extraction
        .facts
        .iter()
        .filter(|f| f.line_item == "revenue")
        .collect();
    assert_eq!(revenue.len(), 1);
    assert_relative_eq!(revenue[0].value, 85_777_000_000.0);
    assert_eq!(revenue[0].ticker, "AAPL");
    assert_eq!(
        revenue[0].accession.as_deref(),
        Some("0000320193-24-000081")
    );
    assert_eq!(
        revenue[0].source_path.as_deref(),
        Some("filings/0000320193-24-000081.htm")
    );
    assert!(extraction.facts.iter().all(|f| f.line_item != "goodwill"));
}

#[test]
fn test_net_income_maps_to_two_statements() {
    let extraction = extract();
    let statements: Vec<Statement> = extraction
        .facts
        .iter()
        .filter(|f| f.line_item == "net_income")
        .map(|f| f.statement)
        .collect();
    assert!(statements.contains(&Statement::IncomeStatement));
    assert!(statements.contains(&Statement::CashFlow));
}

#[test]
fn test_sign_attribute_and_periods() {
    let extraction = extract();
    let capex = extraction
        .facts
        .iter()
        .find(|f| f.line_item == "capex")
        .expect("capex extracted");
    assert_relative_eq!(capex.value, -6_539_000_000.0);
    assert_eq!(capex.period_type, PeriodType::Duration);
    assert_eq!(capex.period_start, NaiveDate::from_ymd_opt(2023, 10, 1));
    assert_eq!(capex.duration_days(), Some(272));
}

#[rstest]
#[case::memory(Box::new(MemoryStore::new()) as Box<dyn FactStore>)]
#[case::sqlite(Box::new(SqliteStore::in_memory().unwrap()) as Box<dyn FactStore>)]
fn test_persist_extraction(#[case] store: Box<dyn FactStore>) {
    let extraction = extract();
    let outcome = store.persist_facts(&extraction.facts).unwrap();
    assert_eq!(outcome.inserted, extraction.facts.len());
    assert_eq!(outcome.dropped, 0);

    store
        .upsert_filing(&Filing {
            ticker: "AAPL".into(),
            cik: "0000320193".into(),
            accession: "0000320193-24-000081".into(),
            form: Some("10-Q".into()),
            filed_at: NaiveDate::from_ymd_opt(2024, 8, 2),
            path: Some("filings/0000320193-24-000081.htm".into()),
            submissions_path: None,
        })
        .unwrap();

    let stored = store.list_facts("aapl").unwrap();
    assert_eq!(stored.len(), extraction.facts.len());
    assert!(stored.iter().all(|f| f.id.is_some()));
    assert_eq!(
        store.infer_default_period_end("AAPL").unwrap(),
        NaiveDate::from_ymd_opt(2024, 8, 2)
    );
    assert_eq!(store.list_filings("AAPL").unwrap().len(), 1);
}
