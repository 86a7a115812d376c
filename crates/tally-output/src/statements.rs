//! Statement view of canonical facts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tally_data::{CanonicalFact, Filing, Statement, schema};

/// Periods shown when no limit is given.
pub const DEFAULT_STATEMENT_PERIODS: usize = 8;

/// One line of a statement with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementLine {
    /// Canonical line item
    pub line_item: String,
    /// Value
    pub value: f64,
    /// Unit code
    pub unit: String,
    /// Accession the value came from
    pub source_accession: Option<String>,
    /// Local path of the filing document
    pub source_path: Option<String>,
    /// XBRL concept
    pub source_xbrl_tag: Option<String>,
    /// XBRL context
    pub source_context_ref: Option<String>,
    /// Form type of the filing
    pub source_form: Option<String>,
    /// Filing date
    pub source_filed_at: Option<NaiveDate>,
}

/// Statements of one period end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementPeriod {
    /// Period end
    pub period_end: NaiveDate,
    /// Most frequent period start across all lines
    pub period_start: Option<NaiveDate>,
    /// Most frequent period start per statement
    pub statement_starts: BTreeMap<Statement, NaiveDate>,
    /// Lines per statement in display order
    pub lines: BTreeMap<Statement, Vec<StatementLine>>,
}

/// Statement periods of one ticker, newest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementsView {
    /// Ticker symbol
    pub ticker: String,
    /// Periods, newest first
    pub periods: Vec<StatementPeriod>,
}

/// Most frequent start, ties going to the earliest date.
fn select_period_start(starts: &[NaiveDate]) -> Option<NaiveDate> {
    let mut counts: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for start in starts {
        *counts.entry(*start).or_default() += 1;
    }
    let max = counts.values().copied().max()?;
    counts
        .into_iter()
        .find(|(_, count)| *count == max)
        .map(|(start, _)| start)
}

/// Groups canonical facts into statement periods.
///
/// Provenance is enriched from `filings` when the accession is registered.
pub fn build_statements(
    ticker: &str,
    facts: &[CanonicalFact],
    filings: &[Filing],
    limit: usize,
) -> StatementsView {
    let filings: HashMap<&str, &Filing> = filings
        .iter()
        .map(|filing| (filing.accession.as_str(), filing))
        .collect();

    let mut by_period: BTreeMap<NaiveDate, Vec<&CanonicalFact>> = BTreeMap::new();
    for fact in facts {
        by_period.entry(fact.period_end).or_default().push(fact);
    }

    let periods = by_period
        .into_iter()
        .rev()
        .take(limit)
        .map(|(period_end, facts)| {
            let mut lines: BTreeMap<Statement, Vec<StatementLine>> =
                Statement::ALL.into_iter().map(|s| (s, Vec::new())).collect();
            let mut starts: BTreeMap<Statement, Vec<NaiveDate>> = BTreeMap::new();
            for fact in facts {
                if let Some(start) = fact.period_start {
                    starts.entry(fact.statement).or_default().push(start);
                }
                let filing = fact
                    .accession
                    .as_deref()
                    .and_then(|accession| filings.get(accession));
                lines.entry(fact.statement).or_default().push(StatementLine {
                    line_item: fact.line_item.clone(),
                    value: fact.value,
                    unit: fact.unit.clone(),
                    source_accession: fact.accession.clone(),
                    source_path: filing.and_then(|f| f.path.clone()),
                    source_xbrl_tag: fact.source_xbrl_tag.clone(),
                    source_context_ref: fact.source_context_ref.clone(),
                    source_form: filing.and_then(|f| f.form.clone()),
                    source_filed_at: filing.and_then(|f| f.filed_at),
                });
            }
            for (statement, items) in &mut lines {
                items.sort_by(|a, b| {
                    schema::display_rank(*statement, &a.line_item)
                        .cmp(&schema::display_rank(*statement, &b.line_item))
                        .then_with(|| a.line_item.cmp(&b.line_item))
                });
            }
            let all_starts: Vec<NaiveDate> = starts.values().flatten().copied().collect();
            StatementPeriod {
                period_end,
                period_start: select_period_start(&all_starts),
                statement_starts: starts
                    .iter()
                    .filter_map(|(statement, dates)| {
                        select_period_start(dates).map(|start| (*statement, start))
                    })
                    .collect(),
                lines,
            }
        })
        .collect();

    StatementsView {
        ticker: ticker.to_ascii_uppercase(),
        periods,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_data::PeriodType;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn fact(
        end: NaiveDate,
        start: Option<NaiveDate>,
        statement: Statement,
        line_item: &str,
    ) -> CanonicalFact {
        CanonicalFact {
            ticker: "ACME".into(),
            cik: "1".into(),
            accession: Some("0001".into()),
            period_start: start,
            period_end: end,
            period_type: if start.is_some() {
                PeriodType::Duration
            } else {
                PeriodType::Instant
            },
            statement,
            line_item: line_item.into(),
            value: 1.0,
            unit: "USD".into(),
            source_fact_id: Some(1),
            source_xbrl_tag: None,
            source_context_ref: None,
        }
    }

    #[test]
    fn test_period_start_ties_take_earliest() {
        let a = date(2024, 1, 1);
        let b = date(2024, 4, 1);
        assert_eq!(select_period_start(&[b, a, b, a]), Some(a));
        assert_eq!(select_period_start(&[b, a, b]), Some(b));
        assert_eq!(select_period_start(&[]), None);
    }

    #[test]
    fn test_order_limit_and_provenance() {
        let q1 = date(2024, 3, 31);
        let q2 = date(2024, 6, 30);
        let q2_start = Some(date(2024, 4, 1));
        let facts = vec![
            fact(q1, None, Statement::BalanceSheet, "cash"),
            fact(q2, q2_start, Statement::IncomeStatement, "net_income"),
            fact(q2, q2_start, Statement::IncomeStatement, "revenue"),
            fact(q2, q2_start, Statement::IncomeStatement, "gross_profit"),
            fact(q2, None, Statement::BalanceSheet, "assets"),
        ];
        let filing = Filing {
            ticker: "ACME".into(),
            cik: "1".into(),
            accession: "0001".into(),
            form: Some("10-Q".into()),
            filed_at: Some(date(2024, 8, 1)),
            path: Some("/tmp/0001.htm".into()),
            submissions_path: None,
        };
        let view = build_statements("acme", &facts, &[filing], 1);
        assert_eq!(view.ticker, "ACME");
        assert_eq!(view.periods.len(), 1);

        let period = &view.periods[0];
        assert_eq!(period.period_end, q2);
        assert_eq!(period.period_start, q2_start);
        assert_eq!(period.statement_starts.get(&Statement::BalanceSheet), None);
        let income: Vec<&str> = period.lines[&Statement::IncomeStatement]
            .iter()
            .map(|line| line.line_item.as_str())
            .collect();
        assert_eq!(income, vec!["revenue", "gross_profit", "net_income"]);
        assert!(period.lines[&Statement::CashFlow].is_empty());
        let revenue = &period.lines[&Statement::IncomeStatement][0];
        assert_eq!(revenue.source_form.as_deref(), Some("10-Q"));
        assert_eq!(revenue.source_path.as_deref(), Some("/tmp/0001.htm"));
    }
}
