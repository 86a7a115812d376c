//! Grouping and duplicate resolution.
//!
//! Raw facts are grouped on (ticker, cik, period end, period type, statement,
//! line item, unit), with the CIK zero-padded so both spellings of one filer
//! share a group. Within a group one fact wins:
//!
//! 1. the newer accession;
//! 2. for duration statements, the shorter reported period, so a quarterly
//!    figure beats the year-to-date figure tagged with the same concept;
//! 3. the smaller magnitude on the cash flow statement, the larger one
//!    elsewhere;
//! 4. the lower store id.

use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tally_data::{CanonicalFact, PeriodType, RawFact, Statement, normalize_cik, schema};

/// Grouping key of a canonical fact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    /// Upper-case ticker
    pub ticker: String,
    /// Ten-digit central index key
    pub cik: String,
    /// Period end, possibly defaulted
    pub period_end: NaiveDate,
    /// Period type normalized by statement
    pub period_type: PeriodType,
    /// Statement
    pub statement: Statement,
    /// Line item
    pub line_item: String,
    /// Upper-case unit
    pub unit: String,
}

impl GroupKey {
    /// Builds the key of a raw fact.
    ///
    /// Returns `None` for facts outside the canonical schema, non-finite
    /// values, or facts with neither a period end nor a default.
    pub fn of(fact: &RawFact, default_period_end: Option<NaiveDate>) -> Option<Self> {
        if !schema::is_allowed(fact.statement, &fact.line_item) || !fact.value.is_finite() {
            return None;
        }
        let period_end = fact.period_end.or(default_period_end)?;
        Some(Self {
            ticker: fact.ticker.trim().to_uppercase(),
            cik: normalize_cik(&fact.cik),
            period_end,
            period_type: fact.statement.expected_period_type(),
            statement: fact.statement,
            line_item: fact.line_item.clone(),
            unit: normalize_unit(&fact.unit),
        })
    }
}

/// Upper-cases a unit code, defaulting to `USD`.
pub fn normalize_unit(unit: &str) -> String {
    let unit = unit.trim();
    if unit.is_empty() {
        "USD".to_string()
    } else {
        unit.to_uppercase()
    }
}

/// Orders accession numbers by recency.
///
/// Accessions look like `0000320193-24-000081`; the middle segment is the
/// two-digit filing year. Accessions from the same year, and any that do not
/// follow the pattern, fall back to plain string order. A missing accession
/// is older than any present one.
pub fn compare_accession(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match (accession_year(a), accession_year(b)) {
            (Some(ya), Some(yb)) => ya.cmp(&yb).then_with(|| a.cmp(b)),
            _ => a.cmp(b),
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn accession_year(accession: &str) -> Option<u32> {
    let mut parts = accession.trim().split('-');
    let (Some(filer), Some(year), Some(sequence), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    if filer.len() != 10 || year.len() != 2 || sequence.len() != 6 {
        return None;
    }
    let year: u32 = year.parse().ok()?;
    Some(if year < 50 { 2000 + year } else { 1900 + year })
}

/// Orders two competing facts; `Greater` means `a` is preferred.
pub fn preference(a: &RawFact, b: &RawFact) -> Ordering {
    compare_accession(a.accession.as_deref(), b.accession.as_deref())
        .then_with(|| match a.statement {
            Statement::IncomeStatement | Statement::CashFlow => {
                // Shorter wins; unknown duration ranks last.
                match (a.duration_days(), b.duration_days()) {
                    (Some(da), Some(db)) => db.cmp(&da),
                    (Some(_), None) => Ordering::Greater,
                    (None, Some(_)) => Ordering::Less,
                    (None, None) => Ordering::Equal,
                }
            }
            Statement::BalanceSheet => Ordering::Equal,
        })
        .then_with(|| match a.statement {
            Statement::CashFlow => b.value.abs().total_cmp(&a.value.abs()),
            Statement::IncomeStatement | Statement::BalanceSheet => {
                a.value.abs().total_cmp(&b.value.abs())
            }
        })
        .then_with(|| b.id.unwrap_or(i64::MAX).cmp(&a.id.unwrap_or(i64::MAX)))
}

/// Picks the preferred fact among candidates.
pub fn select<'a, I>(candidates: I) -> Option<&'a RawFact>
where
    I: IntoIterator<Item = &'a RawFact>,
{
    candidates.into_iter().max_by(|a, b| preference(a, b))
}

/// Raw facts grouped by canonical key.
#[derive(Debug, Default)]
pub struct Groups<'a> {
    groups: BTreeMap<GroupKey, Vec<&'a RawFact>>,
}

impl<'a> Groups<'a> {
    /// Groups raw facts, assigning `default_period_end` to facts without one.
    pub fn build(raw: &'a [RawFact], default_period_end: Option<NaiveDate>) -> Self {
        let mut groups: BTreeMap<GroupKey, Vec<&'a RawFact>> = BTreeMap::new();
        for fact in raw {
            if let Some(key) = GroupKey::of(fact, default_period_end) {
                groups.entry(key).or_default().push(fact);
            }
        }
        Self { groups }
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true if no fact could be grouped.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Candidates competing for a key.
    pub fn candidates(&self, key: &GroupKey) -> &[&'a RawFact] {
        self.groups.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// One canonical fact per group, in key order.
    pub fn winners(&self) -> Vec<CanonicalFact> {
        self.groups
            .iter()
            .filter_map(|(key, candidates)| {
                select(candidates.iter().copied()).map(|winner| canonical_from(key, winner))
            })
            .collect()
    }
}

/// Canonical fact carrying the winner's value and provenance.
pub fn canonical_from(key: &GroupKey, winner: &RawFact) -> CanonicalFact {
    CanonicalFact {
        ticker: key.ticker.clone(),
        cik: key.cik.clone(),
        accession: winner.accession.clone(),
        period_start: match key.period_type {
            PeriodType::Instant => None,
            _ => winner.period_start,
        },
        period_end: key.period_end,
        period_type: key.period_type,
        statement: key.statement,
        line_item: key.line_item.clone(),
        value: winner.value,
        unit: key.unit.clone(),
        source_fact_id: winner.id,
        source_xbrl_tag: winner.source_xbrl_tag.clone(),
        source_context_ref: winner.source_context_ref.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{date, raw};
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Some("0000320193-24-000081"), Some("0000320193-23-000106"), Ordering::Greater)]
    #[case(Some("0000320193-99-000001"), Some("0000320193-01-000001"), Ordering::Less)]
    #[case(Some("0002"), Some("0001"), Ordering::Greater)]
    #[case(Some("0001"), None, Ordering::Greater)]
    #[case(None, None, Ordering::Equal)]
    fn test_compare_accession(
        #[case] a: Option<&str>,
        #[case] b: Option<&str>,
        #[case] expected: Ordering,
    ) {
        assert_eq!(compare_accession(a, b), expected);
    }

    #[test]
    fn test_newer_accession_wins() {
        let mut old = raw("revenue", Statement::IncomeStatement, 100.0);
        old.accession = Some("0001".into());
        old.id = Some(1);
        let mut new = raw("revenue", Statement::IncomeStatement, 120.0);
        new.accession = Some("0002".into());
        new.id = Some(2);

        let facts = [old, new];
        let winners = Groups::build(&facts, None).winners();
        assert_eq!(winners.len(), 1);
        assert_relative_eq!(winners[0].value, 120.0);
        assert_eq!(winners[0].source_fact_id, Some(2));
    }

    #[test]
    fn test_shorter_duration_wins() {
        let mut ytd = raw("revenue", Statement::IncomeStatement, 300.0);
        ytd.period_start = Some(date(2024, 1, 1));
        ytd.period_end = Some(date(2024, 6, 30));
        let mut quarter = raw("revenue", Statement::IncomeStatement, 120.0);
        quarter.period_start = Some(date(2024, 4, 1));
        quarter.period_end = Some(date(2024, 6, 30));

        let facts = [ytd, quarter];
        let winners = Groups::build(&facts, None).winners();
        assert_relative_eq!(winners[0].value, 120.0);
        assert_eq!(winners[0].period_start, Some(date(2024, 4, 1)));
    }

    #[rstest]
    #[case(Statement::CashFlow, "cfo", 10.0)]
    #[case(Statement::IncomeStatement, "revenue", -30.0)]
    #[case(Statement::BalanceSheet, "assets", -30.0)]
    fn test_magnitude_tie_break(
        #[case] statement: Statement,
        #[case] line_item: &str,
        #[case] expected: f64,
    ) {
        let facts = [raw(line_item, statement, 10.0), raw(line_item, statement, -30.0)];
        let winners = Groups::build(&facts, None).winners();
        assert_relative_eq!(winners[0].value, expected);
    }

    #[test]
    fn test_identical_values_keep_lowest_id() {
        let mut a = raw("assets", Statement::BalanceSheet, 50.0);
        a.id = Some(9);
        let mut b = raw("assets", Statement::BalanceSheet, 50.0);
        b.id = Some(4);
        let facts = [a, b];
        assert_eq!(Groups::build(&facts, None).winners()[0].source_fact_id, Some(4));
    }

    #[test]
    fn test_unit_and_period_type_normalization() {
        let mut lower = raw("assets", Statement::BalanceSheet, 50.0);
        lower.unit = "usd".into();
        lower.period_type = PeriodType::Unknown;
        let mut empty = raw("assets", Statement::BalanceSheet, 60.0);
        empty.unit = String::new();

        let facts = [lower, empty];
        let winners = Groups::build(&facts, None).winners();
        assert_eq!(winners.len(), 1);
        assert_eq!(winners[0].unit, "USD");
        assert_eq!(winners[0].period_type, PeriodType::Instant);
        assert_eq!(winners[0].period_start, None);
    }

    #[test]
    fn test_default_period_end_and_schema_filter() {
        let mut undated = raw("revenue", Statement::IncomeStatement, 5.0);
        undated.period_end = None;
        let outside = raw("revenue", Statement::BalanceSheet, 7.0);
        let facts = [undated, outside];

        assert!(Groups::build(&facts, None).is_empty());
        let groups = Groups::build(&facts, Some(date(2024, 5, 1)));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups.winners()[0].period_end, date(2024, 5, 1));
    }
}
