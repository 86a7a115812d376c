//! Fact records shared by every stage of the pipeline.
//!
//! A [`RawFact`] is what the extractor pulls out of one filing. A
//! [`CanonicalFact`] is the single reconciled value the aggregator keeps for a
//! (period, statement, line item, unit) key.

use crate::error::UnknownVariant;
use crate::schema;
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Normalizes a central index key to the ten-digit zero-padded form EDGAR
/// uses in document paths.
///
/// Keys that are not purely numeric are only trimmed.
pub fn normalize_cik(cik: &str) -> String {
    let cik = cik.trim();
    if !cik.is_empty() && cik.len() <= 10 && cik.bytes().all(|b| b.is_ascii_digit()) {
        format!("{cik:0>10}")
    } else {
        cik.to_string()
    }
}

/// Financial statement a line item is reported on.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    /// Income statement (duration facts)
    #[display("income_statement")]
    IncomeStatement,
    /// Balance sheet (instant facts)
    #[display("balance_sheet")]
    BalanceSheet,
    /// Cash flow statement (duration facts)
    #[display("cash_flow")]
    CashFlow,
}

impl Statement {
    /// All statements in presentation order.
    pub const ALL: [Self; 3] = [Self::IncomeStatement, Self::BalanceSheet, Self::CashFlow];

    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IncomeStatement => "income_statement",
            Self::BalanceSheet => "balance_sheet",
            Self::CashFlow => "cash_flow",
        }
    }

    /// Period type every fact on this statement is normalized to.
    pub const fn expected_period_type(&self) -> PeriodType {
        match self {
            Self::BalanceSheet => PeriodType::Instant,
            Self::IncomeStatement | Self::CashFlow => PeriodType::Duration,
        }
    }

    /// Allowed line items in display order.
    pub const fn line_items(&self) -> &'static [&'static str] {
        match self {
            Self::IncomeStatement => schema::INCOME_STATEMENT_ITEMS,
            Self::BalanceSheet => schema::BALANCE_SHEET_ITEMS,
            Self::CashFlow => schema::CASH_FLOW_ITEMS,
        }
    }

    /// Line items whose contexts define the primary reporting periods.
    pub const fn anchor_items(&self) -> &'static [&'static str] {
        match self {
            Self::IncomeStatement => &["revenue", "net_income", "gross_profit", "operating_income"],
            Self::BalanceSheet => &["assets", "equity", "liabilities_equity", "cash"],
            Self::CashFlow => &["cfo", "cfi", "cff", "net_income"],
        }
    }
}

impl FromStr for Statement {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income_statement" => Ok(Self::IncomeStatement),
            "balance_sheet" => Ok(Self::BalanceSheet),
            "cash_flow" => Ok(Self::CashFlow),
            _ => Err(UnknownVariant::new("statement", s)),
        }
    }
}

/// Whether a fact describes a point in time or a span.
#[derive(
    Debug,
    Display,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    /// Point in time (balance sheet)
    #[display("instant")]
    Instant,
    /// Span between a start and an end date
    #[display("duration")]
    Duration,
    /// Context missing or carrying a `forever` period
    #[default]
    #[display("unknown")]
    Unknown,
}

impl PeriodType {
    /// Storage representation.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Instant => "instant",
            Self::Duration => "duration",
            Self::Unknown => "unknown",
        }
    }
}

impl FromStr for PeriodType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "instant" => Ok(Self::Instant),
            "duration" => Ok(Self::Duration),
            "unknown" | "" => Ok(Self::Unknown),
            _ => Err(UnknownVariant::new("period type", s)),
        }
    }
}

/// A fact as extracted from one filing.
///
/// Raw facts are append-only. A newer accession supersedes an older one during
/// aggregation; the older row stays in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFact {
    /// Store identifier, `None` until persisted
    pub id: Option<i64>,
    /// Ticker symbol, upper case
    pub ticker: String,
    /// SEC central index key
    pub cik: String,
    /// Filing accession number
    pub accession: Option<String>,
    /// Canonical line item (e.g. `revenue`)
    pub line_item: String,
    /// Statement the line item belongs to
    pub statement: Statement,
    /// Scaled, signed value
    pub value: f64,
    /// Normalized unit code (`USD`, `SHARES`, `USDPERSHARE`, ...)
    pub unit: String,
    /// Start of the period, `None` for instants
    pub period_start: Option<NaiveDate>,
    /// End of the period (or the instant)
    pub period_end: Option<NaiveDate>,
    /// Instant, duration or unknown
    pub period_type: PeriodType,
    /// XBRL concept that produced the fact
    pub source_xbrl_tag: Option<String>,
    /// XBRL context id that scoped the fact
    pub source_context_ref: Option<String>,
    /// Path of the filing document on disk
    pub source_path: Option<String>,
}

impl RawFact {
    /// Length of the reported period in days.
    pub fn duration_days(&self) -> Option<i64> {
        duration_between(self.period_start, self.period_end)
    }
}

/// The reconciled value for one (period, statement, line item, unit) key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFact {
    /// Ticker symbol, upper case
    pub ticker: String,
    /// SEC central index key
    pub cik: String,
    /// Accession of the winning raw fact (or of the inputs for derived facts)
    pub accession: Option<String>,
    /// Start of the period, `None` for instants
    pub period_start: Option<NaiveDate>,
    /// End of the period
    pub period_end: NaiveDate,
    /// Normalized period type
    pub period_type: PeriodType,
    /// Statement
    pub statement: Statement,
    /// Canonical line item
    pub line_item: String,
    /// Value
    pub value: f64,
    /// Normalized unit code
    pub unit: String,
    /// Raw fact the value came from; `None` for derived facts
    pub source_fact_id: Option<i64>,
    /// XBRL concept of the winning raw fact
    pub source_xbrl_tag: Option<String>,
    /// XBRL context of the winning raw fact
    pub source_context_ref: Option<String>,
}

impl CanonicalFact {
    /// Returns true if the fact was computed rather than reported.
    pub const fn is_derived(&self) -> bool {
        self.source_fact_id.is_none() && self.source_xbrl_tag.is_none()
    }

    /// Length of the reported period in days.
    pub fn duration_days(&self) -> Option<i64> {
        duration_between(self.period_start, Some(self.period_end))
    }
}

/// A filing registered with the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filing {
    /// Ticker symbol
    pub ticker: String,
    /// SEC central index key
    pub cik: String,
    /// Unique accession number
    pub accession: String,
    /// Form type (`10-K`, `10-Q`, ...)
    pub form: Option<String>,
    /// Date the filing was accepted
    pub filed_at: Option<NaiveDate>,
    /// Local path of the primary document
    pub path: Option<String>,
    /// Local path of the submissions index the filing was discovered from
    pub submissions_path: Option<String>,
}

fn duration_between(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<i64> {
    match (start, end) {
        (Some(start), Some(end)) => Some(end.signed_duration_since(start).num_days()),
        _ => None,
    }
}
