//! Tie checks.
//!
//! Two identities are checked per period end:
//! - balance sheet: `assets - (liabilities + equity)`, or
//!   `assets - liabilities_equity` when the split is not reported;
//! - cash flow: `cfo + cfi + cff + fx_on_cash + change_in_restricted_cash`
//!   against the reported `change_in_cash`.
//!
//! Periods where neither identity can be computed are skipped.

use crate::config::AggregatorConfig;
use crate::derive::{CASH_FLOW_ACTIVITIES, CASH_FLOW_ADDENDS};
use chrono::NaiveDate;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_data::{CanonicalFact, Statement};

/// Outcome of a tie check.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TieStatus {
    /// Within absolute tolerance
    #[display("ok")]
    Ok,
    /// Off, but small relative to the statement's scale
    #[display("warn")]
    Warn,
    /// Off
    #[display("fail")]
    Fail,
}

impl TieStatus {
    /// Classifies a delta against the absolute tolerance and, failing that,
    /// against `warn_ratio` of `scale`.
    pub fn classify(delta: f64, scale: Option<f64>, config: &AggregatorConfig) -> Self {
        if delta.abs() <= config.tie_tolerance {
            return Self::Ok;
        }
        match scale.map(f64::abs) {
            Some(scale) if scale > 0.0 && delta.abs() / scale <= config.warn_ratio => Self::Warn,
            _ => Self::Fail,
        }
    }
}

/// Which identity a violation concerns.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieKind {
    /// Assets against liabilities and equity
    #[display("balance_sheet")]
    BalanceSheet,
    /// Cash flows against the change in cash
    #[display("cash_flow")]
    CashFlow,
}

/// Tie check result for one period end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieCheck {
    /// Period end
    pub period_end: NaiveDate,
    /// Balance sheet delta
    pub bs_tie: Option<f64>,
    /// Sum of the cash flow addends
    pub cf_sum: Option<f64>,
    /// Change in cash the sum is compared against
    pub cash_delta: Option<f64>,
    /// Cash flow delta (`cf_sum - cash_delta`)
    pub cf_tie: Option<f64>,
    /// Worst status of the two identities
    pub status: TieStatus,
    #[serde(skip)]
    bs_status: Option<TieStatus>,
    #[serde(skip)]
    cf_status: Option<TieStatus>,
}

impl TieCheck {
    /// Builds a check from the two deltas, classifying each against its scale.
    ///
    /// Returns `None` when neither delta is known.
    pub fn new(
        period_end: NaiveDate,
        bs: Option<(f64, Option<f64>)>,
        cf: Option<(f64, f64)>,
        config: &AggregatorConfig,
    ) -> Option<Self> {
        if bs.is_none() && cf.is_none() {
            return None;
        }
        let bs_status = bs.map(|(delta, scale)| TieStatus::classify(delta, scale, config));
        let cf_tie = cf.map(|(sum, change)| sum - change);
        let cf_status =
            cf.map(|(sum, change)| TieStatus::classify(sum - change, Some(change), config));
        let status = bs_status
            .into_iter()
            .chain(cf_status)
            .max()
            .unwrap_or(TieStatus::Ok);
        Some(Self {
            period_end,
            bs_tie: bs.map(|(delta, _)| delta),
            cf_sum: cf.map(|(sum, _)| sum),
            cash_delta: cf.map(|(_, change)| change),
            cf_tie,
            status,
            bs_status,
            cf_status,
        })
    }

    /// Identities that missed the absolute tolerance.
    pub fn violations(&self) -> Vec<TieViolation> {
        [
            (TieKind::BalanceSheet, self.bs_tie, self.bs_status),
            (TieKind::CashFlow, self.cf_tie, self.cf_status),
        ]
        .into_iter()
        .filter_map(|(kind, delta, status)| match (delta, status) {
            (Some(delta), Some(status)) if status != TieStatus::Ok => Some(TieViolation {
                period_end: self.period_end,
                kind,
                delta,
                status,
            }),
            _ => None,
        })
        .collect()
    }
}

/// One identity that did not tie.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieViolation {
    /// Period end
    pub period_end: NaiveDate,
    /// Identity that failed
    pub kind: TieKind,
    /// Signed delta
    pub delta: f64,
    /// `warn` or `fail`
    pub status: TieStatus,
}

/// What materialization does with tie violations.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TiePolicy {
    /// Log violations and write the canonical set anyway
    #[default]
    Advisory,
    /// Refuse to write when any identity misses the tolerance
    Enforcing,
}

impl TiePolicy {
    /// `Enforcing` when `strict` is set.
    pub const fn from_strict(strict: bool) -> Self {
        if strict { Self::Enforcing } else { Self::Advisory }
    }
}

/// Balance sheet delta and its scale (`assets`).
pub fn balance_sheet_delta(values: &BTreeMap<&str, f64>) -> Option<(f64, Option<f64>)> {
    let assets = *values.get("assets")?;
    let delta = match (
        values.get("liabilities"),
        values.get("equity"),
        values.get("liabilities_equity"),
    ) {
        (Some(liabilities), Some(equity), _) => assets - (liabilities + equity),
        (_, _, Some(total)) => assets - total,
        _ => return None,
    };
    Some((delta, Some(assets)))
}

/// Sum of the cash flow addends, when at least one activity total is present.
pub fn cash_flow_sum(values: &BTreeMap<&str, f64>) -> Option<f64> {
    if !CASH_FLOW_ACTIVITIES.iter().any(|item| values.contains_key(item)) {
        return None;
    }
    Some(
        CASH_FLOW_ADDENDS
            .iter()
            .filter_map(|item| values.get(item))
            .sum(),
    )
}

/// Runs tie checks over canonical facts, one result per period end in
/// ascending order.
///
/// Only `USD` facts take part, so share counts never mix with dollars.
pub fn check_ties(facts: &[CanonicalFact], config: &AggregatorConfig) -> Vec<TieCheck> {
    let mut periods: BTreeMap<NaiveDate, [BTreeMap<&str, f64>; 2]> = BTreeMap::new();
    for fact in facts.iter().filter(|f| f.unit == "USD") {
        let slot = match fact.statement {
            Statement::BalanceSheet => 0,
            Statement::CashFlow => 1,
            Statement::IncomeStatement => continue,
        };
        periods.entry(fact.period_end).or_default()[slot].insert(fact.line_item.as_str(), fact.value);
    }

    periods
        .into_iter()
        .filter_map(|(period_end, [balance, cash_flow])| {
            let bs = balance_sheet_delta(&balance);
            let cf = cash_flow_sum(&cash_flow)
                .zip(cash_flow.get("change_in_cash").copied());
            TieCheck::new(period_end, bs, cf, config)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::canonical;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use tally_data::Statement::{BalanceSheet as Bs, CashFlow as Cf};

    #[test]
    fn test_balance_sheet_off_by_ten() {
        let facts = vec![
            canonical("assets", Bs, 100.0),
            canonical("liabilities", Bs, 60.0),
            canonical("equity", Bs, 30.0),
        ];
        let checks = check_ties(&facts, &AggregatorConfig::default());
        assert_eq!(checks.len(), 1);
        assert_relative_eq!(checks[0].bs_tie.unwrap(), 10.0);
        assert_eq!(checks[0].status, TieStatus::Fail);
        assert_eq!(checks[0].cf_tie, None);

        let violations = checks[0].violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].kind, TieKind::BalanceSheet);
    }

    #[test]
    fn test_liabilities_equity_fallback() {
        let facts = vec![
            canonical("assets", Bs, 100.0),
            canonical("liabilities_equity", Bs, 100.0),
        ];
        let checks = check_ties(&facts, &AggregatorConfig::default());
        assert_relative_eq!(checks[0].bs_tie.unwrap(), 0.0);
        assert_eq!(checks[0].status, TieStatus::Ok);
        assert!(checks[0].violations().is_empty());
    }

    #[test]
    fn test_cash_flow_tie() {
        let facts = vec![
            canonical("cfo", Cf, 50.0),
            canonical("cfi", Cf, -20.0),
            canonical("cff", Cf, 7.0),
            canonical("change_in_cash", Cf, 36.0),
        ];
        let checks = check_ties(&facts, &AggregatorConfig::default());
        assert_relative_eq!(checks[0].cf_sum.unwrap(), 37.0);
        assert_relative_eq!(checks[0].cash_delta.unwrap(), 36.0);
        assert_relative_eq!(checks[0].cf_tie.unwrap(), 1.0);
        assert_eq!(checks[0].status, TieStatus::Fail);
    }

    #[test]
    fn test_untieable_periods_skipped() {
        let facts = vec![canonical("cash", Bs, 10.0), canonical("cfo", Cf, 5.0)];
        assert!(check_ties(&facts, &AggregatorConfig::default()).is_empty());
    }

    #[rstest]
    #[case(0.005, Some(100.0), TieStatus::Ok)]
    #[case(0.5, Some(100.0), TieStatus::Warn)]
    #[case(5.0, Some(100.0), TieStatus::Fail)]
    #[case(0.5, None, TieStatus::Fail)]
    #[case(-0.5, Some(-100.0), TieStatus::Warn)]
    fn test_classify(#[case] delta: f64, #[case] scale: Option<f64>, #[case] expected: TieStatus) {
        assert_eq!(
            TieStatus::classify(delta, scale, &AggregatorConfig::default()),
            expected
        );
    }
}
