//! Cash flow period alignment.
//!
//! Some filers tag operating cash flow for the quarter but investing and
//! financing totals year-to-date (or the reverse) within the same period. The
//! totals are re-selected so every one of them starts where `cfo` starts.

use crate::group::{GroupKey, Groups, canonical_from, select};
use tally_data::{CanonicalFact, Statement};
use tracing::debug;

/// Line items realigned to the start date of `cfo`.
pub const ALIGNED_ITEMS: &[&str] = &["cfi", "cff", "change_in_cash"];

/// Replaces cash flow totals whose period start differs from `cfo`'s with the
/// best raw candidate starting on the same date, when one exists.
pub fn align_cash_flow(facts: &mut [CanonicalFact], groups: &Groups<'_>) {
    let anchors: Vec<CanonicalFact> = facts
        .iter()
        .filter(|f| f.statement == Statement::CashFlow && f.line_item == "cfo")
        .filter(|f| f.period_start.is_some())
        .cloned()
        .collect();

    for cfo in &anchors {
        for fact in facts.iter_mut().filter(|f| {
            f.statement == Statement::CashFlow
                && ALIGNED_ITEMS.contains(&f.line_item.as_str())
                && f.ticker == cfo.ticker
                && f.cik == cfo.cik
                && f.period_end == cfo.period_end
                && f.unit == cfo.unit
                && f.period_start != cfo.period_start
        }) {
            let key = GroupKey {
                ticker: fact.ticker.clone(),
                cik: fact.cik.clone(),
                period_end: fact.period_end,
                period_type: fact.period_type,
                statement: fact.statement,
                line_item: fact.line_item.clone(),
                unit: fact.unit.clone(),
            };
            let matching = groups
                .candidates(&key)
                .iter()
                .copied()
                .filter(|raw| raw.period_start == cfo.period_start);
            if let Some(winner) = select(matching) {
                debug!(
                    line_item = %fact.line_item,
                    period_end = %fact.period_end,
                    "aligned cash flow total to cfo period start"
                );
                *fact = canonical_from(&key, winner);
            }
        }
    }
}
