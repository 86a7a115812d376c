//! Canonical materialization.

use crate::align::align_cash_flow;
use crate::config::AggregatorConfig;
use crate::derive::derive_line_items;
use crate::error::{CanonicalError, Result};
use crate::group::Groups;
use crate::ties::{TieCheck, TiePolicy, TieViolation, check_ties};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tally_data::{CanonicalFact, FactStore, RawFact, schema};
use tracing::{info, instrument, warn};

/// Result of materializing one ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    /// Canonical facts written
    pub inserted: usize,
    /// Raw facts outside the canonical schema
    pub dropped: usize,
    /// Tie check results per period end
    pub ties: Vec<TieCheck>,
}

impl MaterializeOutcome {
    /// Every identity that missed the tolerance.
    pub fn violations(&self) -> Vec<TieViolation> {
        self.ties.iter().flat_map(TieCheck::violations).collect()
    }
}

/// Reconciles raw facts into canonical facts.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalAggregator {
    config: AggregatorConfig,
}

impl CanonicalAggregator {
    /// Creates an aggregator with the given tolerances.
    pub const fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// Tolerances in use.
    pub const fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Groups, dedupes, aligns and completes a ticker's raw facts.
    ///
    /// Facts without a period end are assigned `default_period_end`, or
    /// dropped when it is `None`. Output is sorted by period end, statement,
    /// line item and unit, so equal inputs give equal outputs.
    pub fn aggregate(
        &self,
        raw: &[RawFact],
        default_period_end: Option<NaiveDate>,
    ) -> Vec<CanonicalFact> {
        let groups = Groups::build(raw, default_period_end);
        let mut facts = groups.winners();
        align_cash_flow(&mut facts, &groups);
        let derived = derive_line_items(&facts, &self.config);
        facts.extend(derived);
        facts.sort_by(|a, b| {
            a.period_end
                .cmp(&b.period_end)
                .then_with(|| a.statement.cmp(&b.statement))
                .then_with(|| a.line_item.cmp(&b.line_item))
                .then_with(|| a.unit.cmp(&b.unit))
        });
        facts
    }

    /// Rebuilds the canonical snapshot of one ticker.
    ///
    /// Under [`TiePolicy::Enforcing`] any tie violation aborts before the
    /// store is touched, leaving the previous snapshot in place.
    #[instrument(skip(self, store), fields(ticker = %ticker))]
    pub fn materialize<S: FactStore + ?Sized>(
        &self,
        store: &S,
        ticker: &str,
        policy: TiePolicy,
    ) -> Result<MaterializeOutcome> {
        let raw = store.list_facts(ticker)?;
        let dropped = raw
            .iter()
            .filter(|f| !schema::is_allowed(f.statement, &f.line_item))
            .count();

        let default_period_end = if raw.iter().any(|f| f.period_end.is_none()) {
            store.infer_default_period_end(ticker)?
        } else {
            None
        };
        let facts = self.aggregate(&raw, default_period_end);

        let ties = check_ties(&facts, &self.config);
        let violations: Vec<TieViolation> = ties.iter().flat_map(TieCheck::violations).collect();
        if !violations.is_empty() {
            match policy {
                TiePolicy::Enforcing => return Err(CanonicalError::TieViolations(violations)),
                TiePolicy::Advisory => {
                    for violation in &violations {
                        warn!(
                            period_end = %violation.period_end,
                            kind = %violation.kind,
                            delta = violation.delta,
                            status = %violation.status,
                            "tie check violation"
                        );
                    }
                }
            }
        }

        let inserted = store.replace_canonical(ticker, &facts)?;
        info!(raw = raw.len(), inserted, dropped, "materialized canonical facts");
        Ok(MaterializeOutcome {
            inserted,
            dropped,
            ties,
        })
    }
}

/// Rebuilds the canonical snapshot of `ticker` with the given tolerances and
/// tie policy.
pub fn materialize_canonical_for_ticker<S: FactStore + ?Sized>(
    store: &S,
    ticker: &str,
    config: &AggregatorConfig,
    policy: TiePolicy,
) -> Result<MaterializeOutcome> {
    CanonicalAggregator::new(*config).materialize(store, ticker, policy)
}
