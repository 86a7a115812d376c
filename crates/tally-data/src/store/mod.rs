//! Fact storage.
//!
//! The [`FactStore`] trait is the persistence seam for raw facts, canonical
//! facts and the filings registry. [`SqliteStore`] is the durable
//! implementation; [`MemoryStore`] backs tests and throwaway runs.

pub mod frame;
pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::facts::{CanonicalFact, Filing, RawFact};
use crate::schema;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counts from a batch persist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOutcome {
    /// Facts written
    pub inserted: usize,
    /// Facts rejected by the canonical schema
    pub dropped: usize,
}

/// Persistence for raw facts, canonical facts and filings.
///
/// Implementations must keep `replace_canonical` atomic: a failure part way
/// through leaves the previous canonical snapshot in place.
pub trait FactStore {
    /// Inserts or updates a filing keyed on accession.
    fn upsert_filing(&self, filing: &Filing) -> Result<()>;

    /// Looks up a filing by accession.
    fn get_filing(&self, accession: &str) -> Result<Option<Filing>>;

    /// Filings for a ticker, newest first.
    fn list_filings(&self, ticker: &str) -> Result<Vec<Filing>>;

    /// Appends raw facts without schema checks, returning how many were written.
    fn insert_facts(&self, facts: &[&RawFact]) -> Result<usize>;

    /// Raw facts for a ticker ordered by period end (newest first), statement,
    /// line item and id.
    fn list_facts(&self, ticker: &str) -> Result<Vec<RawFact>>;

    /// Filing date of the accession behind the most recently stored fact.
    fn infer_default_period_end(&self, ticker: &str) -> Result<Option<NaiveDate>>;

    /// Atomically replaces every canonical fact for a ticker.
    fn replace_canonical(&self, ticker: &str, facts: &[CanonicalFact]) -> Result<usize>;

    /// Canonical facts ordered by period end (newest first), statement and
    /// line item.
    fn list_canonical(&self, ticker: &str) -> Result<Vec<CanonicalFact>>;

    /// Removes every filing, raw fact and canonical fact for a ticker.
    fn delete_ticker(&self, ticker: &str) -> Result<()>;

    /// Persists one raw fact.
    ///
    /// Returns `false` when the (statement, line item) pair is outside the
    /// canonical schema and the fact was dropped.
    fn persist_fact(&self, fact: &RawFact) -> Result<bool> {
        Ok(self.persist_facts(std::slice::from_ref(fact))?.inserted == 1)
    }

    /// Persists a batch of raw facts, dropping those outside the schema.
    fn persist_facts(&self, facts: &[RawFact]) -> Result<PersistOutcome> {
        let (allowed, dropped): (Vec<&RawFact>, Vec<&RawFact>) = facts
            .iter()
            .partition(|fact| schema::is_allowed(fact.statement, &fact.line_item));
        for fact in &dropped {
            debug!(
                statement = %fact.statement,
                line_item = %fact.line_item,
                "dropping fact outside canonical schema"
            );
        }
        let inserted = self.insert_facts(&allowed)?;
        Ok(PersistOutcome {
            inserted,
            dropped: dropped.len(),
        })
    }

    /// Canonical facts with a period end on or before `as_of`.
    fn list_canonical_as_of(&self, ticker: &str, as_of: NaiveDate) -> Result<Vec<CanonicalFact>> {
        Ok(self
            .list_canonical(ticker)?
            .into_iter()
            .filter(|fact| fact.period_end <= as_of)
            .collect())
    }
}

pub(crate) fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}
