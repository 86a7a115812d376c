//! In-memory fact store.

use super::{FactStore, normalize_ticker};
use crate::error::{DataError, Result};
use crate::facts::{CanonicalFact, Filing, RawFact};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    filings: BTreeMap<String, Filing>,
    facts: Vec<RawFact>,
    canonical: BTreeMap<String, Vec<CanonicalFact>>,
    next_id: i64,
}

/// Simple in-memory store for tests and throwaway runs.
///
/// Data lives behind an `RwLock` and is lost when the store is dropped.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| DataError::Store("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| DataError::Store("memory store lock poisoned".to_string()))
    }
}

fn canonical_key(fact: &CanonicalFact) -> (NaiveDate, String, String, String, String) {
    (
        fact.period_end,
        fact.period_type.as_str().to_string(),
        fact.statement.as_str().to_string(),
        fact.line_item.clone(),
        fact.unit.clone(),
    )
}

impl FactStore for MemoryStore {
    fn upsert_filing(&self, filing: &Filing) -> Result<()> {
        let mut state = self.write()?;
        let mut filing = filing.clone();
        filing.ticker = normalize_ticker(&filing.ticker);
        if let Some(existing) = state.filings.get(&filing.accession) {
            filing.form = filing.form.or_else(|| existing.form.clone());
            filing.filed_at = filing.filed_at.or(existing.filed_at);
            filing.path = filing.path.or_else(|| existing.path.clone());
            filing.submissions_path = filing
                .submissions_path
                .or_else(|| existing.submissions_path.clone());
        }
        state.filings.insert(filing.accession.clone(), filing);
        Ok(())
    }

    fn get_filing(&self, accession: &str) -> Result<Option<Filing>> {
        Ok(self.read()?.filings.get(accession).cloned())
    }

    fn list_filings(&self, ticker: &str) -> Result<Vec<Filing>> {
        let ticker = normalize_ticker(ticker);
        let mut filings: Vec<Filing> = self
            .read()?
            .filings
            .values()
            .filter(|f| f.ticker == ticker)
            .cloned()
            .collect();
        filings.sort_by(|a, b| {
            b.filed_at
                .cmp(&a.filed_at)
                .then_with(|| b.accession.cmp(&a.accession))
        });
        Ok(filings)
    }

    fn insert_facts(&self, facts: &[&RawFact]) -> Result<usize> {
        let mut state = self.write()?;
        for fact in facts {
            state.next_id += 1;
            let mut stored = (*fact).clone();
            stored.id = Some(state.next_id);
            stored.ticker = normalize_ticker(&stored.ticker);
            state.facts.push(stored);
        }
        Ok(facts.len())
    }

    fn list_facts(&self, ticker: &str) -> Result<Vec<RawFact>> {
        let ticker = normalize_ticker(ticker);
        let mut facts: Vec<RawFact> = self
            .read()?
            .facts
            .iter()
            .filter(|f| f.ticker == ticker)
            .cloned()
            .collect();
        // `None` sorts last, as NULL does under SQLite's `ORDER BY period_end DESC`.
        facts.sort_by(|a, b| {
            b.period_end
                .cmp(&a.period_end)
                .then_with(|| a.statement.as_str().cmp(b.statement.as_str()))
                .then_with(|| a.line_item.cmp(&b.line_item))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(facts)
    }

    fn infer_default_period_end(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let ticker = normalize_ticker(ticker);
        let state = self.read()?;
        Ok(state
            .facts
            .iter()
            .rev()
            .filter(|f| f.ticker == ticker)
            .filter_map(|f| f.accession.as_ref())
            .find_map(|accession| state.filings.get(accession).and_then(|f| f.filed_at)))
    }

    fn replace_canonical(&self, ticker: &str, facts: &[CanonicalFact]) -> Result<usize> {
        let mut seen = HashSet::new();
        for fact in facts {
            if !seen.insert(canonical_key(fact)) {
                return Err(DataError::Store(format!(
                    "duplicate canonical fact {} {} {}",
                    fact.period_end, fact.statement, fact.line_item
                )));
            }
        }
        let ticker = normalize_ticker(ticker);
        let mut rows = facts.to_vec();
        for row in &mut rows {
            row.ticker = ticker.clone();
        }
        self.write()?.canonical.insert(ticker, rows);
        Ok(facts.len())
    }

    fn list_canonical(&self, ticker: &str) -> Result<Vec<CanonicalFact>> {
        let mut facts = self
            .read()?
            .canonical
            .get(&normalize_ticker(ticker))
            .cloned()
            .unwrap_or_default();
        facts.sort_by(|a, b| {
            b.period_end
                .cmp(&a.period_end)
                .then_with(|| a.statement.as_str().cmp(b.statement.as_str()))
                .then_with(|| a.line_item.cmp(&b.line_item))
                .then_with(|| a.unit.cmp(&b.unit))
                .then_with(|| a.period_type.as_str().cmp(b.period_type.as_str()))
        });
        Ok(facts)
    }

    fn delete_ticker(&self, ticker: &str) -> Result<()> {
        let ticker = normalize_ticker(ticker);
        let mut state = self.write()?;
        state.canonical.remove(&ticker);
        state.facts.retain(|f| f.ticker != ticker);
        state.filings.retain(|_, f| f.ticker != ticker);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Statement;
    use crate::store::fixtures::{date, raw};

    #[test]
    fn test_ids_are_assigned_in_order() {
        let store = MemoryStore::new();
        store
            .persist_facts(&[
                raw("revenue", Statement::IncomeStatement, 1.0),
                raw("revenue", Statement::IncomeStatement, 2.0),
            ])
            .unwrap();
        let ids: Vec<_> = store
            .list_facts("test")
            .unwrap()
            .iter()
            .map(|f| f.id)
            .collect();
        assert_eq!(ids, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_default_period_from_latest_fact() {
        let store = MemoryStore::new();
        for (accession, filed) in [("a-1", date(2024, 2, 1)), ("a-2", date(2024, 5, 1))] {
            store
                .upsert_filing(&Filing {
                    ticker: "TEST".into(),
                    cik: "1".into(),
                    accession: accession.into(),
                    form: None,
                    filed_at: Some(filed),
                    path: None,
                    submissions_path: None,
                })
                .unwrap();
            let mut fact = raw("revenue", Statement::IncomeStatement, 1.0);
            fact.accession = Some(accession.into());
            store.persist_fact(&fact).unwrap();
        }
        assert_eq!(
            store.infer_default_period_end("TEST").unwrap(),
            Some(date(2024, 5, 1))
        );
    }

    #[test]
    fn test_unknown_ticker_is_empty() {
        let store = MemoryStore::new();
        assert!(store.list_canonical("NONE").unwrap().is_empty());
        assert!(store.list_filings("NONE").unwrap().is_empty());
    }
}
