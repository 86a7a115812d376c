//! SQLite fact store.

use super::{FactStore, normalize_ticker};
use crate::error::Result;
use crate::facts::{CanonicalFact, Filing, PeriodType, RawFact, Statement};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, instrument};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-backed [`FactStore`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (or creates) a store at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS filings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                cik TEXT NOT NULL,
                accession TEXT NOT NULL UNIQUE,
                form TEXT,
                filed_at TEXT,
                path TEXT,
                submissions_path TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_filings_ticker ON filings(ticker, filed_at);

            CREATE TABLE IF NOT EXISTS facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                cik TEXT NOT NULL,
                accession TEXT,
                statement TEXT NOT NULL,
                line_item TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                period_start TEXT,
                period_end TEXT,
                period_type TEXT NOT NULL,
                xbrl_tag TEXT,
                context_ref TEXT,
                source_path TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_facts_ticker_period ON facts(ticker, period_end);
            CREATE INDEX IF NOT EXISTS idx_facts_accession ON facts(accession);

            CREATE TABLE IF NOT EXISTS canonical_facts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticker TEXT NOT NULL,
                cik TEXT NOT NULL,
                accession TEXT,
                period_start TEXT,
                period_end TEXT NOT NULL,
                period_type TEXT NOT NULL,
                statement TEXT NOT NULL,
                line_item TEXT NOT NULL,
                value REAL NOT NULL,
                unit TEXT NOT NULL,
                source_fact_id INTEGER REFERENCES facts(id) ON DELETE SET NULL,
                source_xbrl_tag TEXT,
                source_context_ref TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (ticker, cik, period_end, period_type, statement, line_item, unit)
            );
            CREATE INDEX IF NOT EXISTS idx_canonical_ticker_period
                ON canonical_facts(ticker, period_end);",
        )?;
        Ok(())
    }

    /// Number of raw facts stored for a ticker.
    pub fn count_facts(&self, ticker: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM facts WHERE ticker = ?1",
            params![normalize_ticker(ticker)],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Tickers with at least one raw fact.
    pub fn list_tickers(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT ticker FROM facts ORDER BY ticker")?;
        let tickers = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(tickers)
    }
}

impl FactStore for SqliteStore {
    #[instrument(skip(self, filing), fields(accession = %filing.accession))]
    fn upsert_filing(&self, filing: &Filing) -> Result<()> {
        self.conn.execute(
            "INSERT INTO filings (ticker, cik, accession, form, filed_at, path, submissions_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(accession) DO UPDATE SET
                ticker = excluded.ticker,
                cik = excluded.cik,
                form = COALESCE(excluded.form, filings.form),
                filed_at = COALESCE(excluded.filed_at, filings.filed_at),
                path = COALESCE(excluded.path, filings.path),
                submissions_path = COALESCE(excluded.submissions_path, filings.submissions_path)",
            params![
                normalize_ticker(&filing.ticker),
                filing.cik,
                filing.accession,
                filing.form,
                date_to_db(filing.filed_at),
                filing.path,
                filing.submissions_path,
            ],
        )?;
        Ok(())
    }

    fn get_filing(&self, accession: &str) -> Result<Option<Filing>> {
        let filing = self
            .conn
            .query_row(
                "SELECT ticker, cik, accession, form, filed_at, path, submissions_path
                 FROM filings WHERE accession = ?1",
                params![accession],
                filing_from_row,
            )
            .optional()?;
        Ok(filing)
    }

    fn list_filings(&self, ticker: &str) -> Result<Vec<Filing>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticker, cik, accession, form, filed_at, path, submissions_path
             FROM filings WHERE ticker = ?1
             ORDER BY filed_at DESC, accession DESC",
        )?;
        let filings = stmt
            .query_map(params![normalize_ticker(ticker)], filing_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(filings)
    }

    #[instrument(skip(self, facts), fields(count = facts.len()))]
    fn insert_facts(&self, facts: &[&RawFact]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO facts
                 (ticker, cik, accession, statement, line_item, value, unit,
                  period_start, period_end, period_type, xbrl_tag, context_ref, source_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for fact in facts {
                stmt.execute(params![
                    normalize_ticker(&fact.ticker),
                    fact.cik,
                    fact.accession,
                    fact.statement.as_str(),
                    fact.line_item,
                    fact.value,
                    fact.unit,
                    date_to_db(fact.period_start),
                    date_to_db(fact.period_end),
                    fact.period_type.as_str(),
                    fact.source_xbrl_tag,
                    fact.source_context_ref,
                    fact.source_path,
                ])?;
            }
        }
        tx.commit()?;
        debug!(inserted = facts.len(), "stored raw facts");
        Ok(facts.len())
    }

    fn list_facts(&self, ticker: &str) -> Result<Vec<RawFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, ticker, cik, accession, statement, line_item, value, unit,
                    period_start, period_end, period_type, xbrl_tag, context_ref, source_path
             FROM facts WHERE ticker = ?1
             ORDER BY period_end DESC, statement, line_item, id",
        )?;
        let facts = stmt
            .query_map(params![normalize_ticker(ticker)], raw_fact_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    fn infer_default_period_end(&self, ticker: &str) -> Result<Option<NaiveDate>> {
        let filed_at: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT f.filed_at
                 FROM facts x JOIN filings f ON f.accession = x.accession
                 WHERE x.ticker = ?1 AND f.filed_at IS NOT NULL
                 ORDER BY x.id DESC LIMIT 1",
                params![normalize_ticker(ticker)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(filed_at
            .flatten()
            .and_then(|s| NaiveDate::parse_from_str(&s, DATE_FORMAT).ok()))
    }

    #[instrument(skip(self, facts), fields(count = facts.len()))]
    fn replace_canonical(&self, ticker: &str, facts: &[CanonicalFact]) -> Result<usize> {
        let ticker = normalize_ticker(ticker);
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(
            "DELETE FROM canonical_facts WHERE ticker = ?1",
            params![ticker],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO canonical_facts
                 (ticker, cik, accession, period_start, period_end, period_type, statement,
                  line_item, value, unit, source_fact_id, source_xbrl_tag, source_context_ref)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            )?;
            for fact in facts {
                stmt.execute(params![
                    ticker,
                    fact.cik,
                    fact.accession,
                    date_to_db(fact.period_start),
                    fact.period_end.format(DATE_FORMAT).to_string(),
                    fact.period_type.as_str(),
                    fact.statement.as_str(),
                    fact.line_item,
                    fact.value,
                    fact.unit,
                    fact.source_fact_id,
                    fact.source_xbrl_tag,
                    fact.source_context_ref,
                ])?;
            }
        }
        tx.commit()?;
        info!(%ticker, removed, inserted = facts.len(), "replaced canonical facts");
        Ok(facts.len())
    }

    fn list_canonical(&self, ticker: &str) -> Result<Vec<CanonicalFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticker, cik, accession, period_start, period_end, period_type, statement,
                    line_item, value, unit, source_fact_id, source_xbrl_tag, source_context_ref
             FROM canonical_facts WHERE ticker = ?1
             ORDER BY period_end DESC, statement, line_item, unit, period_type",
        )?;
        let facts = stmt
            .query_map(params![normalize_ticker(ticker)], canonical_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    fn list_canonical_as_of(&self, ticker: &str, as_of: NaiveDate) -> Result<Vec<CanonicalFact>> {
        let mut stmt = self.conn.prepare(
            "SELECT ticker, cik, accession, period_start, period_end, period_type, statement,
                    line_item, value, unit, source_fact_id, source_xbrl_tag, source_context_ref
             FROM canonical_facts WHERE ticker = ?1 AND period_end <= ?2
             ORDER BY period_end DESC, statement, line_item, unit, period_type",
        )?;
        let facts = stmt
            .query_map(
                params![normalize_ticker(ticker), as_of.format(DATE_FORMAT).to_string()],
                canonical_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(facts)
    }

    fn delete_ticker(&self, ticker: &str) -> Result<()> {
        let ticker = normalize_ticker(ticker);
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM canonical_facts WHERE ticker = ?1", params![ticker])?;
        tx.execute("DELETE FROM facts WHERE ticker = ?1", params![ticker])?;
        tx.execute("DELETE FROM filings WHERE ticker = ?1", params![ticker])?;
        tx.commit()?;
        Ok(())
    }
}

fn date_to_db(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format(DATE_FORMAT).to_string())
}

fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|s| {
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn filing_from_row(row: &Row<'_>) -> rusqlite::Result<Filing> {
    Ok(Filing {
        ticker: row.get(0)?,
        cik: row.get(1)?,
        accession: row.get(2)?,
        form: row.get(3)?,
        filed_at: date_column(row, 4)?,
        path: row.get(5)?,
        submissions_path: row.get(6)?,
    })
}

fn raw_fact_from_row(row: &Row<'_>) -> rusqlite::Result<RawFact> {
    Ok(RawFact {
        id: row.get(0)?,
        ticker: row.get(1)?,
        cik: row.get(2)?,
        accession: row.get(3)?,
        statement: enum_column::<Statement>(row, 4)?,
        line_item: row.get(5)?,
        value: row.get(6)?,
        unit: row.get(7)?,
        period_start: date_column(row, 8)?,
        period_end: date_column(row, 9)?,
        period_type: enum_column::<PeriodType>(row, 10)?,
        source_xbrl_tag: row.get(11)?,
        source_context_ref: row.get(12)?,
        source_path: row.get(13)?,
    })
}

fn canonical_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalFact> {
    let period_end = date_column(row, 4)?.ok_or(rusqlite::Error::InvalidColumnType(
        4,
        "period_end".to_string(),
        Type::Null,
    ))?;
    Ok(CanonicalFact {
        ticker: row.get(0)?,
        cik: row.get(1)?,
        accession: row.get(2)?,
        period_start: date_column(row, 3)?,
        period_end,
        period_type: enum_column::<PeriodType>(row, 5)?,
        statement: enum_column::<Statement>(row, 6)?,
        line_item: row.get(7)?,
        value: row.get(8)?,
        unit: row.get(9)?,
        source_fact_id: row.get(10)?,
        source_xbrl_tag: row.get(11)?,
        source_context_ref: row.get(12)?,
    })
}
