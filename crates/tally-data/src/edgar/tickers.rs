//! Ticker to CIK resolution.
//!
//! Two sources back the lookup: a curated `ticker,cik` CSV that defines the
//! coverage list, and the SEC `company_tickers.json` document as a broad
//! fallback. Each source is reloaded only when its modification time changes.

use crate::error::Result;
use crate::facts::normalize_cik;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Format of a ticker source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceFormat {
    CuratedCsv,
    SecJson,
}

#[derive(Debug, Clone)]
struct TickerSource {
    path: Option<PathBuf>,
    format: SourceFormat,
    modified: Option<SystemTime>,
    entries: BTreeMap<String, String>,
}

impl TickerSource {
    const fn new(path: Option<PathBuf>, format: SourceFormat) -> Self {
        Self {
            path,
            format,
            modified: None,
            entries: BTreeMap::new(),
        }
    }

    fn refresh(&mut self) -> Result<bool> {
        let Some(path) = self.path.as_deref() else {
            return Ok(false);
        };
        let modified = match std::fs::metadata(path) {
            Ok(meta) => meta.modified().ok(),
            Err(err) => {
                warn!(path = %path.display(), %err, "ticker source not found");
                return Ok(false);
            }
        };
        if !self.entries.is_empty() && modified.is_some() && modified == self.modified {
            return Ok(false);
        }
        let file = File::open(path)?;
        self.entries = match self.format {
            SourceFormat::CuratedCsv => parse_curated(file)?,
            SourceFormat::SecJson => parse_sec(file)?,
        };
        self.modified = modified;
        info!(path = %path.display(), tickers = self.entries.len(), "loaded ticker source");
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct CuratedRow {
    ticker: String,
    cik: String,
}

#[derive(Debug, Deserialize)]
struct SecEntry {
    ticker: Option<String>,
    #[serde(alias = "cik")]
    cik_str: Option<CikValue>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CikValue {
    Number(u64),
    Text(String),
}

impl CikValue {
    fn padded(&self) -> Option<String> {
        let number = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
        };
        Some(format!("{number:010}"))
    }
}

fn normalize_ticker(ticker: &str) -> String {
    ticker.trim().to_uppercase()
}

fn parse_curated<R: Read>(reader: R) -> Result<BTreeMap<String, String>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut entries = BTreeMap::new();
    for row in rdr.deserialize::<CuratedRow>() {
        let row = row?;
        let ticker = normalize_ticker(&row.ticker);
        let cik = normalize_cik(&row.cik);
        if !ticker.is_empty() && !cik.is_empty() {
            entries.insert(ticker, cik);
        }
    }
    Ok(entries)
}

fn parse_sec<R: Read>(reader: R) -> Result<BTreeMap<String, String>> {
    let document: HashMap<String, SecEntry> = serde_json::from_reader(reader)?;
    let mut entries = BTreeMap::new();
    for entry in document.into_values() {
        let (Some(ticker), Some(cik)) = (entry.ticker, entry.cik_str.and_then(|c| c.padded()))
        else {
            continue;
        };
        entries.insert(normalize_ticker(&ticker), cik);
    }
    Ok(entries)
}

/// Ticker to CIK lookup service.
///
/// Construct once per process and pass it where resolution is needed. Call
/// [`CikLookup::refresh`] to pick up edited source files.
#[derive(Debug, Clone)]
pub struct CikLookup {
    curated: TickerSource,
    sec: TickerSource,
}

impl Default for CikLookup {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl CikLookup {
    /// Creates a lookup over optional curated CSV and SEC JSON files.
    ///
    /// Nothing is read until [`CikLookup::refresh`] is called.
    pub const fn new(curated_csv: Option<PathBuf>, sec_json: Option<PathBuf>) -> Self {
        Self {
            curated: TickerSource::new(curated_csv, SourceFormat::CuratedCsv),
            sec: TickerSource::new(sec_json, SourceFormat::SecJson),
        }
    }

    /// Creates a lookup and loads both sources.
    pub fn load(curated_csv: Option<PathBuf>, sec_json: Option<PathBuf>) -> Result<Self> {
        let mut lookup = Self::new(curated_csv, sec_json);
        lookup.refresh()?;
        Ok(lookup)
    }

    /// Creates a lookup with an in-memory curated list.
    pub fn from_entries<I, T, C>(entries: I) -> Self
    where
        I: IntoIterator<Item = (T, C)>,
        T: AsRef<str>,
        C: AsRef<str>,
    {
        let mut lookup = Self::default();
        lookup.curated.entries = entries
            .into_iter()
            .map(|(t, c)| (normalize_ticker(t.as_ref()), normalize_cik(c.as_ref())))
            .collect();
        lookup
    }

    /// Reloads sources whose files changed since the last load.
    ///
    /// Returns true if any source was reloaded.
    pub fn refresh(&mut self) -> Result<bool> {
        let curated = self.curated.refresh()?;
        let sec = self.sec.refresh()?;
        Ok(curated || sec)
    }

    /// Resolves a ticker, preferring the curated list.
    pub fn resolve(&self, ticker: &str) -> Option<String> {
        let ticker = normalize_ticker(ticker);
        if ticker.is_empty() {
            return None;
        }
        let found = self
            .curated
            .entries
            .get(&ticker)
            .or_else(|| self.sec.entries.get(&ticker))
            .cloned();
        if found.is_none() {
            debug!(%ticker, "ticker not resolvable");
        }
        found
    }

    /// Returns true if the ticker is on the curated coverage list.
    pub fn is_covered(&self, ticker: &str) -> bool {
        self.curated.entries.contains_key(&normalize_ticker(ticker))
    }

    /// The curated coverage list.
    pub const fn supported(&self) -> &BTreeMap<String, String> {
        &self.curated.entries
    }

    /// Path of the curated source, if any.
    pub fn curated_path(&self) -> Option<&Path> {
        self.curated.path.as_deref()
    }
}
