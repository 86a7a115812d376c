//! End-to-end orchestration for one fact store.
//!
//! A [`Pipeline`] owns the store, the tag vocabulary, the ticker lookup and the
//! configuration. Ingestion extracts inline XBRL into raw facts,
//! materialization rebuilds a ticker's canonical facts, and the read side
//! assembles the summary, statements, model and backtest views from canonical
//! facts.

use crate::config::TallyConfig;
use crate::error::{Result, TallyError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tally_canonical::{MaterializeOutcome, TieCheck, TiePolicy, materialize_canonical_for_ticker};
use tally_data::edgar::{CikLookup, FilingMeta, TagMap, XbrlExtractor};
use tally_data::{CanonicalFact, FactStore, Filing, schema};
use tally_forecast::{
    Drivers, ForecastPeriod, ForecastSummary, MetricSeries, MetricValue, build_forecast,
    build_forecast_summary, compute_drivers,
};
use tally_output::{
    BacktestMetrics, BacktestMode, ModelView, PeriodCoverage, StatementsView,
    applicable_from_raw, build_model, build_statements, compute_coverage, compute_tie_checks,
    revenue_backtest,
};
use tracing::{debug, info, instrument};

/// Registered filings shown in a summary.
const SUMMARY_FILINGS: usize = 5;

/// Counts from ingesting one filing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestOutcome {
    /// Facts the extractor produced
    pub extracted: usize,
    /// Facts written to the store
    pub inserted: usize,
    /// Facts outside the canonical schema
    pub dropped: usize,
}

/// Values of one reported period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryPeriod {
    /// Period end
    pub period_end: NaiveDate,
    /// Values by line item
    pub values: BTreeMap<String, MetricValue>,
}

/// Everything known about one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Ticker symbol
    pub ticker: String,
    /// Whether a ticker source knows the ticker
    pub resolvable: bool,
    /// Whether the ticker is on the curated coverage list
    pub covered: bool,
    /// Resolved CIK, or the CIK recorded on stored facts
    pub cik: Option<String>,
    /// Stored raw facts outside the canonical schema
    pub dropped_facts: usize,
    /// Reported periods, newest first
    pub periods: Vec<SummaryPeriod>,
    /// Most recently filed registered filings
    pub filings: Vec<Filing>,
    /// Drivers computed from the reported periods
    pub drivers: Drivers,
    /// Forecast periods for every scenario
    pub forecast: Vec<ForecastPeriod>,
    /// Bands across scenarios
    pub forecast_summary: ForecastSummary,
    /// Line item coverage per period
    pub coverage: BTreeMap<NaiveDate, PeriodCoverage>,
    /// Quarterized tie checks per period
    pub ties: BTreeMap<NaiveDate, TieCheck>,
    /// Rolling revenue backtest
    pub backtest: Option<BacktestMetrics>,
    /// Revenue backtest recomputing drivers from full history at each step
    pub backtest_time_travel: Option<BacktestMetrics>,
}

/// Revenue backtests restricted to a date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Latest period end considered
    pub as_of: NaiveDate,
    /// Rolling revenue backtest
    pub backtest: Option<BacktestMetrics>,
    /// Revenue backtest recomputing drivers from full history at each step
    pub backtest_time_travel: Option<BacktestMetrics>,
}

/// Ingestion, materialization and read views over one fact store.
#[derive(Debug)]
pub struct Pipeline<S: FactStore> {
    store: S,
    tags: TagMap,
    tickers: CikLookup,
    config: TallyConfig,
}

impl<S: FactStore> Pipeline<S> {
    /// Creates a pipeline with the configured tag vocabulary and ticker sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured source cannot be read.
    pub fn new(store: S, config: TallyConfig) -> Result<Self> {
        let tags = config.tag_map()?;
        let tickers = config.cik_lookup()?;
        Ok(Self::with_lookup(store, tags, tickers, config))
    }

    /// Creates a pipeline from already built lookup services.
    pub const fn with_lookup(
        store: S,
        tags: TagMap,
        tickers: CikLookup,
        config: TallyConfig,
    ) -> Self {
        Self {
            store,
            tags,
            tickers,
            config,
        }
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// The ticker lookup.
    pub const fn tickers(&self) -> &CikLookup {
        &self.tickers
    }

    /// The configuration.
    pub const fn config(&self) -> &TallyConfig {
        &self.config
    }

    /// Reloads ticker sources whose files changed.
    ///
    /// # Errors
    ///
    /// Returns an error if a changed source cannot be parsed.
    pub fn refresh_tickers(&mut self) -> Result<bool> {
        Ok(self.tickers.refresh()?)
    }

    /// Resolves a ticker to its CIK.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::CikNotFound`] if no ticker source knows it.
    pub fn resolve_cik(&self, ticker: &str) -> Result<String> {
        self.tickers
            .resolve(ticker)
            .ok_or_else(|| TallyError::CikNotFound(ticker.trim().to_uppercase()))
    }

    /// A filing record for a ticker's accession, with the CIK resolved.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::CikNotFound`] if the ticker cannot be resolved.
    pub fn filing(&self, ticker: &str, accession: &str) -> Result<Filing> {
        Ok(Filing {
            ticker: ticker.trim().to_uppercase(),
            cik: self.resolve_cik(ticker)?,
            accession: accession.trim().to_string(),
            form: None,
            filed_at: None,
            path: None,
            submissions_path: None,
        })
    }

    /// Extracts one filing document, persists its facts and registers it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    #[instrument(skip(self, filing, content), fields(ticker = %filing.ticker, accession = %filing.accession))]
    pub fn ingest_filing(&self, filing: &Filing, content: &[u8]) -> Result<IngestOutcome> {
        let mut meta = FilingMeta::new(&filing.ticker, &filing.cik, &filing.accession);
        if let Some(path) = &filing.path {
            meta = meta.with_source_path(path.clone());
        }
        let extraction =
            XbrlExtractor::new(&self.tags, &self.config.extractor).extract(content, &meta);
        let persisted = self.store.persist_facts(&extraction.facts)?;
        self.store.upsert_filing(filing)?;

        let outcome = IngestOutcome {
            extracted: extraction.facts.len(),
            inserted: persisted.inserted,
            dropped: persisted.dropped,
        };
        info!(
            extracted = outcome.extracted,
            inserted = outcome.inserted,
            dropped = outcome.dropped,
            unmapped = extraction.unmapped,
            "ingested filing"
        );
        Ok(outcome)
    }

    /// Reads a filing document from disk and ingests it.
    ///
    /// The path is recorded on the filing unless it already names one.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the store rejects the
    /// write.
    pub fn ingest_path(&self, filing: &Filing, path: &Path) -> Result<IngestOutcome> {
        let content = std::fs::read(path)?;
        let mut filing = filing.clone();
        if filing.path.is_none() {
            filing.path = Some(path.display().to_string());
        }
        self.ingest_filing(&filing, &content)
    }

    /// Rebuilds a ticker's canonical facts.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure, or on tie violations when `policy`
    /// is enforcing.
    #[instrument(skip(self))]
    pub fn materialize(&self, ticker: &str, policy: TiePolicy) -> Result<MaterializeOutcome> {
        let outcome =
            materialize_canonical_for_ticker(&self.store, ticker, &self.config.aggregator, policy)?;
        info!(
            inserted = outcome.inserted,
            dropped = outcome.dropped,
            violations = outcome.violations().len(),
            "materialized canonical facts"
        );
        Ok(outcome)
    }

    /// Canonical facts of a ticker.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn canonical(&self, ticker: &str) -> Result<Vec<CanonicalFact>> {
        Ok(self.store.list_canonical(ticker)?)
    }

    fn forecast(&self, series: &MetricSeries) -> (Drivers, Vec<ForecastPeriod>) {
        let drivers = compute_drivers(series, &self.config.drivers);
        let forecast = series
            .latest()
            .map(|(anchor_date, anchor)| {
                build_forecast(
                    anchor_date,
                    anchor,
                    &drivers,
                    &self.config.forecast,
                    &self.config.scenarios,
                )
            })
            .unwrap_or_default();
        (drivers, forecast)
    }

    /// Assembles the summary of a ticker.
    ///
    /// An unknown ticker is reported through `resolvable` rather than an error,
    /// and a ticker without facts yields empty sections.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    #[instrument(skip(self))]
    pub fn summary(&self, ticker: &str) -> Result<Summary> {
        let ticker = ticker.trim().to_uppercase();
        let resolved = self.tickers.resolve(&ticker);
        let canonical = self.store.list_canonical(&ticker)?;
        let raw = self.store.list_facts(&ticker)?;
        let mut filings = self.store.list_filings(&ticker)?;
        filings.truncate(SUMMARY_FILINGS);

        let series = MetricSeries::from_canonical(&canonical);
        let (drivers, forecast) = self.forecast(&series);
        let dropped_facts = raw
            .iter()
            .filter(|fact| !schema::is_allowed(fact.statement, &fact.line_item))
            .count();
        let periods = series
            .newest_first()
            .map(|(period_end, metrics)| SummaryPeriod {
                period_end,
                values: metrics.values.clone(),
            })
            .collect();
        debug!(
            periods = series.len(),
            drivers = drivers.len(),
            forecast = forecast.len(),
            "assembled summary"
        );

        Ok(Summary {
            resolvable: resolved.is_some(),
            covered: self.tickers.is_covered(&ticker),
            cik: resolved.or_else(|| canonical.first().map(|fact| fact.cik.clone())),
            dropped_facts,
            periods,
            filings,
            forecast_summary: build_forecast_summary(&forecast),
            coverage: compute_coverage(&series, Some(&applicable_from_raw(&raw))),
            ties: compute_tie_checks(&series, &self.config.aggregator),
            backtest: revenue_backtest(&series, BacktestMode::Rolling, &self.config.drivers),
            backtest_time_travel: revenue_backtest(
                &series,
                BacktestMode::TimeTravel,
                &self.config.drivers,
            ),
            drivers,
            forecast,
            ticker,
        })
    }

    /// Statement view of a ticker's most recent `limit` periods.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn statements(&self, ticker: &str, limit: usize) -> Result<StatementsView> {
        let canonical = self.store.list_canonical(ticker)?;
        let filings = self.store.list_filings(ticker)?;
        Ok(build_statements(ticker, &canonical, &filings, limit))
    }

    /// Model view with `actuals_limit` actual periods per statement.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn model(&self, ticker: &str, actuals_limit: usize) -> Result<ModelView> {
        let series = MetricSeries::from_canonical(&self.store.list_canonical(ticker)?);
        let (drivers, forecast) = self.forecast(&series);
        Ok(build_model(ticker, &series, &drivers, &forecast, actuals_limit))
    }

    /// Revenue backtests on the canonical facts ending on or before `as_of`.
    ///
    /// # Errors
    ///
    /// Returns an error on store failure.
    pub fn backtest_as_of(&self, ticker: &str, as_of: NaiveDate) -> Result<BacktestReport> {
        let canonical = self.store.list_canonical_as_of(ticker, as_of)?;
        let series = MetricSeries::from_canonical(&canonical);
        Ok(BacktestReport {
            as_of,
            backtest: revenue_backtest(&series, BacktestMode::Rolling, &self.config.drivers),
            backtest_time_travel: revenue_backtest(
                &series,
                BacktestMode::TimeTravel,
                &self.config.drivers,
            ),
        })
    }
}
