//! Pipeline configuration.
//!
//! Every section falls back to its defaults, so a config file only needs the
//! values it changes:
//!
//! ```json
//! {
//!   "drivers": { "tax_rate": 0.25 },
//!   "forecast": { "num_periods": 8 },
//!   "curated_tickers": "data/tickers.csv"
//! }
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use tally_canonical::AggregatorConfig;
use tally_data::edgar::{CikLookup, ExtractorConfig, TagMap};
use tally_forecast::{DriverDefaults, ForecastOptions, ScenarioConfig};
use tracing::info;

/// Configuration for every pipeline stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Dimension allow-lists for extraction
    pub extractor: ExtractorConfig,
    /// Derivation and tie tolerances
    pub aggregator: AggregatorConfig,
    /// Driver fallbacks and trailing window
    pub drivers: DriverDefaults,
    /// Bull and bear shifts
    pub scenarios: ScenarioConfig,
    /// Forecast horizon
    pub forecast: ForecastOptions,
    /// Extra tag mappings (`xbrl_tag,line_item,statement`)
    pub tags_csv: Option<PathBuf>,
    /// Curated coverage list (`ticker,cik`)
    pub curated_tickers: Option<PathBuf>,
    /// SEC `company_tickers.json`
    pub sec_tickers: Option<PathBuf>,
}

impl TallyConfig {
    /// Parses a JSON config.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Loads a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        info!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// The standard tag vocabulary plus any configured extension.
    ///
    /// # Errors
    ///
    /// Returns an error if the extension file cannot be read.
    pub fn tag_map(&self) -> Result<TagMap> {
        let mut tags = TagMap::standard();
        if let Some(path) = &self.tags_csv {
            let added = tags.extend_from_csv(File::open(path)?)?;
            info!(path = %path.display(), added, "extended tag vocabulary");
        }
        Ok(tags)
    }

    /// Ticker lookup over the configured sources.
    ///
    /// # Errors
    ///
    /// Returns an error if a present source cannot be parsed.
    pub fn cik_lookup(&self) -> Result<CikLookup> {
        Ok(CikLookup::load(
            self.curated_tickers.clone(),
            self.sec_tickers.clone(),
        )?)
    }
}
