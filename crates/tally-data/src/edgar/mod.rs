//! SEC EDGAR filing ingestion.
//!
//! - [`tags`]: curated concept vocabulary
//! - [`xbrl`]: inline XBRL fact extraction
//! - [`tickers`]: ticker to CIK resolution

pub mod tags;
pub mod tickers;
pub mod xbrl;

pub use tags::{TagMap, TagMapping};
pub use tickers::CikLookup;
pub use xbrl::{Extraction, ExtractorConfig, FilingMeta, XbrlExtractor};
