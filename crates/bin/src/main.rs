//! Tally CLI binary.
//!
//! Ingests inline XBRL filings into a local SQLite store and prints canonical
//! statements, forecasts and quality diagnostics.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process;
use tally::forecast::MetricSeries;
use tally::{Pipeline, TallyConfig};
use tally_canonical::{TieCheck, TiePolicy};
use tally_data::store::frame::canonical_frame;
use tally_data::{FactStore, Filing, SqliteStore};
use tally_output::{
    DEFAULT_ACTUALS_LIMIT, DEFAULT_STATEMENT_PERIODS, ExportFormat, Exporter, coverage_mismatches,
    period_start_consistent,
};
use tracing::level_filters::LevelFilter;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Tally: fundamentals and forecasts from SEC filings", long_about = None)]
#[command(version)]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a filing document, or a directory of `<accession>.htm` files
    Ingest {
        /// Ticker symbol
        ticker: String,

        /// Filing document or directory
        path: PathBuf,

        /// Accession number (defaults to the file stem)
        #[arg(long)]
        accession: Option<String>,

        /// Form type, e.g. 10-Q
        #[arg(long)]
        form: Option<String>,

        /// Filing date (YYYY-MM-DD)
        #[arg(long)]
        filed_at: Option<NaiveDate>,
    },

    /// Rebuild canonical facts for a ticker
    Materialize {
        /// Ticker symbol
        ticker: String,

        /// Fail on tie check violations
        #[arg(long)]
        strict: bool,
    },

    /// Print the summary of a ticker
    Summary {
        /// Ticker symbol
        ticker: String,
    },

    /// Print statements grouped by period
    Statements {
        /// Ticker symbol
        ticker: String,

        /// Number of periods
        #[arg(long, default_value_t = DEFAULT_STATEMENT_PERIODS)]
        limit: usize,

        /// Print canonical facts as a table instead of JSON
        #[arg(long)]
        table: bool,
    },

    /// Print actuals and forecasts per statement
    Model {
        /// Ticker symbol
        ticker: String,

        /// Number of actual periods
        #[arg(long, default_value_t = DEFAULT_ACTUALS_LIMIT)]
        actuals_limit: usize,
    },

    /// Run revenue backtests
    Backtest {
        /// Ticker symbol
        ticker: String,

        /// Only use periods ending on or before this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },

    /// Print coverage, tie checks and view parity
    Quality {
        /// Ticker symbol
        ticker: String,
    },

    /// Export canonical facts, forecasts or tie checks
    Export {
        /// Ticker symbol
        ticker: String,

        /// What to export
        #[arg(long, value_enum, default_value_t = ExportKind::Canonical)]
        what: ExportKind,

        /// Output format (csv, json or pretty-json)
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Output file (defaults to stdout)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Resolve a ticker, or list the curated coverage
    Tickers {
        /// Ticker symbol
        ticker: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportKind {
    /// Canonical facts
    Canonical,
    /// Forecast periods, one row per value
    Forecast,
    /// Quarterized tie checks
    Ties,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tally")
        .join("tally.db")
}

fn open_pipeline(cli: &Cli) -> CliResult<Pipeline<SqliteStore>> {
    let config = match &cli.config {
        Some(path) => TallyConfig::load(path)?,
        None => TallyConfig::default(),
    };
    let db = cli.db.clone().unwrap_or_else(default_db_path);
    if let Some(parent) = db.parent() {
        std::fs::create_dir_all(parent)?;
    }
    info!(db = %db.display(), "opening store");
    Ok(Pipeline::new(SqliteStore::new(&db)?, config)?)
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let pipeline = open_pipeline(&cli)?;

    match cli.command {
        Commands::Ingest {
            ticker,
            path,
            accession,
            form,
            filed_at,
        } => {
            let template = Filing {
                form,
                filed_at,
                ..pipeline.filing(&ticker, "")?
            };
            ingest(&pipeline, &template, &path, accession.as_deref())?;
        }
        Commands::Materialize { ticker, strict } => {
            let outcome = pipeline.materialize(&ticker, TiePolicy::from_strict(strict))?;
            println!(
                "{}: {} canonical facts, {} dropped, {} tie violations",
                ticker.to_uppercase(),
                outcome.inserted,
                outcome.dropped,
                outcome.violations().len()
            );
        }
        Commands::Summary { ticker } => {
            print_json(&pipeline.summary(&ticker)?)?;
        }
        Commands::Statements {
            ticker,
            limit,
            table,
        } => {
            if table {
                print_table(&pipeline, &ticker, limit)?;
            } else {
                print_json(&pipeline.statements(&ticker, limit)?)?;
            }
        }
        Commands::Model {
            ticker,
            actuals_limit,
        } => {
            print_json(&pipeline.model(&ticker, actuals_limit)?)?;
        }
        Commands::Backtest { ticker, as_of } => match as_of {
            Some(as_of) => print_json(&pipeline.backtest_as_of(&ticker, as_of)?)?,
            None => {
                let summary = pipeline.summary(&ticker)?;
                print_json(&json!({
                    "ticker": summary.ticker,
                    "backtest": summary.backtest,
                    "backtest_time_travel": summary.backtest_time_travel,
                }))?;
            }
        },
        Commands::Quality { ticker } => quality(&pipeline, &ticker)?,
        Commands::Export {
            ticker,
            what,
            format,
            output,
        } => {
            let content = match what {
                ExportKind::Canonical => pipeline.canonical(&ticker)?.export_to_string(format)?,
                ExportKind::Forecast => {
                    let forecast = pipeline.summary(&ticker)?.forecast;
                    forecast.export_to_string(format)?
                }
                ExportKind::Ties => {
                    let ties: Vec<TieCheck> =
                        pipeline.summary(&ticker)?.ties.into_values().collect();
                    ties.export_to_string(format)?
                }
            };
            match output {
                Some(path) => {
                    std::fs::write(&path, content)?;
                    info!(path = %path.display(), "exported");
                }
                None => print!("{content}"),
            }
        }
        Commands::Tickers { ticker } => match ticker {
            Some(ticker) => print_json(&json!({
                "ticker": ticker.trim().to_uppercase(),
                "cik": pipeline.tickers().resolve(&ticker),
                "covered": pipeline.tickers().is_covered(&ticker),
            }))?,
            None => print_json(pipeline.tickers().supported())?,
        },
    }

    Ok(())
}

fn is_filing_document(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("htm") || ext.eq_ignore_ascii_case("html"))
}

fn accession_of(path: &Path) -> CliResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("cannot derive accession from {}", path.display()).into())
}

fn ingest<S: FactStore>(
    pipeline: &Pipeline<S>,
    template: &Filing,
    path: &Path,
    accession: Option<&str>,
) -> CliResult<()> {
    if path.is_file() {
        let accession = match accession {
            Some(accession) => accession.to_string(),
            None => accession_of(path)?,
        };
        let filing = Filing {
            accession,
            ..template.clone()
        };
        let outcome = pipeline.ingest_path(&filing, path)?;
        println!(
            "{}: {} extracted, {} inserted, {} dropped",
            filing.accession, outcome.extracted, outcome.inserted, outcome.dropped
        );
        return Ok(());
    }

    let mut documents: Vec<PathBuf> = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| is_filing_document(p))
        .collect();
    documents.sort();

    let pb = ProgressBar::new(documents.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let (mut inserted, mut failed) = (0, 0);
    for document in &documents {
        let result = accession_of(document).and_then(|accession| {
            pb.set_message(accession.clone());
            let filing = Filing {
                accession,
                ..template.clone()
            };
            Ok(pipeline.ingest_path(&filing, document)?)
        });
        match result {
            Ok(outcome) => inserted += outcome.inserted,
            Err(e) => {
                warn!(path = %document.display(), error = %e, "ingest failed");
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_with_message(format!("{inserted} facts inserted, {failed} failed"));
    Ok(())
}

fn print_table<S: FactStore>(
    pipeline: &Pipeline<S>,
    ticker: &str,
    limit: usize,
) -> CliResult<()> {
    let facts = pipeline.canonical(ticker)?;
    let mut ends: Vec<NaiveDate> = facts.iter().map(|fact| fact.period_end).collect();
    ends.sort_unstable_by(|a, b| b.cmp(a));
    ends.dedup();
    ends.truncate(limit);
    let recent: Vec<_> = facts
        .into_iter()
        .filter(|fact| ends.contains(&fact.period_end))
        .collect();
    println!("{}", canonical_frame(&recent)?);
    Ok(())
}

fn quality<S: FactStore>(pipeline: &Pipeline<S>, ticker: &str) -> CliResult<()> {
    let summary = pipeline.summary(ticker)?;
    let statements = pipeline.statements(ticker, 1)?;

    let latest = summary.periods.first().map(|period| period.period_end);
    let parity = coverage_mismatches(
        latest,
        latest.and_then(|end| summary.coverage.get(&end)),
        statements.periods.first(),
    );
    let series = MetricSeries::from_canonical(&pipeline.canonical(ticker)?);
    let cash_flow_starts = series.latest().map(|(_, period)| {
        let (consistent, starts) = period_start_consistent(period, &["cfo", "cfi", "cff"]);
        json!({ "consistent": consistent, "starts": starts })
    });

    print_json(&json!({
        "ticker": summary.ticker,
        "coverage": summary.coverage,
        "ties": summary.ties,
        "backtest_time_travel": summary.backtest_time_travel,
        "parity": parity,
        "cash_flow_period_start": cash_flow_starts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_args() {
        let cli = Cli::try_parse_from([
            "tally", "export", "aapl", "--what", "ties", "--format", "json", "--db", "t.db",
        ])
        .unwrap();
        assert_eq!(cli.db, Some(PathBuf::from("t.db")));
        assert!(matches!(
            cli.command,
            Commands::Export {
                what: ExportKind::Ties,
                format: ExportFormat::Json,
                output: None,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["tally", "export", "aapl", "--format", "xlsx"]).is_err());
    }

    #[test]
    fn test_ingest_args() {
        let cli = Cli::try_parse_from([
            "tally",
            "ingest",
            "aapl",
            "filings/",
            "--form",
            "10-Q",
            "--filed-at",
            "2024-08-02",
        ])
        .unwrap();
        let Commands::Ingest {
            filed_at, form, ..
        } = cli.command
        else {
            panic!("expected ingest");
        };
        assert_eq!(filed_at, NaiveDate::from_ymd_opt(2024, 8, 2));
        assert_eq!(form.as_deref(), Some("10-Q"));
    }

    #[test]
    fn test_filing_documents() {
        assert!(is_filing_document(Path::new("0000320193-24-000081.htm")));
        assert!(is_filing_document(Path::new("a/b.HTML")));
        assert!(!is_filing_document(Path::new("index.json")));
        assert_eq!(
            accession_of(Path::new("dir/0000320193-24-000081.htm")).unwrap(),
            "0000320193-24-000081"
        );
    }
}
