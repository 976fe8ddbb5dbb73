//! JSON export for a static dashboard: `good_stocks.json`, `manifest.json`
//! and `categories.json` in one directory, plus optional per-ticker price
//! history CSVs under `prices/`.

use crate::domain::aggregate::ScanRow;
use crate::domain::categories::{build_categories, Categories};
use crate::domain::error::ScanError;
use crate::domain::scan::ScanReport;
use crate::domain::universe::Universe;
use crate::ports::price_port::PriceSource;
use crate::ports::sink_port::ScanSink;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

const SINK: &str = "json";
const PRICES_SINK: &str = "prices";

/// Dashboards list at most this many candidates.
pub const DEFAULT_MAX_ROWS: usize = 200;

#[derive(Debug, Serialize)]
struct SiteRow<'a> {
    #[serde(flatten)]
    row: &'a ScanRow,
    #[serde(rename = "Name", skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(rename = "Exchange", skip_serializing_if = "Option::is_none")]
    exchange: Option<&'a str>,
    #[serde(rename = "Sector", skip_serializing_if = "Option::is_none")]
    sector: Option<&'a str>,
    #[serde(rename = "Industry", skip_serializing_if = "Option::is_none")]
    industry: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct GoodStocks<'a> {
    generated_utc: String,
    rows: Vec<SiteRow<'a>>,
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    last_updated_utc: String,
    universe: &'a str,
    tickers_count: usize,
    skipped_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    history_sessions: Option<usize>,
}

#[derive(Debug, Serialize)]
struct CategoriesFile {
    generated_utc: String,
    #[serde(flatten)]
    categories: Categories,
}

pub struct JsonExportSink {
    dir: PathBuf,
    max_rows: usize,
    history_sessions: Option<usize>,
}

impl JsonExportSink {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            max_rows: DEFAULT_MAX_ROWS,
            history_sessions: None,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Record in the manifest how much history the price CSVs carry.
    pub fn with_history_sessions(mut self, sessions: usize) -> Self {
        self.history_sessions = Some(sessions);
        self
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), ScanError> {
        let path = self.dir.join(file);
        let body = serde_json::to_string_pretty(value).map_err(|e| ScanError::sink(SINK, e))?;
        fs::write(&path, body).map_err(|e| ScanError::sink(SINK, format!("{}: {}", path.display(), e)))
    }
}

impl ScanSink for JsonExportSink {
    fn name(&self) -> &'static str {
        SINK
    }

    fn write(&self, report: &ScanReport, universe: &Universe) -> Result<(), ScanError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| ScanError::sink(SINK, format!("{}: {}", self.dir.display(), e)))?;
        let generated = report.timestamp();
        let top = &report.rows[..report.rows.len().min(self.max_rows)];

        let rows = top
            .iter()
            .map(|row| {
                let meta = universe.meta(&row.ticker);
                SiteRow {
                    row,
                    name: meta.and_then(|m| m.name.as_deref()),
                    exchange: meta.and_then(|m| m.exchange.as_deref()),
                    sector: meta.and_then(|m| m.sector.as_deref()),
                    industry: meta.and_then(|m| m.industry.as_deref()),
                }
            })
            .collect();

        self.write_json(
            "good_stocks.json",
            &GoodStocks {
                generated_utc: generated.clone(),
                rows,
            },
        )?;
        self.write_json(
            "manifest.json",
            &Manifest {
                last_updated_utc: generated.clone(),
                universe: &universe.label,
                tickers_count: report.universe_size,
                skipped_count: report.skipped.len(),
                history_sessions: self.history_sessions,
            },
        )?;
        self.write_json(
            "categories.json",
            &CategoriesFile {
                generated_utc: generated,
                categories: build_categories(top, universe),
            },
        )?;

        tracing::info!(dir = %self.dir.display(), rows = top.len(), "wrote JSON export");
        Ok(())
    }
}

/// File-system-safe, upper-cased form of a ticker (`^GSPC` -> `_GSPC`).
pub fn safe_filename(ticker: &str) -> String {
    ticker
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '^') { '_' } else { c })
        .collect::<String>()
        .to_uppercase()
}

/// Writes `<dir>/<TICKER>.csv` with daily OHLCV history for every ticker in
/// the universe, so the dashboard can chart names that did not trigger.
/// Tickers whose history cannot be fetched are skipped with a warning.
pub struct PriceHistoryExport<'a> {
    dir: PathBuf,
    prices: &'a dyn PriceSource,
    sessions: usize,
}

impl<'a> PriceHistoryExport<'a> {
    pub fn new(dir: PathBuf, prices: &'a dyn PriceSource, sessions: usize) -> Self {
        Self {
            dir,
            prices,
            sessions,
        }
    }

    fn write_ticker(&self, ticker: &str) -> Result<(), ScanError> {
        let points = self.prices.fetch(ticker, self.sessions)?;
        let path = self.dir.join(format!("{}.csv", safe_filename(ticker)));
        let fail = |e: csv::Error| ScanError::sink(PRICES_SINK, format!("{}: {}", path.display(), e));

        let mut wtr = csv::Writer::from_path(&path).map_err(fail)?;
        wtr.write_record(["Date", "Open", "High", "Low", "Close", "Volume"])
            .map_err(fail)?;
        for p in &points {
            wtr.write_record([
                p.date.format("%Y-%m-%d").to_string(),
                p.open.to_string(),
                p.high.to_string(),
                p.low.to_string(),
                p.close.to_string(),
                p.volume.to_string(),
            ])
            .map_err(fail)?;
        }
        wtr.flush()
            .map_err(|e| ScanError::sink(PRICES_SINK, format!("{}: {}", path.display(), e)))
    }
}

impl ScanSink for PriceHistoryExport<'_> {
    fn name(&self) -> &'static str {
        PRICES_SINK
    }

    fn write(&self, _report: &ScanReport, universe: &Universe) -> Result<(), ScanError> {
        fs::create_dir_all(&self.dir)
            .map_err(|e| ScanError::sink(PRICES_SINK, format!("{}: {}", self.dir.display(), e)))?;

        let mut written = 0;
        for ticker in &universe.tickers {
            match self.write_ticker(ticker) {
                Ok(()) => written += 1,
                Err(e @ ScanError::DataUnavailable { .. }) => {
                    tracing::warn!(ticker = %ticker, error = %e, "no price history to export");
                }
                Err(e) => return Err(e),
            }
        }
        tracing::info!(dir = %self.dir.display(), written, "wrote price history CSVs");
        Ok(())
    }
}
