//! Universe sources: an explicit ticker list, a ticker file, the first column
//! of a spreadsheet, the S&P 500 constituents downloaded over HTTP with a
//! built-in offline fallback, or the NSE equity master list.

use crate::domain::error::ScanError;
use crate::domain::settings::UniverseSpec;
use crate::domain::universe::{
    clean_tickers, normalize_symbol, parse_ticker_lines, Exchange, TickerMeta, Universe,
    UniverseError, SP500_FALLBACK,
};
use crate::ports::universe_port::UniverseSource;
use calamine::{open_workbook_auto, Data, Reader};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub const SP500_CONSTITUENTS_URL: &str =
    "https://raw.githubusercontent.com/datasets/s-and-p-500-companies/main/data/constituents.csv";

pub const NSE_EQUITY_LIST_URL: &str = "https://archives.nseindia.com/content/equities/EQUITY_L.csv";

const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

// The NSE archive rejects requests without a browser-like agent.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; stockscan)";

fn http_get_text(url: &str, timeout: Duration) -> Result<String, String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| e.to_string())?;
    let resp = client
        .get(url)
        .header(reqwest::header::ACCEPT, "text/csv,text/plain,*/*")
        .send()
        .map_err(|e| e.to_string())?;
    if !resp.status().is_success() {
        return Err(format!("HTTP {}", resp.status()));
    }
    resp.text().map_err(|e| e.to_string())
}

pub struct ListUniverse {
    tickers: Vec<String>,
}

impl ListUniverse {
    pub fn new(tickers: Vec<String>) -> Self {
        Self { tickers }
    }
}

impl UniverseSource for ListUniverse {
    fn load(&self) -> Result<Universe, ScanError> {
        Ok(Universe::new("list", self.tickers.clone())?)
    }
}

pub struct FileUniverse {
    path: PathBuf,
}

impl FileUniverse {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl UniverseSource for FileUniverse {
    fn load(&self) -> Result<Universe, ScanError> {
        let label = self.path.display().to_string();
        let content = fs::read_to_string(&self.path).map_err(|e| UniverseError::Unreadable {
            path: label.clone(),
            reason: e.to_string(),
        })?;
        Ok(Universe::new(label, parse_ticker_lines(&content))?)
    }
}

pub struct Sp500Universe {
    url: String,
    timeout: Duration,
}

impl Default for Sp500Universe {
    fn default() -> Self {
        Self {
            url: SP500_CONSTITUENTS_URL.to_string(),
            timeout: HTTP_TIMEOUT,
        }
    }
}

impl Sp500Universe {
    fn download(&self) -> Result<String, String> {
        http_get_text(&self.url, self.timeout)
    }

    fn fallback() -> Result<Universe, ScanError> {
        let tickers = SP500_FALLBACK.iter().map(|t| t.to_string()).collect();
        Ok(Universe::new("sp500", tickers)?)
    }
}

impl UniverseSource for Sp500Universe {
    fn load(&self) -> Result<Universe, ScanError> {
        let parsed = self.download().and_then(|body| parse_constituents(&body));
        match parsed {
            Ok((tickers, meta)) => {
                tracing::info!(tickers = tickers.len(), "loaded S&P 500 constituents");
                Ok(Universe::new("sp500", tickers)?.with_meta(meta))
            }
            Err(reason) => {
                tracing::warn!(reason = %reason, "S&P 500 list unavailable, using offline fallback");
                Self::fallback()
            }
        }
    }
}

/// Parse a constituents CSV with `Symbol`, and optionally `Security`,
/// `GICS Sector` and `GICS Sub-Industry` columns.
pub fn parse_constituents(body: &str) -> Result<(Vec<String>, BTreeMap<String, TickerMeta>), String> {
    let mut rdr = csv::Reader::from_reader(body.as_bytes());
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let column = |name: &str| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(name));

    let symbol_col = column("Symbol").ok_or_else(|| "no Symbol column".to_string())?;
    let name_col = column("Security");
    let sector_col = column("GICS Sector");
    let industry_col = column("GICS Sub-Industry");

    let mut tickers = Vec::new();
    let mut meta = BTreeMap::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let text = |col: Option<usize>| {
            col.and_then(|c| record.get(c))
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };
        let Some(symbol) = text(Some(symbol_col)).map(|s| normalize_symbol(&s)) else {
            continue;
        };
        if meta.contains_key(&symbol) {
            continue;
        }
        meta.insert(
            symbol.clone(),
            TickerMeta {
                name: text(name_col),
                sector: text(sector_col),
                industry: text(industry_col),
                exchange: None,
            },
        );
        tickers.push(symbol);
    }

    if tickers.is_empty() {
        return Err("constituents list is empty".into());
    }
    Ok((tickers, meta))
}

/// Every NSE-listed equity, keyed by its `.NS` symbol. There is no offline
/// fallback: a failed download is a universe error.
pub struct NseUniverse {
    url: String,
    timeout: Duration,
}

impl Default for NseUniverse {
    fn default() -> Self {
        Self {
            url: NSE_EQUITY_LIST_URL.to_string(),
            timeout: HTTP_TIMEOUT,
        }
    }
}

impl UniverseSource for NseUniverse {
    fn load(&self) -> Result<Universe, ScanError> {
        let (tickers, meta) = http_get_text(&self.url, self.timeout)
            .and_then(|body| parse_nse_equity_list(&body))
            .map_err(|reason| UniverseError::Unavailable {
                source_name: "nse".into(),
                reason,
            })?;
        tracing::info!(tickers = tickers.len(), "loaded NSE equity list");
        Ok(Universe::new("nse", tickers)?.with_meta(meta))
    }
}

/// Parse NSE's `EQUITY_L.csv`. Its headers carry stray spaces; the company
/// name column is `NAME OF COMPANY` (older files say `NAME`).
pub fn parse_nse_equity_list(
    body: &str,
) -> Result<(Vec<String>, BTreeMap<String, TickerMeta>), String> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(body.as_bytes());
    let headers = rdr.headers().map_err(|e| e.to_string())?.clone();
    let column = |names: &[&str]| {
        headers
            .iter()
            .position(|h| names.iter().any(|n| h.trim().eq_ignore_ascii_case(n)))
    };
    let symbol_col = column(&["SYMBOL"]).ok_or_else(|| "no SYMBOL column".to_string())?;
    let name_col = column(&["NAME OF COMPANY", "NAME"])
        .ok_or_else(|| "no NAME OF COMPANY column".to_string())?;

    let mut tickers = Vec::new();
    let mut meta = BTreeMap::new();
    for record in rdr.records() {
        let record = record.map_err(|e| e.to_string())?;
        let symbol = record.get(symbol_col).unwrap_or("").trim();
        if symbol.is_empty() || symbol.eq_ignore_ascii_case("nan") || symbol.starts_with('#') {
            continue;
        }
        let ticker = Exchange::Nse.apply(&symbol.to_uppercase());
        if meta.contains_key(&ticker) {
            continue;
        }
        let name = record
            .get(name_col)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from);
        meta.insert(
            ticker.clone(),
            TickerMeta {
                name,
                exchange: Some(Exchange::Nse.to_string()),
                ..TickerMeta::default()
            },
        );
        tickers.push(ticker);
    }

    if tickers.is_empty() {
        return Err("equity list is empty".into());
    }
    Ok((tickers, meta))
}

/// Tickers from the first column of a workbook's first sheet.
pub struct ExcelUniverse {
    path: PathBuf,
}

impl ExcelUniverse {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl UniverseSource for ExcelUniverse {
    fn load(&self) -> Result<Universe, ScanError> {
        let label = self.path.display().to_string();
        let unreadable = |reason: String| UniverseError::Unreadable {
            path: label.clone(),
            reason,
        };
        let mut workbook = open_workbook_auto(&self.path).map_err(|e| unreadable(e.to_string()))?;
        let range = workbook
            .worksheet_range_at(0)
            .ok_or_else(|| unreadable("workbook has no sheets".into()))?
            .map_err(|e| unreadable(e.to_string()))?;

        let cells: Vec<String> = range
            .rows()
            .filter_map(|row| row.first())
            .filter_map(cell_text)
            .collect();
        Ok(Universe::new(label, clean_tickers(cells.iter().map(String::as_str)))?)
    }
}

/// Ticker text for a cell. Whole numbers (numeric codes such as BSE scrip
/// codes) print without a decimal point.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 => Some(format!("{f:.0}")),
        Data::Float(f) => Some(f.to_string()),
        _ => None,
    }
}

/// Build the source a `UniverseSpec` names.
pub fn universe_source(spec: &UniverseSpec) -> Box<dyn UniverseSource> {
    match spec {
        UniverseSpec::Sp500 => Box::new(Sp500Universe::default()),
        UniverseSpec::Nse => Box::new(NseUniverse::default()),
        UniverseSpec::List(tickers) => Box::new(ListUniverse::new(tickers.clone())),
        UniverseSpec::File(path) => Box::new(FileUniverse::new(path.clone())),
        UniverseSpec::Excel(path) => Box::new(ExcelUniverse::new(path.clone())),
    }
}
