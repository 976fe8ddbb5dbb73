//! Ticker universes: the list of symbols a scan walks, plus whatever
//! descriptive metadata the source could supply for each.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// Used when the S&P 500 constituent list cannot be downloaded.
pub const SP500_FALLBACK: [&str; 8] = ["AAPL", "MSFT", "NVDA", "AMZN", "GOOGL", "META", "BRK-B", "AVGO"];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TickerMeta {
    pub name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub exchange: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    /// Human-readable origin, e.g. `sp500` or a file path.
    pub label: String,
    pub tickers: Vec<String>,
    pub meta: BTreeMap<String, TickerMeta>,
}

impl Universe {
    pub fn new(label: impl Into<String>, tickers: Vec<String>) -> Result<Self, UniverseError> {
        let label = label.into();
        if tickers.is_empty() {
            return Err(UniverseError::Empty(label));
        }
        Ok(Self {
            label,
            tickers,
            meta: BTreeMap::new(),
        })
    }

    pub fn with_meta(mut self, meta: BTreeMap<String, TickerMeta>) -> Self {
        self.meta = meta;
        self
    }

    pub fn count(&self) -> usize {
        self.tickers.len()
    }

    pub fn meta(&self, ticker: &str) -> Option<&TickerMeta> {
        self.meta.get(ticker)
    }

    /// Keep the first `max` tickers in sorted order when the universe is
    /// larger than that. Metadata for dropped tickers goes with them.
    pub fn capped(mut self, max: usize) -> Self {
        if self.tickers.len() <= max {
            return self;
        }
        self.tickers.sort();
        self.tickers.dedup();
        self.tickers.truncate(max);
        let kept: HashSet<&String> = self.tickers.iter().collect();
        self.meta.retain(|ticker, _| kept.contains(ticker));
        self
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in ticker list")]
    EmptyToken,

    #[error("duplicate ticker: {0}")]
    DuplicateCode(String),

    #[error("universe '{0}' has no tickers")]
    Empty(String),

    #[error("cannot read universe file {path}: {reason}")]
    Unreadable { path: String, reason: String },

    #[error("universe source {source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },
}

/// Parse a comma-separated ticker list. Tokens are upper-cased; empty tokens
/// and duplicates are errors.
pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

/// Parse a universe file: one ticker per line, or a CSV whose first column
/// is the ticker. Blank lines, `#` comments and a `ticker`/`symbol` header
/// are skipped; repeats keep their first position.
pub fn parse_ticker_lines(content: &str) -> Vec<String> {
    clean_tickers(
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.starts_with('#'))
            .filter_map(|line| line.split(',').next()),
    )
}

/// Shared cleanup for ticker cells from any tabular source: trim, strip
/// quotes, upper-case, drop blanks, `NAN`, comments and header words, dedupe.
pub fn clean_tickers<'a>(cells: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    cells
        .into_iter()
        .map(|cell| cell.trim().trim_matches('"').trim().to_uppercase())
        .filter(|t| !t.is_empty() && !t.starts_with('#'))
        .filter(|t| !matches!(t.as_str(), "TICKER" | "SYMBOL" | "NAN"))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Index-provider symbols use `.` for share classes; price feeds use `-`.
/// A trailing exchange suffix (`.NS`, `.BO`) is kept as is.
pub fn normalize_symbol(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    match Exchange::split_suffix(&upper) {
        Some((base, exchange)) => format!("{}{}", base.replace('.', "-"), exchange.suffix()),
        None => upper.replace('.', "-"),
    }
}

/// Listing venue for a bare symbol. Price feeds key Indian listings with a
/// venue suffix; US symbols go bare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Exchange {
    Nse,
    Bse,
    #[default]
    Us,
}

impl Exchange {
    pub fn suffix(self) -> &'static str {
        match self {
            Exchange::Nse => ".NS",
            Exchange::Bse => ".BO",
            Exchange::Us => "",
        }
    }

    /// Split an upper-cased symbol into its base and venue when it carries a
    /// known suffix.
    fn split_suffix(symbol: &str) -> Option<(&str, Exchange)> {
        [Exchange::Nse, Exchange::Bse].into_iter().find_map(|exchange| {
            symbol
                .strip_suffix(exchange.suffix())
                .filter(|base| !base.is_empty())
                .map(|base| (base, exchange))
        })
    }

    /// Qualify a normalized symbol for this venue. Symbols that already carry
    /// a venue suffix are left alone.
    pub fn apply(self, symbol: &str) -> String {
        if Exchange::split_suffix(symbol).is_some() {
            symbol.to_string()
        } else {
            format!("{}{}", symbol, self.suffix())
        }
    }
}

impl std::str::FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nse" | "ns" => Ok(Exchange::Nse),
            "bse" | "bo" => Ok(Exchange::Bse),
            "us" => Ok(Exchange::Us),
            other => Err(format!("unknown exchange '{other}' (expected nse, bse or us)")),
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Exchange::Nse => "NSE",
            Exchange::Bse => "BSE",
            Exchange::Us => "US",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_codes_basic() {
        let result = parse_codes("AAPL,MSFT,NVDA").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "NVDA"]);
    }

    #[test]
    fn parse_codes_trims_and_uppercases() {
        let result = parse_codes("  aapl , msft ,Brk-b").unwrap();
        assert_eq!(result, vec!["AAPL", "MSFT", "BRK-B"]);
    }

    #[test]
    fn parse_codes_empty_token() {
        assert!(matches!(parse_codes("AAPL,,MSFT"), Err(UniverseError::EmptyToken)));
    }

    #[test]
    fn parse_codes_duplicate() {
        let result = parse_codes("AAPL,MSFT,aapl");
        assert!(matches!(result, Err(UniverseError::DuplicateCode(s)) if s == "AAPL"));
    }

    #[test]
    fn ticker_lines_skip_comments_and_blanks() {
        let content = "# watchlist\nAAPL\n\n  msft  \n#NVDA\nAAPL\n";
        assert_eq!(parse_ticker_lines(content), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn ticker_lines_take_first_csv_column() {
        let content = "Ticker,Name\nAAPL,Apple Inc.\n\"MSFT\",Microsoft\n";
        assert_eq!(parse_ticker_lines(content), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn clean_tickers_drops_noise() {
        let cells = [" aapl ", "", "nan", "#skip", "Ticker", "\"msft\"", "AAPL"];
        assert_eq!(clean_tickers(cells), vec!["AAPL", "MSFT"]);
    }

    #[test]
    fn capped_keeps_first_sorted() {
        let mut meta = BTreeMap::new();
        for t in ["ZZZ", "AAA", "MMM"] {
            meta.insert(t.to_string(), TickerMeta::default());
        }
        let universe = Universe::new("nse", vec!["ZZZ".into(), "AAA".into(), "MMM".into()])
            .unwrap()
            .with_meta(meta);

        let capped = universe.clone().capped(2);
        assert_eq!(capped.tickers, vec!["AAA", "MMM"]);
        assert!(capped.meta("ZZZ").is_none());

        let untouched = universe.capped(3);
        assert_eq!(untouched.tickers, vec!["ZZZ", "AAA", "MMM"]);
    }

    #[test]
    fn normalize_share_class() {
        assert_eq!(normalize_symbol("brk.b"), "BRK-B");
    }

    #[test]
    fn normalize_keeps_exchange_suffix() {
        assert_eq!(normalize_symbol("RELIANCE.NS"), "RELIANCE.NS");
        assert_eq!(normalize_symbol(" tcs.bo "), "TCS.BO");
        assert_eq!(normalize_symbol("m.m.ns"), "M-M.NS");
        assert_eq!(normalize_symbol(".NS"), "-NS");
    }

    #[test]
    fn exchange_qualifies_bare_symbols() {
        assert_eq!(Exchange::Nse.apply("RELIANCE"), "RELIANCE.NS");
        assert_eq!(Exchange::Bse.apply("TCS"), "TCS.BO");
        assert_eq!(Exchange::Us.apply("BRK-B"), "BRK-B");
        assert_eq!(Exchange::Bse.apply("RELIANCE.NS"), "RELIANCE.NS");
        assert_eq!(
            Exchange::Nse.apply(&normalize_symbol("infy.ns")),
            "INFY.NS"
        );
    }

    #[test]
    fn exchange_from_str() {
        assert_eq!("NSE".parse::<Exchange>(), Ok(Exchange::Nse));
        assert_eq!("bo".parse::<Exchange>(), Ok(Exchange::Bse));
        assert_eq!("us".parse::<Exchange>(), Ok(Exchange::Us));
        assert!("lse".parse::<Exchange>().is_err());
    }

    #[test]
    fn empty_universe_is_rejected() {
        assert!(matches!(
            Universe::new("list", vec![]),
            Err(UniverseError::Empty(label)) if label == "list"
        ));
    }

    #[test]
    fn universe_meta_lookup() {
        let mut meta = BTreeMap::new();
        meta.insert(
            "AAPL".to_string(),
            TickerMeta {
                sector: Some("Technology".into()),
                ..TickerMeta::default()
            },
        );
        let universe = Universe::new("list", vec!["AAPL".into(), "MSFT".into()])
            .unwrap()
            .with_meta(meta);
        assert_eq!(universe.count(), 2);
        assert_eq!(
            universe.meta("AAPL").and_then(|m| m.sector.as_deref()),
            Some("Technology")
        );
        assert!(universe.meta("MSFT").is_none());
    }
}
