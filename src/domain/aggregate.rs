//! Combine per-strategy results into at most one row per ticker.

use crate::domain::error::ScanError;
use crate::domain::evaluator::StrategyResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationMode {
    /// Highest-scoring strategy; ties go to the earlier table entry.
    #[default]
    Best,
    /// Sum of all triggered scores under a combined label.
    Sum,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Best => f.write_str("best"),
            AggregationMode::Sum => f.write_str("sum"),
        }
    }
}

impl FromStr for AggregationMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" => Ok(AggregationMode::Best),
            "sum" => Ok(AggregationMode::Sum),
            other => Err(ScanError::InvalidAggregation(other.to_string())),
        }
    }
}

/// One output row. Field names on the wire match the spreadsheet columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRow {
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Ticker")]
    pub ticker: String,
    #[serde(rename = "Strategy")]
    pub strategy: String,
    #[serde(rename = "Score")]
    pub score: f64,
    #[serde(rename = "Close")]
    pub close: f64,
    #[serde(rename = "RSI14")]
    pub rsi14: Option<f64>,
    #[serde(rename = "SMA50")]
    pub sma50: Option<f64>,
    #[serde(rename = "SMA200")]
    pub sma200: Option<f64>,
    #[serde(rename = "Dist_52wHigh")]
    pub dist_52w_high: Option<f64>,
    #[serde(rename = "Vol5x20")]
    pub vol5x20: Option<f64>,
}

pub const SCAN_COLUMNS: [&str; 10] = [
    "Timestamp",
    "Ticker",
    "Strategy",
    "Score",
    "Close",
    "RSI14",
    "SMA50",
    "SMA200",
    "Dist_52wHigh",
    "Vol5x20",
];

/// `results` must belong to one ticker and be in table order. Returns `None`
/// when nothing triggered.
pub fn aggregate(results: &[StrategyResult], mode: AggregationMode, timestamp: &str) -> Option<ScanRow> {
    let triggered: Vec<&StrategyResult> = results.iter().filter(|r| r.is_triggered()).collect();
    let first = *triggered.first()?;

    let (label, score) = match mode {
        AggregationMode::Best => {
            let best = triggered
                .iter()
                .copied()
                .fold(first, |best, r| if r.score() > best.score() { r } else { best });
            (best.strategy.key().to_string(), best.score())
        }
        AggregationMode::Sum => {
            let mut keys: Vec<&str> = triggered.iter().map(|r| r.strategy.key()).collect();
            keys.sort_unstable();
            let total = triggered.iter().map(|r| r.score()).sum();
            (keys.join("+"), total)
        }
    };

    let metrics = first.metrics;
    Some(ScanRow {
        timestamp: timestamp.to_string(),
        ticker: first.ticker.clone(),
        strategy: label,
        score,
        close: metrics.close,
        rsi14: metrics.rsi14,
        sma50: metrics.sma50,
        sma200: metrics.sma200,
        dist_52w_high: metrics.dist_52w_high,
        vol5x20: metrics.vol5x20,
    })
}

/// Score descending, then ticker ascending.
pub fn sort_rows(rows: &mut [ScanRow]) {
    rows.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
}
