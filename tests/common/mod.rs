#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use stockscan::domain::error::ScanError;
pub use stockscan::domain::ohlcv::PricePoint;
use stockscan::ports::price_port::{keep_last, PriceSource};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

pub struct MockPriceSource {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockPriceSource {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_points(mut self, ticker: &str, points: Vec<PricePoint>) -> Self {
        self.data.insert(ticker.to_string(), points);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }
}

impl PriceSource for MockPriceSource {
    fn fetch(&self, ticker: &str, lookback: usize) -> Result<Vec<PricePoint>, ScanError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(ScanError::data_unavailable(ticker, reason));
        }
        self.data
            .get(ticker)
            .cloned()
            .map(|points| keep_last(points, lookback))
            .ok_or_else(|| ScanError::data_unavailable(ticker, "no such ticker"))
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

pub fn clock() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 21, 5, 0).unwrap()
}

/// Daily points from closes and volumes; high/low sit half a point either
/// side of the close.
pub fn points_from(closes: &[f64], volumes: &[u64]) -> Vec<PricePoint> {
    assert_eq!(closes.len(), volumes.len());
    let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (&close, &volume))| PricePoint {
            date: start + chrono::Duration::days(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume,
        })
        .collect()
}

/// Steady uptrend with liquid volume: Golden Cross only, score 2.0.
pub fn rising_series(len: usize, volume: u64) -> Vec<PricePoint> {
    let closes: Vec<f64> = (0..len).map(|i| 50.0 + 0.5 * i as f64).collect();
    points_from(&closes, &vec![volume; len])
}

/// Steady downtrend: nothing triggers.
pub fn declining_series(len: usize) -> Vec<PricePoint> {
    let closes: Vec<f64> = (0..len).map(|i| 150.0 - 0.2 * i as f64).collect();
    points_from(&closes, &vec![1_000_000; len])
}

/// A run-up to a peak, a 150-session base, then a close at a new high on
/// triple volume. Breakout and Golden Cross both trigger at 2.0.
pub fn breakout_series() -> Vec<PricePoint> {
    let mut closes: Vec<f64> = (0..100).map(|i| 50.0 + 0.5 * i as f64).collect();
    closes.extend((100..249).map(|i| 97.0 + (i % 3) as f64 * 0.3));
    closes.push(100.5);
    let mut volumes = vec![1_000_000; 249];
    volumes.push(3_000_000);
    points_from(&closes, &volumes)
}

/// Flat range followed by eight down days to the lower Bollinger band:
/// Mean-Reversion only.
pub fn mean_reversion_series() -> Vec<PricePoint> {
    let tail = [99.5, 99.0, 98.5, 98.0, 97.5, 97.0, 96.5, 96.0];
    let mut closes: Vec<f64> = (0..250 - tail.len())
        .map(|i| if i % 2 == 1 { 100.3 } else { 99.7 })
        .collect();
    closes.extend(tail);
    points_from(&closes, &vec![1_000_000; 250])
}

/// Gentle uptrend with the last five sessions on 4x volume: Volume Surge.
pub fn surge_series(len: usize) -> Vec<PricePoint> {
    let closes: Vec<f64> = (0..len).map(|i| 20.0 + i as f64 * 0.1).collect();
    let volumes: Vec<u64> = (0..len)
        .map(|i| if i + 5 >= len { 2_000_000 } else { 500_000 })
        .collect();
    points_from(&closes, &volumes)
}

pub fn write_price_csv(dir: &Path, ticker: &str, points: &[PricePoint]) {
    let mut body = String::from("Date,Open,High,Low,Close,Volume\n");
    for p in points {
        body.push_str(&format!(
            "{},{},{},{},{},{}\n",
            p.date, p.open, p.high, p.low, p.close, p.volume
        ));
    }
    fs::write(dir.join(format!("{ticker}.csv")), body).unwrap();
}
