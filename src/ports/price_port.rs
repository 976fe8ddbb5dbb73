//! Price history port trait.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::PricePoint;

/// Shared across scan workers, hence `Send + Sync`.
pub trait PriceSource: Send + Sync {
    /// The most recent `lookback` sessions for `ticker`, oldest first.
    /// Failures are reported as `ScanError::DataUnavailable`.
    fn fetch(&self, ticker: &str, lookback: usize) -> Result<Vec<PricePoint>, ScanError>;

    fn describe(&self) -> String;
}

/// Keep the last `lookback` points of an ascending series.
pub fn keep_last(mut points: Vec<PricePoint>, lookback: usize) -> Vec<PricePoint> {
    if points.len() > lookback {
        points.drain(..points.len() - lookback);
    }
    points
}
