//! Daily OHLCV price point.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PricePoint {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    /// All four prices are finite numbers.
    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn dollar_volume(&self) -> f64 {
        self.close * self.volume as f64
    }

    /// Position of the close inside the bar's range, 0.0 at the low and 1.0 at
    /// the high. `None` for a zero-width bar.
    pub fn close_location(&self) -> Option<f64> {
        let range = self.high - self.low;
        if range <= 0.0 {
            return None;
        }
        Some((self.close - self.low) / range)
    }
}

/// Returns true when dates are strictly increasing.
pub fn is_chronological(points: &[PricePoint]) -> bool {
    points.windows(2).all(|w| w[0].date < w[1].date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_point() -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            open: 100.0,
            high: 110.0,
            low: 90.0,
            close: 105.0,
            volume: 50_000,
        }
    }

    #[test]
    fn true_range_hl_dominates() {
        let p = sample_point();
        // high-low=20, |high-100|=10, |low-100|=10 → 20
        assert!((p.true_range(100.0) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_up() {
        let p = sample_point();
        // high-low=20, |110-70|=40, |90-70|=20 → 40
        assert!((p.true_range(70.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn true_range_gap_down() {
        let p = sample_point();
        // high-low=20, |110-130|=20, |90-130|=40 → 40
        assert!((p.true_range(130.0) - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn dollar_volume_is_close_times_volume() {
        let p = sample_point();
        assert!((p.dollar_volume() - 5_250_000.0).abs() < 1e-6);
    }

    #[test]
    fn close_location_in_range() {
        let p = sample_point();
        // (105 - 90) / 20 = 0.75
        assert!((p.close_location().unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn close_location_flat_bar() {
        let mut p = sample_point();
        p.high = 100.0;
        p.low = 100.0;
        assert!(p.close_location().is_none());
    }

    #[test]
    fn chronological_check() {
        let a = sample_point();
        let mut b = sample_point();
        b.date = NaiveDate::from_ymd_opt(2024, 1, 16).unwrap();
        assert!(is_chronological(&[a.clone(), b.clone()]));
        assert!(!is_chronological(&[b, a]));
        assert!(is_chronological(&[]));
    }
}
