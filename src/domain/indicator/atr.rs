//! Average True Range with Wilder's smoothing.
//!
//! True range needs a previous close, so the first point contributes none.
//! Seed: mean of TR[1..=n]; then ATR[i] = (ATR[i-1]*(n-1) + TR[i]) / n.
//! Warmup: first n points are unavailable.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

pub fn calculate_atr(points: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }

    let mut values = Vec::with_capacity(points.len());
    let mut seed_sum = 0.0;
    let mut atr = 0.0;

    for (i, p) in points.iter().enumerate() {
        let value = if i == 0 {
            None
        } else {
            let tr = p.true_range(points[i - 1].close);
            if i < period {
                seed_sum += tr;
                None
            } else if i == period {
                seed_sum += tr;
                atr = seed_sum / period as f64;
                Some(IndicatorValue::Simple(atr))
            } else {
                atr = (atr * (period - 1) as f64 + tr) / period as f64;
                Some(IndicatorValue::Simple(atr))
            }
        };
        values.push(IndicatorPoint {
            date: p.date,
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_point(day: u32, high: f64, low: f64, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn atr_warmup() {
        let points: Vec<PricePoint> = (1..=5).map(|d| make_point(d, 110.0, 90.0, 100.0)).collect();
        let series = calculate_atr(&points, 3);

        assert_eq!(series.values.len(), 5);
        assert!(series.values[0].value.is_none());
        assert!(series.values[2].value.is_none());
        assert!(series.values[3].value.is_some());
        assert!(series.values[4].value.is_some());
    }

    #[test]
    fn atr_seed_is_average_true_range() {
        let points = vec![
            make_point(1, 110.0, 100.0, 105.0),
            make_point(2, 115.0, 105.0, 110.0),
            make_point(3, 120.0, 110.0, 115.0),
            make_point(4, 125.0, 115.0, 120.0),
        ];
        let series = calculate_atr(&points, 3);
        // each TR = max(10, 10, 0) = 10
        assert!((series.simple_at(3).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let points = vec![
            make_point(1, 110.0, 100.0, 105.0),
            make_point(2, 115.0, 105.0, 110.0),
            make_point(3, 120.0, 110.0, 115.0),
            make_point(4, 140.0, 115.0, 120.0),
        ];
        let series = calculate_atr(&points, 2);
        let seed = 10.0;
        // TR[3] = max(25, |140-115|, |115-115|) = 25
        let expected = (seed * 1.0 + 25.0) / 2.0;
        assert!((series.simple_at(3).unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_insufficient_points() {
        let points: Vec<PricePoint> = (1..=3).map(|d| make_point(d, 110.0, 90.0, 100.0)).collect();
        let series = calculate_atr(&points, 14);
        assert_eq!(series.latest_simple(), None);
    }

    #[test]
    fn atr_handles_gaps() {
        let points = vec![
            make_point(1, 110.0, 100.0, 105.0),
            make_point(2, 130.0, 120.0, 125.0),
            make_point(3, 120.0, 110.0, 115.0),
        ];
        let series = calculate_atr(&points, 2);
        // TR[1] = 25 (gap up), TR[2] = 15 (gap down to 110 from 125)
        assert!((series.simple_at(2).unwrap() - 20.0).abs() < 1e-9);
    }
}
