//! RSI (Relative Strength Index) with Wilder's smoothing.
//!
//! - First average: simple mean of gains/losses over the first n changes
//! - Subsequent: avg = (prev_avg * (n-1) + current) / n
//!
//! RSI = 100 - (100 / (1 + avg_gain / avg_loss)); 100 when avg_loss == 0,
//! 50 when the window is completely flat.
//!
//! Warmup: first n points are unavailable (n changes need n+1 closes).

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}

pub fn calculate_rsi(points: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 {
        let values = points
            .iter()
            .map(|p| IndicatorPoint {
                date: p.date,
                value: None,
            })
            .collect();
        return IndicatorSeries {
            indicator_type: IndicatorType::Rsi(period),
            values,
        };
    }

    let mut values = Vec::with_capacity(points.len());
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    let mut seed_gain = 0.0;
    let mut seed_loss = 0.0;

    for (i, p) in points.iter().enumerate() {
        if i == 0 {
            values.push(IndicatorPoint {
                date: p.date,
                value: None,
            });
            continue;
        }

        let change = p.close - points[i - 1].close;
        let gain = change.max(0.0);
        let loss = (-change).max(0.0);

        let value = if i < period {
            seed_gain += gain;
            seed_loss += loss;
            None
        } else if i == period {
            seed_gain += gain;
            seed_loss += loss;
            avg_gain = seed_gain / period as f64;
            avg_loss = seed_loss / period as f64;
            Some(rsi_from_averages(avg_gain, avg_loss))
        } else {
            avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
            Some(rsi_from_averages(avg_gain, avg_loss))
        };

        values.push(IndicatorPoint {
            date: p.date,
            value: value.map(|v| IndicatorValue::Simple(v.clamp(0.0, 100.0))),
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_point(day: u32, close: f64) -> PricePoint {
        PricePoint {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000,
        }
    }

    fn make_points(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| make_point(i as u32 + 1, c))
            .collect()
    }

    #[test]
    fn rsi_empty() {
        let series = calculate_rsi(&[], 14);
        assert!(series.values.is_empty());
    }

    #[test]
    fn rsi_warmup_period() {
        let closes: Vec<f64> = (1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0).collect();
        let series = calculate_rsi(&make_points(&closes), 14);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(series.values[i].value.is_none(), "point {} should be unavailable", i);
        }
        assert!(series.values[14].value.is_some());
    }

    #[test]
    fn rsi_fourteen_points_unavailable() {
        let closes: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&make_points(&closes), 14);
        assert_eq!(series.latest_simple(), None);
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let series = calculate_rsi(&make_points(&closes), 14);
        assert!((series.simple_at(14).unwrap() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let closes: Vec<f64> = (0..15).map(|i| 100.0 - i as f64).collect();
        let series = calculate_rsi(&make_points(&closes), 14);
        assert!(series.simple_at(14).unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_flat_is_neutral() {
        let series = calculate_rsi(&make_points(&[100.0; 16]), 14);
        assert!((series.latest_simple().unwrap() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rsi_in_range() {
        let closes: Vec<f64> = (1..=28)
            .map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0)
            .collect();
        let series = calculate_rsi(&make_points(&closes), 14);
        for v in series.simple_values().into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "RSI {} out of range", v);
        }
    }

    #[test]
    fn rsi_wilder_smoothing_step() {
        // 2 gains of 1.0 then one loss of 1.0, period 2
        let series = calculate_rsi(&make_points(&[10.0, 11.0, 12.0, 11.0]), 2);
        // seed: avg_gain = 1.0, avg_loss = 0.0 → 100
        assert!((series.simple_at(2).unwrap() - 100.0).abs() < f64::EPSILON);
        // next: avg_gain = 0.5, avg_loss = 0.5 → 50
        assert!((series.simple_at(3).unwrap() - 50.0).abs() < 1e-12);
    }

    #[test]
    fn rsi_zero_period() {
        let series = calculate_rsi(&make_points(&[100.0, 101.0]), 0);
        assert_eq!(series.values.len(), 2);
        assert_eq!(series.valid_count(), 0);
    }
}
