//! Exponential Moving Average of closing price.
//!
//! k = 2/(n+1), seeded with the SMA of the first n closes, then
//! EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Warmup: first (n-1) points are unavailable.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

pub fn calculate_ema(points: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 || points.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(period));
    }

    let mut values = Vec::with_capacity(points.len());
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = 0.0;
    let mut sum = 0.0;

    for (i, p) in points.iter().enumerate() {
        let value = if i < period - 1 {
            sum += p.close;
            None
        } else if i == period - 1 {
            sum += p.close;
            ema = sum / period as f64;
            Some(IndicatorValue::Simple(ema))
        } else {
            ema = p.close * k + ema * (1.0 - k);
            Some(IndicatorValue::Simple(ema))
        };
        values.push(IndicatorPoint {
            date: p.date,
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(period),
        values,
    }
}
