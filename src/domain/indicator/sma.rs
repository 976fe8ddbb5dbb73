//! Simple Moving Average of closing price.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). Each window is summed from scratch so a
//! value depends only on its own n closes, not on how much history precedes it.
//! Warmup: first (n-1) points are unavailable.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PricePoint;

pub fn calculate_sma(points: &[PricePoint], period: usize) -> IndicatorSeries {
    if period == 0 {
        return IndicatorSeries::empty(IndicatorType::Sma(period));
    }

    let values = points
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let value = if i + 1 >= period {
                let window = &points[i + 1 - period..=i];
                let mean = window.iter().map(|w| w.close).sum::<f64>() / period as f64;
                Some(IndicatorValue::Simple(mean))
            } else {
                None
            };
            IndicatorPoint {
                date: p.date,
                value,
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Sma(period),
        values,
    }
}

/// Mean of the last `window` values of `xs`, `None` if fewer are available.
pub fn trailing_mean(xs: &[f64], window: usize) -> Option<f64> {
    if window == 0 || xs.len() < window {
        return None;
    }
    let tail = &xs[xs.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}
