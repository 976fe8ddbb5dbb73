//! Indicator snapshot: every reading the strategies need, as of the latest
//! price point of a ticker.
//!
//! `compute_snapshot` is a pure function of its input. Each field is either a
//! concrete value or `None` when the history is too short for it; nothing is
//! ever filled in with a default.

use crate::domain::indicator::atr::calculate_atr;
use crate::domain::indicator::bollinger::calculate_bollinger;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::sma::{calculate_sma, trailing_mean};
use crate::domain::indicator::IndicatorValue;
use crate::domain::ohlcv::{is_chronological, PricePoint};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// Window lengths and history floors used by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorConfig {
    /// Minimum number of points before the 52-week high is trusted.
    pub min_history_52w: usize,
    pub high_window: usize,
    pub dollar_volume_window: usize,
    pub pocket_pivot_lookback: usize,
    pub rsi_diff_count: usize,
    pub bollinger_period: usize,
    /// Band width in standard deviations, times 100.
    pub bollinger_mult_x100: u32,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            min_history_52w: 60,
            high_window: 252,
            dollar_volume_window: 20,
            pocket_pivot_lookback: 10,
            rsi_diff_count: 5,
            bollinger_period: 20,
            bollinger_mult_x100: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Names a snapshot reading, used to report which input a strategy was
/// missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Indicator {
    Sma50,
    Sma200,
    Ema20,
    Rsi14,
    Atr14,
    Bollinger,
    High52w,
    Vol5x20,
    VolumeVsAvg20,
    DollarVolume,
    RsiTrend,
    BaseLength,
    PocketPivot,
    History { required: usize },
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Indicator::Sma50 => write!(f, "SMA50"),
            Indicator::Sma200 => write!(f, "SMA200"),
            Indicator::Ema20 => write!(f, "EMA20"),
            Indicator::Rsi14 => write!(f, "RSI14"),
            Indicator::Atr14 => write!(f, "ATR14"),
            Indicator::Bollinger => write!(f, "BB(20,2)"),
            Indicator::High52w => write!(f, "52w high"),
            Indicator::Vol5x20 => write!(f, "Vol5x20"),
            Indicator::VolumeVsAvg20 => write!(f, "volume vs 20d avg"),
            Indicator::DollarVolume => write!(f, "avg dollar volume"),
            Indicator::RsiTrend => write!(f, "RSI differences"),
            Indicator::BaseLength => write!(f, "base length"),
            Indicator::PocketPivot => write!(f, "pocket pivot"),
            Indicator::History { required } => write!(f, "{} points of history", required),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub date: NaiveDate,
    pub close: f64,
    pub history_len: usize,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub ema20: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub bollinger: Option<Bands>,
    pub high_52w: Option<f64>,
    /// Fraction below the 52-week high, 0.0 at a new high.
    pub dist_52w_high: Option<f64>,
    pub vol5x20: Option<f64>,
    /// Latest volume over the mean volume of the 20 sessions before it.
    pub volume_vs_avg20: Option<f64>,
    pub avg_dollar_volume: Option<f64>,
    /// Last few first differences of RSI14, oldest first.
    pub rsi_diffs: Option<Vec<f64>>,
    /// Sessions since SMA50 last crossed SMA200 (0 = crossed on the latest bar).
    pub sma_cross_age: Option<usize>,
    /// Sessions since the prior 52-week closing high.
    pub base_length: Option<usize>,
    pub pocket_pivot: Option<bool>,
    pub return_1m: Option<f64>,
    pub return_3m: Option<f64>,
}

impl IndicatorSnapshot {
    /// Numeric reading for `indicator`, or the indicator itself as the error
    /// when it is unavailable.
    pub fn value(&self, indicator: Indicator) -> Result<f64, Indicator> {
        let v = match indicator {
            Indicator::Sma50 => self.sma50,
            Indicator::Sma200 => self.sma200,
            Indicator::Ema20 => self.ema20,
            Indicator::Rsi14 => self.rsi14,
            Indicator::Atr14 => self.atr14,
            Indicator::High52w => self.high_52w,
            Indicator::Vol5x20 => self.vol5x20,
            Indicator::VolumeVsAvg20 => self.volume_vs_avg20,
            Indicator::DollarVolume => self.avg_dollar_volume,
            Indicator::BaseLength => self.base_length.map(|b| b as f64),
            Indicator::Bollinger
            | Indicator::RsiTrend
            | Indicator::PocketPivot
            | Indicator::History { .. } => None,
        };
        v.ok_or(indicator)
    }

    pub fn bands(&self) -> Result<Bands, Indicator> {
        self.bollinger.ok_or(Indicator::Bollinger)
    }

    pub fn rsi_trend(&self) -> Result<&[f64], Indicator> {
        self.rsi_diffs.as_deref().ok_or(Indicator::RsiTrend)
    }

    pub fn require_history(&self, required: usize) -> Result<(), Indicator> {
        if self.history_len >= required {
            Ok(())
        } else {
            Err(Indicator::History { required })
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    #[error("empty price series")]
    Empty,

    #[error("price series is not in ascending date order")]
    NotChronological,

    #[error("non-finite price on {0}")]
    NonFinite(NaiveDate),
}

pub fn compute_snapshot(
    points: &[PricePoint],
    config: &IndicatorConfig,
) -> Result<IndicatorSnapshot, SnapshotError> {
    let last = points.last().ok_or(SnapshotError::Empty)?;
    if !is_chronological(points) {
        return Err(SnapshotError::NotChronological);
    }
    if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
        return Err(SnapshotError::NonFinite(bad.date));
    }

    let sma50_series = calculate_sma(points, 50);
    let sma200_series = calculate_sma(points, 200);
    let rsi_series = calculate_rsi(points, 14);

    let bands = calculate_bollinger(points, config.bollinger_period, config.bollinger_mult_x100);
    let bollinger = match bands.latest() {
        Some(IndicatorValue::Bollinger {
            upper,
            middle,
            lower,
        }) => Some(Bands {
            upper,
            middle,
            lower,
        }),
        _ => None,
    };

    let high_52w = high_52w(points, config);
    let dist_52w_high = high_52w
        .filter(|h| *h > 0.0)
        .map(|h| (h - last.close) / h);

    let volumes: Vec<f64> = points.iter().map(|p| p.volume as f64).collect();
    let dollar_volumes: Vec<f64> = points.iter().map(|p| p.dollar_volume()).collect();

    Ok(IndicatorSnapshot {
        date: last.date,
        close: last.close,
        history_len: points.len(),
        sma50: sma50_series.latest_simple(),
        sma200: sma200_series.latest_simple(),
        ema20: calculate_ema(points, 20).latest_simple(),
        rsi14: rsi_series.latest_simple(),
        atr14: calculate_atr(points, 14).latest_simple(),
        bollinger,
        high_52w,
        dist_52w_high,
        vol5x20: volume_ratio(&volumes),
        volume_vs_avg20: latest_volume_vs_prior(&volumes, 20),
        avg_dollar_volume: trailing_mean(&dollar_volumes, config.dollar_volume_window),
        rsi_diffs: trailing_diffs(&rsi_series.simple_values(), config.rsi_diff_count),
        sma_cross_age: cross_age(
            &sma50_series.simple_values(),
            &sma200_series.simple_values(),
        ),
        base_length: high_52w.and_then(|_| base_length(points, config.high_window)),
        pocket_pivot: pocket_pivot(points, config.pocket_pivot_lookback),
        return_1m: trailing_return(points, 21),
        return_3m: trailing_return(points, 63),
    })
}

fn high_52w(points: &[PricePoint], config: &IndicatorConfig) -> Option<f64> {
    if points.len() < config.min_history_52w.max(1) {
        return None;
    }
    let start = points.len().saturating_sub(config.high_window);
    points[start..].iter().map(|p| p.close).reduce(f64::max)
}

fn volume_ratio(volumes: &[f64]) -> Option<f64> {
    let v5 = trailing_mean(volumes, 5)?;
    let v20 = trailing_mean(volumes, 20)?;
    (v20 > 0.0).then(|| v5 / v20)
}

fn latest_volume_vs_prior(volumes: &[f64], window: usize) -> Option<f64> {
    let (latest, prior) = volumes.split_last()?;
    let avg = trailing_mean(prior, window)?;
    (avg > 0.0).then(|| latest / avg)
}

/// Last `count` first differences of `values`; every one of the trailing
/// `count + 1` values must be present.
fn trailing_diffs(values: &[Option<f64>], count: usize) -> Option<Vec<f64>> {
    if count == 0 || values.len() < count + 1 {
        return None;
    }
    let tail: Option<Vec<f64>> = values[values.len() - count - 1..].iter().copied().collect();
    let tail = tail?;
    Some(tail.windows(2).map(|w| w[1] - w[0]).collect())
}

fn cross_age(fast: &[Option<f64>], slow: &[Option<f64>]) -> Option<usize> {
    let last = fast.len().checked_sub(1)?;
    (1..fast.len()).rev().find_map(|i| {
        let (f0, s0, f1, s1) = (fast[i - 1]?, slow[i - 1]?, fast[i]?, slow[i]?);
        let up = f0 <= s0 && f1 > s1;
        let down = f0 >= s0 && f1 < s1;
        (up || down).then_some(last - i)
    })
}

/// Sessions between the highest close of the trailing window (excluding the
/// latest point) and the latest point. Ties resolve to the most recent high.
fn base_length(points: &[PricePoint], window: usize) -> Option<usize> {
    let last = points.len().checked_sub(1)?;
    if last == 0 {
        return None;
    }
    let start = points.len().saturating_sub(window);
    let mut peak_idx = start;
    for i in start..last {
        if points[i].close >= points[peak_idx].close {
            peak_idx = i;
        }
    }
    Some(last - peak_idx)
}

/// Up-close in the top 30% of the bar's range, on volume above every
/// down-day volume of the prior `lookback` sessions.
fn pocket_pivot(points: &[PricePoint], lookback: usize) -> Option<bool> {
    if lookback == 0 || points.len() < lookback + 2 {
        return None;
    }
    let last = points.len() - 1;
    let today = &points[last];
    let up_close = today.close > points[last - 1].close;
    let strong_close = today.close_location().is_some_and(|loc| loc >= 0.7);

    let max_down_volume = (last - lookback..last)
        .filter(|&i| points[i].close < points[i - 1].close)
        .map(|i| points[i].volume)
        .max()
        .unwrap_or(0);

    Some(up_close && strong_close && today.volume > max_down_volume)
}

/// Return from `points[len - sessions]` to the latest close. The base bar is
/// counted inside the window, so `sessions = 21` spans 20 trading sessions
/// (and 63 spans 62); the `return_1m`/`return_3m` figures use that convention.
fn trailing_return(points: &[PricePoint], sessions: usize) -> Option<f64> {
    if sessions == 0 || points.len() < sessions {
        return None;
    }
    let base = points[points.len() - sessions].close;
    let last = points.last()?.close;
    (base != 0.0).then(|| last / base - 1.0)
}
