//! Coarse market-behaviour classification of a single ticker.

use crate::domain::snapshot::IndicatorSnapshot;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    Momentum,
    MeanReversion,
    Thematic,
}

impl Regime {
    pub fn approach(&self) -> &'static str {
        match self {
            Regime::Momentum => "Momentum trade",
            Regime::MeanReversion => "Swing trade only",
            Regime::Thematic => "Avoid for now",
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Regime::Momentum => f.write_str("Momentum"),
            Regime::MeanReversion => f.write_str("Mean-reversion"),
            Regime::Thematic => f.write_str("Thematic / story-driven"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub regime: Regime,
    pub reason: &'static str,
}

const NEAR_HIGH: f64 = 0.10;
const STRONG_RETURN_3M: f64 = 0.10;
const FLAT_MA_GAP: f64 = 0.03;

pub fn classify(snap: &IndicatorSnapshot) -> Classification {
    let trend = snap.sma50.zip(snap.sma200);

    let momentum = match (trend, snap.dist_52w_high, snap.return_3m) {
        (Some((sma50, sma200)), Some(dist), Some(ret_3m)) => {
            sma50 > sma200 && dist <= NEAR_HIGH && ret_3m >= STRONG_RETURN_3M
        }
        _ => false,
    };
    if momentum {
        return Classification {
            regime: Regime::Momentum,
            reason: "SMA50 above SMA200, price within 10% of the 52w high, 3m return at least 10%",
        };
    }

    let flat = match trend {
        Some((sma50, sma200)) if snap.close != 0.0 => {
            (sma50 - sma200).abs() / snap.close <= FLAT_MA_GAP
        }
        _ => false,
    };
    if flat {
        return Classification {
            regime: Regime::MeanReversion,
            reason: "SMA50 and SMA200 within 3% of price: flat regime",
        };
    }

    Classification {
        regime: Regime::Thematic,
        reason: "insufficient evidence for trend or mean reversion from price alone",
    }
}
