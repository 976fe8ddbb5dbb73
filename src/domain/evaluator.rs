//! Strategy evaluation against an indicator snapshot.

use crate::domain::snapshot::{Indicator, IndicatorSnapshot};
use crate::domain::strategy::{ConstraintMode, StrategyDefinition, StrategyKind, StrategyTable, Strength};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Triggered { score: f64 },
    NotTriggered,
    /// The trigger fired but a gating constraint failed.
    Rejected { constraint: &'static str },
    /// An input the strategy needs is missing from the snapshot.
    Unavailable { indicator: Indicator },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Triggered { score } => write!(f, "triggered ({:.2})", score),
            Outcome::NotTriggered => write!(f, "not triggered"),
            Outcome::Rejected { constraint } => write!(f, "rejected: {}", constraint),
            Outcome::Unavailable { indicator } => write!(f, "unavailable: needs {}", indicator),
        }
    }
}

/// The snapshot readings carried into a scan row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowMetrics {
    pub close: f64,
    pub rsi14: Option<f64>,
    pub sma50: Option<f64>,
    pub sma200: Option<f64>,
    pub dist_52w_high: Option<f64>,
    pub vol5x20: Option<f64>,
}

impl From<&IndicatorSnapshot> for RowMetrics {
    fn from(snap: &IndicatorSnapshot) -> Self {
        Self {
            close: snap.close,
            rsi14: snap.rsi14,
            sma50: snap.sma50,
            sma200: snap.sma200,
            dist_52w_high: snap.dist_52w_high,
            vol5x20: snap.vol5x20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyResult {
    pub ticker: String,
    pub strategy: StrategyKind,
    pub outcome: Outcome,
    pub metrics: RowMetrics,
}

impl StrategyResult {
    /// Positive exactly when the strategy triggered.
    pub fn score(&self) -> f64 {
        match self.outcome {
            Outcome::Triggered { score } => score,
            _ => 0.0,
        }
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.outcome, Outcome::Triggered { .. })
    }
}

/// Evaluate every strategy in `table`, in table order.
pub fn evaluate(ticker: &str, snap: &IndicatorSnapshot, table: &StrategyTable) -> Vec<StrategyResult> {
    let metrics = RowMetrics::from(snap);
    table
        .definitions
        .iter()
        .map(|def| StrategyResult {
            ticker: ticker.to_string(),
            strategy: def.kind,
            outcome: evaluate_strategy(def, snap, table.mode, table.advisory_penalty),
            metrics,
        })
        .collect()
}

pub fn evaluate_strategy(
    def: &StrategyDefinition,
    snap: &IndicatorSnapshot,
    mode: ConstraintMode,
    advisory_penalty: f64,
) -> Outcome {
    if let Err(indicator) = snap.require_history(def.min_history) {
        return Outcome::Unavailable { indicator };
    }

    match def.trigger.check(snap) {
        Err(indicator) => return Outcome::Unavailable { indicator },
        Ok(false) => return Outcome::NotTriggered,
        Ok(true) => {}
    }

    let mut penalties = 0;
    for constraint in &def.constraints {
        let passed = match constraint.kind.check(snap) {
            Ok(passed) => passed,
            Err(_) if constraint.waive_if_unavailable => continue,
            Err(indicator) => return Outcome::Unavailable { indicator },
        };
        if passed {
            continue;
        }
        let gates = constraint.strength == Strength::Required || mode == ConstraintMode::Strict;
        if gates {
            return Outcome::Rejected {
                constraint: constraint.kind.name(),
            };
        }
        penalties += 1;
    }

    let score = def.score.score(snap) * (1.0 - advisory_penalty).powi(penalties);
    if score > 0.0 {
        Outcome::Triggered { score }
    } else {
        Outcome::NotTriggered
    }
}
