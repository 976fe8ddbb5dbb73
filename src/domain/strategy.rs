//! Strategy definitions and the table that carries their thresholds.
//!
//! Every threshold is a typed field on a `Trigger` or `ConstraintKind`; the
//! evaluator reads them from the table it is handed and nothing else.

use crate::domain::error::ScanError;
use crate::domain::snapshot::{Indicator, IndicatorSnapshot};
use crate::ports::config_port::ConfigPort;
use std::fmt;
use std::str::FromStr;

/// Declaration order is priority order: it breaks score ties in best mode
/// and orders table listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StrategyKind {
    GoldenCross,
    RsiMomentum,
    Breakout52w,
    VolumeSurge,
    MeanReversion,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::GoldenCross,
        StrategyKind::RsiMomentum,
        StrategyKind::Breakout52w,
        StrategyKind::VolumeSurge,
        StrategyKind::MeanReversion,
    ];

    /// Stable identifier used on the command line, in config sections and in
    /// the Strategy column of scan output.
    pub fn key(&self) -> &'static str {
        match self {
            StrategyKind::GoldenCross => "golden_cross",
            StrategyKind::RsiMomentum => "rsi_momentum",
            StrategyKind::Breakout52w => "breakout_52w",
            StrategyKind::VolumeSurge => "volume_surge",
            StrategyKind::MeanReversion => "mean_reversion",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StrategyKind::GoldenCross => "Golden Cross",
            StrategyKind::RsiMomentum => "RSI Momentum",
            StrategyKind::Breakout52w => "52-Week Breakout",
            StrategyKind::VolumeSurge => "Volume Surge",
            StrategyKind::MeanReversion => "Mean-Reversion",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for StrategyKind {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        StrategyKind::ALL
            .into_iter()
            .find(|k| k.key() == normalized)
            .ok_or_else(|| ScanError::UnknownStrategy(s.trim().to_string()))
    }
}

/// Parse a comma-separated strategy list. Duplicates are dropped and the
/// result follows table order regardless of input order.
pub fn parse_strategy_list(input: &str) -> Result<Vec<StrategyKind>, ScanError> {
    let mut kinds = Vec::new();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        kinds.push(token.parse::<StrategyKind>()?);
    }
    if kinds.is_empty() {
        return Err(ScanError::ConfigInvalid {
            section: "scan".into(),
            key: "strategies".into(),
            reason: "no strategies selected".into(),
        });
    }
    kinds.sort();
    kinds.dedup();
    Ok(kinds)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintMode {
    /// Every failed constraint rejects the strategy.
    Strict,
    /// Failed preferred constraints reduce the score instead of rejecting.
    Advisory,
}

impl fmt::Display for ConstraintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstraintMode::Strict => f.write_str("strict"),
            ConstraintMode::Advisory => f.write_str("advisory"),
        }
    }
}

impl FromStr for ConstraintMode {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Ok(ConstraintMode::Strict),
            "advisory" => Ok(ConstraintMode::Advisory),
            other => Err(ScanError::InvalidConstraintMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// close > SMA50, close > SMA200 and SMA50 > SMA200.
    GoldenCross,
    RsiMomentum {
        rsi_low: f64,
        rsi_high: f64,
        min_rising: usize,
    },
    Breakout {
        near_high: f64,
        volume_mult: f64,
    },
    /// vol5x20 at or above `vol_ratio`, with close above EMA20 or a pocket pivot.
    VolumeSurge { vol_ratio: f64 },
    MeanReversion {
        rsi_max: f64,
        max_sma200_dev: f64,
    },
}

impl Trigger {
    pub fn check(&self, snap: &IndicatorSnapshot) -> Result<bool, Indicator> {
        match self {
            Trigger::GoldenCross => {
                let sma50 = snap.value(Indicator::Sma50)?;
                let sma200 = snap.value(Indicator::Sma200)?;
                Ok(snap.close > sma50 && snap.close > sma200 && sma50 > sma200)
            }
            Trigger::RsiMomentum {
                rsi_low,
                rsi_high,
                min_rising,
            } => {
                let rsi = snap.value(Indicator::Rsi14)?;
                let rising = snap.rsi_trend()?.iter().filter(|d| **d > 0.0).count();
                Ok(rsi >= *rsi_low && rsi <= *rsi_high && rising >= *min_rising)
            }
            Trigger::Breakout {
                near_high,
                volume_mult,
            } => {
                let high = snap.value(Indicator::High52w)?;
                let volume = snap.value(Indicator::VolumeVsAvg20)?;
                Ok(high > 0.0 && snap.close >= near_high * high && volume >= *volume_mult)
            }
            Trigger::VolumeSurge { vol_ratio } => {
                let ratio = snap.value(Indicator::Vol5x20)?;
                if ratio < *vol_ratio {
                    return Ok(false);
                }
                let above_ema = snap.ema20.map(|ema| snap.close > ema);
                match (above_ema, snap.pocket_pivot) {
                    (Some(true), _) | (_, Some(true)) => Ok(true),
                    (None, None) => Err(Indicator::Ema20),
                    _ => Ok(false),
                }
            }
            Trigger::MeanReversion {
                rsi_max,
                max_sma200_dev,
            } => {
                let rsi = snap.value(Indicator::Rsi14)?;
                let bands = snap.bands()?;
                let sma200 = snap.value(Indicator::Sma200)?;
                let deviation = (snap.close - sma200).abs() / sma200;
                Ok(rsi <= *rsi_max && snap.close <= bands.lower && deviation <= *max_sma200_dev)
            }
        }
    }

    fn set(&mut self, key: &str, value: f64) -> Result<bool, String> {
        let slot = match (self, key) {
            (Trigger::RsiMomentum { rsi_low, .. }, "rsi_low") => rsi_low,
            (Trigger::RsiMomentum { rsi_high, .. }, "rsi_high") => rsi_high,
            (Trigger::RsiMomentum { min_rising, .. }, "min_rising") => {
                *min_rising = whole(value)?;
                return Ok(true);
            }
            (Trigger::Breakout { near_high, .. }, "near_high") => near_high,
            (Trigger::Breakout { volume_mult, .. }, "volume_mult") => volume_mult,
            (Trigger::VolumeSurge { vol_ratio }, "vol_ratio") => vol_ratio,
            (Trigger::MeanReversion { rsi_max, .. }, "rsi_max") => rsi_max,
            (Trigger::MeanReversion { max_sma200_dev, .. }, "max_sma200_dev") => max_sma200_dev,
            _ => return Ok(false),
        };
        *slot = value;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strength {
    Required,
    Preferred,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConstraintKind {
    /// SMA50 / SMA200 at or above `ratio`.
    MinTrendSpread { ratio: f64 },
    /// close at or above `fraction` of the 52-week high.
    NearHigh { fraction: f64 },
    MinDollarVolume { floor: f64 },
    MaxRsi { max: f64 },
    /// SMA50 at or above SMA200.
    TrendAligned,
    MinBaseLength { sessions: usize },
    /// A stop `atr_mult` ATRs below close sits no more than `max_pct` below it.
    MaxAtrStop { atr_mult: f64, max_pct: f64 },
    /// |SMA50 - SMA200| / close strictly below `max_pct`.
    MaxTrendGap { max_pct: f64 },
}

impl ConstraintKind {
    pub fn name(&self) -> &'static str {
        match self {
            ConstraintKind::MinTrendSpread { .. } => "trend spread",
            ConstraintKind::NearHigh { .. } => "near 52w high",
            ConstraintKind::MinDollarVolume { .. } => "dollar volume floor",
            ConstraintKind::MaxRsi { .. } => "RSI ceiling",
            ConstraintKind::TrendAligned => "SMA50 >= SMA200",
            ConstraintKind::MinBaseLength { .. } => "base length",
            ConstraintKind::MaxAtrStop { .. } => "ATR stop distance",
            ConstraintKind::MaxTrendGap { .. } => "SMA gap",
        }
    }

    pub fn check(&self, snap: &IndicatorSnapshot) -> Result<bool, Indicator> {
        match self {
            ConstraintKind::MinTrendSpread { ratio } => {
                let sma50 = snap.value(Indicator::Sma50)?;
                let sma200 = snap.value(Indicator::Sma200)?;
                Ok(sma200 > 0.0 && sma50 / sma200 >= *ratio)
            }
            ConstraintKind::NearHigh { fraction } => {
                let high = snap.value(Indicator::High52w)?;
                Ok(snap.close >= fraction * high)
            }
            ConstraintKind::MinDollarVolume { floor } => {
                Ok(snap.value(Indicator::DollarVolume)? >= *floor)
            }
            ConstraintKind::MaxRsi { max } => Ok(snap.value(Indicator::Rsi14)? <= *max),
            ConstraintKind::TrendAligned => {
                Ok(snap.value(Indicator::Sma50)? >= snap.value(Indicator::Sma200)?)
            }
            ConstraintKind::MinBaseLength { sessions } => {
                Ok(snap.base_length.ok_or(Indicator::BaseLength)? >= *sessions)
            }
            ConstraintKind::MaxAtrStop { atr_mult, max_pct } => {
                let atr = snap.value(Indicator::Atr14)?;
                Ok(snap.close > 0.0 && atr_mult * atr / snap.close <= *max_pct)
            }
            ConstraintKind::MaxTrendGap { max_pct } => {
                let sma50 = snap.value(Indicator::Sma50)?;
                let sma200 = snap.value(Indicator::Sma200)?;
                Ok(snap.close > 0.0 && (sma50 - sma200).abs() / snap.close < *max_pct)
            }
        }
    }

    fn set(&mut self, key: &str, value: f64) -> Result<bool, String> {
        let slot = match (self, key) {
            (ConstraintKind::MinTrendSpread { ratio }, "min_trend_spread") => ratio,
            (ConstraintKind::NearHigh { fraction }, "near_high") => fraction,
            (ConstraintKind::MinDollarVolume { floor }, "min_dollar_volume") => floor,
            (ConstraintKind::MaxRsi { max }, "max_rsi") => max,
            (ConstraintKind::MinBaseLength { sessions }, "min_base") => {
                *sessions = whole(value)?;
                return Ok(true);
            }
            (ConstraintKind::MaxAtrStop { atr_mult, .. }, "atr_mult") => atr_mult,
            (ConstraintKind::MaxAtrStop { max_pct, .. }, "max_stop_pct") => max_pct,
            (ConstraintKind::MaxTrendGap { max_pct }, "max_trend_gap") => max_pct,
            _ => return Ok(false),
        };
        *slot = value;
        Ok(true)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub kind: ConstraintKind,
    pub strength: Strength,
    /// Skip this constraint, rather than report the strategy unavailable,
    /// when its inputs are missing.
    pub waive_if_unavailable: bool,
}

impl Constraint {
    pub fn required(kind: ConstraintKind) -> Self {
        Self {
            kind,
            strength: Strength::Required,
            waive_if_unavailable: false,
        }
    }

    pub fn preferred(kind: ConstraintKind) -> Self {
        Self {
            kind,
            strength: Strength::Preferred,
            waive_if_unavailable: false,
        }
    }

    pub fn waived_when_unavailable(mut self) -> Self {
        self.waive_if_unavailable = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossBonus {
    /// A cross younger than this many sessions earns the bonus.
    pub within: usize,
    pub bonus: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRule {
    pub base: f64,
    pub cross_bonus: Option<CrossBonus>,
}

impl ScoreRule {
    pub fn flat(base: f64) -> Self {
        Self {
            base,
            cross_bonus: None,
        }
    }

    pub fn score(&self, snap: &IndicatorSnapshot) -> f64 {
        let bonus = match (self.cross_bonus, snap.sma_cross_age) {
            (Some(rule), Some(age)) if age < rule.within => rule.bonus,
            _ => 0.0,
        };
        self.base + bonus
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub kind: StrategyKind,
    pub trigger: Trigger,
    pub score: ScoreRule,
    pub constraints: Vec<Constraint>,
    pub min_history: usize,
}

impl StrategyDefinition {
    pub fn default_for(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::GoldenCross => Self {
                kind,
                trigger: Trigger::GoldenCross,
                score: ScoreRule {
                    base: 2.0,
                    cross_bonus: Some(CrossBonus {
                        within: 10,
                        bonus: 1.0,
                    }),
                },
                constraints: vec![
                    Constraint::preferred(ConstraintKind::MinTrendSpread { ratio: 1.02 }),
                    Constraint::preferred(ConstraintKind::NearHigh { fraction: 0.9 }),
                    Constraint::preferred(ConstraintKind::MinDollarVolume { floor: 10_000_000.0 }),
                ],
                min_history: 200,
            },
            StrategyKind::RsiMomentum => Self {
                kind,
                trigger: Trigger::RsiMomentum {
                    rsi_low: 55.0,
                    rsi_high: 70.0,
                    min_rising: 3,
                },
                score: ScoreRule::flat(1.5),
                constraints: vec![
                    Constraint::required(ConstraintKind::MaxRsi { max: 72.0 }),
                    Constraint::required(ConstraintKind::TrendAligned),
                ],
                min_history: 20,
            },
            StrategyKind::Breakout52w => Self {
                kind,
                trigger: Trigger::Breakout {
                    near_high: 0.98,
                    volume_mult: 1.5,
                },
                score: ScoreRule::flat(2.0),
                constraints: vec![
                    Constraint::required(ConstraintKind::MinBaseLength { sessions: 30 }),
                    Constraint::required(ConstraintKind::MaxAtrStop {
                        atr_mult: 2.0,
                        max_pct: 0.10,
                    }),
                ],
                min_history: 200,
            },
            StrategyKind::VolumeSurge => Self {
                kind,
                trigger: Trigger::VolumeSurge { vol_ratio: 1.5 },
                score: ScoreRule::flat(1.0),
                constraints: vec![
                    Constraint::preferred(ConstraintKind::MinDollarVolume { floor: 5_000_000.0 }),
                    Constraint::preferred(ConstraintKind::TrendAligned).waived_when_unavailable(),
                ],
                min_history: 20,
            },
            StrategyKind::MeanReversion => Self {
                kind,
                trigger: Trigger::MeanReversion {
                    rsi_max: 35.0,
                    max_sma200_dev: 0.05,
                },
                score: ScoreRule::flat(1.0),
                constraints: vec![Constraint::required(ConstraintKind::MaxTrendGap {
                    max_pct: 0.05,
                })],
                min_history: 200,
            },
        }
    }

    /// Override one tunable by its config key.
    pub fn set_param(&mut self, key: &str, value: f64) -> Result<(), String> {
        match key {
            "base_score" => {
                self.score.base = value;
                return Ok(());
            }
            "min_history" => {
                self.min_history = whole(value)?;
                return Ok(());
            }
            "cross_bonus" | "cross_window" => {
                let Some(rule) = self.score.cross_bonus.as_mut() else {
                    return Err(format!("{} has no cross bonus", self.kind));
                };
                if key == "cross_bonus" {
                    rule.bonus = value;
                } else {
                    rule.within = whole(value)?;
                }
                return Ok(());
            }
            _ => {}
        }
        if self.trigger.set(key, value)? {
            return Ok(());
        }
        for constraint in &mut self.constraints {
            if constraint.kind.set(key, value)? {
                return Ok(());
            }
        }
        Err(format!("unknown parameter for {}", self.kind))
    }
}

fn whole(value: f64) -> Result<usize, String> {
    if value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(format!("expected a whole number, got {}", value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyTable {
    pub definitions: Vec<StrategyDefinition>,
    pub mode: ConstraintMode,
    /// Fraction taken off the score per failed preferred constraint in
    /// advisory mode.
    pub advisory_penalty: f64,
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self {
            definitions: StrategyKind::ALL
                .into_iter()
                .map(StrategyDefinition::default_for)
                .collect(),
            mode: ConstraintMode::Strict,
            advisory_penalty: 0.25,
        }
    }
}

impl StrategyTable {
    /// Keep only `kinds`, preserving table order.
    pub fn select(mut self, kinds: &[StrategyKind]) -> Self {
        self.definitions.retain(|d| kinds.contains(&d.kind));
        self
    }

    pub fn with_mode(mut self, mode: ConstraintMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn definition(&self, kind: StrategyKind) -> Option<&StrategyDefinition> {
        self.definitions.iter().find(|d| d.kind == kind)
    }

    pub fn kinds(&self) -> Vec<StrategyKind> {
        self.definitions.iter().map(|d| d.kind).collect()
    }

    /// Apply `[<strategy key>]` sections from `config`. Unknown keys and
    /// non-numeric values are configuration errors.
    pub fn apply_overrides(&mut self, config: &dyn ConfigPort) -> Result<(), ScanError> {
        for def in &mut self.definitions {
            let section = def.kind.key();
            for key in config.keys(section) {
                let Some(raw) = config.get_string(section, &key) else {
                    continue;
                };
                let invalid = |reason: String| ScanError::ConfigInvalid {
                    section: section.to_string(),
                    key: key.clone(),
                    reason,
                };
                let value: f64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{}' is not a number", raw.trim())))?;
                def.set_param(&key, value).map_err(invalid)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.definitions.is_empty() {
            return Err(ScanError::ConfigInvalid {
                section: "scan".into(),
                key: "strategies".into(),
                reason: "no strategies selected".into(),
            });
        }
        if !(0.0..1.0).contains(&self.advisory_penalty) {
            return Err(ScanError::ConfigInvalid {
                section: "scan".into(),
                key: "advisory_penalty".into(),
                reason: format!("must be in [0, 1), got {}", self.advisory_penalty),
            });
        }
        for def in &self.definitions {
            if !(def.score.base > 0.0 && def.score.base.is_finite()) {
                return Err(ScanError::ConfigInvalid {
                    section: def.kind.key().into(),
                    key: "base_score".into(),
                    reason: format!("must be positive, got {}", def.score.base),
                });
            }
            match def.score.cross_bonus {
                Some(rule) if rule.bonus < 0.0 => {
                    return Err(ScanError::ConfigInvalid {
                        section: def.kind.key().into(),
                        key: "cross_bonus".into(),
                        reason: format!("must not be negative, got {}", rule.bonus),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn kind_round_trips_through_key() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.key().parse::<StrategyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn kind_parse_is_lenient_on_case_and_dashes() {
        assert_eq!(
            "Golden-Cross".parse::<StrategyKind>().unwrap(),
            StrategyKind::GoldenCross
        );
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let err = "turtle".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, ScanError::UnknownStrategy(s) if s == "turtle"));
    }

    #[test]
    fn strategy_list_follows_table_order() {
        let kinds = parse_strategy_list("volume_surge, golden_cross,volume_surge").unwrap();
        assert_eq!(kinds, vec![StrategyKind::GoldenCross, StrategyKind::VolumeSurge]);
    }

    #[test]
    fn empty_strategy_list_is_rejected() {
        assert!(parse_strategy_list(" , ").is_err());
    }

    #[test]
    fn constraint_mode_parse() {
        assert_eq!("STRICT".parse::<ConstraintMode>().unwrap(), ConstraintMode::Strict);
        assert_eq!("advisory".parse::<ConstraintMode>().unwrap(), ConstraintMode::Advisory);
        assert!("loose".parse::<ConstraintMode>().is_err());
    }

    #[test]
    fn default_table_has_all_strategies_in_order() {
        let table = StrategyTable::default();
        assert_eq!(table.kinds(), StrategyKind::ALL.to_vec());
        assert_eq!(table.mode, ConstraintMode::Strict);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn select_preserves_table_order() {
        let table = StrategyTable::default()
            .select(&[StrategyKind::VolumeSurge, StrategyKind::RsiMomentum]);
        assert_eq!(
            table.kinds(),
            vec![StrategyKind::RsiMomentum, StrategyKind::VolumeSurge]
        );
    }

    #[test]
    fn overrides_apply_to_named_section() {
        let config = FileConfigAdapter::from_string(
            "[golden_cross]\nbase_score = 2.5\nmin_dollar_volume = 1000000\n\
             [rsi_momentum]\nmin_rising = 4\n",
        )
        .unwrap();
        let mut table = StrategyTable::default();
        table.apply_overrides(&config).unwrap();

        let gc = table.definition(StrategyKind::GoldenCross).unwrap();
        assert_eq!(gc.score.base, 2.5);
        assert!(gc.constraints.iter().any(
            |c| c.kind == ConstraintKind::MinDollarVolume { floor: 1_000_000.0 }
        ));

        let rsi = table.definition(StrategyKind::RsiMomentum).unwrap();
        assert!(matches!(rsi.trigger, Trigger::RsiMomentum { min_rising: 4, .. }));
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let config = FileConfigAdapter::from_string("[volume_surge]\nvol_ratio = lots\n").unwrap();
        let err = StrategyTable::default().apply_overrides(&config).unwrap_err();
        assert!(matches!(err, ScanError::ConfigInvalid { key, .. } if key == "vol_ratio"));
    }

    #[test]
    fn unknown_override_key_is_rejected() {
        let config = FileConfigAdapter::from_string("[breakout_52w]\nwidth = 3\n").unwrap();
        assert!(StrategyTable::default().apply_overrides(&config).is_err());
    }

    #[test]
    fn fractional_session_count_is_rejected() {
        let mut def = StrategyDefinition::default_for(StrategyKind::Breakout52w);
        assert!(def.set_param("min_base", 12.5).is_err());
        assert!(def.set_param("min_base", 12.0).is_ok());
    }

    #[test]
    fn cross_bonus_only_on_golden_cross() {
        let mut def = StrategyDefinition::default_for(StrategyKind::VolumeSurge);
        assert!(def.set_param("cross_bonus", 2.0).is_err());
    }

    #[test]
    fn validate_rejects_non_positive_score() {
        let mut table = StrategyTable::default();
        table.definitions[1].score.base = 0.0;
        assert!(table.validate().is_err());
    }

    #[test]
    fn validate_rejects_full_penalty() {
        let table = StrategyTable {
            advisory_penalty: 1.0,
            ..StrategyTable::default()
        };
        assert!(table.validate().is_err());
    }
}
