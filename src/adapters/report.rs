//! Plain-text and markdown rendering for the terminal and `analyze` output.

use crate::domain::aggregate::{ScanRow, SCAN_COLUMNS};
use crate::domain::evaluator::{Outcome, StrategyResult};
use crate::domain::regime::Classification;
use crate::domain::scan::SkippedTicker;
use crate::domain::snapshot::IndicatorSnapshot;
use crate::domain::strategy::{Constraint, ConstraintKind, StrategyTable, Strength, Trigger};
use std::fmt::Write;

fn opt(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", decimals, v),
        None => "-".to_string(),
    }
}

fn pct(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v * 100.0),
        None => "-".to_string(),
    }
}

fn dollars_m(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("${:.1}M", v / 1_000_000.0),
        None => "-".to_string(),
    }
}

/// Left-aligned text columns sized to their widest cell.
fn text_table(header: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    let line = |cells: Vec<&str>| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = w))
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(header.to_vec());
    out.push('\n');
    for row in rows {
        out.push_str(&line(row.iter().map(String::as_str).collect()));
        out.push('\n');
    }
    out
}

/// The first `limit` rows of a scan as a text table.
pub fn render_scan_table(rows: &[ScanRow], limit: usize) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .take(limit)
        .map(|r| {
            vec![
                r.timestamp.clone(),
                r.ticker.clone(),
                r.strategy.clone(),
                format!("{:.2}", r.score),
                format!("{:.2}", r.close),
                opt(r.rsi14, 1),
                opt(r.sma50, 2),
                opt(r.sma200, 2),
                opt(r.dist_52w_high, 4),
                opt(r.vol5x20, 2),
            ]
        })
        .collect();
    text_table(&SCAN_COLUMNS, &cells)
}

pub fn render_skipped(skipped: &[SkippedTicker]) -> String {
    let mut out = String::new();
    for s in skipped {
        let _ = writeln!(out, "  {}: {}", s.ticker, s.reason_text());
    }
    out
}

pub fn describe_trigger(trigger: &Trigger) -> String {
    match trigger {
        Trigger::GoldenCross => "close > SMA50 > SMA200".to_string(),
        Trigger::RsiMomentum {
            rsi_low,
            rsi_high,
            min_rising,
        } => format!("RSI14 in [{rsi_low}, {rsi_high}], >= {min_rising} rising days"),
        Trigger::Breakout {
            near_high,
            volume_mult,
        } => format!(
            "close >= {:.0}% of 52w high, volume >= {volume_mult}x 20d avg",
            near_high * 100.0
        ),
        Trigger::VolumeSurge { vol_ratio } => {
            format!("vol5x20 >= {vol_ratio}, close > EMA20 or pocket pivot")
        }
        Trigger::MeanReversion {
            rsi_max,
            max_sma200_dev,
        } => format!(
            "RSI14 < {rsi_max}, close within {:.0}% of SMA200",
            max_sma200_dev * 100.0
        ),
    }
}

pub fn describe_constraint(constraint: &Constraint) -> String {
    let detail = match &constraint.kind {
        ConstraintKind::MinTrendSpread { ratio } => format!("SMA50/SMA200 >= {ratio}"),
        ConstraintKind::NearHigh { fraction } => {
            format!("close >= {:.0}% of 52w high", fraction * 100.0)
        }
        ConstraintKind::MinDollarVolume { floor } => {
            format!("20d dollar volume >= ${:.1}M", floor / 1_000_000.0)
        }
        ConstraintKind::MaxRsi { max } => format!("RSI14 <= {max}"),
        ConstraintKind::TrendAligned => "SMA50 >= SMA200".to_string(),
        ConstraintKind::MinBaseLength { sessions } => format!("base >= {sessions} sessions"),
        ConstraintKind::MaxAtrStop { atr_mult, max_pct } => {
            format!("{atr_mult}x ATR stop within {:.0}%", max_pct * 100.0)
        }
        ConstraintKind::MaxTrendGap { max_pct } => {
            format!("|SMA50-SMA200|/close < {:.0}%", max_pct * 100.0)
        }
    };
    let strength = match constraint.strength {
        Strength::Required => "required",
        Strength::Preferred => "preferred",
    };
    if constraint.waive_if_unavailable {
        format!("{detail} ({strength}, waived if unavailable)")
    } else {
        format!("{detail} ({strength})")
    }
}

/// The effective strategy table, one block per strategy.
pub fn render_strategy_table(table: &StrategyTable) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Constraint mode: {} (advisory penalty {:.0}% per failed preference)\n",
        table.mode,
        table.advisory_penalty * 100.0
    );
    for def in &table.definitions {
        let _ = writeln!(out, "{} [{}]", def.kind.label(), def.kind.key());
        let _ = writeln!(out, "  trigger:     {}", describe_trigger(&def.trigger));
        match def.score.cross_bonus {
            Some(b) => {
                let _ = writeln!(
                    out,
                    "  score:       {:.2} (+{:.2} if SMA cross within {} sessions)",
                    def.score.base, b.bonus, b.within
                );
            }
            None => {
                let _ = writeln!(out, "  score:       {:.2}", def.score.base);
            }
        }
        let _ = writeln!(out, "  min history: {} sessions", def.min_history);
        for c in &def.constraints {
            let _ = writeln!(out, "  constraint:  {}", describe_constraint(c));
        }
        out.push('\n');
    }
    out
}

pub struct AnalysisContext<'a> {
    pub ticker: &'a str,
    pub generated: &'a str,
    pub snapshot: &'a IndicatorSnapshot,
    pub results: &'a [StrategyResult],
    pub regime: &'a Classification,
}

/// Markdown analysis for a single ticker.
pub fn render_analysis(ctx: &AnalysisContext) -> String {
    let s = ctx.snapshot;
    let mut md = String::new();
    let _ = writeln!(md, "# {} ({})\n", ctx.ticker, ctx.generated);
    let _ = writeln!(md, "As of {} with {} sessions of history.\n", s.date, s.history_len);

    md.push_str("## Classification\n\n");
    let _ = writeln!(md, "- Regime: {}", ctx.regime.regime);
    let _ = writeln!(md, "- Why: {}", ctx.regime.reason);
    let _ = writeln!(md, "- Approach: {}\n", ctx.regime.regime.approach());

    md.push_str("## Technicals\n\n| Indicator | Value |\n|---|---|\n");
    let rows = [
        ("Close", format!("{:.2}", s.close)),
        ("SMA50", opt(s.sma50, 2)),
        ("SMA200", opt(s.sma200, 2)),
        ("EMA20", opt(s.ema20, 2)),
        ("RSI14", opt(s.rsi14, 1)),
        ("ATR14", opt(s.atr14, 2)),
        ("52w high", opt(s.high_52w, 2)),
        ("Distance from 52w high", pct(s.dist_52w_high)),
        ("Vol 5d/20d", opt(s.vol5x20, 2)),
        ("20d dollar volume", dollars_m(s.avg_dollar_volume)),
        ("1m return", pct(s.return_1m)),
        ("3m return", pct(s.return_3m)),
    ];
    for (name, value) in rows {
        let _ = writeln!(md, "| {name} | {value} |");
    }
    if let Some(b) = s.bollinger {
        let _ = writeln!(
            md,
            "| Bollinger (20, 2) | {:.2} / {:.2} / {:.2} |",
            b.lower, b.middle, b.upper
        );
    }

    md.push_str("\n## Strategies\n\n| Strategy | Outcome |\n|---|---|\n");
    for r in ctx.results {
        let _ = writeln!(md, "| {} | {} |", r.strategy.label(), r.outcome);
    }

    let triggered: Vec<&StrategyResult> = ctx.results.iter().filter(|r| r.is_triggered()).collect();
    md.push('\n');
    if triggered.is_empty() {
        md.push_str("No strategy triggered.\n");
    } else {
        let best = triggered
            .iter()
            .copied()
            .fold(triggered[0], |best, r| if r.score() > best.score() { r } else { best });
        let _ = writeln!(md, "Best fit: {} ({:.2}).", best.strategy.label(), best.score());
    }

    let unavailable: Vec<String> = ctx
        .results
        .iter()
        .filter_map(|r| match &r.outcome {
            Outcome::Unavailable { indicator } => Some(format!("{} needs {}", r.strategy.key(), indicator)),
            _ => None,
        })
        .collect();
    if !unavailable.is_empty() {
        let _ = writeln!(md, "Not enough data: {}.", unavailable.join("; "));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::strategy::ConstraintMode;

    fn row(ticker: &str, score: f64) -> ScanRow {
        ScanRow {
            timestamp: "2024-06-03 21:05 UTC".into(),
            ticker: ticker.into(),
            strategy: "golden_cross".into(),
            score,
            close: 108.0,
            rsi14: Some(61.24),
            sma50: Some(105.0),
            sma200: None,
            dist_52w_high: Some(0.0609),
            vol5x20: Some(1.1),
        }
    }

    #[test]
    fn scan_table_aligns_and_limits() {
        let rows = vec![row("AAPL", 3.0), row("MSFT", 2.0), row("T", 1.0)];
        let out = render_scan_table(&rows, 2);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Timestamp"));
        assert!(lines[1].contains("AAPL"));
        assert!(lines[1].contains("61.2"));
        assert!(!out.contains("  T  "));
        let ticker_col = lines[0].find("Ticker").unwrap();
        assert_eq!(&lines[2][ticker_col..ticker_col + 4], "MSFT");
    }

    #[test]
    fn missing_values_render_as_dash() {
        let out = render_scan_table(&[row("AAPL", 2.0)], 25);
        let cells: Vec<&str> = out.lines().nth(1).unwrap().split_whitespace().collect();
        // timestamp spans three whitespace-separated tokens
        assert_eq!(cells[9], "-");
    }

    #[test]
    fn strategy_table_lists_every_definition() {
        let table = StrategyTable::default().with_mode(ConstraintMode::Advisory);
        let out = render_strategy_table(&table);
        assert!(out.starts_with("Constraint mode: advisory"));
        assert!(out.contains("Golden Cross [golden_cross]"));
        assert!(out.contains("+1.00 if SMA cross within 10 sessions"));
        assert!(out.contains("20d dollar volume >= $10.0M (preferred)"));
        assert!(out.contains("SMA50 >= SMA200 (preferred, waived if unavailable)"));
        assert_eq!(out.matches("min history").count(), 5);
    }
}
