//! The scan pipeline: fetch, compute, evaluate and aggregate every ticker of
//! a universe, then rank the rows.

use crate::domain::aggregate::{aggregate, sort_rows, AggregationMode, ScanRow};
use crate::domain::error::ScanError;
use crate::domain::evaluator::{evaluate, StrategyResult};
use crate::domain::snapshot::{compute_snapshot, IndicatorConfig, IndicatorSnapshot};
use crate::domain::strategy::StrategyTable;
use crate::domain::universe::Universe;
use crate::ports::price_port::PriceSource;
use chrono::{DateTime, Utc};
use rayon::prelude::*;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    /// Sessions of history requested per ticker.
    pub lookback: usize,
    pub aggregation: AggregationMode,
    pub workers: usize,
    pub indicators: IndicatorConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            lookback: 252,
            aggregation: AggregationMode::Best,
            workers: 4,
            indicators: IndicatorConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The price source could not deliver a series.
    Fetch(String),
    /// The series arrived but no snapshot could be built from it.
    Data(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: SkipReason,
}

impl SkippedTicker {
    pub fn reason_text(&self) -> &str {
        match &self.reason {
            SkipReason::Fetch(r) | SkipReason::Data(r) => r,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    /// Sorted by score descending, then ticker ascending.
    pub rows: Vec<ScanRow>,
    pub skipped: Vec<SkippedTicker>,
    pub universe_size: usize,
    pub run_at: DateTime<Utc>,
    pub aggregation: AggregationMode,
}

impl ScanReport {
    pub fn timestamp(&self) -> String {
        format_timestamp(self.run_at)
    }

    pub fn candidates(&self) -> usize {
        self.rows.len()
    }

    pub fn top(&self, n: usize) -> &[ScanRow] {
        &self.rows[..n.min(self.rows.len())]
    }
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Everything computed for a single ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct TickerAnalysis {
    pub snapshot: IndicatorSnapshot,
    pub results: Vec<StrategyResult>,
}

enum TickerOutcome {
    Evaluated(Option<ScanRow>),
    Skipped(SkipReason),
}

pub struct ScanPipeline<'a> {
    prices: &'a dyn PriceSource,
    table: StrategyTable,
    options: ScanOptions,
}

impl<'a> ScanPipeline<'a> {
    pub fn new(prices: &'a dyn PriceSource, table: StrategyTable, options: ScanOptions) -> Self {
        Self {
            prices,
            table,
            options,
        }
    }

    pub fn table(&self) -> &StrategyTable {
        &self.table
    }

    pub fn run(&self, universe: &Universe) -> Result<ScanReport, ScanError> {
        self.run_at(universe, Utc::now())
    }

    /// Run with a fixed clock; `run_at` stamps every row.
    pub fn run_at(&self, universe: &Universe, run_at: DateTime<Utc>) -> Result<ScanReport, ScanError> {
        let timestamp = format_timestamp(run_at);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.workers.max(1))
            .thread_name(|i| format!("stockscan-worker-{i}"))
            .build()
            .map_err(std::io::Error::other)?;

        tracing::info!(
            universe = %universe.label,
            tickers = universe.count(),
            strategies = self.table.definitions.len(),
            workers = self.options.workers,
            "scan started"
        );

        let outcomes: Vec<(&String, TickerOutcome)> = pool.install(|| {
            universe
                .tickers
                .par_iter()
                .map(|ticker| (ticker, self.scan_ticker(ticker, &timestamp)))
                .collect()
        });

        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for (ticker, outcome) in outcomes {
            match outcome {
                TickerOutcome::Evaluated(row) => rows.extend(row),
                TickerOutcome::Skipped(reason) => skipped.push(SkippedTicker {
                    ticker: ticker.clone(),
                    reason,
                }),
            }
        }

        let fetch_failures = skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::Fetch(_)))
            .count();
        if universe.count() > 0 && fetch_failures == universe.count() {
            return Err(ScanError::UniverseUnreachable {
                attempted: universe.count(),
            });
        }

        sort_rows(&mut rows);
        tracing::info!(
            candidates = rows.len(),
            skipped = skipped.len(),
            "scan finished"
        );

        Ok(ScanReport {
            rows,
            skipped,
            universe_size: universe.count(),
            run_at,
            aggregation: self.options.aggregation,
        })
    }

    /// Fetch one ticker and evaluate every strategy against it.
    pub fn analyze(&self, ticker: &str) -> Result<TickerAnalysis, ScanError> {
        let points = self.prices.fetch(ticker, self.options.lookback)?;
        let snapshot = compute_snapshot(&points, &self.options.indicators)
            .map_err(|e| ScanError::data_unavailable(ticker, e))?;
        let results = evaluate(ticker, &snapshot, &self.table);
        Ok(TickerAnalysis { snapshot, results })
    }

    fn scan_ticker(&self, ticker: &str, timestamp: &str) -> TickerOutcome {
        let points = match self.prices.fetch(ticker, self.options.lookback) {
            Ok(points) => points,
            Err(e) => {
                tracing::warn!(ticker, reason = %e, "skipping ticker: fetch failed");
                return TickerOutcome::Skipped(SkipReason::Fetch(e.to_string()));
            }
        };

        let snapshot = match compute_snapshot(&points, &self.options.indicators) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!(ticker, reason = %e, "skipping ticker: unusable series");
                return TickerOutcome::Skipped(SkipReason::Data(e.to_string()));
            }
        };

        let results = evaluate(ticker, &snapshot, &self.table);
        for r in &results {
            tracing::debug!(ticker, strategy = %r.strategy, outcome = %r.outcome, "evaluated");
        }
        TickerOutcome::Evaluated(aggregate(&results, self.options.aggregation, timestamp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ohlcv::PricePoint;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::HashMap;

    struct FixedPrices(HashMap<String, Vec<PricePoint>>);

    impl PriceSource for FixedPrices {
        fn fetch(&self, ticker: &str, lookback: usize) -> Result<Vec<PricePoint>, ScanError> {
            self.0
                .get(ticker)
                .cloned()
                .map(|pts| crate::ports::price_port::keep_last(pts, lookback))
                .ok_or_else(|| ScanError::data_unavailable(ticker, "not found"))
        }

        fn describe(&self) -> String {
            "fixed".into()
        }
    }

    fn surge_series(len: usize) -> Vec<PricePoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..len)
            .map(|i| {
                let close = 20.0 + i as f64 * 0.1;
                PricePoint {
                    date: start + chrono::Duration::days(i as i64),
                    open: close,
                    high: close + 0.5,
                    low: close - 0.5,
                    close,
                    volume: if i + 5 >= len { 2_000_000 } else { 500_000 },
                }
            })
            .collect()
    }

    fn clock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, 21, 5, 0).unwrap()
    }

    #[test]
    fn timestamp_format() {
        assert_eq!(format_timestamp(clock()), "2024-06-03 21:05 UTC");
    }

    #[test]
    fn scan_collects_rows_and_skips() {
        let mut data = HashMap::new();
        data.insert("AAA".to_string(), surge_series(60));
        data.insert("EMPTY".to_string(), Vec::new());
        let prices = FixedPrices(data);
        let universe = Universe::new(
            "test",
            vec!["AAA".into(), "EMPTY".into(), "MISSING".into()],
        )
        .unwrap();

        let pipeline = ScanPipeline::new(&prices, StrategyTable::default(), ScanOptions::default());
        let report = pipeline.run_at(&universe, clock()).unwrap();

        assert_eq!(report.universe_size, 3);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].ticker, "AAA");
        assert_eq!(report.rows[0].strategy, "volume_surge");
        assert_eq!(report.rows[0].timestamp, "2024-06-03 21:05 UTC");

        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(report.skipped[0].reason, SkipReason::Data(_)));
        assert_eq!(report.skipped[1].ticker, "MISSING");
        assert!(matches!(report.skipped[1].reason, SkipReason::Fetch(_)));
    }

    #[test]
    fn all_fetches_failing_aborts() {
        let prices = FixedPrices(HashMap::new());
        let universe = Universe::new("test", vec!["X".into(), "Y".into()]).unwrap();
        let pipeline = ScanPipeline::new(&prices, StrategyTable::default(), ScanOptions::default());
        assert!(matches!(
            pipeline.run_at(&universe, clock()),
            Err(ScanError::UniverseUnreachable { attempted: 2 })
        ));
    }

    #[test]
    fn analyze_single_ticker() {
        let mut data = HashMap::new();
        data.insert("AAA".to_string(), surge_series(80));
        let prices = FixedPrices(data);
        let options = ScanOptions {
            lookback: 50,
            ..ScanOptions::default()
        };
        let pipeline = ScanPipeline::new(&prices, StrategyTable::default(), options);
        let analysis = pipeline.analyze("AAA").unwrap();
        assert_eq!(analysis.snapshot.history_len, 50);
        assert_eq!(analysis.results.len(), 5);
        assert!(pipeline.analyze("NOPE").is_err());
    }

    #[test]
    fn top_is_bounded() {
        let report = ScanReport {
            rows: Vec::new(),
            skipped: Vec::new(),
            universe_size: 0,
            run_at: clock(),
            aggregation: AggregationMode::Best,
        };
        assert!(report.top(25).is_empty());
        assert_eq!(report.candidates(), 0);
    }
}
