//! SQLite scan history sink.
//!
//! Each run appends its rows to `scan_rows` and one line to `run_log`, so
//! the database accumulates every scan ever written to it.

use crate::domain::aggregate::ScanRow;
use crate::domain::error::ScanError;
use crate::domain::scan::ScanReport;
use crate::domain::universe::Universe;
use crate::ports::sink_port::ScanSink;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

const SINK: &str = "sqlite";

fn db_err(e: impl ToString) -> ScanError {
    ScanError::sink(SINK, e)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunLogEntry {
    pub timestamp: String,
    pub universe: String,
    pub universe_size: usize,
    pub candidates: usize,
    pub skipped: usize,
    pub aggregation: String,
}

pub struct SqliteSink {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let parent = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty());
        if let Some(parent) = parent {
            std::fs::create_dir_all(parent).map_err(db_err)?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder().max_size(2).build(manager).map_err(db_err)?;
        let sink = Self { pool };
        sink.initialize_schema()?;
        Ok(sink)
    }

    pub fn in_memory() -> Result<Self, ScanError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(db_err)?;
        let sink = Self { pool };
        sink.initialize_schema()?;
        Ok(sink)
    }

    fn initialize_schema(&self) -> Result<(), ScanError> {
        let conn = self.pool.get().map_err(db_err)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS run_log (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                universe TEXT NOT NULL,
                universe_size INTEGER NOT NULL,
                candidates INTEGER NOT NULL,
                skipped INTEGER NOT NULL,
                aggregation TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scan_rows (
                run_id INTEGER NOT NULL REFERENCES run_log(run_id),
                timestamp TEXT NOT NULL,
                ticker TEXT NOT NULL,
                strategy TEXT NOT NULL,
                score REAL NOT NULL,
                close REAL NOT NULL,
                rsi14 REAL,
                sma50 REAL,
                sma200 REAL,
                dist_52w_high REAL,
                vol5x20 REAL
            );
            CREATE INDEX IF NOT EXISTS idx_scan_rows_ticker ON scan_rows(ticker);
            CREATE INDEX IF NOT EXISTS idx_scan_rows_run ON scan_rows(run_id);",
        )
        .map_err(db_err)?;
        Ok(())
    }

    pub fn record(&self, report: &ScanReport, universe: &Universe) -> Result<i64, ScanError> {
        let mut conn = self.pool.get().map_err(db_err)?;
        let tx = conn.transaction().map_err(db_err)?;
        let timestamp = report.timestamp();

        tx.execute(
            "INSERT INTO run_log (timestamp, universe, universe_size, candidates, skipped, aggregation)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                timestamp,
                universe.label,
                report.universe_size as i64,
                report.candidates() as i64,
                report.skipped.len() as i64,
                report.aggregation.to_string()
            ],
        )
        .map_err(db_err)?;
        let run_id = tx.last_insert_rowid();

        for row in &report.rows {
            tx.execute(
                "INSERT INTO scan_rows (run_id, timestamp, ticker, strategy, score, close,
                                        rsi14, sma50, sma200, dist_52w_high, vol5x20)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    run_id,
                    row.timestamp,
                    row.ticker,
                    row.strategy,
                    row.score,
                    row.close,
                    row.rsi14,
                    row.sma50,
                    row.sma200,
                    row.dist_52w_high,
                    row.vol5x20
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;
        Ok(run_id)
    }

    pub fn run_log(&self) -> Result<Vec<RunLogEntry>, ScanError> {
        let conn = self.pool.get().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, universe, universe_size, candidates, skipped, aggregation
                 FROM run_log ORDER BY run_id ASC",
            )
            .map_err(db_err)?;
        let entries = stmt
            .query_map([], |row| {
                Ok(RunLogEntry {
                    timestamp: row.get(0)?,
                    universe: row.get(1)?,
                    universe_size: row.get::<_, i64>(2)? as usize,
                    candidates: row.get::<_, i64>(3)? as usize,
                    skipped: row.get::<_, i64>(4)? as usize,
                    aggregation: row.get(5)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(entries)
    }

    /// Every stored row for `ticker`, oldest run first.
    pub fn history(&self, ticker: &str) -> Result<Vec<ScanRow>, ScanError> {
        let conn = self.pool.get().map_err(db_err)?;
        let mut stmt = conn
            .prepare(
                "SELECT timestamp, ticker, strategy, score, close, rsi14, sma50, sma200,
                        dist_52w_high, vol5x20
                 FROM scan_rows WHERE ticker = ?1 ORDER BY run_id ASC",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![ticker], |row| {
                Ok(ScanRow {
                    timestamp: row.get(0)?,
                    ticker: row.get(1)?,
                    strategy: row.get(2)?,
                    score: row.get(3)?,
                    close: row.get(4)?,
                    rsi14: row.get(5)?,
                    sma50: row.get(6)?,
                    sma200: row.get(7)?,
                    dist_52w_high: row.get(8)?,
                    vol5x20: row.get(9)?,
                })
            })
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;
        Ok(rows)
    }
}

impl ScanSink for SqliteSink {
    fn name(&self) -> &'static str {
        SINK
    }

    fn write(&self, report: &ScanReport, universe: &Universe) -> Result<(), ScanError> {
        let run_id = self.record(report, universe)?;
        tracing::info!(run_id, rows = report.rows.len(), "recorded scan in sqlite");
        Ok(())
    }
}
