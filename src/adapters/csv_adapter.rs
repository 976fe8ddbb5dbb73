//! CSV directory price source: one `<TICKER>.csv` per symbol with
//! `Date,Open,High,Low,Close,Volume` columns.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::PricePoint;
use crate::ports::price_port::{keep_last, PriceSource};
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

const COLUMNS: [&str; 6] = ["date", "open", "high", "low", "close", "volume"];

pub struct CsvPriceSource {
    base_path: PathBuf,
}

impl CsvPriceSource {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, ticker: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", ticker))
    }

    fn parse(&self, ticker: &str, content: &str) -> Result<Vec<PricePoint>, ScanError> {
        let fail = |reason: String| ScanError::data_unavailable(ticker, reason);

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let headers = rdr
            .headers()
            .map_err(|e| fail(format!("CSV header error: {}", e)))?
            .clone();

        let mut positions = [0usize; 6];
        for (slot, column) in positions.iter_mut().zip(COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(column))
                .ok_or_else(|| fail(format!("missing {} column", column)))?;
        }
        let [date_col, open_col, high_col, low_col, close_col, volume_col] = positions;

        let mut points = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| fail(format!("CSV parse error: {}", e)))?;
            let field = |col: usize| record.get(col).map(str::trim).unwrap_or("");

            // Exports leave the close blank or NaN on non-trading days.
            let close = field(close_col);
            if close.is_empty() || close.eq_ignore_ascii_case("nan") {
                continue;
            }

            let date_str = field(date_col);
            let date = NaiveDate::parse_from_str(date_str.get(..10).unwrap_or(date_str), "%Y-%m-%d")
                .map_err(|e| fail(format!("row {}: invalid date '{}': {}", line + 1, date_str, e)))?;

            let number = |col: usize, name: &str| -> Result<f64, ScanError> {
                let raw = field(col);
                let value = raw
                    .parse::<f64>()
                    .map_err(|e| fail(format!("row {}: invalid {} value: {}", line + 1, name, e)))?;
                if !value.is_finite() {
                    return Err(fail(format!("row {}: {} is not a finite number: '{}'", line + 1, name, raw)));
                }
                Ok(value)
            };
            let volume = number(volume_col, "volume")?;
            if volume < 0.0 {
                return Err(fail(format!("row {}: negative volume {}", line + 1, volume)));
            }

            points.push(PricePoint {
                date,
                open: number(open_col, "open")?,
                high: number(high_col, "high")?,
                low: number(low_col, "low")?,
                close: number(close_col, "close")?,
                volume: volume.round() as u64,
            });
        }

        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Ok(points)
    }
}

impl PriceSource for CsvPriceSource {
    fn fetch(&self, ticker: &str, lookback: usize) -> Result<Vec<PricePoint>, ScanError> {
        let path = self.csv_path(ticker);
        let content = fs::read_to_string(&path).map_err(|e| {
            ScanError::data_unavailable(ticker, format!("failed to read {}: {}", path.display(), e))
        })?;
        let points = self.parse(ticker, &content)?;
        if points.is_empty() {
            return Err(ScanError::data_unavailable(ticker, "no rows"));
        }
        Ok(keep_last(points, lookback))
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.base_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let aapl = "Date,Open,High,Low,Close,Volume\n\
            2024-01-16,105.0,115.0,100.0,110.0,60000\n\
            2024-01-15,100.0,110.0,90.0,105.0,50000\n\
            2024-01-17,110.0,120.0,105.0,115.0,70000.0\n";
        fs::write(path.join("AAPL.csv"), aapl).unwrap();

        let msft = "date,open,high,low,close,adj close,volume\n\
            2024-01-15 00:00:00,50.0,55.0,45.0,52.0,51.5,1000\n\
            2024-01-16,,,,,,\n";
        fs::write(path.join("MSFT.csv"), msft).unwrap();

        fs::write(path.join("BAD.csv"), "Date,Open,High,Low,Close,Volume\nnot-a-date,1,1,1,1,1\n").unwrap();
        fs::write(path.join("NOVOL.csv"), "Date,Open,High,Low,Close\n2024-01-15,1,1,1,1\n").unwrap();
        fs::write(path.join("notes.txt"), "ignored").unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_returns_sorted_points() {
        let (_dir, path) = setup_test_data();
        let source = CsvPriceSource::new(path);

        let points = source.fetch("AAPL", 100).unwrap();
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(points[2].close, 115.0);
        assert_eq!(points[2].volume, 70000);
    }

    #[test]
    fn fetch_truncates_to_lookback() {
        let (_dir, path) = setup_test_data();
        let source = CsvPriceSource::new(path);

        let points = source.fetch("AAPL", 2).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 1, 16).unwrap());
    }

    #[test]
    fn headers_are_located_by_name() {
        let (_dir, path) = setup_test_data();
        let source = CsvPriceSource::new(path);

        let points = source.fetch("MSFT", 10).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].close, 52.0);
        assert_eq!(points[0].volume, 1000);
    }

    #[test]
    fn missing_file_is_data_unavailable() {
        let (_dir, path) = setup_test_data();
        let source = CsvPriceSource::new(path);
        assert!(matches!(
            source.fetch("XYZ", 10),
            Err(ScanError::DataUnavailable { ticker, .. }) if ticker == "XYZ"
        ));
    }

    #[test]
    fn malformed_rows_are_data_unavailable() {
        let (_dir, path) = setup_test_data();
        let source = CsvPriceSource::new(path);
        assert!(matches!(source.fetch("BAD", 10), Err(ScanError::DataUnavailable { .. })));
        assert!(matches!(source.fetch("NOVOL", 10), Err(ScanError::DataUnavailable { .. })));
    }

    #[test]
    fn nan_close_rows_are_skipped() {
        let (_dir, path) = setup_test_data();
        let body = "Date,Open,High,Low,Close,Volume\n\
            2024-01-15,10,11,9,10.5,1000\n\
            2024-01-16,NaN,NaN,NaN,NaN,NaN\n\
            2024-01-17,10.5,12,10,11.5,2000\n";
        fs::write(path.join("GAP.csv"), body).unwrap();

        let points = CsvPriceSource::new(path).fetch("GAP", 10).unwrap();
        assert_eq!(points.len(), 2);
        assert!(points.iter().all(|p| p.close.is_finite()));
        assert_eq!(points[1].date, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
    }

    #[test]
    fn non_finite_prices_and_volumes_are_rejected() {
        let (_dir, path) = setup_test_data();
        fs::write(
            path.join("HIGH.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-15,10,nan,9,10.5,1000\n",
        )
        .unwrap();
        fs::write(
            path.join("VOL.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-15,10,11,9,10.5,NaN\n",
        )
        .unwrap();
        fs::write(
            path.join("NEG.csv"),
            "Date,Open,High,Low,Close,Volume\n2024-01-15,10,11,9,10.5,-5\n",
        )
        .unwrap();

        let source = CsvPriceSource::new(path);
        for ticker in ["HIGH", "VOL", "NEG"] {
            assert!(
                matches!(source.fetch(ticker, 10), Err(ScanError::DataUnavailable { .. })),
                "{ticker} should be rejected"
            );
        }
    }
}
