//! Yahoo Finance price source.
//!
//! Reads daily bars from the v8 chart API over blocking HTTP. Prices are
//! split/dividend adjusted with the `adjclose` series when Yahoo supplies it.

use crate::domain::error::ScanError;
use crate::domain::ohlcv::PricePoint;
use crate::ports::price_port::{keep_last, PriceSource};
use chrono::{DateTime, Duration as CalendarDays, Utc};
use serde::Deserialize;
use std::time::Duration;

const BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

enum Attempt {
    Retry(String),
    Fatal(String),
}

pub struct YahooPriceSource {
    client: reqwest::blocking::Client,
    attempts: u32,
    backoff: Duration,
}

impl YahooPriceSource {
    pub fn new() -> Result<Self, ScanError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) stockscan")
            .build()
            .map_err(|e| ScanError::Io(std::io::Error::other(e)))?;
        Ok(Self {
            client,
            attempts: 3,
            backoff: Duration::from_millis(500),
        })
    }

    fn chart_url(ticker: &str, lookback: usize, now: DateTime<Utc>) -> String {
        // Weekends and holidays: ~252 sessions per 365 days, plus slack.
        let days = (lookback as i64 * 7 / 5) + 14;
        let start = (now - CalendarDays::days(days)).timestamp();
        let end = now.timestamp();
        format!(
            "{BASE_URL}/{ticker}?period1={start}&period2={end}&interval=1d&includeAdjustedClose=true"
        )
    }

    fn attempt(&self, ticker: &str, url: &str) -> Result<Vec<PricePoint>, Attempt> {
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| Attempt::Retry(format!("request failed: {e}")))?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Attempt::Fatal("symbol not found".into()));
        }
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Attempt::Fatal(format!("HTTP {status}: access denied")));
        }
        if !status.is_success() {
            return Err(Attempt::Retry(format!("HTTP {status}")));
        }

        let body = resp
            .text()
            .map_err(|e| Attempt::Retry(format!("failed to read body: {e}")))?;
        parse_chart(ticker, &body).map_err(Attempt::Fatal)
    }
}

impl PriceSource for YahooPriceSource {
    fn fetch(&self, ticker: &str, lookback: usize) -> Result<Vec<PricePoint>, ScanError> {
        let url = Self::chart_url(ticker, lookback, Utc::now());
        let mut last_error = String::from("no attempts made");

        for attempt in 0..self.attempts {
            match self.attempt(ticker, &url) {
                Ok(points) => return Ok(keep_last(points, lookback)),
                Err(Attempt::Fatal(reason)) => return Err(ScanError::data_unavailable(ticker, reason)),
                Err(Attempt::Retry(reason)) => {
                    tracing::debug!(ticker, attempt = attempt + 1, reason = %reason, "yahoo fetch failed");
                    last_error = reason;
                }
            }
            if attempt + 1 < self.attempts {
                std::thread::sleep(self.backoff * (attempt + 1));
            }
        }

        Err(ScanError::data_unavailable(
            ticker,
            format!("{} attempts failed, last: {}", self.attempts, last_error),
        ))
    }

    fn describe(&self) -> String {
        "yahoo".into()
    }
}

/// Parse a chart API body into ascending, adjusted price points.
fn parse_chart(ticker: &str, body: &str) -> Result<Vec<PricePoint>, String> {
    let resp: ChartResponse =
        serde_json::from_str(body).map_err(|e| format!("unexpected response format: {e}"))?;

    let results = match (resp.chart.result, resp.chart.error) {
        (Some(results), _) => results,
        (None, Some(err)) => return Err(format!("{}: {}", err.code, err.description)),
        (None, None) => return Err("empty result with no error".into()),
    };
    let data = results
        .into_iter()
        .next()
        .ok_or_else(|| "result array is empty".to_string())?;
    let timestamps = data.timestamp.unwrap_or_default();
    let quote = data
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| "no quote data".to_string())?;
    let adj_closes = data
        .indicators
        .adjclose
        .and_then(|v| v.into_iter().next())
        .map(|a| a.adjclose);

    let mut points = Vec::with_capacity(timestamps.len());
    for (i, &ts) in timestamps.iter().enumerate() {
        let date = DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.date_naive())
            .ok_or_else(|| format!("invalid timestamp: {ts}"))?;

        let at = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) =
            (at(&quote.open), at(&quote.high), at(&quote.low), at(&quote.close))
        else {
            // Non-trading days come back as all-null rows.
            continue;
        };

        let factor = adj_closes
            .as_ref()
            .and_then(|adj| adj.get(i).copied().flatten())
            .filter(|_| close > 0.0)
            .map(|adj| adj / close)
            .unwrap_or(1.0);

        points.push(PricePoint {
            date,
            open: open * factor,
            high: high * factor,
            low: low * factor,
            close: close * factor,
            volume: quote.volume.get(i).copied().flatten().unwrap_or(0),
        });
    }

    if points.is_empty() {
        return Err(format!("no price rows for {ticker}"));
    }
    points.sort_by_key(|p| p.date);
    points.dedup_by_key(|p| p.date);
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1717421400, 1717507800, 1717594200],
                "indicators": {
                    "quote": [{
                        "open":   [100.0, null, 104.0],
                        "high":   [102.0, null, 106.0],
                        "low":    [ 99.0, null, 103.0],
                        "close":  [101.0, null, 105.0],
                        "volume": [1000, null, 1500]
                    }],
                    "adjclose": [{ "adjclose": [50.5, null, 105.0] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_and_adjusts() {
        let points = parse_chart("AAPL", SAMPLE).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());
        // adjclose is half the raw close on the first row
        assert!((points[0].close - 50.5).abs() < 1e-9);
        assert!((points[0].high - 51.0).abs() < 1e-9);
        assert_eq!(points[0].volume, 1000);
        assert!((points[1].close - 105.0).abs() < 1e-9);
    }

    #[test]
    fn api_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = parse_chart("ZZZZ", body).unwrap_err();
        assert!(err.starts_with("Not Found"));
    }

    #[test]
    fn garbage_body_is_rejected() {
        assert!(parse_chart("AAPL", "<html>").is_err());
    }

    #[test]
    fn all_null_rows_mean_no_data() {
        let body = r#"{"chart":{"result":[{"timestamp":[1717421400],"indicators":{"quote":[{"open":[null],"high":[null],"low":[null],"close":[null],"volume":[null]}]}}],"error":null}"#;
        assert!(parse_chart("AAPL", body).is_err());
    }

    #[test]
    fn url_spans_lookback_in_calendar_days() {
        let now = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
        let url = YahooPriceSource::chart_url("BRK-B", 252, now);
        let start = (now - CalendarDays::days(252 * 7 / 5 + 14)).timestamp();
        assert!(url.starts_with("https://query2.finance.yahoo.com/v8/finance/chart/BRK-B?"));
        assert!(url.contains(&format!("period1={start}")));
        assert!(url.contains("interval=1d"));
    }
}
