//! Environment checks behind `stockscan doctor`.

use crate::ports::price_port::PriceSource;
use crate::ports::universe_port::UniverseSource;
use std::fmt::Write;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok: true,
            detail: detail.into(),
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            ok: false,
            detail: detail.into(),
        }
    }
}

/// The workbook's directory exists (or can be created) and accepts writes.
pub fn check_excel_path(path: &Path) -> CheckResult {
    let dir = match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir,
        None => Path::new("."),
    };
    let probe = dir.join(".stockscan_write_test");
    let result = fs::create_dir_all(dir)
        .and_then(|_| fs::write(&probe, "ok"))
        .and_then(|_| fs::remove_file(&probe));
    match result {
        Ok(()) => CheckResult::pass("excel:path", path.display().to_string()),
        Err(e) => CheckResult::fail("excel:path", format!("{}: {}", path.display(), e)),
    }
}

pub fn check_config(path: Option<&Path>, loaded: Result<(), String>) -> CheckResult {
    let label = path.map_or_else(|| "(defaults)".to_string(), |p| p.display().to_string());
    match loaded {
        Ok(()) => CheckResult::pass("config", label),
        Err(reason) => CheckResult::fail("config", format!("{label}: {reason}")),
    }
}

pub fn check_universe(source: &dyn UniverseSource) -> CheckResult {
    match source.load() {
        Ok(universe) => CheckResult::pass(
            "universe:configured",
            format!("universe={}, tickers={}", universe.label, universe.count()),
        ),
        Err(e) => CheckResult::fail("universe:configured", e.to_string()),
    }
}

pub fn check_price_fetch(prices: &dyn PriceSource, ticker: &str) -> CheckResult {
    let name = format!("prices:{}", prices.describe());
    match prices.fetch(ticker, 63) {
        Ok(points) if !points.is_empty() => {
            CheckResult::pass(&name, format!("ticker={ticker}, rows={}", points.len()))
        }
        Ok(_) => CheckResult::fail(&name, format!("ticker={ticker}, rows=0")),
        Err(e) => CheckResult::fail(&name, e.to_string()),
    }
}

#[cfg(feature = "sqlite")]
pub fn check_sqlite(path: &Path) -> CheckResult {
    match crate::adapters::sqlite_adapter::SqliteSink::open(path) {
        Ok(_) => CheckResult::pass("sqlite", path.display().to_string()),
        Err(e) => CheckResult::fail("sqlite", e.to_string()),
    }
}

pub fn all_ok(checks: &[CheckResult]) -> bool {
    checks.iter().all(|c| c.ok)
}

pub fn render(checks: &[CheckResult]) -> String {
    let mut out = String::new();
    let verdict = if all_ok(checks) { "PASS" } else { "FAIL" };
    let _ = writeln!(out, "Diagnostics: {verdict}");
    for c in checks {
        let status = if c.ok { "OK" } else { "FAIL" };
        let _ = writeln!(out, "- {status} {}: {}", c.name, c.detail);
    }
    out
}
