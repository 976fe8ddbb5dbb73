//! Run settings, layered from defaults, the INI file, `STOCKSCAN_*`
//! environment variables and finally command-line flags.

use crate::domain::aggregate::AggregationMode;
use crate::domain::error::ScanError;
use crate::domain::scan::ScanOptions;
use crate::domain::snapshot::IndicatorConfig;
use crate::domain::strategy::{parse_strategy_list, ConstraintMode, StrategyKind, StrategyTable};
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

pub const DEFAULT_EXCEL_PATH: &str = "data/Top500_Sample_Strategy_Playbook.xlsx";

/// Universe cap applied when a dashboard export is configured and no
/// explicit `max_tickers` is set.
pub const SITE_MAX_TICKERS: usize = 250;

#[derive(Debug, Clone, PartialEq)]
pub enum UniverseSpec {
    Sp500,
    Nse,
    List(Vec<String>),
    File(PathBuf),
    Excel(PathBuf),
}

impl UniverseSpec {
    /// `sp500`, `nse`, `file:<path>`, `excel:<path>`, something path-shaped,
    /// or a comma-separated ticker list.
    pub fn parse(value: &str) -> Result<Self, ScanError> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("sp500") {
            return Ok(UniverseSpec::Sp500);
        }
        if value.eq_ignore_ascii_case("nse") {
            return Ok(UniverseSpec::Nse);
        }
        if let Some(path) = value.strip_prefix("file:") {
            return Ok(UniverseSpec::File(PathBuf::from(path)));
        }
        if let Some(path) = value.strip_prefix("excel:") {
            return Ok(UniverseSpec::Excel(PathBuf::from(path)));
        }
        let lower = value.to_lowercase();
        if lower.ends_with(".xlsx") || lower.ends_with(".xls") {
            return Ok(UniverseSpec::Excel(PathBuf::from(value)));
        }
        if value.contains('/') || value.contains('\\') || lower.ends_with(".txt") || lower.ends_with(".csv") {
            return Ok(UniverseSpec::File(PathBuf::from(value)));
        }
        Ok(UniverseSpec::List(parse_codes(value)?))
    }
}

impl fmt::Display for UniverseSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniverseSpec::Sp500 => f.write_str("sp500"),
            UniverseSpec::Nse => f.write_str("nse"),
            UniverseSpec::List(tickers) => f.write_str(&tickers.join(",")),
            UniverseSpec::File(path) => write!(f, "{}", path.display()),
            UniverseSpec::Excel(path) => write!(f, "excel:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub log_level: String,
    pub log_format: LogFormat,
    pub universe: UniverseSpec,
    pub strategies: Vec<StrategyKind>,
    pub lookback: usize,
    pub aggregation: AggregationMode,
    pub excel: PathBuf,
    pub workers: usize,
    pub constraint_mode: ConstraintMode,
    pub advisory_penalty: f64,
    pub prices_dir: Option<PathBuf>,
    pub json_dir: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    pub min_history_52w: usize,
    /// Scan only the first N tickers (sorted) of a larger universe.
    pub max_tickers: Option<usize>,
    pub site: SiteSettings,
}

/// `[site]`: how the dashboard export is shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteSettings {
    pub max_rows: usize,
    pub export_prices: bool,
    pub history_sessions: usize,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            max_rows: 200,
            export_prices: false,
            history_sessions: 504,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            universe: UniverseSpec::Sp500,
            strategies: StrategyKind::ALL.to_vec(),
            lookback: 252,
            aggregation: AggregationMode::Best,
            excel: PathBuf::from(DEFAULT_EXCEL_PATH),
            workers: 4,
            constraint_mode: ConstraintMode::Strict,
            advisory_penalty: 0.25,
            prices_dir: None,
            json_dir: None,
            sqlite: None,
            min_history_52w: IndicatorConfig::default().min_history_52w,
            max_tickers: None,
            site: SiteSettings::default(),
        }
    }
}

/// Values supplied on the command line; `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub universe: Option<String>,
    pub universe_file: Option<PathBuf>,
    pub strategies: Option<String>,
    pub lookback: Option<usize>,
    pub aggregate: Option<String>,
    pub excel: Option<PathBuf>,
    pub workers: Option<usize>,
    pub constraint_mode: Option<String>,
    pub prices_dir: Option<PathBuf>,
    pub json_dir: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    pub max_tickers: Option<usize>,
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> ScanError {
    ScanError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn parse_count(section: &str, key: &str, raw: &str) -> Result<usize, ScanError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| invalid(section, key, format!("'{}' is not a whole number", raw.trim())))
}

fn parse_flag(section: &str, key: &str, raw: &str) -> Result<bool, ScanError> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(invalid(section, key, format!("'{}' is not a boolean", other))),
    }
}

impl Settings {
    /// Resolve every layer below the command line.
    pub fn load<F>(config: &dyn ConfigPort, env: F) -> Result<Self, ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();
        settings.apply_config(config)?;
        settings.apply_env(env)?;
        Ok(settings)
    }

    pub fn apply_config(&mut self, config: &dyn ConfigPort) -> Result<(), ScanError> {
        if let Some(level) = config.get_string("app", "log_level") {
            self.log_level = level.trim().to_lowercase();
        }
        if let Some(format) = config.get_string("app", "log_format") {
            self.log_format = format.parse().map_err(|e: String| invalid("app", "log_format", e))?;
        }

        if let Some(universe) = config.get_string("scan", "universe") {
            self.universe = UniverseSpec::parse(&universe)?;
        }
        if let Some(strategies) = config.get_string("scan", "strategies") {
            self.strategies = parse_strategy_list(&strategies)?;
        }
        if let Some(lookback) = config.get_string("scan", "lookback") {
            self.lookback = parse_count("scan", "lookback", &lookback)?;
        }
        if let Some(aggregate) = config.get_string("scan", "aggregate") {
            self.aggregation = aggregate.parse()?;
        }
        if let Some(excel) = config.get_string("scan", "excel") {
            self.excel = PathBuf::from(excel.trim());
        }
        if let Some(workers) = config.get_string("scan", "workers") {
            self.workers = parse_count("scan", "workers", &workers)?;
        }
        if let Some(mode) = config.get_string("scan", "constraint_mode") {
            self.constraint_mode = mode.parse()?;
        }
        if let Some(penalty) = config.get_string("scan", "advisory_penalty") {
            self.advisory_penalty = penalty
                .trim()
                .parse()
                .map_err(|_| invalid("scan", "advisory_penalty", format!("'{}' is not a number", penalty.trim())))?;
        }
        if let Some(dir) = config.get_string("scan", "prices_dir") {
            self.prices_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(dir) = config.get_string("scan", "json_dir") {
            self.json_dir = Some(PathBuf::from(dir.trim()));
        }
        if let Some(db) = config.get_string("scan", "sqlite") {
            self.sqlite = Some(PathBuf::from(db.trim()));
        }
        if let Some(max) = config.get_string("scan", "max_tickers") {
            self.max_tickers = Some(parse_count("scan", "max_tickers", &max)?);
        }

        if let Some(rows) = config.get_string("site", "max_rows") {
            self.site.max_rows = parse_count("site", "max_rows", &rows)?;
        }
        if let Some(flag) = config.get_string("site", "export_prices") {
            self.site.export_prices = parse_flag("site", "export_prices", &flag)?;
        }
        if let Some(sessions) = config.get_string("site", "history_sessions") {
            self.site.history_sessions = parse_count("site", "history_sessions", &sessions)?;
        }

        if let Some(min) = config.get_string("indicators", "min_history_52w") {
            self.min_history_52w = parse_count("indicators", "min_history_52w", &min)?;
        }
        Ok(())
    }

    pub fn apply_env<F>(&mut self, env: F) -> Result<(), ScanError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| env(name).filter(|v| !v.trim().is_empty());

        if let Some(level) = var("STOCKSCAN_LOG_LEVEL") {
            self.log_level = level.trim().to_lowercase();
        }
        if let Some(universe) = var("STOCKSCAN_UNIVERSE") {
            self.universe = UniverseSpec::parse(&universe)?;
        }
        if let Some(strategies) = var("STOCKSCAN_STRATEGIES") {
            self.strategies = parse_strategy_list(&strategies)?;
        }
        if let Some(lookback) = var("STOCKSCAN_LOOKBACK") {
            self.lookback = parse_count("env", "STOCKSCAN_LOOKBACK", &lookback)?;
        }
        if let Some(excel) = var("STOCKSCAN_EXCEL") {
            self.excel = PathBuf::from(excel.trim());
        }
        if let Some(aggregate) = var("STOCKSCAN_AGGREGATE") {
            self.aggregation = aggregate.parse()?;
        }
        if let Some(max) = var("STOCKSCAN_MAX_TICKERS") {
            self.max_tickers = Some(parse_count("env", "STOCKSCAN_MAX_TICKERS", &max)?);
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) -> Result<(), ScanError> {
        if let Some(universe) = &cli.universe {
            self.universe = UniverseSpec::parse(universe)?;
        }
        if let Some(path) = &cli.universe_file {
            self.universe = UniverseSpec::File(path.clone());
        }
        if let Some(strategies) = &cli.strategies {
            self.strategies = parse_strategy_list(strategies)?;
        }
        if let Some(lookback) = cli.lookback {
            self.lookback = lookback;
        }
        if let Some(aggregate) = &cli.aggregate {
            self.aggregation = aggregate.parse()?;
        }
        if let Some(excel) = &cli.excel {
            self.excel = excel.clone();
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(mode) = &cli.constraint_mode {
            self.constraint_mode = mode.parse()?;
        }
        if cli.prices_dir.is_some() {
            self.prices_dir = cli.prices_dir.clone();
        }
        if cli.json_dir.is_some() {
            self.json_dir = cli.json_dir.clone();
        }
        if cli.sqlite.is_some() {
            self.sqlite = cli.sqlite.clone();
        }
        if cli.max_tickers.is_some() {
            self.max_tickers = cli.max_tickers;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.lookback == 0 {
            return Err(invalid("scan", "lookback", "lookback must be positive"));
        }
        if self.workers == 0 {
            return Err(invalid("scan", "workers", "workers must be at least 1"));
        }
        if self.min_history_52w == 0 {
            return Err(invalid("indicators", "min_history_52w", "must be positive"));
        }
        if self.strategies.is_empty() {
            return Err(invalid("scan", "strategies", "no strategies selected"));
        }
        if self.max_tickers == Some(0) {
            return Err(invalid("scan", "max_tickers", "must be at least 1"));
        }
        if self.site.max_rows == 0 {
            return Err(invalid("site", "max_rows", "must be at least 1"));
        }
        if self.site.history_sessions == 0 {
            return Err(invalid("site", "history_sessions", "must be positive"));
        }
        Ok(())
    }

    /// The universe cap in force: the explicit `max_tickers`, else
    /// `SITE_MAX_TICKERS` when a dashboard export is configured.
    pub fn effective_max_tickers(&self) -> Option<usize> {
        self.max_tickers
            .or_else(|| self.json_dir.as_ref().map(|_| SITE_MAX_TICKERS))
    }

    /// The effective strategy table: defaults, then `[<strategy>]` overrides,
    /// narrowed to the selected strategies.
    pub fn strategy_table(&self, config: &dyn ConfigPort) -> Result<StrategyTable, ScanError> {
        let mut table = StrategyTable::default().with_mode(self.constraint_mode);
        table.advisory_penalty = self.advisory_penalty;
        table.apply_overrides(config)?;
        let table = table.select(&self.strategies);
        table.validate()?;
        Ok(table)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            lookback: self.lookback,
            aggregation: self.aggregation,
            workers: self.workers,
            indicators: IndicatorConfig {
                min_history_52w: self.min_history_52w,
                ..IndicatorConfig::default()
            },
        }
    }
}
