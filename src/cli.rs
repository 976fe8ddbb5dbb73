//! CLI definition and dispatch.

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvPriceSource;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_export::{JsonExportSink, PriceHistoryExport};
use crate::adapters::report::{self, AnalysisContext};
use crate::adapters::universe_adapter::universe_source;
use crate::adapters::xlsx_adapter::ExcelSink;
use crate::adapters::yahoo_adapter::YahooPriceSource;
use crate::diagnostics;
use crate::domain::error::ScanError;
use crate::domain::regime::classify;
use crate::domain::scan::{format_timestamp, ScanPipeline, ScanReport};
use crate::domain::settings::{CliOverrides, Settings};
use crate::domain::universe::{normalize_symbol, Exchange, Universe};
use crate::logging;
use crate::ports::config_port::ConfigPort;
use crate::ports::price_port::PriceSource;
use crate::ports::sink_port::ScanSink;

#[derive(Parser, Debug)]
#[command(name = "stockscan", version, about = "Rule-based stock screener")]
pub struct Cli {
    /// INI configuration file (falls back to $STOCKSCAN_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan a universe, print the ranked candidates and write the outputs
    Scan(ScanArgs),
    /// Print the effective strategy table
    Strategies {
        #[arg(long)]
        strategies: Option<String>,
        #[arg(long)]
        constraint_mode: Option<String>,
    },
    /// Indicator snapshot, strategy outcomes and regime for one ticker
    Analyze {
        #[arg(long)]
        ticker: String,
        /// nse or bse adds the `.NS`/`.BO` suffix; us leaves the symbol bare
        #[arg(long, default_value = "us")]
        exchange: Exchange,
        /// Sessions of history to load
        #[arg(long, default_value_t = 252)]
        days: usize,
        /// Write markdown here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        prices_dir: Option<PathBuf>,
        #[arg(long)]
        constraint_mode: Option<String>,
    },
    /// Check that outputs are writable and data sources respond
    Doctor {
        #[arg(long)]
        excel: Option<PathBuf>,
        #[arg(long)]
        prices_dir: Option<PathBuf>,
        /// Ticker used for the price fetch probe
        #[arg(long, default_value = "AAPL")]
        ticker: String,
    },
}

#[derive(Args, Debug, Default, Clone)]
pub struct ScanArgs {
    /// `sp500`, `nse`, `excel:<path>`, a comma-separated ticker list or a
    /// path to a ticker file
    #[arg(long)]
    pub universe: Option<String>,
    /// Scan only the first N tickers (sorted) of the universe
    #[arg(long)]
    pub max_tickers: Option<usize>,
    #[arg(long)]
    pub universe_file: Option<PathBuf>,
    /// Comma-separated strategy keys
    #[arg(long)]
    pub strategies: Option<String>,
    /// Sessions of history per ticker
    #[arg(long)]
    pub lookback: Option<usize>,
    /// best or sum
    #[arg(long)]
    pub aggregate: Option<String>,
    /// Print results without writing any output
    #[arg(long)]
    pub dry_run: bool,
    #[arg(long)]
    pub excel: Option<PathBuf>,
    /// Read `<TICKER>.csv` files from this directory instead of Yahoo
    #[arg(long)]
    pub prices_dir: Option<PathBuf>,
    #[arg(long)]
    pub json_dir: Option<PathBuf>,
    #[arg(long)]
    pub sqlite: Option<PathBuf>,
    #[arg(long)]
    pub workers: Option<usize>,
    /// strict or advisory
    #[arg(long)]
    pub constraint_mode: Option<String>,
    /// Rows printed to the terminal
    #[arg(long, default_value_t = 25)]
    pub top: usize,
}

impl ScanArgs {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            universe: self.universe.clone(),
            universe_file: self.universe_file.clone(),
            strategies: self.strategies.clone(),
            lookback: self.lookback,
            aggregate: self.aggregate.clone(),
            excel: self.excel.clone(),
            workers: self.workers,
            constraint_mode: self.constraint_mode.clone(),
            prices_dir: self.prices_dir.clone(),
            json_dir: self.json_dir.clone(),
            sqlite: self.sqlite.clone(),
            max_tickers: self.max_tickers,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let config_path = cli
        .config
        .or_else(|| std::env::var_os("STOCKSCAN_CONFIG").map(PathBuf::from));

    if let Command::Doctor {
        excel,
        prices_dir,
        ticker,
    } = &cli.command
    {
        return run_doctor(config_path.as_deref(), excel.as_ref(), prices_dir.as_ref(), ticker);
    }

    let config = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    match cli.command {
        Command::Scan(args) => run_scan(&config, &args),
        Command::Strategies {
            strategies,
            constraint_mode,
        } => {
            let overrides = CliOverrides {
                strategies,
                constraint_mode,
                ..CliOverrides::default()
            };
            run_strategies(&config, &overrides)
        }
        Command::Analyze {
            ticker,
            exchange,
            days,
            output,
            prices_dir,
            constraint_mode,
        } => {
            let overrides = CliOverrides {
                lookback: Some(days),
                prices_dir,
                constraint_mode,
                ..CliOverrides::default()
            };
            let ticker = exchange.apply(&normalize_symbol(&ticker));
            run_analyze(&config, &overrides, &ticker, output.as_deref())
        }
        Command::Doctor { .. } => ExitCode::SUCCESS,
    }
}

fn fail(err: &ScanError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, ScanError> {
    match path {
        None => Ok(FileConfigAdapter::empty()),
        Some(path) => FileConfigAdapter::from_file(path).map_err(|e| ScanError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Defaults, then the config file, then `STOCKSCAN_*` variables, then flags.
pub fn resolve_settings(config: &dyn ConfigPort, overrides: &CliOverrides) -> Result<Settings, ScanError> {
    let mut settings = Settings::load(config, |name| std::env::var(name).ok())?;
    settings.apply_cli(overrides)?;
    settings.validate()?;
    Ok(settings)
}

pub fn price_source(settings: &Settings) -> Result<Box<dyn PriceSource>, ScanError> {
    match &settings.prices_dir {
        Some(dir) => Ok(Box::new(CsvPriceSource::new(dir.clone()))),
        None => Ok(Box::new(YahooPriceSource::new()?)),
    }
}

#[cfg(feature = "sqlite")]
fn sqlite_sink(path: &Path) -> Result<Box<dyn ScanSink>, ScanError> {
    Ok(Box::new(crate::adapters::sqlite_adapter::SqliteSink::open(path)?))
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_sink(_path: &Path) -> Result<Box<dyn ScanSink>, ScanError> {
    Err(ScanError::sink("sqlite", "built without the sqlite feature"))
}

#[cfg(feature = "sqlite")]
fn sqlite_check(settings: &Settings) -> Option<diagnostics::CheckResult> {
    settings.sqlite.as_deref().map(diagnostics::check_sqlite)
}

#[cfg(not(feature = "sqlite"))]
fn sqlite_check(_settings: &Settings) -> Option<diagnostics::CheckResult> {
    None
}

/// Load the configured universe and apply the ticker cap.
pub fn load_universe(settings: &Settings) -> Result<Universe, ScanError> {
    let universe = universe_source(&settings.universe).load()?;
    match settings.effective_max_tickers() {
        Some(max) if universe.count() > max => {
            tracing::info!(universe = %universe.label, from = universe.count(), to = max, "capping universe");
            Ok(universe.capped(max))
        }
        _ => Ok(universe),
    }
}

/// Hand the report to every configured sink. A failing sink does not stop
/// the others; its error is returned.
pub fn write_sinks(
    settings: &Settings,
    prices: &dyn PriceSource,
    report: &ScanReport,
    universe: &Universe,
) -> Vec<ScanError> {
    let mut errors = Vec::new();
    let mut sinks: Vec<Box<dyn ScanSink + '_>> = vec![Box::new(ExcelSink::new(settings.excel.clone()))];
    if let Some(dir) = &settings.json_dir {
        let json = JsonExportSink::new(dir.clone()).with_max_rows(settings.site.max_rows);
        if settings.site.export_prices {
            let sessions = settings.site.history_sessions;
            sinks.push(Box::new(json.with_history_sessions(sessions)));
            sinks.push(Box::new(PriceHistoryExport::new(dir.join("prices"), prices, sessions)));
        } else {
            sinks.push(Box::new(json));
        }
    }
    if let Some(path) = &settings.sqlite {
        match sqlite_sink(path) {
            Ok(sink) => sinks.push(sink),
            Err(e) => errors.push(e),
        }
    }

    for sink in &sinks {
        if let Err(e) = sink.write(report, universe) {
            tracing::error!(sink = sink.name(), error = %e, "sink write failed");
            errors.push(e);
        }
    }
    errors
}

/// Everything `scan` needs after settings are resolved. Dry runs skip the
/// sinks.
pub fn run_scan_pipeline(
    settings: &Settings,
    config: &dyn ConfigPort,
    prices: &dyn PriceSource,
    universe: &Universe,
    dry_run: bool,
) -> Result<(ScanReport, Vec<ScanError>), ScanError> {
    let table = settings.strategy_table(config)?;
    let pipeline = ScanPipeline::new(prices, table, settings.scan_options());
    let report = pipeline.run(universe)?;
    let sink_errors = if dry_run {
        Vec::new()
    } else {
        write_sinks(settings, prices, &report, universe)
    };
    Ok((report, sink_errors))
}

fn run_scan(config: &FileConfigAdapter, args: &ScanArgs) -> ExitCode {
    let settings = match resolve_settings(config, &args.overrides()) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    logging::init(&settings.log_level, settings.log_format);

    // Strategy configuration errors surface before any network traffic.
    if let Err(e) = settings.strategy_table(config) {
        return fail(&e);
    }

    let universe = match load_universe(&settings) {
        Ok(u) => u,
        Err(e) => return fail(&e),
    };
    let prices = match price_source(&settings) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    eprintln!(
        "Scanning {} tickers from {} via {}",
        universe.count(),
        universe.label,
        prices.describe()
    );

    let (report, sink_errors) =
        match run_scan_pipeline(&settings, config, prices.as_ref(), &universe, args.dry_run) {
            Ok(out) => out,
            Err(e) => return fail(&e),
        };

    if report.rows.is_empty() {
        println!("No candidates found.");
    } else {
        print!("{}", report::render_scan_table(&report.rows, args.top));
    }
    if !report.skipped.is_empty() {
        eprintln!("Skipped {} tickers:", report.skipped.len());
        eprint!("{}", report::render_skipped(&report.skipped));
    }

    if args.dry_run {
        println!("Dry run: not writing outputs.");
        return ExitCode::SUCCESS;
    }
    match sink_errors.first() {
        None => {
            println!("Updated Excel: {}", settings.excel.display());
            ExitCode::SUCCESS
        }
        Some(first) => {
            for e in &sink_errors {
                eprintln!("error: {e}");
            }
            first.into()
        }
    }
}

fn run_strategies(config: &FileConfigAdapter, overrides: &CliOverrides) -> ExitCode {
    let table = resolve_settings(config, overrides).and_then(|s| s.strategy_table(config));
    match table {
        Ok(table) => {
            print!("{}", report::render_strategy_table(&table));
            ExitCode::SUCCESS
        }
        Err(e) => fail(&e),
    }
}

/// Markdown analysis of one ticker.
pub fn analyze_ticker(
    settings: &Settings,
    config: &dyn ConfigPort,
    prices: &dyn PriceSource,
    ticker: &str,
) -> Result<String, ScanError> {
    let table = settings.strategy_table(config)?;
    let pipeline = ScanPipeline::new(prices, table, settings.scan_options());
    let analysis = pipeline.analyze(ticker)?;
    let regime = classify(&analysis.snapshot);
    let generated = format_timestamp(chrono::Utc::now());
    Ok(report::render_analysis(&AnalysisContext {
        ticker,
        generated: &generated,
        snapshot: &analysis.snapshot,
        results: &analysis.results,
        regime: &regime,
    }))
}

fn run_analyze(
    config: &FileConfigAdapter,
    overrides: &CliOverrides,
    ticker: &str,
    output: Option<&Path>,
) -> ExitCode {
    let settings = match resolve_settings(config, overrides) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    logging::init(&settings.log_level, settings.log_format);

    let markdown = match price_source(&settings)
        .and_then(|prices| analyze_ticker(&settings, config, prices.as_ref(), &ticker))
    {
        Ok(md) => md,
        Err(e) => return fail(&e),
    };

    match output {
        None => {
            print!("{markdown}");
            ExitCode::SUCCESS
        }
        Some(path) => {
            let written = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map_or(Ok(()), fs::create_dir_all)
                .and_then(|_| fs::write(path, &markdown));
            match written {
                Ok(()) => {
                    println!("Written analysis to {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => fail(&ScanError::Io(e)),
            }
        }
    }
}

fn run_doctor(
    config_path: Option<&Path>,
    excel: Option<&PathBuf>,
    prices_dir: Option<&PathBuf>,
    ticker: &str,
) -> ExitCode {
    let mut checks = Vec::new();

    let config = load_config(config_path);
    checks.push(diagnostics::check_config(
        config_path,
        config.as_ref().map(|_| ()).map_err(|e| e.to_string()),
    ));
    let config = config.unwrap_or_else(|_| FileConfigAdapter::empty());

    let overrides = CliOverrides {
        excel: excel.cloned(),
        prices_dir: prices_dir.cloned(),
        ..CliOverrides::default()
    };
    let settings = match resolve_settings(&config, &overrides) {
        Ok(s) => s,
        Err(e) => {
            checks.push(diagnostics::CheckResult {
                name: "settings".into(),
                ok: false,
                detail: e.to_string(),
            });
            Settings::default()
        }
    };
    logging::init(&settings.log_level, settings.log_format);

    checks.push(diagnostics::check_excel_path(&settings.excel));
    checks.push(diagnostics::check_universe(universe_source(&settings.universe).as_ref()));
    match price_source(&settings) {
        Ok(prices) => checks.push(diagnostics::check_price_fetch(prices.as_ref(), ticker)),
        Err(e) => checks.push(diagnostics::CheckResult {
            name: "prices".into(),
            ok: false,
            detail: e.to_string(),
        }),
    }
    checks.extend(sqlite_check(&settings));

    print!("{}", diagnostics::render(&checks));
    if diagnostics::all_ok(&checks) {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    }
}
