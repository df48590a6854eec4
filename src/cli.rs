//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::csv_adapter::CsvKlineAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::rule_script_compiler::RuleScriptCompiler;
use crate::domain::backtest::BacktestResult;
use crate::domain::config_validation::{
    backtest_window, execution_settings, screener_concurrency, validate_config,
};
use crate::domain::error::{ScriptError, StrategistError};
use crate::domain::kline::TimeWindow;
use crate::domain::registry::StrategyRegistry;
use crate::domain::script::ENTRY_SYMBOL;
use crate::logging;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::script_port::ScriptCompiler;
use crate::ports::store_port::StrategyStorePort;
use crate::service::{ScreenEvent, Service};

#[derive(Parser, Debug)]
#[command(name = "strategist", about = "Stock strategy screener and backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List registered strategy names
    Strategies {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Backtest one security
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        code: String,
        /// Strategy name; repeat to AND several together
        #[arg(short, long = "strategy", required = true)]
        strategies: Vec<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Print closed trades as CSV
        #[arg(long)]
        trades: bool,
    },
    /// Screen the universe; matches are written as CSV to stdout
    Screen {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long = "strategy", required = true)]
        strategies: Vec<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Backtest every security instead of screening
        #[arg(long)]
        backtest: bool,
    },
    /// Compile a script file without registering it
    Validate { file: PathBuf },
    /// Manage persisted script strategies
    Script {
        #[arg(short, long)]
        config: PathBuf,
        #[command(subcommand)]
        action: ScriptAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ScriptAction {
    /// Create a script; without --file it starts from a never-firing body
    Add {
        name: String,
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long)]
        disabled: bool,
    },
    /// Replace a script's body
    Update {
        name: String,
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        disabled: bool,
    },
    Enable { name: String },
    Disable { name: String },
    Delete { name: String },
    List,
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Strategies { config } => run_strategies(&config),
        Command::Backtest {
            config,
            code,
            strategies,
            start,
            end,
            trades,
        } => run_backtest(&config, &code, &strategies, start, end, trades),
        Command::Screen {
            config,
            strategies,
            start,
            end,
            backtest,
        } => run_screen(&config, &strategies, start, end, backtest),
        Command::Validate { file } => {
            logging::init(None);
            run_validate(&file)
        }
        Command::Script { config, action } => run_script(&config, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads and validates the config file, then starts logging at its level.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, StrategistError> {
    let config = FileConfigAdapter::from_file(path)?;
    validate_config(&config)?;
    logging::init(config.get_string("log", "level").as_deref());
    Ok(config)
}

pub fn build_data_port(config: &dyn ConfigPort) -> Result<Arc<dyn DataPort>, StrategistError> {
    let dir = config.get_path("data", "dir").unwrap_or_default();
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "sqlite".to_string())
        .to_lowercase();
    match source.trim() {
        "csv" => Ok(Arc::new(CsvKlineAdapter::new(dir)?)),
        #[cfg(feature = "sqlite")]
        "sqlite" => Ok(Arc::new(
            crate::adapters::sqlite_adapter::SqliteKlineAdapter::new(dir)?,
        )),
        other => Err(StrategistError::ConfigInvalid {
            section: "data".into(),
            key: "source".into(),
            reason: format!("source '{other}' is not available in this build"),
        }),
    }
}

pub fn build_store(
    config: &dyn ConfigPort,
) -> Result<Option<Arc<dyn StrategyStorePort>>, StrategistError> {
    if config.get_string("store", "path").is_none() {
        return Ok(None);
    }
    #[cfg(feature = "sqlite")]
    {
        let store = crate::adapters::sqlite_store::SqliteStrategyStore::from_config(config)?;
        Ok(Some(Arc::new(store)))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Err(StrategistError::ConfigInvalid {
            section: "store".into(),
            key: "path".into(),
            reason: "sqlite feature is required for the strategy store".into(),
        })
    }
}

/// Wires registry, data port and store from a validated config, loading
/// persisted and on-disk scripts into the registry.
pub fn build_service(config: &dyn ConfigPort) -> Result<Service, StrategistError> {
    let data = build_data_port(config)?;
    let store = build_store(config)?;

    let registry = Arc::new(StrategyRegistry::with_builtins(Arc::new(
        RuleScriptCompiler::new(),
    )));
    let script_dir = config.get_path("scripts", "dir");
    let report = registry.load(store.as_deref(), script_dir.as_deref())?;
    if report.failed > 0 {
        eprintln!("warning: {} script(s) failed to load", report.failed);
    }

    Ok(Service::new(
        registry,
        data,
        store,
        config.get_bool("data", "load_minutes", false),
        screener_concurrency(config),
    ))
}

/// The configured window with either end overridden from the command line.
pub fn resolve_window(
    config: &dyn ConfigPort,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<TimeWindow, StrategistError> {
    let mut window = backtest_window(config)?;
    if let Some(start) = start.and_then(|d| d.and_hms_opt(0, 0, 0)) {
        window.start = start;
    }
    if let Some(end) = end.and_then(|d| d.and_hms_opt(23, 59, 59)) {
        window.end = end;
    }
    if window.start > window.end {
        return Err(StrategistError::ConfigInvalid {
            section: "backtest".into(),
            key: "start_date".into(),
            reason: "start must not be after end".into(),
        });
    }
    Ok(window)
}

fn runtime() -> Result<tokio::runtime::Runtime, StrategistError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn csv_err(e: csv::Error) -> StrategistError {
    StrategistError::Io(std::io::Error::other(e))
}

fn run_strategies(config_path: &Path) -> Result<(), StrategistError> {
    let config = load_config(config_path)?;
    let service = build_service(&config)?;
    for name in service.strategy_names() {
        println!("{name}");
    }
    Ok(())
}

pub fn format_result(result: &BacktestResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("bars:          {}\n", result.bars));
    out.push_str(&format!("initial cash:  {:.2}\n", result.initial_cash));
    out.push_str(&format!("final equity:  {:.2}\n", result.final_equity));
    out.push_str(&format!("total return:  {:.2}%\n", result.total_return * 100.0));
    out.push_str(&format!("max drawdown:  {:.2}%\n", result.max_drawdown * 100.0));
    out.push_str(&format!("sharpe:        {:.3}\n", result.sharpe));
    out.push_str(&format!("trades:        {}\n", result.trade_count()));
    if let Some(open) = &result.open_position {
        out.push_str(&format!(
            "open position: {} shares @ {:.2} since {}\n",
            open.shares, open.entry_price, open.entry_time
        ));
    }
    out
}

fn run_backtest(
    config_path: &Path,
    code: &str,
    strategies: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    trades: bool,
) -> Result<(), StrategistError> {
    let config = load_config(config_path)?;
    let service = build_service(&config)?;
    let window = resolve_window(&config, start, end)?;
    let settings = execution_settings(&config);

    let result = service.backtest(code, strategies, window, &settings)?;
    if trades {
        write_csv(result.trades.iter())?;
    } else {
        print!("{}", format_result(&result));
    }
    Ok(())
}

fn write_csv<'a, T: Serialize + 'a>(
    rows: impl Iterator<Item = &'a T>,
) -> Result<(), StrategistError> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout().lock());
    for row in rows {
        wtr.serialize(row).map_err(csv_err)?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_screen(
    config_path: &Path,
    strategies: &[String],
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    backtest: bool,
) -> Result<(), StrategistError> {
    let config = load_config(config_path)?;
    let service = build_service(&config)?;
    let window = resolve_window(&config, start, end)?;
    let settings = execution_settings(&config);

    runtime()?.block_on(async {
        let mut wtr = csv::Writer::from_writer(std::io::stdout());
        if backtest {
            let mut stream = service.backtest_all(strategies, window, &settings)?;
            while let Some(event) = stream.next().await {
                match event {
                    ScreenEvent::Item(item) => {
                        wtr.serialize(&item).map_err(csv_err)?;
                        wtr.flush()?;
                    }
                    ScreenEvent::Summary(s) => eprintln!(
                        "{} securities, avg return {:.2}%, avg sharpe {:.3}, avg max drawdown {:.2}%",
                        s.count,
                        s.avg_return * 100.0,
                        s.avg_sharpe,
                        s.avg_max_drawdown * 100.0
                    ),
                }
            }
        } else {
            let mut stream = service.screen(strategies, window)?;
            let mut count = 0usize;
            while let Some(m) = stream.next().await {
                wtr.serialize(&m.info).map_err(csv_err)?;
                wtr.flush()?;
                count += 1;
            }
            eprintln!("{count} match(es)");
        }
        Ok::<(), StrategistError>(())
    })
}

/// Compiles `source`, returning the signal's lookback.
pub fn check_script(source: &str) -> Result<usize, ScriptError> {
    RuleScriptCompiler::new()
        .compile(source, ENTRY_SYMBOL)
        .map(|signal| signal.lookback())
}

/// Renders a compile failure, pointing at the offending line when the
/// position is known.
pub fn render_script_error(err: &ScriptError, source: &str) -> String {
    match err {
        ScriptError::Compile(e) => e.display_with_context(source),
        other => other.to_string(),
    }
}

fn run_validate(path: &Path) -> Result<(), StrategistError> {
    let source = fs::read_to_string(path)?;
    match check_script(&source) {
        Ok(lookback) => {
            eprintln!("{}: ok, lookback {} bar(s)", path.display(), lookback);
            Ok(())
        }
        Err(e) => {
            eprintln!("{}", render_script_error(&e, &source));
            Err(e.into())
        }
    }
}

fn run_script(config_path: &Path, action: ScriptAction) -> Result<(), StrategistError> {
    let config = load_config(config_path)?;
    let service = build_service(&config)?;

    match action {
        ScriptAction::Add {
            name,
            file,
            disabled,
        } => {
            let source = file.map(fs::read_to_string).transpose()?;
            let record = service.create_script(&name, source.as_deref(), !disabled)?;
            eprintln!("created {} ({})", record.name, record.namespace);
        }
        ScriptAction::Update {
            name,
            file,
            disabled,
        } => {
            let source = fs::read_to_string(file)?;
            let record = service.update_script(&name, &source, !disabled)?;
            eprintln!("updated {} ({})", record.name, record.namespace);
        }
        ScriptAction::Enable { name } => service.set_enabled(&name, true)?,
        ScriptAction::Disable { name } => service.set_enabled(&name, false)?,
        ScriptAction::Delete { name } => service.delete_script(&name)?,
        ScriptAction::List => {
            let mut out = std::io::stdout().lock();
            for record in service.list_scripts()? {
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    record.name,
                    record.kind,
                    if record.enabled { "enabled" } else { "disabled" },
                    record.namespace
                )?;
            }
        }
    }
    Ok(())
}
