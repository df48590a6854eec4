//! Configuration validation and typed readers.
//!
//! Validates every section before a command runs, then turns the raw INI
//! values into domain settings.

use crate::domain::error::StrategistError;
use crate::domain::kline::TimeWindow;
use crate::domain::screener::MAX_CONCURRENCY;
use crate::domain::settings::ExecutionSettings;
use crate::ports::config_port::ConfigPort;
use chrono::{NaiveDate, NaiveDateTime};

pub const DEFAULT_CONCURRENCY: i64 = 16;
pub const DEFAULT_POOL_SIZE: i64 = 4;

const SOURCES: [&str; 2] = ["sqlite", "csv"];
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    validate_data(config)?;
    validate_store(config)?;
    validate_screener(config)?;
    validate_backtest(config)?;
    validate_log(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> StrategistError {
    StrategistError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    let source = config.get_value("data", "source").unwrap_or_else(|| "sqlite".to_string());
    if !SOURCES.contains(&source.to_lowercase().as_str()) {
        return Err(invalid("data", "source", "source must be sqlite or csv"));
    }
    if config.get_value("data", "dir").is_none() {
        return Err(StrategistError::ConfigMissing {
            section: "data".to_string(),
            key: "dir".to_string(),
        });
    }
    Ok(())
}

fn validate_store(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    let pool = config.get_int("store", "pool_size", DEFAULT_POOL_SIZE);
    if pool < 1 {
        return Err(invalid("store", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

fn validate_screener(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    let value = config.get_int("screener", "concurrency", DEFAULT_CONCURRENCY);
    if value < 1 || value > MAX_CONCURRENCY as i64 {
        return Err(invalid(
            "screener",
            "concurrency",
            &format!("concurrency must be between 1 and {MAX_CONCURRENCY}"),
        ));
    }
    Ok(())
}

fn validate_backtest(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    if config.get_double("backtest", "cash", ExecutionSettings::DEFAULT_CASH) <= 0.0 {
        return Err(invalid("backtest", "cash", "cash must be positive"));
    }
    if config.get_int("backtest", "size", ExecutionSettings::DEFAULT_SIZE) < 1 {
        return Err(invalid("backtest", "size", "size must be at least 1"));
    }
    for key in ["fee_rate", "min_fee", "slippage", "take_profit"] {
        if config.get_double("backtest", key, 0.0) < 0.0 {
            return Err(invalid(
                "backtest",
                key,
                &format!("{key} must be non-negative"),
            ));
        }
    }
    let stop = config.get_double("backtest", "stop_loss", 0.0);
    if !(0.0..1.0).contains(&stop) {
        return Err(invalid(
            "backtest",
            "stop_loss",
            "stop_loss must be between 0 and 1",
        ));
    }
    backtest_window(config)?;
    Ok(())
}

fn validate_log(config: &dyn ConfigPort) -> Result<(), StrategistError> {
    match config.get_value("log", "level") {
        Some(level) if !LOG_LEVELS.contains(&level.to_lowercase().as_str()) => Err(invalid(
            "log",
            "level",
            "level must be one of trace, debug, info, warn, error",
        )),
        _ => Ok(()),
    }
}

fn parse_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, StrategistError> {
    match config.get_value("backtest", key) {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                invalid(
                    "backtest",
                    key,
                    &format!("invalid {key} format, expected YYYY-MM-DD"),
                )
            }),
    }
}

/// The `[backtest]` date range; either end defaults to the unbounded side.
pub fn backtest_window(config: &dyn ConfigPort) -> Result<TimeWindow, StrategistError> {
    let all = TimeWindow::all();
    let start = parse_date(config, "start_date")?;
    let end = parse_date(config, "end_date")?;
    if let (Some(s), Some(e)) = (start, end) {
        if s > e {
            return Err(invalid(
                "backtest",
                "start_date",
                "start_date must not be after end_date",
            ));
        }
    }
    let start: NaiveDateTime = start
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(all.start);
    let end: NaiveDateTime = end
        .and_then(|d| d.and_hms_opt(23, 59, 59))
        .unwrap_or(all.end);
    Ok(TimeWindow::new(start, end))
}

pub fn execution_settings(config: &dyn ConfigPort) -> ExecutionSettings {
    ExecutionSettings {
        cash: config.get_double("backtest", "cash", ExecutionSettings::DEFAULT_CASH),
        size: config.get_int("backtest", "size", ExecutionSettings::DEFAULT_SIZE),
        fee_rate: config.get_double("backtest", "fee_rate", ExecutionSettings::DEFAULT_FEE_RATE),
        min_fee: config.get_double("backtest", "min_fee", ExecutionSettings::DEFAULT_MIN_FEE),
        slippage: config.get_double("backtest", "slippage", 0.0),
        stop_loss: config.get_double("backtest", "stop_loss", 0.0),
        take_profit: config.get_double("backtest", "take_profit", 0.0),
    }
    .normalized()
}

pub fn screener_concurrency(config: &dyn ConfigPort) -> usize {
    config
        .get_int("screener", "concurrency", DEFAULT_CONCURRENCY)
        .clamp(1, MAX_CONCURRENCY as i64) as usize
}
