//! CSV file kline adapter.
//!
//! One directory per universe: `<code>.csv` holds daily bars and an optional
//! `<code>.min.csv` holds intraday bars. An optional `codes.csv` with a
//! `code,name` header supplies display names.

use crate::domain::error::StrategistError;
use crate::domain::kline::{Kline, TimeWindow};
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const NAMES_FILE: &str = "codes.csv";
const DAY_SUFFIX: &str = ".csv";
const MIN_SUFFIX: &str = ".min.csv";

#[derive(Debug, Deserialize)]
struct KlineRow {
    time: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    turnover: f64,
    #[serde(default)]
    float_stock: i64,
    #[serde(default)]
    total_stock: i64,
}

#[derive(Debug, Deserialize)]
struct NameRow {
    code: String,
    name: String,
}

/// Date-only stamps are daily bars and land on the 15:00 close.
pub(crate) fn parse_bar_time(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(15, 0, 0))
        })
}

/// Reads a `code,name` table; a missing file yields an empty map.
pub(crate) fn read_code_names(path: &Path) -> Result<HashMap<String, String>, StrategistError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let mut rdr = csv::Reader::from_path(path).map_err(|e| StrategistError::Database {
        reason: format!("failed to read {}: {}", path.display(), e),
    })?;
    let mut names = HashMap::new();
    for row in rdr.deserialize::<NameRow>() {
        let row = row.map_err(|e| StrategistError::Database {
            reason: format!("CSV parse error in {}: {}", path.display(), e),
        })?;
        names.insert(row.code, row.name);
    }
    Ok(names)
}

pub struct CsvKlineAdapter {
    base_path: PathBuf,
    names: HashMap<String, String>,
}

impl CsvKlineAdapter {
    pub fn new(base_path: PathBuf) -> Result<Self, StrategistError> {
        let names = read_code_names(&base_path.join(NAMES_FILE))?;
        Ok(Self { base_path, names })
    }

    fn read_bars(&self, path: &Path, window: TimeWindow) -> Result<Vec<Kline>, StrategistError> {
        let content = fs::read_to_string(path).map_err(|e| StrategistError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for row in rdr.deserialize::<KlineRow>() {
            let row = row.map_err(|e| StrategistError::Database {
                reason: format!("CSV parse error: {}", e),
            })?;
            let time = parse_bar_time(&row.time).ok_or_else(|| StrategistError::Database {
                reason: format!("invalid time value: {}", row.time),
            })?;
            if !window.contains(time) {
                continue;
            }
            bars.push(Kline {
                time,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
                amount: row.amount,
                turnover: row.turnover,
                float_stock: row.float_stock,
                total_stock: row.total_stock,
            });
        }

        bars.sort_by_key(|b| b.time);
        Ok(bars)
    }
}

impl DataPort for CsvKlineAdapter {
    fn list_codes(&self) -> Result<Vec<String>, StrategistError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| StrategistError::Database {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StrategistError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name == NAMES_FILE || name.ends_with(MIN_SUFFIX) {
                continue;
            }
            if let Some(code) = name.strip_suffix(DAY_SUFFIX) {
                codes.push(code.to_string());
            }
        }

        codes.sort();
        Ok(codes)
    }

    fn code_name(&self, code: &str) -> String {
        self.names.get(code).cloned().unwrap_or_default()
    }

    fn fetch_day_klines(
        &self,
        code: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError> {
        let path = self.base_path.join(format!("{code}{DAY_SUFFIX}"));
        if !path.exists() {
            return Err(StrategistError::NoData { code: code.into() });
        }
        self.read_bars(&path, window)
    }

    /// A security without a minute file simply has no intraday bars.
    fn fetch_minute_klines(
        &self,
        code: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError> {
        let path = self.base_path.join(format!("{code}{MIN_SUFFIX}"));
        if !path.exists() {
            if self.base_path.join(format!("{code}{DAY_SUFFIX}")).exists() {
                return Ok(Vec::new());
            }
            return Err(StrategistError::NoData { code: code.into() });
        }
        self.read_bars(&path, window)
    }
}
