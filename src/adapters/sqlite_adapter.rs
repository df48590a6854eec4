//! SQLite kline adapter.
//!
//! Each security lives in its own `<code>.db` file holding `day_kline` and
//! `minute_kline` tables keyed by a unix timestamp. Every read opens its
//! own read-only connection so concurrent screener workers never share a
//! handle.

use crate::adapters::csv_adapter::{NAMES_FILE, read_code_names};
use crate::domain::error::StrategistError;
use crate::domain::kline::{Kline, TimeWindow};
use crate::ports::data_port::DataPort;
use chrono::{DateTime, NaiveDateTime};
use rusqlite::{Connection, OpenFlags, params};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const DB_SUFFIX: &str = ".db";
pub const DAY_TABLE: &str = "day_kline";
pub const MINUTE_TABLE: &str = "minute_kline";

fn query_err(e: rusqlite::Error) -> StrategistError {
    StrategistError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn to_unix(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp()
}

fn from_unix(secs: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp(secs, 0).map(|t| t.naive_utc())
}

pub struct SqliteKlineAdapter {
    dir: PathBuf,
    names: HashMap<String, String>,
}

impl SqliteKlineAdapter {
    pub fn new(dir: PathBuf) -> Result<Self, StrategistError> {
        let names = read_code_names(&dir.join(NAMES_FILE))?;
        Ok(Self { dir, names })
    }

    fn db_path(&self, code: &str) -> PathBuf {
        self.dir.join(format!("{code}{DB_SUFFIX}"))
    }

    fn open_read_only(&self, code: &str) -> Result<Connection, StrategistError> {
        let path = self.db_path(code);
        if !path.exists() {
            return Err(StrategistError::NoData { code: code.into() });
        }
        Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| StrategistError::Database {
            reason: format!("failed to open {}: {}", path.display(), e),
        })
    }

    fn query(
        &self,
        code: &str,
        table: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError> {
        let conn = self.open_read_only(code)?;
        let sql = format!(
            "SELECT unix, open, high, low, close, volume, amount, turnover, float_stock, total_stock
             FROM {table}
             WHERE unix >= ?1 AND unix <= ?2
             ORDER BY unix ASC"
        );
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(
                params![to_unix(window.start), to_unix(window.end)],
                |row| {
                    let unix: i64 = row.get(0)?;
                    let time = from_unix(unix).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, unix))?;
                    Ok(Kline {
                        time,
                        open: row.get(1)?,
                        high: row.get(2)?,
                        low: row.get(3)?,
                        close: row.get(4)?,
                        volume: row.get(5)?,
                        amount: row.get(6)?,
                        turnover: row.get(7)?,
                        float_stock: row.get(8)?,
                        total_stock: row.get(9)?,
                    })
                },
            )
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }
        Ok(bars)
    }
}

fn is_db_file(path: &Path) -> bool {
    path.is_file() && path.extension().is_some_and(|ext| ext == "db")
}

impl DataPort for SqliteKlineAdapter {
    fn list_codes(&self) -> Result<Vec<String>, StrategistError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StrategistError::Database {
            reason: format!("failed to read directory {}: {}", self.dir.display(), e),
        })?;

        let mut codes = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StrategistError::Database {
                reason: format!("directory entry error: {}", e),
            })?;
            let path = entry.path();
            if !is_db_file(&path) {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                codes.push(stem.to_string_lossy().into_owned());
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
        self.query(code, DAY_TABLE, window)
    }

    fn fetch_minute_klines(
        &self,
        code: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError> {
        self.query(code, MINUTE_TABLE, window)
    }
}
