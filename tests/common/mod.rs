#![allow(dead_code)]

use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use strategist::adapters::rule_script_compiler::RuleScriptCompiler;
use strategist::domain::error::StrategistError;
use strategist::domain::info::Info;
use strategist::domain::kline::{Kline, TimeWindow};
use strategist::domain::registry::StrategyRegistry;
use strategist::domain::script::ScriptRecord;
use strategist::domain::strategy::Strategy;
use strategist::ports::data_port::DataPort;
use strategist::ports::store_port::StrategyStorePort;

pub struct MockDataPort {
    pub day: BTreeMap<String, Vec<Kline>>,
    pub min: HashMap<String, Vec<Kline>>,
    pub names: HashMap<String, String>,
    pub errors: HashMap<String, String>,
    pub list_error: Option<String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            day: BTreeMap::new(),
            min: HashMap::new(),
            names: HashMap::new(),
            errors: HashMap::new(),
            list_error: None,
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<Kline>) -> Self {
        self.day.insert(code.to_string(), bars);
        self
    }

    pub fn with_minutes(mut self, code: &str, bars: Vec<Kline>) -> Self {
        self.min.insert(code.to_string(), bars);
        self
    }

    pub fn with_name(mut self, code: &str, name: &str) -> Self {
        self.names.insert(code.to_string(), name.to_string());
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }

    /// Makes `list_codes` fail, as a missing data directory does.
    pub fn with_list_error(mut self, reason: &str) -> Self {
        self.list_error = Some(reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn list_codes(&self) -> Result<Vec<String>, StrategistError> {
        if let Some(reason) = &self.list_error {
            return Err(StrategistError::Database {
                reason: reason.clone(),
            });
        }
        let mut codes: Vec<String> = self.day.keys().cloned().collect();
        codes.extend(self.errors.keys().cloned());
        codes.sort();
        codes.dedup();
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
        if let Some(reason) = self.errors.get(code) {
            return Err(StrategistError::Database {
                reason: reason.clone(),
            });
        }
        match self.day.get(code) {
            Some(bars) => Ok(bars
                .iter()
                .filter(|k| window.contains(k.time))
                .cloned()
                .collect()),
            None => Err(StrategistError::NoData { code: code.into() }),
        }
    }

    fn fetch_minute_klines(
        &self,
        code: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(StrategistError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .min
            .get(code)
            .map(|bars| {
                bars.iter()
                    .filter(|k| window.contains(k.time))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Script records kept in memory, with the same error contract as the
/// SQLite store. Writes can be switched to fail.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, ScriptRecord>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StrategistError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StrategistError::Database {
                reason: "disk I/O error".into(),
            });
        }
        Ok(())
    }

    fn not_found(name: &str) -> StrategistError {
        StrategistError::NotFound {
            what: format!("strategy '{name}'"),
        }
    }
}

impl StrategyStorePort for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<ScriptRecord>, StrategistError> {
        Ok(self.records.lock().unwrap().get(name).cloned())
    }

    fn list_all(&self) -> Result<Vec<ScriptRecord>, StrategistError> {
        Ok(self.records.lock().unwrap().values().cloned().collect())
    }

    fn insert(&self, record: &ScriptRecord) -> Result<(), StrategistError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        if records.contains_key(&record.name) {
            return Err(StrategistError::Database {
                reason: format!("'{}' already exists", record.name),
            });
        }
        records.insert(record.name.clone(), record.clone());
        Ok(())
    }

    fn update_script(
        &self,
        name: &str,
        script: &str,
        enabled: bool,
        namespace: &str,
    ) -> Result<(), StrategistError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        record.script = script.to_string();
        record.enabled = enabled;
        record.namespace = namespace.to_string();
        Ok(())
    }

    fn update_enabled(&self, name: &str, enabled: bool) -> Result<(), StrategistError> {
        self.check_writable()?;
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(name).ok_or_else(|| Self::not_found(name))?;
        record.enabled = enabled;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<(), StrategistError> {
        self.check_writable()?;
        self.records
            .lock()
            .unwrap()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Self::not_found(name))
    }
}

/// A strategy with a fixed verdict.
pub struct Fixed {
    pub name: String,
    pub verdict: bool,
    pub lookback: usize,
}

impl Fixed {
    pub fn new(name: &str, verdict: bool) -> Arc<dyn Strategy> {
        Arc::new(Self {
            name: name.to_string(),
            verdict,
            lookback: 1,
        })
    }
}

impl Strategy for Fixed {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal(&self, _info: &Info, _day: &[Kline], _min: &[Kline]) -> bool {
        self.verdict
    }

    fn lookback(&self) -> usize {
        self.lookback
    }
}

pub fn registry() -> Arc<StrategyRegistry> {
    Arc::new(StrategyRegistry::with_builtins(Arc::new(
        RuleScriptCompiler::new(),
    )))
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Daily bars from a close series starting 2024-01-01, closing at 15:00.
/// Opens sit just below the close so every bar is bullish.
pub fn series(closes: &[f64]) -> Vec<Kline> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Kline {
            time: (date(2024, 1, 1) + chrono::Duration::days(i as i64))
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            open: close * 0.99,
            high: close * 1.01,
            low: close * 0.98,
            close,
            volume: 10_000,
            amount: close * 10_000.0,
            turnover: 1.5,
            float_stock: 1_000_000,
            total_stock: 3_000_000,
        })
        .collect()
}

pub fn rising(n: usize, start: f64) -> Vec<Kline> {
    series(&(0..n).map(|i| start + i as f64).collect::<Vec<_>>())
}

pub fn falling(n: usize, start: f64) -> Vec<Kline> {
    series(&(0..n).map(|i| start - i as f64 * 0.1).collect::<Vec<_>>())
}

/// `n` filler codes in the Shenzhen ChiNext range.
pub fn filler_codes(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("sz3{:05}", i)).collect()
}
