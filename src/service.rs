//! Application service: the boundary the CLI (or any other front end)
//! drives.
//!
//! Owns the strategy registry, the data port and the optional script store,
//! and composes them into backtests, screens and script management.

use crate::domain::backtest::{BacktestResult, run_backtest};
use crate::domain::error::StrategistError;
use crate::domain::info::Info;
use crate::domain::kline::{Kline, TimeWindow};
use crate::domain::registry::StrategyRegistry;
use crate::domain::screener::{Match, ScreenStream, Screener};
use crate::domain::script::{DEFAULT_SCRIPT, ScriptRecord};
use crate::domain::settings::ExecutionSettings;
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::ports::data_port::DataPort;
use crate::ports::store_port::StrategyStorePort;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One security's outcome in a universe backtest.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestItem {
    pub code: String,
    pub name: String,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub trades: usize,
    pub final_equity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Summary {
    pub count: usize,
    pub avg_return: f64,
    pub avg_sharpe: f64,
    pub avg_max_drawdown: f64,
}

#[derive(Debug, Default)]
struct Accumulator {
    count: usize,
    sum_return: f64,
    sum_sharpe: f64,
    sum_drawdown: f64,
}

impl Accumulator {
    fn add(&mut self, item: &BacktestItem) {
        self.count += 1;
        self.sum_return += item.total_return;
        self.sum_sharpe += item.sharpe;
        self.sum_drawdown += item.max_drawdown;
    }

    fn summary(&self) -> Summary {
        if self.count == 0 {
            return Summary::default();
        }
        let n = self.count as f64;
        Summary {
            count: self.count,
            avg_return: self.sum_return / n,
            avg_sharpe: self.sum_sharpe / n,
            avg_max_drawdown: self.sum_drawdown / n,
        }
    }
}

/// Universe backtest output: every item, then exactly one summary.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenEvent {
    Item(BacktestItem),
    Summary(Summary),
}

pub struct Service {
    registry: Arc<StrategyRegistry>,
    data: Arc<dyn DataPort>,
    store: Option<Arc<dyn StrategyStorePort>>,
    screener: Screener,
    load_minutes: bool,
    concurrency: usize,
}

impl Service {
    pub fn new(
        registry: Arc<StrategyRegistry>,
        data: Arc<dyn DataPort>,
        store: Option<Arc<dyn StrategyStorePort>>,
        load_minutes: bool,
        concurrency: usize,
    ) -> Self {
        let screener = Screener::new(Arc::clone(&data), load_minutes);
        Self {
            registry,
            data,
            store,
            screener,
            load_minutes,
            concurrency,
        }
    }

    pub fn registry(&self) -> &Arc<StrategyRegistry> {
        &self.registry
    }

    /// Resolves `names` into one strategy: the AND of all of them.
    pub fn strategy(&self, names: &[String]) -> Result<Arc<dyn Strategy>, StrategistError> {
        Ok(Arc::new(self.registry.group(names)?))
    }

    fn store(&self) -> Result<&Arc<dyn StrategyStorePort>, StrategistError> {
        self.store.as_ref().ok_or_else(|| StrategistError::NotFound {
            what: "strategy store".to_string(),
        })
    }

    pub fn strategy_names(&self) -> Vec<String> {
        let mut names = self.registry.list_names();
        names.sort();
        names
    }

    /// Backtests one security over `window`. A security with no bars in
    /// the window yields the zero result. Minute bars are read only when
    /// the service was built with `load_minutes`.
    pub fn backtest(
        &self,
        code: &str,
        names: &[String],
        window: TimeWindow,
        settings: &ExecutionSettings,
    ) -> Result<BacktestResult, StrategistError> {
        let strategy = self.strategy(names)?;
        let day = self.data.fetch_day_klines(code, window)?;
        let min = if self.load_minutes {
            self.data.fetch_minute_klines(code, window)?
        } else {
            Vec::new()
        };
        let info = Info::from_klines(code, &self.data.code_name(code), &day)
            .unwrap_or_else(|| Info::bare(code));
        let result = run_backtest(&info, &day, &min, strategy.as_ref(), settings);
        info!(
            code,
            strategy = strategy.name(),
            total_return = result.total_return,
            trades = result.trade_count(),
            "backtest finished"
        );
        Ok(result)
    }

    /// Backtests caller-supplied bars.
    pub fn backtest_bars(
        &self,
        info: &Info,
        day: &[Kline],
        min: &[Kline],
        names: &[String],
        settings: &ExecutionSettings,
    ) -> Result<BacktestResult, StrategistError> {
        let strategy = self.strategy(names)?;
        Ok(run_backtest(info, day, min, strategy.as_ref(), settings))
    }

    /// Streams the securities whose combined signal fires at the end of
    /// `window`. Fails when the universe cannot be listed. Must be called
    /// from within a tokio runtime.
    pub fn screen(
        &self,
        names: &[String],
        window: TimeWindow,
    ) -> Result<ScreenStream<Match>, StrategistError> {
        let strategy = self.strategy(names)?;
        self.screener.screen(strategy, window, self.concurrency)
    }

    /// Backtests every security, streaming per-security items in completion
    /// order and a closing summary. Fails without a summary when the
    /// universe cannot be listed. Must be called from within a tokio
    /// runtime.
    pub fn backtest_all(
        &self,
        names: &[String],
        window: TimeWindow,
        settings: &ExecutionSettings,
    ) -> Result<ScreenStream<ScreenEvent>, StrategistError> {
        let strategy = self.strategy(names)?;
        let settings = settings.normalized();
        info!(strategy = strategy.name(), "universe backtest started");

        let mut items = self
            .screener
            .range(self.concurrency, window, move |info, day, min| {
                let result = run_backtest(info, day, min, strategy.as_ref(), &settings);
                Some(BacktestItem {
                    code: info.code.clone(),
                    name: info.name.clone(),
                    total_return: result.total_return,
                    max_drawdown: result.max_drawdown,
                    sharpe: result.sharpe,
                    trades: result.trade_count(),
                    final_equity: result.final_equity,
                })
            })?;

        let (tx, rx) = mpsc::channel(self.concurrency.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let stop = Arc::clone(&cancelled);
        tokio::spawn(async move {
            let mut acc = Accumulator::default();
            while let Some(item) = items.next().await {
                if stop.load(Ordering::SeqCst) {
                    items.cancel();
                    return;
                }
                acc.add(&item);
                if tx.send(ScreenEvent::Item(item)).await.is_err() {
                    items.cancel();
                    return;
                }
            }
            let summary = acc.summary();
            info!(
                count = summary.count,
                avg_return = summary.avg_return,
                "universe backtest finished"
            );
            let _ = tx.send(ScreenEvent::Summary(summary)).await;
        });

        Ok(ScreenStream::from_channel(rx, cancelled))
    }

    pub fn list_scripts(&self) -> Result<Vec<ScriptRecord>, StrategistError> {
        self.store()?.list_all()
    }

    /// Persists a new script and registers it when enabled. A script that
    /// fails to compile is not persisted.
    pub fn create_script(
        &self,
        name: &str,
        script: Option<&str>,
        enabled: bool,
    ) -> Result<ScriptRecord, StrategistError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StrategistError::ConfigInvalid {
                section: "script".to_string(),
                key: "name".to_string(),
                reason: "name is required".to_string(),
            });
        }
        let store = self.store()?;
        let record = ScriptRecord::new(
            name,
            StrategyKind::DayKline,
            script.unwrap_or(DEFAULT_SCRIPT),
            enabled,
        );
        let previous = self.registry.get(name);
        self.registry.register_script(&record)?;
        if let Err(err) = store.insert(&record) {
            self.restore(name, previous);
            return Err(err);
        }
        Ok(record)
    }

    /// Replaces a script's body and flag under a fresh namespace.
    pub fn update_script(
        &self,
        name: &str,
        script: &str,
        enabled: bool,
    ) -> Result<ScriptRecord, StrategistError> {
        let store = self.store()?;
        let mut record = store.get(name)?.ok_or_else(|| StrategistError::NotFound {
            what: format!("strategy '{name}'"),
        })?;
        record.script = script.to_string();
        record.enabled = enabled;
        record.touch();

        let previous = self.registry.get(name);
        self.registry.register_script(&record)?;
        if let Err(err) =
            store.update_script(name, &record.script, record.enabled, &record.namespace)
        {
            self.restore(name, previous);
            return Err(err);
        }
        Ok(record)
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), StrategistError> {
        let store = self.store()?;
        let mut record = store.get(name)?.ok_or_else(|| StrategistError::NotFound {
            what: format!("strategy '{name}'"),
        })?;
        if record.enabled == enabled {
            return Ok(());
        }
        record.enabled = enabled;
        let previous = self.registry.get(name);
        self.registry.register_script(&record)?;
        if let Err(err) = store.update_enabled(name, enabled) {
            self.restore(name, previous);
            return Err(err);
        }
        Ok(())
    }

    /// Puts back the registration a failed store write displaced.
    fn restore(&self, name: &str, previous: Option<Arc<dyn Strategy>>) {
        warn!(strategy = name, "store write failed, registration restored");
        match previous {
            Some(strategy) => self.registry.register(strategy),
            None => self.registry.delete(name),
        }
    }

    pub fn delete_script(&self, name: &str) -> Result<(), StrategistError> {
        let store = self.store()?;
        if let Err(err) = store.delete(name) {
            warn!(strategy = name, error = %err, "delete from store failed");
            return Err(err);
        }
        self.registry.delete(name);
        Ok(())
    }
}
