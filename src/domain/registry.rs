//! Strategy registry.
//!
//! Maps a strategy name to at most one shared handle. Reads and replacement
//! may happen while screens are running; a running screen keeps the handle
//! it resolved.

use crate::domain::builtin;
use crate::domain::error::{ScriptError, StrategistError};
use crate::domain::group::Group;
use crate::domain::script::{ENTRY_SYMBOL, SCRIPT_EXT, ScriptRecord, ScriptStrategy};
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::ports::script_port::ScriptCompiler;
use crate::ports::store_port::StrategyStorePort;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Outcome of startup loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub failed: usize,
}

pub struct StrategyRegistry {
    strategies: RwLock<HashMap<String, Arc<dyn Strategy>>>,
    compiler: Arc<dyn ScriptCompiler>,
}

impl StrategyRegistry {
    pub fn new(compiler: Arc<dyn ScriptCompiler>) -> Self {
        Self {
            strategies: RwLock::new(HashMap::new()),
            compiler,
        }
    }

    /// A registry pre-populated with every built-in strategy.
    pub fn with_builtins(compiler: Arc<dyn ScriptCompiler>) -> Self {
        let registry = Self::new(compiler);
        for strategy in builtin::all() {
            registry.register(strategy);
        }
        info!(count = registry.len(), "built-in strategies registered");
        registry
    }

    /// Inserts or replaces the entry under `strategy.name()`.
    pub fn register(&self, strategy: Arc<dyn Strategy>) {
        let name = strategy.name().to_string();
        let mut map = self
            .strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if map.insert(name.clone(), strategy).is_some() {
            debug!(strategy = %name, "replaced registration");
        } else {
            debug!(strategy = %name, "registered");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Strategy>> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn delete(&self, name: &str) {
        let removed = self
            .strategies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
        if removed.is_some() {
            debug!(strategy = %name, "unregistered");
        }
    }

    /// Registered names in no particular order.
    pub fn list_names(&self) -> Vec<String> {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.strategies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Compiles and registers a script record.
    ///
    /// A disabled record removes any registration under its name. On a
    /// compile failure the previous registration is left in place.
    pub fn register_script(&self, record: &ScriptRecord) -> Result<(), ScriptError> {
        if !record.enabled {
            self.delete(&record.name);
            return Ok(());
        }
        let signal = self.compiler.compile(&record.script, ENTRY_SYMBOL)?;
        self.register(Arc::new(ScriptStrategy::new(record, signal)));
        info!(strategy = %record.name, namespace = %record.namespace, "script registered");
        Ok(())
    }

    /// Builds an AND composite from registered names.
    pub fn group(&self, names: &[String]) -> Result<Group, StrategistError> {
        Group::resolve(names, |name| self.get(name))
    }

    /// Registers persisted records, then every `*.strategy` file in
    /// `script_dir`. Individual failures are logged and skipped.
    pub fn load(
        &self,
        store: Option<&dyn StrategyStorePort>,
        script_dir: Option<&Path>,
    ) -> Result<LoadReport, StrategistError> {
        let mut report = LoadReport::default();

        if let Some(store) = store {
            for record in store.list_all()? {
                self.load_one(&record, &mut report, "store");
            }
        }

        if let Some(dir) = script_dir {
            for record in read_script_dir(dir)? {
                self.load_one(&record, &mut report, "file");
            }
        }

        info!(
            loaded = report.loaded,
            failed = report.failed,
            "script strategies loaded"
        );
        Ok(report)
    }

    fn load_one(&self, record: &ScriptRecord, report: &mut LoadReport, origin: &str) {
        match self.register_script(record) {
            Ok(()) if record.enabled => report.loaded += 1,
            Ok(()) => {}
            Err(err) => {
                warn!(strategy = %record.name, origin, error = %err, "skipping script");
                report.failed += 1;
            }
        }
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.len())
            .finish_non_exhaustive()
    }
}

/// Reads every `*.strategy` file in `dir` as an enabled day-kline record
/// named after the file stem. A missing directory yields nothing.
pub fn read_script_dir(dir: &Path) -> Result<Vec<ScriptRecord>, StrategistError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "script directory not found");
        return Ok(Vec::new());
    }
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == SCRIPT_EXT))
        .collect();
    paths.sort();

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match std::fs::read_to_string(&path) {
            Ok(source) => records.push(ScriptRecord::new(
                name,
                StrategyKind::DayKline,
                &source,
                true,
            )),
            Err(err) => warn!(path = %path.display(), error = %err, "unreadable script file"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rule_script_compiler::RuleScriptCompiler;
    use crate::domain::info::Info;
    use crate::domain::kline::fixtures::daily;
    use std::fs;

    fn registry() -> StrategyRegistry {
        StrategyRegistry::new(Arc::new(RuleScriptCompiler::new()))
    }

    fn record(name: &str, script: &str, enabled: bool) -> ScriptRecord {
        ScriptRecord::new(name, StrategyKind::DayKline, script, enabled)
    }

    #[test]
    fn builtins_are_registered() {
        let reg = StrategyRegistry::with_builtins(Arc::new(RuleScriptCompiler::new()));
        assert!(reg.get("three-codes").is_some());
        assert!(reg.get("rise-three-by-close").is_some());
        assert_eq!(reg.len(), 9);
    }

    #[test]
    fn last_registration_wins() {
        let reg = registry();
        reg.register_script(&record("s", "signal = TRUE", true)).unwrap();
        let first = reg.get("s").unwrap();
        reg.register_script(&record("s", "signal = FALSE", true)).unwrap();
        let second = reg.get("s").unwrap();

        let info = Info::bare("sh600000");
        let day = daily(&[1.0]);
        assert!(first.signal(&info, &day, &[]));
        assert!(!second.signal(&info, &day, &[]));
        assert_eq!(reg.list_names(), vec!["s".to_string()]);
    }

    #[test]
    fn disabled_record_unregisters() {
        let reg = registry();
        reg.register_script(&record("s", "signal = TRUE", true)).unwrap();
        reg.register_script(&record("s", "not even parsed", false)).unwrap();
        assert!(reg.get("s").is_none());
    }

    #[test]
    fn failed_compile_keeps_previous() {
        let reg = registry();
        reg.register_script(&record("s", "signal = TRUE", true)).unwrap();
        let err = reg
            .register_script(&record("s", "signal = close", true))
            .unwrap_err();
        assert!(matches!(err, ScriptError::SignatureMismatch { .. }));
        assert!(reg.get("s").is_some());
    }

    #[test]
    fn delete_absent_is_noop() {
        let reg = registry();
        reg.delete("nothing");
        assert!(reg.is_empty());
    }

    #[test]
    fn group_resolves_through_registry() {
        let reg = StrategyRegistry::with_builtins(Arc::new(RuleScriptCompiler::new()));
        let group = reg
            .group(&["no-buy-limit".to_string(), "three-codes".to_string()])
            .unwrap();
        let day = daily(&[1.0]);
        assert!(group.signal(&Info::bare("sh600000"), &day, &[]));
        assert!(!group.signal(&Info::bare("bj920000"), &day, &[]));

        assert!(matches!(
            reg.group(&["ghost".to_string()]),
            Err(StrategistError::UnknownStrategy { .. })
        ));
    }

    #[test]
    fn load_reads_script_dir_and_skips_failures() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("up.strategy"), "signal = RISING(close, 2)").unwrap();
        fs::write(dir.path().join("broken.strategy"), "signal = ABOVE(").unwrap();
        fs::write(dir.path().join("notes.txt"), "signal = TRUE").unwrap();

        let reg = registry();
        let report = reg.load(None, Some(dir.path())).unwrap();
        assert_eq!(report, LoadReport { loaded: 1, failed: 1 });
        assert!(reg.get("up").is_some());
        assert!(reg.get("broken").is_none());
        assert!(reg.get("notes").is_none());
        assert_eq!(reg.get("up").unwrap().lookback(), 3);
    }

    #[test]
    fn missing_dir_is_empty() {
        let reg = registry();
        let report = reg
            .load(None, Some(Path::new("/definitely/not/here")))
            .unwrap();
        assert_eq!(report, LoadReport::default());
    }
}
