//! Script strategy records and the adapter that exposes a compiled script
//! behind the [`Strategy`] contract.

use crate::domain::info::Info;
use crate::domain::kline::Kline;
use crate::domain::strategy::{Strategy, StrategyKind};
use std::fmt;
use std::sync::Arc;

/// Entry binding every script must define.
pub const ENTRY_SYMBOL: &str = "signal";

/// File extension of scripts loaded from the script directory.
pub const SCRIPT_EXT: &str = "strategy";

/// Body given to a record created without a script.
pub const DEFAULT_SCRIPT: &str = "# edit me\nsignal = FALSE\n";

/// Persisted description of a user strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptRecord {
    pub name: String,
    pub kind: StrategyKind,
    pub script: String,
    pub enabled: bool,
    /// `<name>_<unix millis>`, regenerated on every mutation.
    pub namespace: String,
}

impl ScriptRecord {
    pub fn new(name: &str, kind: StrategyKind, script: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            kind,
            script: script.to_string(),
            enabled,
            namespace: namespace_tag(name),
        }
    }

    /// Replaces the namespace with a fresh one.
    pub fn touch(&mut self) {
        self.namespace = namespace_tag(&self.name);
    }
}

pub fn namespace_tag(name: &str) -> String {
    format!("{}_{}", name, chrono::Utc::now().timestamp_millis())
}

type SignalFn = dyn Fn(&Info, &[Kline], &[Kline]) -> bool + Send + Sync;

/// A callable produced by a [`ScriptCompiler`](crate::ports::script_port::ScriptCompiler).
#[derive(Clone)]
pub struct CompiledSignal {
    func: Arc<SignalFn>,
    lookback: usize,
}

impl CompiledSignal {
    pub fn new<F>(lookback: usize, func: F) -> Self
    where
        F: Fn(&Info, &[Kline], &[Kline]) -> bool + Send + Sync + 'static,
    {
        Self {
            func: Arc::new(func),
            lookback: lookback.max(1),
        }
    }

    pub fn call(&self, info: &Info, day: &[Kline], min: &[Kline]) -> bool {
        (self.func)(info, day, min)
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }
}

impl fmt::Debug for CompiledSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSignal")
            .field("lookback", &self.lookback)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ScriptStrategy {
    name: String,
    kind: StrategyKind,
    namespace: String,
    signal: CompiledSignal,
}

impl ScriptStrategy {
    pub fn new(record: &ScriptRecord, signal: CompiledSignal) -> Self {
        Self {
            name: record.name.clone(),
            kind: record.kind,
            namespace: record.namespace.clone(),
            signal,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

impl Strategy for ScriptStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StrategyKind {
        self.kind
    }

    fn signal(&self, info: &Info, day: &[Kline], min: &[Kline]) -> bool {
        self.signal.call(info, day, min)
    }

    fn lookback(&self) -> usize {
        self.signal.lookback()
    }
}
