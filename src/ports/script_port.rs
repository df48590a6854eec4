//! Script compilation port.

use crate::domain::error::ScriptError;
use crate::domain::script::CompiledSignal;

/// Turns script source into a callable signal.
///
/// `entry_symbol` names the binding that must hold the signal. A source
/// that does not parse, or lacks the symbol, is a `Compile` error; a symbol
/// bound to anything other than a signal is a `SignatureMismatch`.
pub trait ScriptCompiler: Send + Sync {
    fn compile(&self, source: &str, entry_symbol: &str) -> Result<CompiledSignal, ScriptError>;
}
