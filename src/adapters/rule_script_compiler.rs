//! `ScriptCompiler` backed by the embedded rule language.

use crate::domain::error::{ParseError, ScriptError};
use crate::domain::rule::Expr;
use crate::domain::rule_eval::Evaluator;
use crate::domain::rule_parser::parse_script;
use crate::domain::script::CompiledSignal;
use crate::ports::script_port::ScriptCompiler;

#[derive(Debug, Default, Clone, Copy)]
pub struct RuleScriptCompiler;

impl RuleScriptCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl ScriptCompiler for RuleScriptCompiler {
    fn compile(&self, source: &str, entry_symbol: &str) -> Result<CompiledSignal, ScriptError> {
        let script = parse_script(source)?;
        let rule = match script.get(entry_symbol) {
            Some(Expr::Bool(rule)) => rule.clone(),
            Some(other) => {
                return Err(ScriptError::SignatureMismatch {
                    symbol: entry_symbol.to_string(),
                    found: other.type_name().to_string(),
                });
            }
            None => {
                return Err(ScriptError::Compile(ParseError {
                    message: format!("entry symbol '{}' is not defined", entry_symbol),
                    position: source.len(),
                }));
            }
        };
        let lookback = rule.lookback();
        Ok(CompiledSignal::new(lookback, move |info, day, _min| {
            Evaluator::new(info, day).signal(&rule)
        }))
    }
}
