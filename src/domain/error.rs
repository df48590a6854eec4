//! Domain error types.

/// A parse error with position information for script compilation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("parse error at position {position}: {message}")]
pub struct ParseError {
    pub message: String,
    pub position: usize,
}

impl ParseError {
    /// Format the error with a caret pointing at the error position in the input.
    pub fn display_with_context(&self, input: &str) -> String {
        let line_start = input[..self.position.min(input.len())]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let line_end = input[line_start..]
            .find('\n')
            .map(|i| line_start + i)
            .unwrap_or(input.len());
        let caret = " ".repeat(self.position.saturating_sub(line_start)) + "^";
        format!(
            "{line}\n{caret}\n{err}",
            line = &input[line_start..line_end],
            caret = caret,
            err = self
        )
    }
}

/// Failure to turn script text into a registered strategy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("compile error: {0}")]
    Compile(#[from] ParseError),

    #[error("signature mismatch: '{symbol}' is {found}, expected a signal (boolean) expression")]
    SignatureMismatch { symbol: String, found: String },
}

/// Top-level error type for strategist.
#[derive(Debug, thiserror::Error)]
pub enum StrategistError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("no data for {code}")]
    NoData { code: String },

    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("no strategy selected")]
    EmptyGroup,

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<&StrategistError> for std::process::ExitCode {
    fn from(err: &StrategistError) -> Self {
        let code: u8 = match err {
            StrategistError::Io(_) => 1,
            StrategistError::ConfigParse { .. }
            | StrategistError::ConfigMissing { .. }
            | StrategistError::ConfigInvalid { .. } => 2,
            StrategistError::Database { .. } | StrategistError::DatabaseQuery { .. } => 3,
            StrategistError::Script(_) => 4,
            StrategistError::NotFound { .. }
            | StrategistError::NoData { .. }
            | StrategistError::UnknownStrategy { .. }
            | StrategistError::EmptyGroup => 5,
        };
        std::process::ExitCode::from(code)
    }
}
