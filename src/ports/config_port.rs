//! Read access to the INI settings file.
//!
//! Sections used by strategist: `[data]`, `[store]`, `[scripts]`,
//! `[screener]`, `[backtest]` and `[log]`.

use std::path::PathBuf;

pub trait ConfigPort {
    /// Raw value, `None` when the key is absent.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// `default` when absent or not an integer.
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    /// `default` when absent or not a number.
    fn get_double(&self, section: &str, key: &str, default: f64) -> f64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Trimmed value; blank values count as absent.
    fn get_value(&self, section: &str, key: &str) -> Option<String> {
        self.get_string(section, key)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    fn get_path(&self, section: &str, key: &str) -> Option<PathBuf> {
        self.get_value(section, key).map(PathBuf::from)
    }
}
