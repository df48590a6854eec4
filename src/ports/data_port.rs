//! Price history access port.

use crate::domain::error::StrategistError;
use crate::domain::kline::{Kline, TimeWindow};

/// Read-only access to the security universe and its bar history.
///
/// Implementations are shared across screener workers, so every call must
/// be safe to make concurrently.
pub trait DataPort: Send + Sync {
    fn list_codes(&self) -> Result<Vec<String>, StrategistError>;

    /// Display name for a code; empty when unknown.
    fn code_name(&self, code: &str) -> String;

    /// Daily bars within `window`, ascending by time.
    fn fetch_day_klines(&self, code: &str, window: TimeWindow)
    -> Result<Vec<Kline>, StrategistError>;

    /// Intraday bars within `window`, ascending by time.
    fn fetch_minute_klines(
        &self,
        code: &str,
        window: TimeWindow,
    ) -> Result<Vec<Kline>, StrategistError>;
}
