//! Point-in-time security snapshot.

use crate::domain::kline::Kline;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Info {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub turnover: f64,
    pub float_stock: i64,
    pub total_stock: i64,
    pub float_value: f64,
    pub total_value: f64,
}

impl Info {
    /// Builds the snapshot from the last bar of a daily series.
    ///
    /// Returns `None` for an empty series.
    pub fn from_klines(code: &str, name: &str, day: &[Kline]) -> Option<Self> {
        let last = day.last()?;
        Some(Info {
            code: code.to_string(),
            name: name.to_string(),
            price: last.close,
            turnover: last.turnover,
            float_stock: last.float_stock,
            total_stock: last.total_stock,
            float_value: last.float_stock as f64 * last.close,
            total_value: last.total_stock as f64 * last.close,
        })
    }

    /// Snapshot carrying only a code, for callers that hand in pre-fetched bars.
    pub fn bare(code: &str) -> Self {
        Info {
            code: code.to_string(),
            ..Default::default()
        }
    }
}
