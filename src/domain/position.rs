//! Open positions and completed trades.

use chrono::NaiveDateTime;
use serde::Serialize;

/// Comparison slack for threshold checks on prices.
const PRICE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenPosition {
    pub entry_index: usize,
    pub entry_time: NaiveDateTime,
    /// Fill price, slippage included.
    pub entry_price: f64,
    pub shares: i64,
    pub entry_fee: f64,
}

impl OpenPosition {
    pub fn market_value(&self, price: f64) -> f64 {
        self.shares as f64 * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares as f64 * (price - self.entry_price)
    }

    /// `close <= entry * (1 - pct)`; never true when `pct` is zero.
    pub fn should_stop_loss(&self, close: f64, pct: f64) -> bool {
        pct > 0.0 && close <= self.entry_price * (1.0 - pct) + PRICE_EPSILON
    }

    /// `close >= entry * (1 + pct)`; never true when `pct` is zero.
    pub fn should_take_profit(&self, close: f64, pct: f64) -> bool {
        pct > 0.0 && close >= self.entry_price * (1.0 + pct) - PRICE_EPSILON
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub entry_index: usize,
    pub exit_index: usize,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub shares: i64,
    /// Entry and exit fees together.
    pub fees: f64,
    /// Realized profit after fees.
    pub pnl: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn close(
        position: &OpenPosition,
        exit_index: usize,
        exit_time: NaiveDateTime,
        exit_price: f64,
        exit_fee: f64,
        reason: ExitReason,
    ) -> Self {
        let fees = position.entry_fee + exit_fee;
        Self {
            entry_index: position.entry_index,
            exit_index,
            entry_time: position.entry_time,
            exit_time,
            entry_price: position.entry_price,
            exit_price,
            shares: position.shares,
            fees,
            pnl: position.unrealized_pnl(exit_price) - fees,
            reason,
        }
    }

    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}
