//! Execution settings for the backtest engine.

/// Caller-supplied execution parameters.
///
/// Non-positive or non-finite `cash`, `size`, `fee_rate` and `min_fee` fall
/// back to their defaults in [`normalized`](Self::normalized). A zero `slippage`,
/// `stop_loss` or `take_profit` disables the feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExecutionSettings {
    pub cash: f64,
    /// Lot multiplier: one order unit is `size` lots of 100 shares.
    pub size: i64,
    pub fee_rate: f64,
    pub min_fee: f64,
    /// Absolute price adjustment applied against the trader on every fill.
    pub slippage: f64,
    /// Fractional loss from entry that forces an exit.
    pub stop_loss: f64,
    /// Fractional gain from entry that forces an exit.
    pub take_profit: f64,
}

impl ExecutionSettings {
    pub const DEFAULT_CASH: f64 = 100_000.0;
    pub const DEFAULT_SIZE: i64 = 1;
    pub const DEFAULT_FEE_RATE: f64 = 0.0005;
    pub const DEFAULT_MIN_FEE: f64 = 5.0;

    pub fn normalized(&self) -> Self {
        fn positive_or(value: f64, default: f64) -> f64 {
            if value > 0.0 && value.is_finite() {
                value
            } else {
                default
            }
        }
        fn non_negative(value: f64) -> f64 {
            if value > 0.0 && value.is_finite() {
                value
            } else {
                0.0
            }
        }
        Self {
            cash: positive_or(self.cash, Self::DEFAULT_CASH),
            size: if self.size > 0 {
                self.size
            } else {
                Self::DEFAULT_SIZE
            },
            fee_rate: positive_or(self.fee_rate, Self::DEFAULT_FEE_RATE),
            min_fee: positive_or(self.min_fee, Self::DEFAULT_MIN_FEE),
            slippage: non_negative(self.slippage),
            stop_loss: non_negative(self.stop_loss),
            take_profit: non_negative(self.take_profit),
        }
    }
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            cash: Self::DEFAULT_CASH,
            size: Self::DEFAULT_SIZE,
            fee_rate: Self::DEFAULT_FEE_RATE,
            min_fee: Self::DEFAULT_MIN_FEE,
            slippage: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
        }
    }
}
