//! Fill simulation: slippage, order sizing and fees.

use crate::domain::settings::ExecutionSettings;

/// Shares per board lot.
pub const LOT: i64 = 100;

/// `max(value * fee_rate, min_fee)`, rounded to cents.
pub fn fee(value: f64, settings: &ExecutionSettings) -> f64 {
    round_cents((value * settings.fee_rate).max(settings.min_fee))
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Long entry fills above the close.
pub fn entry_price(close: f64, slippage: f64) -> f64 {
    close + slippage
}

/// Long exit fills below the close, never below zero.
pub fn exit_price(close: f64, slippage: f64) -> f64 {
    (close - slippage).max(0.0)
}

/// A sized entry order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFill {
    pub shares: i64,
    pub cost: f64,
    pub fee: f64,
}

/// Sizes a long entry at `price` with the cash on hand.
///
/// One unit is `size` lots. Cost plus fee must fit in cash, so the unit
/// count is bounded by both `cash / (unit_cost * (1 + fee_rate))` and
/// `(cash - min_fee) / unit_cost`. The estimate is then stepped down while
/// cent rounding of the fee still overshoots. `None` when not even one unit
/// is affordable or the order size does not fit in an `i64`.
pub fn size_entry(cash: f64, price: f64, settings: &ExecutionSettings) -> Option<EntryFill> {
    if !(price > 0.0 && price.is_finite()) || !(cash > 0.0 && cash.is_finite()) {
        return None;
    }
    let unit = LOT.checked_mul(settings.size.max(1))?;
    let unit_cost = price * unit as f64;
    if !unit_cost.is_finite() {
        return None;
    }

    let by_rate = cash / (unit_cost * (1.0 + settings.fee_rate.max(0.0)));
    let by_min_fee = (cash - settings.min_fee.max(0.0)) / unit_cost;
    let estimate = by_rate.min(by_min_fee).floor();
    if !(estimate >= 1.0) {
        return None;
    }
    let mut units = estimate.min((i64::MAX / unit) as f64) as i64;
    while units > 0 {
        let shares = units.checked_mul(unit)?;
        let cost = shares as f64 * price;
        let fee = fee(cost, settings);
        if cost + fee <= cash {
            return Some(EntryFill { shares, cost, fee });
        }
        units -= 1;
    }
    None
}
