//! Performance metrics over an equity curve.

use chrono::NaiveDateTime;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const TRADING_MINUTES_PER_DAY: f64 = 240.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Metrics {
    pub total_return: f64,
    /// Largest peak-to-trough decline as a positive fraction.
    pub max_drawdown: f64,
    pub sharpe: f64,
}

impl Metrics {
    pub fn compute(equity: &[f64], initial: f64, bars_per_year: f64) -> Self {
        Self {
            total_return: total_return(equity, initial),
            max_drawdown: max_drawdown(equity),
            sharpe: sharpe(equity, bars_per_year),
        }
    }
}

pub fn total_return(equity: &[f64], initial: f64) -> f64 {
    match equity.last() {
        Some(last) if initial > 0.0 => last / initial - 1.0,
        _ => 0.0,
    }
}

pub fn max_drawdown(equity: &[f64]) -> f64 {
    let Some(&first) = equity.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &value in equity {
        if value > peak {
            peak = value;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
        }
    }
    max_dd
}

/// Bar-over-bar returns; a non-positive base contributes a zero return.
pub fn bar_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

/// Annualized mean / population stddev of bar returns; zero without
/// volatility or with fewer than two equity points.
pub fn sharpe(equity: &[f64], bars_per_year: f64) -> f64 {
    let returns = bar_returns(equity);
    if returns.is_empty() {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    if stddev > 0.0 && stddev.is_finite() {
        mean / stddev * bars_per_year.sqrt()
    } else {
        0.0
    }
}

/// Bars per trading year implied by the median spacing of `times`.
///
/// Spacings of a day or more count as daily bars (252 a year); shorter
/// spacings scale by the 240-minute trading day.
pub fn bars_per_year(times: &[NaiveDateTime]) -> f64 {
    let mut gaps: Vec<i64> = times
        .windows(2)
        .map(|w| (w[1] - w[0]).num_minutes())
        .filter(|m| *m > 0)
        .collect();
    if gaps.is_empty() {
        return TRADING_DAYS_PER_YEAR;
    }
    gaps.sort_unstable();
    let median = gaps[gaps.len() / 2];
    if median >= 24 * 60 || median as f64 >= TRADING_MINUTES_PER_DAY {
        TRADING_DAYS_PER_YEAR
    } else {
        TRADING_DAYS_PER_YEAR * (TRADING_MINUTES_PER_DAY / median as f64)
    }
}
