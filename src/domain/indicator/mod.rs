//! Technical indicators over numeric series.
//!
//! Every function returns a vector the same length as its input. Warm-up
//! positions hold `NaN`, which compares false in every rule, so a rule that
//! needs more history than exists simply does not fire.

pub mod moving;
pub mod oscillator;
pub mod volatility;

pub use moving::{ema, sma, wma};
pub use oscillator::{macd, roc, rsi, MacdSeries};
pub use volatility::{atr, stddev};

use std::fmt;

/// Single-output indicators applied to a source series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorKind {
    Sma(usize),
    Ema(usize),
    Wma(usize),
    Rsi(usize),
    Roc(usize),
    Stddev(usize),
}

impl IndicatorKind {
    pub fn period(&self) -> usize {
        match *self {
            IndicatorKind::Sma(n)
            | IndicatorKind::Ema(n)
            | IndicatorKind::Wma(n)
            | IndicatorKind::Rsi(n)
            | IndicatorKind::Roc(n)
            | IndicatorKind::Stddev(n) => n,
        }
    }

    /// Bars of source history needed before the first valid output.
    pub fn warmup(&self) -> usize {
        match *self {
            IndicatorKind::Rsi(n) | IndicatorKind::Roc(n) => n.saturating_add(1),
            other => other.period().max(1),
        }
    }

    pub fn compute(&self, source: &[f64]) -> Vec<f64> {
        match *self {
            IndicatorKind::Sma(n) => sma(source, n),
            IndicatorKind::Ema(n) => ema(source, n),
            IndicatorKind::Wma(n) => wma(source, n),
            IndicatorKind::Rsi(n) => rsi(source, n),
            IndicatorKind::Roc(n) => roc(source, n),
            IndicatorKind::Stddev(n) => stddev(source, n),
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorKind::Sma(n) => write!(f, "SMA({})", n),
            IndicatorKind::Ema(n) => write!(f, "EMA({})", n),
            IndicatorKind::Wma(n) => write!(f, "WMA({})", n),
            IndicatorKind::Rsi(n) => write!(f, "RSI({})", n),
            IndicatorKind::Roc(n) => write!(f, "ROC({})", n),
            IndicatorKind::Stddev(n) => write!(f, "STDDEV({})", n),
        }
    }
}

/// First non-NaN index of a series, if any.
pub fn first_valid(series: &[f64]) -> Option<usize> {
    series.iter().position(|v| !v.is_nan())
}
