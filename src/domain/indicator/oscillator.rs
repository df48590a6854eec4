//! Momentum oscillators: RSI, ROC and MACD.

use super::moving::{ema, on_valid_tail};

/// Wilder RSI. The first average is the simple mean of n changes, later
/// averages are smoothed as (prev * (n-1) + current) / n. A window with no
/// losses reads 100.
pub fn rsi(source: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; source.len()];
    }
    on_valid_tail(source, |values| {
        let mut out = vec![f64::NAN; values.len()];
        if values.len() <= period {
            return out;
        }
        let change = |i: usize| values[i] - values[i - 1];
        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;
        for i in 1..=period {
            let c = change(i);
            avg_gain += c.max(0.0);
            avg_loss += (-c).max(0.0);
        }
        avg_gain /= period as f64;
        avg_loss /= period as f64;
        out[period] = rsi_value(avg_gain, avg_loss);

        for i in (period + 1)..values.len() {
            let c = change(i);
            avg_gain = (avg_gain * (period - 1) as f64 + c.max(0.0)) / period as f64;
            avg_loss = (avg_loss * (period - 1) as f64 + (-c).max(0.0)) / period as f64;
            out[i] = rsi_value(avg_gain, avg_loss);
        }
        out
    })
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// ROC(n) = (P[i] - P[i-n]) / P[i-n] * 100, zero when the base is zero.
pub fn roc(source: &[f64], period: usize) -> Vec<f64> {
    on_valid_tail(source, |values| {
        (0..values.len())
            .map(|i| {
                if period == 0 || i < period {
                    f64::NAN
                } else if values[i - period] == 0.0 {
                    0.0
                } else {
                    (values[i] - values[i - period]) / values[i - period] * 100.0
                }
            })
            .collect()
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD line = EMA(fast) - EMA(slow); signal = EMA(signal) of the line;
/// histogram = line - signal.
pub fn macd(source: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = ema(source, fast);
    let slow_ema = ema(source, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| f - s)
        .collect();
    let signal_line = ema(&line, signal);
    let histogram = line
        .iter()
        .zip(&signal_line)
        .map(|(l, s)| l - s)
        .collect();
    MacdSeries {
        line,
        signal: signal_line,
        histogram,
    }
}
