//! Moving averages.
//!
//! - SMA(n): arithmetic mean of the last n values.
//! - EMA(n): k = 2/(n+1), seeded with the first SMA, then
//!   EMA[i] = P[i]*k + EMA[i-1]*(1-k).
//! - WMA(n): linearly weighted, newest value weight n, O(n) sliding update.
//!
//! Leading NaNs in the source (a nested indicator still warming up) shift
//! the warm-up window instead of poisoning the whole output.

pub(crate) fn on_valid_tail(source: &[f64], f: impl FnOnce(&[f64]) -> Vec<f64>) -> Vec<f64> {
    let start = source
        .iter()
        .position(|v| !v.is_nan())
        .unwrap_or(source.len());
    let mut out = vec![f64::NAN; start];
    out.extend(f(&source[start..]));
    out
}

pub fn sma(source: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; source.len()];
    }
    on_valid_tail(source, |values| {
        (0..values.len())
            .map(|i| {
                if i + 1 < period {
                    f64::NAN
                } else {
                    values[i + 1 - period..=i].iter().sum::<f64>() / period as f64
                }
            })
            .collect()
    })
}

pub fn ema(source: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; source.len()];
    }
    on_valid_tail(source, |values| {
        let k = 2.0 / (period as f64 + 1.0);
        let mut out = Vec::with_capacity(values.len());
        let mut ema = 0.0;
        let mut sum = 0.0;
        for (i, &v) in values.iter().enumerate() {
            if i + 1 < period {
                sum += v;
                out.push(f64::NAN);
            } else if i + 1 == period {
                sum += v;
                ema = sum / period as f64;
                out.push(ema);
            } else {
                ema = v * k + ema * (1.0 - k);
                out.push(ema);
            }
        }
        out
    })
}

pub fn wma(source: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; source.len()];
    }
    on_valid_tail(source, |values| {
        let divisor = (period * (period + 1)) as f64 / 2.0;
        let mut weighted_sum = 0.0;
        let mut window_sum = 0.0;
        let mut out = Vec::with_capacity(values.len());
        for (i, &v) in values.iter().enumerate() {
            if i < period {
                weighted_sum += (i + 1) as f64 * v;
                window_sum += v;
            } else {
                weighted_sum += period as f64 * v - window_sum;
                window_sum += v - values[i - period];
            }
            out.push(if i + 1 >= period {
                weighted_sum / divisor
            } else {
                f64::NAN
            });
        }
        out
    })
}
