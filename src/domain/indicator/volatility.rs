//! Volatility measures.

use super::moving::on_valid_tail;
use crate::domain::kline::Kline;

/// Population standard deviation over a rolling window.
pub fn stddev(source: &[f64], period: usize) -> Vec<f64> {
    if period == 0 {
        return vec![f64::NAN; source.len()];
    }
    on_valid_tail(source, |values| {
        (0..values.len())
            .map(|i| {
                if i + 1 < period {
                    return f64::NAN;
                }
                let window = &values[i + 1 - period..=i];
                let mean = window.iter().sum::<f64>() / period as f64;
                let variance =
                    window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
                variance.sqrt()
            })
            .collect()
    })
}

/// Average True Range with Wilder smoothing.
///
/// The first bar's true range is high - low. ATR[n-1] is the mean of the
/// first n true ranges; later values are (prev * (n-1) + TR) / n.
pub fn atr(bars: &[Kline], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }
    let tr: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let mut value = tr[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = value;
    for i in period..bars.len() {
        value = (value * (period - 1) as f64 + tr[i]) / period as f64;
        out[i] = value;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn bar(day: u32, high: f64, low: f64, close: f64) -> Kline {
        Kline {
            time: NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap()
                .and_hms_opt(15, 0, 0)
                .unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1_000,
            amount: close * 1_000.0,
            turnover: 1.0,
            float_stock: 10_000,
            total_stock: 10_000,
        }
    }

    #[test]
    fn stddev_constant_is_zero() {
        let out = stddev(&[5.0; 6], 3);
        assert!(out[1].is_nan());
        assert_relative_eq!(out[5], 0.0);
    }

    #[test]
    fn stddev_population() {
        // mean 5, squared deviations 9+1+1+9 → variance 5
        let out = stddev(&[2.0, 4.0, 6.0, 8.0], 4);
        assert_relative_eq!(out[3], 5.0_f64.sqrt());
    }

    #[test]
    fn atr_seed_and_smoothing() {
        let bars = vec![
            bar(1, 12.0, 10.0, 11.0),
            bar(2, 13.0, 11.0, 12.0),
            bar(3, 16.0, 12.0, 15.0),
        ];
        let out = atr(&bars, 2);
        assert!(out[0].is_nan());
        // TR: 2, 2 → seed 2
        assert_relative_eq!(out[1], 2.0);
        // TR[2] = max(4, |16-12|, |12-12|) = 4 → (2 + 4) / 2
        assert_relative_eq!(out[2], 3.0);
    }

    #[test]
    fn atr_short_series() {
        let bars = vec![bar(1, 12.0, 10.0, 11.0)];
        assert!(atr(&bars, 5).iter().all(|v| v.is_nan()));
    }
}
