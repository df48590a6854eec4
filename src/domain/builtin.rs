//! Strategies compiled into the binary.

use crate::domain::info::Info;
use crate::domain::kline::Kline;
use crate::domain::strategy::Strategy;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Every built-in, ready for registration.
pub fn all() -> Vec<Arc<dyn Strategy>> {
    vec![
        Arc::new(RiseThreeByClose),
        Arc::new(BullishAlignment),
        Arc::new(TrendUp::default()),
        Arc::new(LimitUpGap::default()),
        Arc::new(CodePrefix::new("no-buy-limit", &["sh6", "sz0"])),
        Arc::new(CodePrefix::new("exchange-sh", &["sh"])),
        Arc::new(CodePrefix::new("exchange-sz", &["sz"])),
        Arc::new(CodePrefix::new("exchange-bj", &["bj"])),
        Arc::new(CodeSet::new(
            "three-codes",
            &["bj920000", "sh600000", "sz000001"],
        )),
    ]
}

/// Three consecutive higher closes.
#[derive(Debug, Clone, Copy)]
pub struct RiseThreeByClose;

impl Strategy for RiseThreeByClose {
    fn name(&self) -> &str {
        "rise-three-by-close"
    }

    fn signal(&self, _info: &Info, day: &[Kline], _min: &[Kline]) -> bool {
        let [.., a, b, c] = day else {
            return false;
        };
        c.close > b.close && b.close > a.close
    }

    fn lookback(&self) -> usize {
        3
    }
}

/// Mean close of the last `n` bars; `None` when there are fewer.
fn trailing_ma(day: &[Kline], n: usize) -> Option<f64> {
    if n == 0 || day.len() < n {
        return None;
    }
    Some(day[day.len() - n..].iter().map(|k| k.close).sum::<f64>() / n as f64)
}

/// MA5 > MA10 > MA20 > MA30 formed on the latest bar, with every average
/// higher than the bar before.
#[derive(Debug, Clone, Copy)]
pub struct BullishAlignment;

impl BullishAlignment {
    const PERIODS: [usize; 4] = [5, 10, 20, 30];

    fn averages(day: &[Kline]) -> Option<[f64; 4]> {
        let mut out = [0.0; 4];
        for (slot, period) in out.iter_mut().zip(Self::PERIODS) {
            *slot = trailing_ma(day, period)?;
        }
        Some(out)
    }

    fn aligned(ma: &[f64; 4]) -> bool {
        ma.windows(2).all(|w| w[0] > w[1])
    }
}

impl Strategy for BullishAlignment {
    fn name(&self) -> &str {
        "bullish-alignment"
    }

    fn signal(&self, _info: &Info, day: &[Kline], _min: &[Kline]) -> bool {
        if day.len() < self.lookback() {
            return false;
        }
        let (Some(now), Some(prev)) = (
            Self::averages(day),
            Self::averages(&day[..day.len() - 1]),
        ) else {
            return false;
        };
        Self::aligned(&now)
            && !Self::aligned(&prev)
            && now.iter().zip(prev.iter()).all(|(n, p)| n > p)
    }

    fn lookback(&self) -> usize {
        31
    }
}

/// Higher swing highs and higher swing lows.
///
/// A swing high (low) is a bar whose high (low) is not exceeded by any bar
/// within `window` bars on either side. The two latest highs H1, H2 and
/// lows L1, L2 must alternate H1 < L1 < H2 < L2 in time, with H2 > H1,
/// L2 > L1 and each low below its high.
#[derive(Debug, Clone, Copy)]
pub struct TrendUp {
    window: usize,
}

impl Default for TrendUp {
    fn default() -> Self {
        Self { window: 8 }
    }
}

impl Strategy for TrendUp {
    fn name(&self) -> &str {
        "trend-up"
    }

    fn signal(&self, _info: &Info, day: &[Kline], _min: &[Kline]) -> bool {
        let w = self.window;
        if day.len() < self.lookback() || day.len() < 2 * w + 1 {
            return false;
        }

        let mut highs: Vec<(usize, f64)> = Vec::new();
        let mut lows: Vec<(usize, f64)> = Vec::new();
        for i in (w..day.len() - w).rev() {
            if highs.len() >= 2 && lows.len() >= 2 {
                break;
            }
            let around = (i - w..=i + w).filter(|&j| j != i);
            let is_high = around.clone().all(|j| day[j].high <= day[i].high);
            let is_low = around.into_iter().all(|j| day[j].low >= day[i].low);
            if is_high {
                highs.push((i, day[i].high));
            }
            if is_low {
                lows.push((i, day[i].low));
            }
        }

        // newest first
        let (&[h2, h1, ..], &[l2, l1, ..]) = (highs.as_slice(), lows.as_slice()) else {
            return false;
        };
        h1.0 < l1.0
            && l1.0 < h2.0
            && h2.0 < l2.0
            && l2.1 > l1.1
            && h2.1 > h1.1
            && l1.1 < h1.1
            && l2.1 < h2.1
    }

    fn lookback(&self) -> usize {
        30
    }
}

/// A limit-up close within the recent window, a gap-up open the next day,
/// bullish bars from the gap on, and expanding volume on the latest bar.
#[derive(Debug, Clone, Copy)]
pub struct LimitUpGap {
    limit_up: f64,
    recent: usize,
    bullish_bars: usize,
}

impl Default for LimitUpGap {
    fn default() -> Self {
        Self {
            limit_up: 0.098,
            recent: 20,
            bullish_bars: 2,
        }
    }
}

impl LimitUpGap {
    fn pattern_at(&self, day: &[Kline], i: usize) -> bool {
        let (prev, curr, next) = (&day[i - 1], &day[i], &day[i + 1]);
        if prev.close == 0.0 {
            return false;
        }
        let change = (curr.close - prev.close) / prev.close;
        change >= self.limit_up
            && next.open > curr.close
            && (0..self.bullish_bars).all(|j| day.get(i + 1 + j).is_some_and(Kline::is_bullish))
    }

    fn volume_expanding(day: &[Kline]) -> bool {
        let last = day.len() - 1;
        let earlier = &day[last.saturating_sub(5)..last];
        if earlier.is_empty() {
            return false;
        }
        let avg = earlier.iter().map(|k| k.volume as f64).sum::<f64>() / earlier.len() as f64;
        let volume = day[last].volume as f64;
        volume > avg && volume > day[last - 1].volume as f64
    }
}

impl Strategy for LimitUpGap {
    fn name(&self) -> &str {
        "limit-up-gap"
    }

    fn signal(&self, _info: &Info, day: &[Kline], _min: &[Kline]) -> bool {
        let n = day.len();
        if n < self.lookback() {
            return false;
        }
        let start = n.saturating_sub(self.recent).max(1);
        (start..n - 1).any(|i| self.pattern_at(day, i)) && Self::volume_expanding(day)
    }

    fn lookback(&self) -> usize {
        self.recent
    }
}

/// Matches codes starting with any of the given prefixes.
#[derive(Debug, Clone)]
pub struct CodePrefix {
    name: String,
    prefixes: Vec<String>,
}

impl CodePrefix {
    pub fn new(name: &str, prefixes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Strategy for CodePrefix {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal(&self, info: &Info, _day: &[Kline], _min: &[Kline]) -> bool {
        self.prefixes.iter().any(|p| info.code.starts_with(p.as_str()))
    }
}

/// Matches an explicit set of codes.
#[derive(Debug, Clone)]
pub struct CodeSet {
    name: String,
    codes: BTreeSet<String>,
}

impl CodeSet {
    pub fn new(name: &str, codes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl Strategy for CodeSet {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal(&self, info: &Info, _day: &[Kline], _min: &[Kline]) -> bool {
        self.codes.contains(&info.code)
    }
}
