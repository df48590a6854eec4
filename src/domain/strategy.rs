//! Strategy contract shared by built-in, script and composite strategies.

use crate::domain::info::Info;
use crate::domain::kline::Kline;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StrategyKind {
    #[default]
    DayKline,
    MinKline,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::DayKline => write!(f, "day-kline"),
            StrategyKind::MinKline => write!(f, "min-kline"),
        }
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "day-kline" | "" => Ok(StrategyKind::DayKline),
            "min-kline" => Ok(StrategyKind::MinKline),
            other => Err(format!("unknown strategy kind '{other}'")),
        }
    }
}

/// A named signal over a security snapshot and its bar history.
///
/// Implementations hold no per-call state: parameters are fixed at
/// construction and the same inputs always give the same verdict.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind {
        StrategyKind::DayKline
    }

    /// `true` when the signal is present at the last bar of `day`.
    fn signal(&self, info: &Info, day: &[Kline], min: &[Kline]) -> bool;

    /// Minimum number of daily bars before the verdict means anything.
    fn lookback(&self) -> usize {
        1
    }
}

impl fmt::Debug for dyn Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .field("lookback", &self.lookback())
            .finish()
    }
}
