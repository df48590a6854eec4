//! Single-security backtest engine.
//!
//! A Flat/Long state machine over daily bars. While Flat the strategy is
//! asked for a signal on the history up to the current bar; a true signal
//! buys at the slipped close. While Long only the stop-loss and
//! take-profit thresholds close the position; the entry signal turning
//! false does not. A position still open at the last bar is marked to
//! market without an exit fee.

use crate::domain::execution::{entry_price, exit_price, fee, size_entry};
use crate::domain::info::Info;
use crate::domain::kline::Kline;
use crate::domain::metrics::{Metrics, bars_per_year};
use crate::domain::position::{ClosedTrade, ExitReason, OpenPosition};
use crate::domain::settings::ExecutionSettings;
use crate::domain::strategy::Strategy;
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub total_return: f64,
    /// Positive magnitude; 0.0 means no drawdown.
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub trades: Vec<ClosedTrade>,
    pub open_position: Option<OpenPosition>,
    pub initial_cash: f64,
    pub final_equity: f64,
    /// Account value at every daily bar.
    #[serde(skip)]
    pub equity: Vec<f64>,
    pub bars: usize,
}

impl BacktestResult {
    /// No trades, no return, equity flat at `cash`.
    pub fn empty(cash: f64, bars: usize) -> Self {
        Self {
            total_return: 0.0,
            max_drawdown: 0.0,
            sharpe: 0.0,
            trades: Vec::new(),
            open_position: None,
            initial_cash: cash,
            final_equity: cash,
            equity: vec![cash; bars],
            bars,
        }
    }

    pub fn trade_count(&self) -> usize {
        self.trades.len()
    }
}

/// Minute bars stamped at or before `time`.
fn minutes_until<'a>(min: &'a [Kline], time: chrono::NaiveDateTime) -> &'a [Kline] {
    &min[..min.partition_point(|k| k.time <= time)]
}

pub fn run_backtest(
    info: &Info,
    day: &[Kline],
    min: &[Kline],
    strategy: &dyn Strategy,
    settings: &ExecutionSettings,
) -> BacktestResult {
    let settings = settings.normalized();
    let lookback = strategy.lookback().max(1);
    if day.len() < lookback {
        debug!(code = %info.code, bars = day.len(), lookback, "not enough bars");
        return BacktestResult::empty(settings.cash, day.len());
    }

    let mut cash = settings.cash;
    let mut position: Option<OpenPosition> = None;
    let mut trades = Vec::new();
    let mut equity = Vec::with_capacity(day.len());
    let mut last_mark = settings.cash;

    for (i, bar) in day.iter().enumerate() {
        let tradable = bar.is_tradable();

        if tradable {
            match position.take() {
                Some(open) => {
                    let reason = if open.should_stop_loss(bar.close, settings.stop_loss) {
                        Some(ExitReason::StopLoss)
                    } else if open.should_take_profit(bar.close, settings.take_profit) {
                        Some(ExitReason::TakeProfit)
                    } else {
                        None
                    };
                    match reason {
                        Some(reason) => {
                            let price = exit_price(bar.close, settings.slippage);
                            let proceeds = open.market_value(price);
                            let exit_fee = fee(proceeds, &settings);
                            cash += proceeds - exit_fee;
                            trades.push(ClosedTrade::close(
                                &open, i, bar.time, price, exit_fee, reason,
                            ));
                        }
                        None => position = Some(open),
                    }
                }
                None if i + 1 >= lookback => {
                    let visible = minutes_until(min, bar.time);
                    if strategy.signal(info, &day[..=i], visible) {
                        let price = entry_price(bar.close, settings.slippage);
                        match size_entry(cash, price, &settings) {
                            Some(fill) => {
                                cash -= fill.cost + fill.fee;
                                position = Some(OpenPosition {
                                    entry_index: i,
                                    entry_time: bar.time,
                                    entry_price: price,
                                    shares: fill.shares,
                                    entry_fee: fill.fee,
                                });
                            }
                            None => {
                                debug!(code = %info.code, index = i, cash, price, "entry unaffordable")
                            }
                        }
                    }
                }
                None => {}
            }

            last_mark = cash + position.as_ref().map_or(0.0, |p| p.market_value(bar.close));
        }

        equity.push(last_mark);
    }

    let times: Vec<_> = day.iter().map(|k| k.time).collect();
    let metrics = Metrics::compute(&equity, settings.cash, bars_per_year(&times));

    BacktestResult {
        total_return: metrics.total_return,
        max_drawdown: metrics.max_drawdown,
        sharpe: metrics.sharpe,
        trades,
        open_position: position,
        initial_cash: settings.cash,
        final_equity: last_mark,
        equity,
        bars: day.len(),
    }
}
