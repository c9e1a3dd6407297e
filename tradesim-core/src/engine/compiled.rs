//! Kernel engine: columnar inputs and scalar state in one indexed loop.
//!
//! Bars are unpacked once into struct-of-arrays columns. The position is a
//! handful of `f64` locals rather than a [`Position`](crate::domain::Position),
//! and trades are collected into a plain `Vec` and turned into a ledger at
//! the end.

use super::kernel;
use super::{SimulationResult, Simulator};
use crate::config::{ReversalPolicy, RunConfig};
use crate::domain::{
    BarSeries, EquityPoint, EquitySeries, ExitReason, Side, SignalFlags, Trade, TradeLedger,
};
use tracing::debug;

const LONG_ENTRY: u8 = 1;
const SHORT_ENTRY: u8 = 1 << 1;
const LONG_EXIT: u8 = 1 << 2;
const SHORT_EXIT: u8 = 1 << 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct KernelEngine;

impl Simulator for KernelEngine {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn simulate(&self, bars: &BarSeries, config: &RunConfig) -> SimulationResult {
        let columns = Columns::from_series(bars);
        let (trades, points) = run_kernel(&columns, config);

        let mut ledger = TradeLedger::new();
        for trade in trades {
            ledger.record(trade);
        }
        debug!(
            engine = "kernel",
            bars = columns.len(),
            trades = ledger.len(),
            "simulation complete"
        );
        SimulationResult {
            ledger,
            equity: EquitySeries::from_points(points, config.initial_capital()),
        }
    }
}

/// Bar data as parallel columns.
pub(crate) struct Columns {
    pub index: Vec<usize>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub flags: Vec<u8>,
}

impl Columns {
    pub fn from_series(bars: &BarSeries) -> Self {
        let n = bars.len();
        let mut columns = Self {
            index: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            flags: Vec::with_capacity(n),
        };
        for bar in bars {
            columns.index.push(bar.index);
            columns.open.push(bar.open);
            columns.high.push(bar.high);
            columns.low.push(bar.low);
            columns.close.push(bar.close);
            columns.flags.push(pack_flags(bar.flags()));
        }
        columns
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn flags_at(&self, i: usize) -> SignalFlags {
        unpack_flags(self.flags[i])
    }
}

fn pack_flags(flags: SignalFlags) -> u8 {
    (flags.long_entry as u8) * LONG_ENTRY
        | (flags.short_entry as u8) * SHORT_ENTRY
        | (flags.long_exit as u8) * LONG_EXIT
        | (flags.short_exit as u8) * SHORT_EXIT
}

fn unpack_flags(bits: u8) -> SignalFlags {
    SignalFlags {
        long_entry: bits & LONG_ENTRY != 0,
        short_entry: bits & SHORT_ENTRY != 0,
        long_exit: bits & LONG_EXIT != 0,
        short_exit: bits & SHORT_EXIT != 0,
    }
}

fn run_kernel(c: &Columns, config: &RunConfig) -> (Vec<Trade>, Vec<EquityPoint>) {
    let n = c.len();
    let leverage = config.leverage();
    let allow_same_bar = config.reversal_policy() == ReversalPolicy::AllowSameBar;

    let mut trades = Vec::new();
    let mut points = Vec::with_capacity(n);

    let mut cash = config.initial_capital();
    let mut pending: Option<Side> = None;

    // Open position as scalars. `in_pos` guards every other field.
    let mut in_pos = false;
    let mut side = Side::Long;
    let mut entry_price = 0.0;
    let mut entry_bar = 0usize;
    let mut size = 0.0;
    let mut stop_loss: Option<f64> = None;
    let mut take_profit: Option<f64> = None;
    let mut margin = 0.0;
    let mut entry_fee = 0.0;
    let mut mae = 0.0_f64;
    let mut mfe = 0.0_f64;

    macro_rules! open_at {
        ($dir:expr, $raw:expr, $bar:expr) => {
            match kernel::plan_entry($dir, $raw, cash, config) {
                Some(fill) => {
                    cash -= fill.cost();
                    in_pos = true;
                    side = fill.side;
                    entry_price = fill.price;
                    entry_bar = $bar;
                    size = fill.size;
                    stop_loss = fill.stop_loss;
                    take_profit = fill.take_profit;
                    margin = fill.margin;
                    entry_fee = fill.entry_fee;
                    mae = 0.0;
                    mfe = 0.0;
                }
                None => debug!(bar = $bar, side = ?$dir, cash, "entry skipped: nothing to allocate"),
            }
        };
    }

    macro_rules! trade_at {
        ($reason:expr, $raw:expr, $bar:expr) => {{
            let exit = kernel::plan_exit(side, $raw, entry_price, size, config);
            Trade {
                side,
                entry_bar,
                entry_price,
                exit_bar: $bar,
                exit_price: exit.price,
                exit_reason: $reason,
                size,
                leverage,
                entry_fee,
                exit_fee: exit.fee,
                fees_paid: entry_fee + exit.fee,
                pnl: exit.pnl,
                bars_held: $bar - entry_bar,
                mae,
                mfe,
            }
        }};
    }

    for i in 0..n {
        let bar_index = c.index[i];
        let (open, high, low, close) = (c.open[i], c.high[i], c.low[i], c.close[i]);
        let flags = c.flags_at(i);
        let mut closed_this_bar = false;

        if let Some(dir) = pending.take() {
            open_at!(dir, open, bar_index);
        }

        if in_pos {
            let (exposed_high, exposed_low) =
                kernel::exposed_range(side, stop_loss, take_profit, high, low);
            let (adverse, favorable) = kernel::bar_excursion(
                side,
                entry_price,
                size,
                leverage,
                exposed_high,
                exposed_low,
            );
            mae = mae.min(adverse);
            mfe = mfe.max(favorable);

            let exit = match kernel::price_exit(
                side,
                stop_loss,
                take_profit,
                high,
                low,
                config.intrabar_policy(),
            ) {
                Some(hit) => Some(hit),
                None if kernel::signal_close(side, flags, config.close_on_opposite_signal()) => {
                    Some((ExitReason::SignalClose, close))
                }
                None if kernel::max_bars_reached(
                    entry_bar,
                    bar_index,
                    config.max_bars_in_trade(),
                ) =>
                {
                    Some((ExitReason::MaxBarsExceeded, close))
                }
                None => None,
            };

            if let Some((reason, raw_price)) = exit {
                let trade = trade_at!(reason, raw_price, bar_index);
                cash += margin + trade.pnl;
                debug!(bar = bar_index, ?side, reason = %reason, pnl = trade.pnl, "position closed");
                trades.push(trade);
                in_pos = false;
                closed_this_bar = true;
            }
        }

        if !in_pos {
            if let Some(dir) = kernel::entry_side(flags, config.trading_mode()) {
                if closed_this_bar && allow_same_bar {
                    open_at!(dir, close, bar_index);
                } else if i + 1 < n {
                    pending = Some(dir);
                }
            }
        }

        let equity = if in_pos {
            cash + (margin + kernel::gross_pnl(side, entry_price, close, size, leverage))
        } else {
            cash
        };
        points.push(EquityPoint {
            bar_index,
            cash,
            equity,
        });
    }

    if in_pos && n > 0 {
        trades.push(trade_at!(ExitReason::EndOfData, c.close[n - 1], c.index[n - 1]));
    }

    (trades, points)
}
