//! Batch engine: many configurations, one pass over the bars.
//!
//! State is laid out per lane in parallel vectors (one lane per
//! [`RunConfig`]) and the loop is bar-major: each bar is read once and
//! applied to every lane before moving on.

use super::kernel;
use super::{SimulationResult, Simulator};
use crate::config::{ReversalPolicy, RunConfig};
use crate::domain::{
    Bar, BarSeries, EquityPoint, EquitySeries, ExitReason, Side, Trade, TradeLedger,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEngine;

impl BatchEngine {
    /// Simulate every configuration over the same bars.
    ///
    /// Results come back in the order of `configs`.
    pub fn run_batch(&self, bars: &BarSeries, configs: &[RunConfig]) -> Vec<SimulationResult> {
        let mut lanes = Lanes::new(configs, bars.len());
        let all = bars.bars();

        for (i, bar) in all.iter().enumerate() {
            let has_next_bar = i + 1 < all.len();
            for lane in 0..lanes.len() {
                lanes.step(lane, bar, has_next_bar);
            }
        }

        if let Some(last) = all.last() {
            for lane in 0..lanes.len() {
                lanes.finish(lane, last);
            }
        }

        debug!(
            engine = "batch",
            bars = all.len(),
            lanes = configs.len(),
            "batch complete"
        );
        lanes.into_results()
    }
}

impl Simulator for BatchEngine {
    fn name(&self) -> &'static str {
        "batch"
    }

    fn simulate(&self, bars: &BarSeries, config: &RunConfig) -> SimulationResult {
        self.run_batch(bars, std::slice::from_ref(config))
            .pop()
            .unwrap_or_else(|| SimulationResult {
                ledger: TradeLedger::new(),
                equity: EquitySeries::from_points(Vec::new(), config.initial_capital()),
            })
    }
}

/// Struct-of-arrays lane state. Index `l` in every vector is lane `l`.
struct Lanes<'a> {
    configs: &'a [RunConfig],
    cash: Vec<f64>,
    pending: Vec<Option<Side>>,
    in_pos: Vec<bool>,
    side: Vec<Side>,
    entry_price: Vec<f64>,
    entry_bar: Vec<usize>,
    size: Vec<f64>,
    stop_loss: Vec<Option<f64>>,
    take_profit: Vec<Option<f64>>,
    margin: Vec<f64>,
    entry_fee: Vec<f64>,
    mae: Vec<f64>,
    mfe: Vec<f64>,
    trades: Vec<Vec<Trade>>,
    points: Vec<Vec<EquityPoint>>,
}

impl<'a> Lanes<'a> {
    fn new(configs: &'a [RunConfig], bar_count: usize) -> Self {
        let n = configs.len();
        Self {
            configs,
            cash: configs.iter().map(RunConfig::initial_capital).collect(),
            pending: vec![None; n],
            in_pos: vec![false; n],
            side: vec![Side::Long; n],
            entry_price: vec![0.0; n],
            entry_bar: vec![0; n],
            size: vec![0.0; n],
            stop_loss: vec![None; n],
            take_profit: vec![None; n],
            margin: vec![0.0; n],
            entry_fee: vec![0.0; n],
            mae: vec![0.0; n],
            mfe: vec![0.0; n],
            trades: vec![Vec::new(); n],
            points: (0..n).map(|_| Vec::with_capacity(bar_count)).collect(),
        }
    }

    fn len(&self) -> usize {
        self.configs.len()
    }

    fn step(&mut self, l: usize, bar: &Bar, has_next_bar: bool) {
        let configs = self.configs;
        let config = &configs[l];
        let flags = bar.flags();

        if let Some(dir) = self.pending[l].take() {
            self.open(l, dir, bar.open, bar.index);
        }

        let mut closed_this_bar = false;
        if self.in_pos[l] {
            let (high, low) = kernel::exposed_range(
                self.side[l],
                self.stop_loss[l],
                self.take_profit[l],
                bar.high,
                bar.low,
            );
            let (adverse, favorable) = kernel::bar_excursion(
                self.side[l],
                self.entry_price[l],
                self.size[l],
                config.leverage(),
                high,
                low,
            );
            self.mae[l] = self.mae[l].min(adverse);
            self.mfe[l] = self.mfe[l].max(favorable);

            let side = self.side[l];
            let exit = kernel::price_exit(
                side,
                self.stop_loss[l],
                self.take_profit[l],
                bar.high,
                bar.low,
                config.intrabar_policy(),
            )
            .or_else(|| {
                kernel::signal_close(side, flags, config.close_on_opposite_signal())
                    .then_some((ExitReason::SignalClose, bar.close))
            })
            .or_else(|| {
                kernel::max_bars_reached(self.entry_bar[l], bar.index, config.max_bars_in_trade())
                    .then_some((ExitReason::MaxBarsExceeded, bar.close))
            });

            if let Some((reason, raw_price)) = exit {
                let trade = self.trade(l, reason, raw_price, bar.index);
                self.cash[l] += self.margin[l] + trade.pnl;
                debug!(lane = l, bar = bar.index, reason = %reason, pnl = trade.pnl, "position closed");
                self.trades[l].push(trade);
                self.in_pos[l] = false;
                closed_this_bar = true;
            }
        }

        if !self.in_pos[l] {
            if let Some(dir) = kernel::entry_side(flags, config.trading_mode()) {
                if closed_this_bar && config.reversal_policy() == ReversalPolicy::AllowSameBar {
                    self.open(l, dir, bar.close, bar.index);
                } else if has_next_bar {
                    self.pending[l] = Some(dir);
                }
            }
        }

        let cash = self.cash[l];
        let equity = if self.in_pos[l] {
            cash + (self.margin[l]
                + kernel::gross_pnl(
                    self.side[l],
                    self.entry_price[l],
                    bar.close,
                    self.size[l],
                    config.leverage(),
                ))
        } else {
            cash
        };
        self.points[l].push(EquityPoint {
            bar_index: bar.index,
            cash,
            equity,
        });
    }

    fn open(&mut self, l: usize, side: Side, raw_price: f64, bar_index: usize) {
        let Some(fill) = kernel::plan_entry(side, raw_price, self.cash[l], &self.configs[l]) else {
            debug!(lane = l, bar = bar_index, ?side, "entry skipped: nothing to allocate");
            return;
        };
        self.cash[l] -= fill.cost();
        self.in_pos[l] = true;
        self.side[l] = fill.side;
        self.entry_price[l] = fill.price;
        self.entry_bar[l] = bar_index;
        self.size[l] = fill.size;
        self.stop_loss[l] = fill.stop_loss;
        self.take_profit[l] = fill.take_profit;
        self.margin[l] = fill.margin;
        self.entry_fee[l] = fill.entry_fee;
        self.mae[l] = 0.0;
        self.mfe[l] = 0.0;
    }

    fn trade(&self, l: usize, reason: ExitReason, raw_price: f64, bar_index: usize) -> Trade {
        let config = &self.configs[l];
        let exit = kernel::plan_exit(
            self.side[l],
            raw_price,
            self.entry_price[l],
            self.size[l],
            config,
        );
        Trade {
            side: self.side[l],
            entry_bar: self.entry_bar[l],
            entry_price: self.entry_price[l],
            exit_bar: bar_index,
            exit_price: exit.price,
            exit_reason: reason,
            size: self.size[l],
            leverage: config.leverage(),
            entry_fee: self.entry_fee[l],
            exit_fee: exit.fee,
            fees_paid: self.entry_fee[l] + exit.fee,
            pnl: exit.pnl,
            bars_held: bar_index - self.entry_bar[l],
            mae: self.mae[l],
            mfe: self.mfe[l],
        }
    }

    fn finish(&mut self, l: usize, last: &Bar) {
        if self.in_pos[l] {
            let trade = self.trade(l, ExitReason::EndOfData, last.close, last.index);
            self.trades[l].push(trade);
            self.in_pos[l] = false;
        }
    }

    fn into_results(self) -> Vec<SimulationResult> {
        self.configs
            .iter()
            .zip(self.trades)
            .zip(self.points)
            .map(|((config, trades), points)| {
                let mut ledger = TradeLedger::new();
                for trade in trades {
                    ledger.record(trade);
                }
                SimulationResult {
                    ledger,
                    equity: EquitySeries::from_points(points, config.initial_capital()),
                }
            })
            .collect()
    }
}
