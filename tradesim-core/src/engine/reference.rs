//! Reference engine: the state machine written the obvious way.
//!
//! Holds an `Option<Position>`, appends to a [`TradeLedger`] and pushes one
//! [`EquityPoint`] per bar. The other engines are checked against this one.

use super::kernel::{self, EntryFill};
use super::{SimulationResult, Simulator};
use crate::config::{ReversalPolicy, RunConfig};
use crate::domain::{
    Bar, BarSeries, EquityPoint, EquitySeries, ExitReason, Position, Side, Trade, TradeLedger,
};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceEngine;

impl Simulator for ReferenceEngine {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn simulate(&self, bars: &BarSeries, config: &RunConfig) -> SimulationResult {
        let mut state = EngineState::new(config);
        let bars = bars.bars();

        for (i, bar) in bars.iter().enumerate() {
            let has_next_bar = i + 1 < bars.len();
            state.step(bar, has_next_bar);
        }

        if let Some(last) = bars.last() {
            state.finish(last);
        }

        debug!(
            engine = "reference",
            bars = bars.len(),
            trades = state.ledger.len(),
            final_cash = state.cash,
            "simulation complete"
        );
        SimulationResult {
            ledger: state.ledger,
            equity: EquitySeries::from_points(state.points, config.initial_capital()),
        }
    }
}

/// Mutable state of a single run.
struct EngineState<'a> {
    config: &'a RunConfig,
    cash: f64,
    position: Option<Position>,
    pending_entry: Option<Side>,
    ledger: TradeLedger,
    points: Vec<EquityPoint>,
}

impl<'a> EngineState<'a> {
    fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            cash: config.initial_capital(),
            position: None,
            pending_entry: None,
            ledger: TradeLedger::new(),
            points: Vec::new(),
        }
    }

    fn step(&mut self, bar: &Bar, has_next_bar: bool) {
        // ─── Phase 0: scheduled entry at the open ───
        if let Some(side) = self.pending_entry.take() {
            self.open(side, bar.open, bar.index);
        }

        // ─── Phase 1: exits ───
        let closed_this_bar = self.check_exits(bar);

        // ─── Phase 2: entries ───
        if self.position.is_none() {
            if let Some(side) = kernel::entry_side(bar.flags(), self.config.trading_mode()) {
                let reversal_now = closed_this_bar
                    && self.config.reversal_policy() == ReversalPolicy::AllowSameBar;
                if reversal_now {
                    self.open(side, bar.close, bar.index);
                } else if has_next_bar {
                    self.pending_entry = Some(side);
                }
            }
        }

        // ─── Phase 3: mark to market ───
        let equity = match &self.position {
            Some(pos) => self.cash + pos.market_value(bar.close),
            None => self.cash,
        };
        self.points.push(EquityPoint {
            bar_index: bar.index,
            cash: self.cash,
            equity,
        });
    }

    /// Returns true if the open position was closed on this bar.
    fn check_exits(&mut self, bar: &Bar) -> bool {
        let Some(pos) = self.position.as_mut() else {
            return false;
        };
        pos.track_excursion(bar.high, bar.low);

        let exit = kernel::price_exit(
            pos.side,
            pos.stop_loss,
            pos.take_profit,
            bar.high,
            bar.low,
            self.config.intrabar_policy(),
        )
        .or_else(|| {
            kernel::signal_close(pos.side, bar.flags(), self.config.close_on_opposite_signal())
                .then_some((ExitReason::SignalClose, bar.close))
        })
        .or_else(|| {
            kernel::max_bars_reached(pos.entry_bar, bar.index, self.config.max_bars_in_trade())
                .then_some((ExitReason::MaxBarsExceeded, bar.close))
        });

        match exit {
            Some((reason, raw_price)) => {
                self.close(reason, raw_price, bar.index);
                true
            }
            None => false,
        }
    }

    fn open(&mut self, side: Side, raw_price: f64, bar_index: usize) {
        let Some(fill) = kernel::plan_entry(side, raw_price, self.cash, self.config) else {
            debug!(bar = bar_index, ?side, cash = self.cash, "entry skipped: nothing to allocate");
            return;
        };
        self.cash -= fill.cost();
        debug!(
            bar = bar_index,
            ?side,
            price = fill.price,
            size = fill.size,
            "position opened"
        );
        self.position = Some(position_from_fill(&fill, bar_index, self.config.leverage()));
    }

    fn close(&mut self, reason: ExitReason, raw_price: f64, bar_index: usize) {
        let Some(pos) = self.position.take() else {
            return;
        };
        let trade = settle(&pos, reason, raw_price, bar_index, self.config);
        self.cash += pos.margin + trade.pnl;
        debug!(
            bar = bar_index,
            side = ?trade.side,
            reason = %reason,
            pnl = trade.pnl,
            "position closed"
        );
        self.ledger.record(trade);
    }

    /// Report a position still open after the last bar. Cash is untouched.
    fn finish(&mut self, last: &Bar) {
        if let Some(pos) = self.position.take() {
            let trade = settle(&pos, ExitReason::EndOfData, last.close, last.index, self.config);
            self.ledger.record(trade);
        }
    }
}

fn position_from_fill(fill: &EntryFill, bar_index: usize, leverage: f64) -> Position {
    Position {
        side: fill.side,
        entry_price: fill.price,
        entry_bar: bar_index,
        size: fill.size,
        stop_loss: fill.stop_loss,
        take_profit: fill.take_profit,
        margin: fill.margin,
        entry_fee: fill.entry_fee,
        leverage,
        mae: 0.0,
        mfe: 0.0,
    }
}

fn settle(
    pos: &Position,
    reason: ExitReason,
    raw_price: f64,
    bar_index: usize,
    config: &RunConfig,
) -> Trade {
    let exit = kernel::plan_exit(pos.side, raw_price, pos.entry_price, pos.size, config);
    Trade {
        side: pos.side,
        entry_bar: pos.entry_bar,
        entry_price: pos.entry_price,
        exit_bar: bar_index,
        exit_price: exit.price,
        exit_reason: reason,
        size: pos.size,
        leverage: pos.leverage,
        entry_fee: pos.entry_fee,
        exit_fee: exit.fee,
        fees_paid: pos.entry_fee + exit.fee,
        pnl: exit.pnl,
        bars_held: bar_index - pos.entry_bar,
        mae: pos.mae,
        mfe: pos.mfe,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn bar(index: usize, ohlc: [f64; 4], long_entry: bool, long_exit: bool) -> Bar {
        Bar {
            index,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                + Duration::hours(index as i64),
            open: ohlc[0],
            high: ohlc[1],
            low: ohlc[2],
            close: ohlc[3],
            long_entry,
            short_entry: false,
            long_exit,
            short_exit: false,
        }
    }

    fn frictionless() -> RunConfig {
        RunConfig::builder()
            .initial_capital(1_000.0)
            .taker_fee(0.0)
            .build()
            .unwrap()
    }

    #[test]
    fn entry_fills_at_next_open_and_exit_at_signal_close() {
        let bars = BarSeries::new(vec![
            bar(0, [100.0, 101.0, 99.0, 100.0], true, false),
            bar(1, [100.0, 106.0, 99.0, 105.0], false, false),
            bar(2, [105.0, 111.0, 104.0, 110.0], false, true),
        ])
        .unwrap();

        let result = ReferenceEngine.simulate(&bars, &frictionless());
        let trade = &result.ledger.trades()[0];
        assert_eq!(trade.entry_bar, 1);
        assert_eq!(trade.entry_price, 100.0);
        assert_eq!(trade.exit_bar, 2);
        assert_eq!(trade.exit_price, 110.0);
        assert_eq!(trade.exit_reason, ExitReason::SignalClose);
        assert_eq!(trade.bars_held, 1);
        assert!((result.final_cash() - 1_100.0).abs() < 1e-9);
        assert!(result.ledger.open_trade().is_none());
    }

    #[test]
    fn open_position_reported_as_end_of_data_without_touching_cash() {
        let bars = BarSeries::new(vec![
            bar(0, [100.0, 101.0, 99.0, 100.0], true, false),
            bar(1, [100.0, 103.0, 99.0, 102.0], false, false),
        ])
        .unwrap();

        let result = ReferenceEngine.simulate(&bars, &frictionless());
        assert!(result.ledger.trades().is_empty());
        let open = result.ledger.open_trade().unwrap();
        assert_eq!(open.exit_reason, ExitReason::EndOfData);
        assert_eq!(open.exit_price, 102.0);
        assert!((open.pnl - 20.0).abs() < 1e-9);
        assert!(result.final_cash().abs() < 1e-9);
        assert!((result.final_equity() - 1_020.0).abs() < 1e-9);
    }

    #[test]
    fn equity_point_per_bar() {
        let bars = BarSeries::new(vec![
            bar(0, [100.0, 101.0, 99.0, 100.0], false, false),
            bar(1, [100.0, 101.0, 99.0, 100.0], false, false),
            bar(2, [100.0, 101.0, 99.0, 100.0], false, false),
        ])
        .unwrap();
        let result = ReferenceEngine.simulate(&bars, &frictionless());
        assert_eq!(result.equity.len(), 3);
        assert!(result.equity.points().iter().all(|p| p.equity == 1_000.0));
    }
}
