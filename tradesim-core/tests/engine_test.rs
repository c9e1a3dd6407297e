//! Scenario tests for the execution simulator.
//!
//! Every scenario runs on all three engines; results must be identical
//! before the reference output is inspected.

use chrono::{Duration, TimeZone, Utc};
use tradesim_core::config::{IntrabarPolicy, ReversalPolicy, RunConfig, TradingMode};
use tradesim_core::domain::{Bar, BarSeries, ExitReason, Side};
use tradesim_core::engine::{EngineKind, SimulationResult};

// ── Helpers ──────────────────────────────────────────────────────────

fn bar(index: usize, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        index,
        timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap() + Duration::hours(index as i64),
        open,
        high,
        low,
        close,
        long_entry: false,
        short_entry: false,
        long_exit: false,
        short_exit: false,
    }
}

fn flat(index: usize, price: f64) -> Bar {
    bar(index, price, price + 1.0, price - 1.0, price)
}

fn long_entry(mut b: Bar) -> Bar {
    b.long_entry = true;
    b
}

fn short_entry(mut b: Bar) -> Bar {
    b.short_entry = true;
    b
}

fn long_exit(mut b: Bar) -> Bar {
    b.long_exit = true;
    b
}

fn series(bars: Vec<Bar>) -> BarSeries {
    BarSeries::new(bars).unwrap()
}

fn frictionless() -> tradesim_core::config::RunConfigBuilder {
    RunConfig::builder().initial_capital(1_000.0).taker_fee(0.0)
}

/// Run every engine and return the reference result once they all agree.
fn run(bars: &BarSeries, config: &RunConfig) -> SimulationResult {
    let results: Vec<SimulationResult> = EngineKind::ALL
        .iter()
        .map(|kind| kind.simulator().simulate(bars, config))
        .collect();
    for (kind, result) in EngineKind::ALL.iter().zip(&results).skip(1) {
        assert_eq!(result, &results[0], "{kind} engine disagrees with reference");
    }
    results.into_iter().next().unwrap()
}

// ── Reference scenarios ──────────────────────────────────────────────

#[test]
fn take_profit_fills_at_target_level() {
    let bars = series(vec![
        long_entry(bar(0, 89_400.0, 89_700.0, 89_300.0, 89_550.0)),
        bar(1, 89_596.40, 90_100.0, 89_450.0, 90_000.0),
        bar(2, 90_000.0, 91_200.0, 89_900.0, 91_000.0),
    ]);
    let config = RunConfig::builder()
        .take_profit_pct(Some(0.015))
        .build()
        .unwrap();

    let result = run(&bars, &config);
    assert_eq!(result.ledger.len(), 1);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.entry_bar, 1);
    assert_eq!(trade.entry_price, 89_596.40);
    assert_eq!(trade.exit_bar, 2);
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert!((trade.exit_price - 90_940.35).abs() < 0.01);
    assert!(trade.pnl > 0.0);
}

#[test]
fn sizing_consumes_allocation_including_fee() {
    let bars = series(vec![
        long_entry(flat(0, 94_000.0)),
        bar(1, 94_970.52, 95_500.0, 94_500.0, 95_000.0),
    ]);
    let config = RunConfig::builder()
        .initial_capital(10_000.0)
        .taker_fee(0.0004)
        .build()
        .unwrap();

    let result = run(&bars, &config);
    let open = result.ledger.open_trade().unwrap();
    let expected_size = 10_000.0 / (94_970.52 * (1.0 + 0.0004));
    assert!((open.size - expected_size).abs() < 1e-12);
    assert!((open.entry_fee - expected_size * 94_970.52 * 0.0004).abs() < 1e-8);

    // Full allocation: nothing left in cash after the entry.
    let cash_after_entry = result.equity.points()[1].cash;
    let expected_cash = 10_000.0 - expected_size * 94_970.52 - expected_size * 94_970.52 * 0.0004;
    assert!((cash_after_entry - expected_cash).abs() < 1e-8);
    assert!(cash_after_entry.abs() < 1e-8);
}

#[test]
fn empty_and_single_bar_series_produce_no_trades() {
    let config = RunConfig::default();

    let empty = run(&BarSeries::empty(), &config);
    assert!(empty.ledger.is_empty());
    assert_eq!(empty.equity.len(), 1);
    assert_eq!(empty.final_equity(), config.initial_capital());

    let one = run(&series(vec![long_entry(flat(0, 100.0))]), &config);
    assert!(one.ledger.is_empty());
    assert_eq!(one.equity.len(), 1);
    assert_eq!(one.final_cash(), config.initial_capital());
}

// ── Exits ────────────────────────────────────────────────────────────

#[test]
fn stop_and_target_on_same_bar_follow_intrabar_policy() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 100.5, 99.5, 100.0),
        bar(2, 100.0, 106.0, 97.0, 101.0),
    ]);
    let base = frictionless().stop_loss_pct(Some(0.02)).take_profit_pct(Some(0.05));

    let pessimistic = run(&bars, &base.clone().build().unwrap());
    let trade = &pessimistic.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.exit_price - 98.0).abs() < 1e-9);

    let optimistic = run(
        &bars,
        &base
            .intrabar_policy(IntrabarPolicy::FavorTakeProfit)
            .build()
            .unwrap(),
    );
    let trade = &optimistic.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
    assert!((trade.exit_price - 105.0).abs() < 1e-9);
}

#[test]
fn stop_can_trigger_on_entry_bar() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 100.5, 96.0, 97.0),
    ]);
    let config = frictionless().stop_loss_pct(Some(0.03)).build().unwrap();

    let result = run(&bars, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.entry_bar, 1);
    assert_eq!(trade.exit_bar, 1);
    assert_eq!(trade.bars_held, 0);
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.pnl + 30.0).abs() < 1e-9);
}

#[test]
fn max_bars_closes_at_close() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        flat(1, 100.0),
        flat(2, 101.0),
        flat(3, 102.0),
        flat(4, 103.0),
    ]);
    let config = frictionless().max_bars_in_trade(Some(2)).build().unwrap();

    let result = run(&bars, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::MaxBarsExceeded);
    assert_eq!(trade.exit_bar, 3);
    assert_eq!(trade.bars_held, 2);
    assert_eq!(trade.exit_price, 102.0);
}

#[test]
fn short_trade_pays_slippage_on_both_sides() {
    let mut exit_bar = flat(2, 90.0);
    exit_bar.short_exit = true;
    let bars = series(vec![short_entry(flat(0, 100.0)), flat(1, 100.0), exit_bar]);
    let config = frictionless()
        .trading_mode(TradingMode::ShortOnly)
        .slippage(0.001)
        .build()
        .unwrap();

    let result = run(&bars, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.side, Side::Short);
    assert!((trade.entry_price - 99.9).abs() < 1e-9);
    assert!((trade.exit_price - 90.09).abs() < 1e-9);
    let expected = (99.9 - 90.09) * trade.size;
    assert!((trade.pnl - expected).abs() < 1e-9);
    assert!((trade.pnl - trade.recompute_pnl()).abs() < 1e-12);
}

#[test]
fn end_of_data_trade_leaves_cash_untouched() {
    let bars = series(vec![long_entry(flat(0, 100.0)), flat(1, 100.0), flat(2, 110.0)]);
    let config = frictionless().build().unwrap();

    let result = run(&bars, &config);
    assert!(result.ledger.trades().is_empty());
    let open = result.ledger.open_trade().unwrap();
    assert_eq!(open.exit_reason, ExitReason::EndOfData);
    assert!(open.is_open_at_end());
    assert_eq!(open.exit_bar, 2);
    assert!((open.pnl - 100.0).abs() < 1e-9);
    assert!(result.final_cash().abs() < 1e-9);
    assert!((result.final_equity() - 1_100.0).abs() < 1e-9);
}

// ── Entries ──────────────────────────────────────────────────────────

#[test]
fn signal_on_last_bar_is_dropped() {
    let bars = series(vec![flat(0, 100.0), long_entry(flat(1, 100.0))]);
    let result = run(&bars, &RunConfig::default());
    assert!(result.ledger.is_empty());
    assert_eq!(result.final_cash(), RunConfig::default().initial_capital());
}

#[test]
fn trading_mode_filters_directions() {
    let bars = series(vec![short_entry(flat(0, 100.0)), flat(1, 100.0), flat(2, 100.0)]);
    let long_only = run(&bars, &frictionless().build().unwrap());
    assert!(long_only.ledger.is_empty());

    let both = run(&bars, &frictionless().trading_mode(TradingMode::Both).build().unwrap());
    assert_eq!(both.ledger.open_trade().map(|t| t.side), Some(Side::Short));
}

#[test]
fn ambiguous_entry_is_ignored() {
    let bars = series(vec![
        short_entry(long_entry(flat(0, 100.0))),
        flat(1, 100.0),
        flat(2, 100.0),
    ]);
    let result = run(&bars, &frictionless().trading_mode(TradingMode::Both).build().unwrap());
    assert!(result.ledger.is_empty());
}

fn reversal_bars() -> BarSeries {
    series(vec![
        long_entry(flat(0, 100.0)),
        flat(1, 100.0),
        short_entry(long_exit(flat(2, 104.0))),
        flat(3, 103.0),
        flat(4, 101.0),
    ])
}

#[test]
fn skip_same_bar_defers_reversal_to_next_open() {
    let config = frictionless().trading_mode(TradingMode::Both).build().unwrap();
    let result = run(&reversal_bars(), &config);

    let closed = &result.ledger.trades()[0];
    assert_eq!(closed.exit_bar, 2);
    assert_eq!(closed.exit_reason, ExitReason::SignalClose);

    let reversal = result.ledger.open_trade().unwrap();
    assert_eq!(reversal.side, Side::Short);
    assert_eq!(reversal.entry_bar, 3);
    assert_eq!(reversal.entry_price, 103.0);
}

#[test]
fn allow_same_bar_reverses_at_close() {
    let config = frictionless()
        .trading_mode(TradingMode::Both)
        .reversal_policy(ReversalPolicy::AllowSameBar)
        .build()
        .unwrap();
    let result = run(&reversal_bars(), &config);

    let reversal = result.ledger.open_trade().unwrap();
    assert_eq!(reversal.side, Side::Short);
    assert_eq!(reversal.entry_bar, 2);
    assert_eq!(reversal.entry_price, 104.0);
    // Freed cash was fully reallocated.
    assert!(result.equity.points()[2].cash.abs() < 1e-9);
}

#[test]
fn allow_same_bar_leaves_flat_entries_at_next_open() {
    let config = frictionless()
        .trading_mode(TradingMode::Both)
        .reversal_policy(ReversalPolicy::AllowSameBar)
        .build()
        .unwrap();
    let bars = series(vec![long_entry(flat(0, 100.0)), flat(1, 101.0), flat(2, 101.0)]);

    let result = run(&bars, &config);
    let open = result.ledger.open_trade().unwrap();
    assert_eq!(open.side, Side::Long);
    assert_eq!(open.entry_bar, 1);
    assert_eq!(open.entry_price, 101.0);
}

#[test]
fn opposite_entry_closes_when_enabled() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        flat(1, 100.0),
        short_entry(flat(2, 102.0)),
        flat(3, 102.0),
    ]);

    let ignored = run(&bars, &frictionless().build().unwrap());
    assert!(ignored.ledger.trades().is_empty());

    let closing = run(&bars, &frictionless().close_on_opposite_signal(true).build().unwrap());
    let trade = &closing.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::SignalClose);
    assert_eq!(trade.exit_bar, 2);
}

// ── Accounting ───────────────────────────────────────────────────────

#[test]
fn excursions_bracket_realized_pnl() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 108.0, 95.0, 103.0),
        long_exit(bar(2, 103.0, 104.0, 101.0, 102.0)),
    ]);
    let result = run(&bars, &frictionless().build().unwrap());
    let trade = &result.ledger.trades()[0];
    assert!((trade.mae + 50.0).abs() < 1e-9);
    assert!((trade.mfe - 80.0).abs() < 1e-9);
    assert!(trade.mae <= trade.pnl && trade.pnl <= trade.mfe);

    // Exit bar excursion is bounded by where the position left the market.
    let stopped = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 108.0, 95.0, 103.0),
        bar(2, 103.0, 104.0, 80.0, 82.0),
    ]);
    let config = frictionless().stop_loss_pct(Some(0.1)).build().unwrap();
    let result = run(&stopped, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.mae - trade.pnl).abs() < 1e-9);
    assert!((trade.mfe - 80.0).abs() < 1e-9);
}

#[test]
fn stop_exit_caps_adverse_excursion_at_stop() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 100.5, 99.5, 100.0),
        bar(2, 99.0, 99.0, 90.0, 92.0),
    ]);
    let config = frictionless().stop_loss_pct(Some(0.02)).build().unwrap();

    let result = run(&bars, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.exit_price - 98.0).abs() < 1e-9);
    let pnl_at_stop = -20.0;
    assert!((trade.pnl - pnl_at_stop).abs() < 1e-9);
    assert!(trade.mae >= pnl_at_stop - 1e-9);
    assert!((trade.mae - pnl_at_stop).abs() < 1e-9);
    assert!((trade.mfe - 5.0).abs() < 1e-9);
}

#[test]
fn conflict_bar_excursions_end_at_both_levels() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        bar(1, 100.0, 100.5, 99.5, 100.0),
        bar(2, 100.0, 120.0, 97.0, 101.0),
    ]);
    let base = frictionless().stop_loss_pct(Some(0.02)).take_profit_pct(Some(0.05));

    for policy in [IntrabarPolicy::FavorStopLoss, IntrabarPolicy::FavorTakeProfit] {
        let config = base.clone().intrabar_policy(policy).build().unwrap();
        let result = run(&bars, &config);
        let trade = &result.ledger.trades()[0];
        // Nothing beyond the 98 stop or the 105 target is ever seen.
        assert!((trade.mae + 20.0).abs() < 1e-9, "{policy:?}: mae {}", trade.mae);
        assert!((trade.mfe - 50.0).abs() < 1e-9, "{policy:?}: mfe {}", trade.mfe);
        assert!(trade.mae <= trade.pnl && trade.pnl <= trade.mfe);
    }
}

#[test]
fn short_stop_caps_adverse_excursion() {
    let bars = series(vec![
        short_entry(flat(0, 100.0)),
        bar(1, 100.0, 100.5, 99.5, 100.0),
        bar(2, 101.0, 112.0, 100.5, 110.0),
    ]);
    let config = frictionless().stop_loss_pct(Some(0.03)).build().unwrap();

    let result = run(&bars, &config);
    let trade = &result.ledger.trades()[0];
    assert_eq!(trade.side, Side::Short);
    assert_eq!(trade.exit_reason, ExitReason::StopLoss);
    assert!((trade.mae + 30.0).abs() < 1e-9);
    assert!((trade.mae - trade.pnl).abs() < 1e-9);
}

#[test]
fn closed_ledger_conserves_cash() {
    let bars = series(vec![
        long_entry(flat(0, 100.0)),
        flat(1, 100.0),
        long_exit(flat(2, 105.0)),
        long_entry(flat(3, 104.0)),
        flat(4, 104.0),
        long_exit(flat(5, 99.0)),
        flat(6, 99.0),
    ]);
    let config = RunConfig::builder()
        .taker_fee(0.001)
        .slippage(0.0005)
        .leverage(3.0)
        .position_size_pct(0.5)
        .build()
        .unwrap();

    let result = run(&bars, &config);
    assert_eq!(result.ledger.len(), 2);
    let expected =
        config.initial_capital() + result.ledger.total_pnl() - result.ledger.entry_fees();
    assert!((result.final_cash() - expected).abs() < 1e-6);
    assert_eq!(result.final_cash(), result.final_equity());
}
