//! Accounting kernel: the pure arithmetic every engine shares.
//!
//! Engines differ in how they hold state and walk the bars; the arithmetic
//! below is the single source of truth for prices, sizing, PnL and
//! excursions. Each expression is written once so that every engine
//! evaluates it in the same order and rounds identically.

use crate::config::{IntrabarPolicy, RunConfig, TradingMode};
use crate::domain::{ExitReason, Side, SignalFlags};

/// Slippage is directional: entries pay more, exits receive less.
pub fn entry_fill_price(raw: f64, side: Side, slippage: f64) -> f64 {
    match side {
        Side::Long => raw * (1.0 + slippage),
        Side::Short => raw * (1.0 - slippage),
    }
}

pub fn exit_fill_price(raw: f64, side: Side, slippage: f64) -> f64 {
    match side {
        Side::Long => raw * (1.0 - slippage),
        Side::Short => raw * (1.0 + slippage),
    }
}

/// Directional PnL before fees.
pub fn gross_pnl(side: Side, entry_price: f64, price: f64, size: f64, leverage: f64) -> f64 {
    match side {
        Side::Long => (price - entry_price) * size * leverage,
        Side::Short => (entry_price - price) * size * leverage,
    }
}

pub fn realized_pnl(
    side: Side,
    entry_price: f64,
    exit_price: f64,
    size: f64,
    leverage: f64,
    exit_fee: f64,
) -> f64 {
    gross_pnl(side, entry_price, exit_price, size, leverage) - exit_fee
}

/// The part of a bar's range an open position is exposed to.
///
/// A stop or target touched inside the bar closes the position there, so
/// the range is cut at every touched level (clamped into the bar, like the
/// fill). Untouched levels leave the range as is. Returns `(high, low)`.
pub fn exposed_range(
    side: Side,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    high: f64,
    low: f64,
) -> (f64, f64) {
    let (upper, lower) = match side {
        Side::Long => (take_profit, stop_loss),
        Side::Short => (stop_loss, take_profit),
    };
    let exposed_high = upper.map_or(high, |level| clamp_to_range(level, low, high));
    let exposed_low = lower.map_or(low, |level| clamp_to_range(level, low, high));
    (exposed_high, exposed_low)
}

/// Adverse and favorable unrealized PnL at the extremes of one bar.
///
/// Callers pass the range from [`exposed_range`].
pub fn bar_excursion(
    side: Side,
    entry_price: f64,
    size: f64,
    leverage: f64,
    high: f64,
    low: f64,
) -> (f64, f64) {
    match side {
        Side::Long => (
            gross_pnl(side, entry_price, low, size, leverage),
            gross_pnl(side, entry_price, high, size, leverage),
        ),
        Side::Short => (
            gross_pnl(side, entry_price, high, size, leverage),
            gross_pnl(side, entry_price, low, size, leverage),
        ),
    }
}

/// Everything decided at the moment a position opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntryFill {
    pub side: Side,
    pub price: f64,
    pub size: f64,
    pub margin: f64,
    pub entry_fee: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

impl EntryFill {
    /// Cash consumed by the entry.
    pub fn cost(&self) -> f64 {
        self.margin + self.entry_fee
    }
}

/// Size an entry at `raw_price` with the cash available.
///
/// `None` when the allocation or the resulting size is not positive.
pub fn plan_entry(side: Side, raw_price: f64, cash: f64, config: &RunConfig) -> Option<EntryFill> {
    let price = entry_fill_price(raw_price, side, config.slippage());
    let allocated = cash * config.position_size_pct();
    if !(allocated > 0.0 && price > 0.0) {
        return None;
    }
    let size = allocated / (price * (1.0 + config.taker_fee()));
    if !(size > 0.0 && size.is_finite()) {
        return None;
    }
    let margin = size * price;
    let entry_fee = size * price * config.taker_fee();
    let (stop_loss, take_profit) =
        protective_levels(side, price, config.stop_loss_pct(), config.take_profit_pct());
    Some(EntryFill {
        side,
        price,
        size,
        margin,
        entry_fee,
        stop_loss,
        take_profit,
    })
}

/// Stop-loss and take-profit prices around an entry fill.
pub fn protective_levels(
    side: Side,
    entry_price: f64,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    match side {
        Side::Long => (
            stop_loss_pct.map(|sl| entry_price * (1.0 - sl)),
            take_profit_pct.map(|tp| entry_price * (1.0 + tp)),
        ),
        Side::Short => (
            stop_loss_pct.map(|sl| entry_price * (1.0 + sl)),
            take_profit_pct.map(|tp| entry_price * (1.0 - tp)),
        ),
    }
}

/// Everything decided at the moment a position closes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitFill {
    pub price: f64,
    pub fee: f64,
    pub pnl: f64,
}

pub fn plan_exit(
    side: Side,
    raw_price: f64,
    entry_price: f64,
    size: f64,
    config: &RunConfig,
) -> ExitFill {
    let price = exit_fill_price(raw_price, side, config.slippage());
    let fee = size * price * config.taker_fee();
    let pnl = realized_pnl(side, entry_price, price, size, config.leverage(), fee);
    ExitFill { price, fee, pnl }
}

/// Check stop-loss and take-profit against one bar's range.
///
/// When both levels are inside `[low, high]` the intrabar policy decides.
/// Returns the exit reason and the raw exit price: the touched level
/// clamped into the bar's range (a gap through the level fills at the
/// nearest traded price).
pub fn price_exit(
    side: Side,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
    high: f64,
    low: f64,
    policy: IntrabarPolicy,
) -> Option<(ExitReason, f64)> {
    let stop_hit = stop_loss.filter(|&level| match side {
        Side::Long => low <= level,
        Side::Short => high >= level,
    });
    let target_hit = take_profit.filter(|&level| match side {
        Side::Long => high >= level,
        Side::Short => low <= level,
    });

    let (reason, level) = match (stop_hit, target_hit) {
        (Some(stop), Some(target)) => match policy {
            IntrabarPolicy::FavorStopLoss => (ExitReason::StopLoss, stop),
            IntrabarPolicy::FavorTakeProfit => (ExitReason::TakeProfit, target),
        },
        (Some(stop), None) => (ExitReason::StopLoss, stop),
        (None, Some(target)) => (ExitReason::TakeProfit, target),
        (None, None) => return None,
    };
    Some((reason, clamp_to_range(level, low, high)))
}

fn clamp_to_range(price: f64, low: f64, high: f64) -> f64 {
    price.max(low).min(high)
}

/// Close-condition flags for an open position, evaluated at the bar's close.
pub fn signal_close(side: Side, flags: SignalFlags, close_on_opposite_signal: bool) -> bool {
    match side {
        Side::Long => flags.long_exit || (close_on_opposite_signal && flags.short_entry),
        Side::Short => flags.short_exit || (close_on_opposite_signal && flags.long_entry),
    }
}

/// The entry direction a bar asks for under the trading mode.
///
/// Both directions requested at once is ambiguous and yields no entry.
pub fn entry_side(flags: SignalFlags, mode: TradingMode) -> Option<Side> {
    let long = flags.long_entry && mode.allows(Side::Long);
    let short = flags.short_entry && mode.allows(Side::Short);
    match (long, short) {
        (true, false) => Some(Side::Long),
        (false, true) => Some(Side::Short),
        _ => None,
    }
}

/// Time stop: true once the position has been held `max_bars` bars.
pub fn max_bars_reached(entry_bar: usize, bar_index: usize, max_bars: Option<usize>) -> bool {
    max_bars.is_some_and(|max| bar_index - entry_bar >= max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flags(long_entry: bool, short_entry: bool, long_exit: bool, short_exit: bool) -> SignalFlags {
        SignalFlags {
            long_entry,
            short_entry,
            long_exit,
            short_exit,
        }
    }

    #[test]
    fn slippage_is_adverse() {
        assert_eq!(entry_fill_price(100.0, Side::Long, 0.01), 101.0);
        assert_eq!(entry_fill_price(100.0, Side::Short, 0.01), 99.0);
        assert_eq!(exit_fill_price(100.0, Side::Long, 0.01), 99.0);
        assert_eq!(exit_fill_price(100.0, Side::Short, 0.01), 101.0);
    }

    #[test]
    fn sizing_matches_fee_inclusive_formula() {
        let config = RunConfig::builder()
            .initial_capital(10_000.0)
            .taker_fee(0.0004)
            .build()
            .unwrap();
        let fill = plan_entry(Side::Long, 94_970.52, 10_000.0, &config).unwrap();

        let expected_size = 10_000.0 / (94_970.52 * 1.0004);
        assert!((fill.size - expected_size).abs() < 1e-15);
        let expected_cash = 10_000.0 - expected_size * 94_970.52 - expected_size * 94_970.52 * 0.0004;
        assert!(((10_000.0 - fill.cost()) - expected_cash).abs() < 1e-8);
    }

    #[test]
    fn no_entry_without_cash() {
        let config = RunConfig::default();
        assert!(plan_entry(Side::Long, 100.0, 0.0, &config).is_none());
        assert!(plan_entry(Side::Long, 100.0, -5.0, &config).is_none());
    }

    #[test]
    fn protective_levels_mirror_for_shorts() {
        let (sl, tp) = protective_levels(Side::Long, 100.0, Some(0.02), Some(0.05));
        assert!((sl.unwrap() - 98.0).abs() < 1e-12);
        assert!((tp.unwrap() - 105.0).abs() < 1e-12);

        let (sl, tp) = protective_levels(Side::Short, 100.0, Some(0.02), Some(0.05));
        assert!((sl.unwrap() - 102.0).abs() < 1e-12);
        assert!((tp.unwrap() - 95.0).abs() < 1e-12);
    }

    #[test]
    fn conflict_resolved_by_policy() {
        let hit = |policy| price_exit(Side::Long, Some(95.0), Some(110.0), 112.0, 94.0, policy);
        assert_eq!(hit(IntrabarPolicy::FavorStopLoss), Some((ExitReason::StopLoss, 95.0)));
        assert_eq!(
            hit(IntrabarPolicy::FavorTakeProfit),
            Some((ExitReason::TakeProfit, 110.0))
        );
    }

    #[test]
    fn single_touch_ignores_policy() {
        let exit = price_exit(
            Side::Short,
            Some(105.0),
            Some(90.0),
            101.0,
            89.0,
            IntrabarPolicy::FavorStopLoss,
        );
        assert_eq!(exit, Some((ExitReason::TakeProfit, 90.0)));
    }

    #[test]
    fn gap_through_level_clamps_into_range() {
        // Long stop at 95, bar gapped down to 88..92: fills at the high.
        let exit = price_exit(Side::Long, Some(95.0), None, 92.0, 88.0, IntrabarPolicy::FavorStopLoss);
        assert_eq!(exit, Some((ExitReason::StopLoss, 92.0)));
    }

    #[test]
    fn exposed_range_stops_at_touched_levels() {
        // Long 98 stop / 105 target, bar swept both: exposure ends at the levels.
        assert_eq!(
            exposed_range(Side::Long, Some(98.0), Some(105.0), 120.0, 97.0),
            (105.0, 98.0)
        );
        // Short 102 stop / 95 target, only the stop touched.
        assert_eq!(
            exposed_range(Side::Short, Some(102.0), Some(95.0), 104.0, 99.0),
            (102.0, 99.0)
        );
        // Gap down through a long stop: the whole bar sits at the fill.
        assert_eq!(
            exposed_range(Side::Long, Some(95.0), None, 92.0, 88.0),
            (92.0, 92.0)
        );
    }

    #[test]
    fn exposed_range_is_the_bar_when_nothing_is_touched() {
        assert_eq!(
            exposed_range(Side::Long, Some(95.0), Some(110.0), 104.0, 97.0),
            (104.0, 97.0)
        );
        assert_eq!(exposed_range(Side::Short, None, None, 104.0, 97.0), (104.0, 97.0));
    }

    #[test]
    fn untouched_levels_do_not_exit() {
        let exit = price_exit(
            Side::Long,
            Some(95.0),
            Some(110.0),
            105.0,
            96.0,
            IntrabarPolicy::FavorStopLoss,
        );
        assert_eq!(exit, None);
    }

    #[test]
    fn short_pnl_and_fee() {
        let config = RunConfig::builder().taker_fee(0.001).leverage(2.0).build().unwrap();
        let exit = plan_exit(Side::Short, 90.0, 100.0, 10.0, &config);
        assert_eq!(exit.price, 90.0);
        assert!((exit.fee - 0.9).abs() < 1e-12);
        assert!((exit.pnl - (10.0 * 10.0 * 2.0 - 0.9)).abs() < 1e-9);
    }

    #[test]
    fn ambiguous_entry_flags_yield_nothing() {
        assert_eq!(entry_side(flags(true, true, false, false), TradingMode::Both), None);
        assert_eq!(
            entry_side(flags(true, true, false, false), TradingMode::LongOnly),
            Some(Side::Long)
        );
        assert_eq!(entry_side(flags(true, false, false, false), TradingMode::ShortOnly), None);
    }

    #[test]
    fn opposite_entry_closes_only_when_enabled() {
        let f = flags(false, true, false, false);
        assert!(!signal_close(Side::Long, f, false));
        assert!(signal_close(Side::Long, f, true));
        assert!(signal_close(Side::Short, flags(false, false, false, true), false));
    }

    #[test]
    fn time_stop() {
        assert!(!max_bars_reached(3, 5, Some(3)));
        assert!(max_bars_reached(3, 6, Some(3)));
        assert!(!max_bars_reached(3, 100, None));
    }
}
