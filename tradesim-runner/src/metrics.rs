//! Performance metrics: pure functions over an equity curve and closed trades.
//!
//! No dependencies on loading or orchestration. Trades are the ledger's
//! closed trades; the end-of-data pseudo-trade is not a realized result and
//! is left out.

use serde::{Deserialize, Serialize};
use tradesim_core::domain::{ExitReason, Trade};
use tradesim_core::engine::SimulationResult;

/// Aggregate statistics for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub max_drawdown: f64,
    pub trade_count: usize,
    pub win_rate: f64,
    /// `None` when no closed trade lost money.
    pub profit_factor: Option<f64>,
    pub avg_bars_held: f64,
    pub max_consecutive_losses: usize,
    pub stop_loss_exits: usize,
    pub take_profit_exits: usize,
}

impl PerformanceMetrics {
    pub fn compute(result: &SimulationResult) -> Self {
        let equity_curve = result.equity.equity_curve();
        let trades = result.ledger.trades();
        Self {
            total_return: total_return(&equity_curve),
            max_drawdown: max_drawdown(&equity_curve),
            trade_count: trades.len(),
            win_rate: win_rate(trades),
            profit_factor: profit_factor(trades),
            avg_bars_held: avg_bars_held(trades),
            max_consecutive_losses: max_consecutive_losses(trades),
            stop_loss_exits: count_exits(trades, ExitReason::StopLoss),
            take_profit_exits: count_exits(trades, ExitReason::TakeProfit),
        }
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    match (equity_curve.first(), equity_curve.last()) {
        (Some(&initial), Some(&last)) if equity_curve.len() >= 2 && initial > 0.0 => {
            (last - initial) / initial
        }
        _ => 0.0,
    }
}

/// Maximum peak-to-trough decline as a negative fraction (0.0 if none).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;

    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of trades with positive PnL after both fees.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profits / gross losses, net of fees.
///
/// Undefined (`None`) without losing trades, including when there are no
/// trades at all.
pub fn profit_factor(trades: &[Trade]) -> Option<f64> {
    let gross_loss: f64 = trades
        .iter()
        .map(Trade::net_pnl)
        .filter(|p| *p < 0.0)
        .map(f64::abs)
        .sum();
    if gross_loss == 0.0 {
        return None;
    }
    let gross_profit: f64 = trades.iter().map(Trade::net_pnl).filter(|p| *p > 0.0).sum();
    Some(gross_profit / gross_loss)
}

pub fn avg_bars_held(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    trades.iter().map(|t| t.bars_held).sum::<usize>() as f64 / trades.len() as f64
}

/// Longest run of consecutive non-winning trades.
pub fn max_consecutive_losses(trades: &[Trade]) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for trade in trades {
        if trade.is_winner() {
            current = 0;
        } else {
            current += 1;
            longest = longest.max(current);
        }
    }
    longest
}

fn count_exits(trades: &[Trade], reason: ExitReason) -> usize {
    trades.iter().filter(|t| t.exit_reason == reason).count()
}
