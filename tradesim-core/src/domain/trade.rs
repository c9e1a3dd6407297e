//! Trade: a closed (or end-of-data) round trip.

use super::position::Side;
use serde::{Deserialize, Serialize};

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    SignalClose,
    EndOfData,
    MaxBarsExceeded,
}

impl ExitReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TakeProfit => "take_profit",
            Self::StopLoss => "stop_loss",
            Self::SignalClose => "signal_close",
            Self::EndOfData => "end_of_data",
            Self::MaxBarsExceeded => "max_bars_exceeded",
        }
    }
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record created when a position closes.
///
/// `pnl` is the realized PnL net of the exit fee only; the entry fee was
/// charged to cash at entry and is reported in `entry_fee`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub side: Side,

    // ── Entry ──
    pub entry_bar: usize,
    pub entry_price: f64,

    // ── Exit ──
    pub exit_bar: usize,
    pub exit_price: f64,
    pub exit_reason: ExitReason,

    // ── Size ──
    pub size: f64,
    pub leverage: f64,

    // ── PnL ──
    pub entry_fee: f64,
    pub exit_fee: f64,
    pub fees_paid: f64,
    pub pnl: f64,

    // ── Duration ──
    pub bars_held: usize,

    // ── Excursion ──
    /// Maximum adverse excursion (worst unrealized PnL during the trade, <= 0).
    pub mae: f64,
    /// Maximum favorable excursion (best unrealized PnL during the trade, >= 0).
    pub mfe: f64,
}

impl Trade {
    /// Realized PnL after both fees.
    pub fn net_pnl(&self) -> f64 {
        self.pnl - self.entry_fee
    }

    /// Recompute `pnl` from prices, size, leverage and exit fee.
    pub fn recompute_pnl(&self) -> f64 {
        crate::engine::kernel::realized_pnl(
            self.side,
            self.entry_price,
            self.exit_price,
            self.size,
            self.leverage,
            self.exit_fee,
        )
    }

    /// Return on the margin committed at entry.
    pub fn return_pct(&self) -> f64 {
        let margin = self.entry_price * self.size;
        if margin == 0.0 {
            return 0.0;
        }
        self.net_pnl() / margin
    }

    pub fn is_winner(&self) -> bool {
        self.net_pnl() > 0.0
    }

    /// True for the pseudo-trade describing a position still open at the end of data.
    pub fn is_open_at_end(&self) -> bool {
        self.exit_reason == ExitReason::EndOfData
    }
}
