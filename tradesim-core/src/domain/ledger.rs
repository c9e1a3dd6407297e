//! Trade ledger: append-only, ordered record of closed trades.

use super::trade::{ExitReason, Trade};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum LedgerError {
    #[error("trade enters at bar {entry_bar} before the previous trade exited at bar {previous_exit}")]
    Overlap {
        previous_exit: usize,
        entry_bar: usize,
    },
    #[error("trade exits at bar {exit_bar} before it entered at bar {entry_bar}")]
    ExitBeforeEntry { entry_bar: usize, exit_bar: usize },
    #[error("end-of-data trades belong in the open slot, not the closed list")]
    EndOfDataInClosed,
    #[error("the open slot only accepts end-of-data trades, got {0}")]
    NotEndOfData(ExitReason),
    #[error("ledger already has an open end-of-data trade")]
    AlreadyOpen,
}

/// Ordered closed trades plus at most one end-of-data pseudo-trade.
///
/// Invariants:
/// - closed trades are ordered by entry bar and never overlap
///   (`next.entry_bar >= prev.exit_bar`; a reversal may reuse the exit bar)
/// - the open trade, if any, starts at or after the last closed exit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TradeLedger {
    trades: Vec<Trade>,
    open_trade: Option<Trade>,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a closed trade, enforcing the ordering invariants.
    pub fn push(&mut self, trade: Trade) -> Result<(), LedgerError> {
        if trade.exit_reason == ExitReason::EndOfData {
            return Err(LedgerError::EndOfDataInClosed);
        }
        if self.open_trade.is_some() {
            return Err(LedgerError::AlreadyOpen);
        }
        self.check_order(&trade)?;
        self.trades.push(trade);
        Ok(())
    }

    /// Attach the pseudo-trade for a position left open when data ran out.
    pub fn set_open_trade(&mut self, trade: Trade) -> Result<(), LedgerError> {
        if trade.exit_reason != ExitReason::EndOfData {
            return Err(LedgerError::NotEndOfData(trade.exit_reason));
        }
        if self.open_trade.is_some() {
            return Err(LedgerError::AlreadyOpen);
        }
        self.check_order(&trade)?;
        self.open_trade = Some(trade);
        Ok(())
    }

    /// Engine-side append. Engines produce ordered trades by construction.
    pub(crate) fn record(&mut self, trade: Trade) {
        debug_assert!(
            self.check_order(&trade).is_ok(),
            "engine produced an out-of-order trade: {trade:?}"
        );
        if trade.exit_reason == ExitReason::EndOfData {
            self.open_trade = Some(trade);
        } else {
            self.trades.push(trade);
        }
    }

    fn check_order(&self, trade: &Trade) -> Result<(), LedgerError> {
        if trade.exit_bar < trade.entry_bar {
            return Err(LedgerError::ExitBeforeEntry {
                entry_bar: trade.entry_bar,
                exit_bar: trade.exit_bar,
            });
        }
        if let Some(prev) = self.trades.last() {
            if trade.entry_bar < prev.exit_bar {
                return Err(LedgerError::Overlap {
                    previous_exit: prev.exit_bar,
                    entry_bar: trade.entry_bar,
                });
            }
        }
        Ok(())
    }

    /// Closed trades, in order.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn open_trade(&self) -> Option<&Trade> {
        self.open_trade.as_ref()
    }

    /// Closed trades followed by the open pseudo-trade, if any.
    pub fn all_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trades.iter().chain(self.open_trade.iter())
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty() && self.open_trade.is_none()
    }

    /// Sum of realized PnL over closed trades.
    pub fn total_pnl(&self) -> f64 {
        self.trades.iter().map(|t| t.pnl).sum()
    }

    /// Sum of entry and exit fees over closed trades.
    pub fn total_fees(&self) -> f64 {
        self.trades.iter().map(|t| t.fees_paid).sum()
    }

    /// Entry fees over closed trades (the fees not already inside `pnl`).
    pub fn entry_fees(&self) -> f64 {
        self.trades.iter().map(|t| t.entry_fee).sum()
    }

    /// BLAKE3 hash of the canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        crate::fingerprint::ledger_hash(self)
    }
}
