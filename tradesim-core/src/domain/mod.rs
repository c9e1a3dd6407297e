//! Domain types for the execution simulator

pub mod bar;
pub mod equity;
pub mod ledger;
pub mod position;
pub mod trade;

pub use bar::{Bar, BarError, BarSeries, SignalFlags};
pub use equity::{EquityPoint, EquitySeries};
pub use ledger::{LedgerError, TradeLedger};
pub use position::{Position, Side};
pub use trade::{ExitReason, Trade};
