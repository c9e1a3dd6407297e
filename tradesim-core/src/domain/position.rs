use serde::{Deserialize, Serialize};

/// Direction of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Short,
}

/// The single open position held by a simulator.
///
/// Owned exclusively by the engine that opened it. Closing it produces a
/// [`Trade`](super::Trade).
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_bar: usize,
    pub size: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Cash locked at entry: `size * entry_price`.
    pub margin: f64,
    pub entry_fee: f64,
    pub leverage: f64,
    /// Worst unrealized PnL seen so far (<= 0).
    pub mae: f64,
    /// Best unrealized PnL seen so far (>= 0).
    pub mfe: f64,
}

impl Position {
    pub fn unrealized_pnl(&self, mark: f64) -> f64 {
        crate::engine::kernel::gross_pnl(self.side, self.entry_price, mark, self.size, self.leverage)
    }

    /// Margin plus unrealized PnL at `mark`.
    pub fn market_value(&self, mark: f64) -> f64 {
        self.margin + self.unrealized_pnl(mark)
    }

    /// Widen MAE/MFE with the range of one bar the position was exposed to.
    pub fn track_excursion(&mut self, high: f64, low: f64) {
        let (high, low) = crate::engine::kernel::exposed_range(
            self.side,
            self.stop_loss,
            self.take_profit,
            high,
            low,
        );
        let (adverse, favorable) = crate::engine::kernel::bar_excursion(
            self.side,
            self.entry_price,
            self.size,
            self.leverage,
            high,
            low,
        );
        self.mae = self.mae.min(adverse);
        self.mfe = self.mfe.max(favorable);
    }
}
