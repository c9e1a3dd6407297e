use serde::{Deserialize, Serialize};

/// Cash and mark-to-market equity at one bar's close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub bar_index: usize,
    pub cash: f64,
    pub equity: f64,
}

/// One [`EquityPoint`] per bar.
///
/// An empty bar series still yields a single seed point holding the
/// initial capital, so `final_equity()` is always defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquitySeries {
    points: Vec<EquityPoint>,
}

impl EquitySeries {
    pub(crate) fn from_points(mut points: Vec<EquityPoint>, initial_capital: f64) -> Self {
        if points.is_empty() {
            points.push(EquityPoint {
                bar_index: 0,
                cash: initial_capital,
                equity: initial_capital,
            });
        }
        Self { points }
    }

    pub fn points(&self) -> &[EquityPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_equity(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.equity)
    }

    pub fn final_cash(&self) -> f64 {
        self.points.last().map_or(0.0, |p| p.cash)
    }

    /// Equity values only, in bar order.
    pub fn equity_curve(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.equity).collect()
    }
}
