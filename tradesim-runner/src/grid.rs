//! Parameter grids over [`RunConfig`].
//!
//! A grid lists candidate values per parameter and expands to their
//! cartesian product, applied on top of a base builder.

use serde::{Deserialize, Serialize};
use tradesim_core::config::{
    ConfigError, IntrabarPolicy, ReversalPolicy, RunConfig, RunConfigBuilder, TradingMode,
};

/// Candidate values per parameter. An empty list keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ParamGrid {
    pub leverage: Vec<f64>,
    pub taker_fee: Vec<f64>,
    pub slippage: Vec<f64>,
    pub position_size_pct: Vec<f64>,
    pub stop_loss_pct: Vec<Option<f64>>,
    pub take_profit_pct: Vec<Option<f64>>,
    pub trading_mode: Vec<TradingMode>,
    pub intrabar_policy: Vec<IntrabarPolicy>,
    pub reversal_policy: Vec<ReversalPolicy>,
    pub max_bars_in_trade: Vec<Option<usize>>,
    pub close_on_opposite_signal: Vec<bool>,
}

impl ParamGrid {
    /// The grid the parity battery runs by default: every policy branch,
    /// with and without protective levels, friction and leverage.
    ///
    /// 2 × 2 × 3 × 3 × 3 × 2 × 2 × 2 = 864 combinations.
    pub fn parity_default() -> Self {
        Self {
            leverage: vec![1.0, 5.0],
            taker_fee: vec![0.0, 0.0004],
            slippage: vec![0.0005],
            position_size_pct: vec![1.0],
            stop_loss_pct: vec![None, Some(0.01), Some(0.03)],
            take_profit_pct: vec![None, Some(0.015), Some(0.05)],
            trading_mode: vec![TradingMode::LongOnly, TradingMode::ShortOnly, TradingMode::Both],
            intrabar_policy: vec![IntrabarPolicy::FavorStopLoss, IntrabarPolicy::FavorTakeProfit],
            reversal_policy: vec![ReversalPolicy::SkipSameBar, ReversalPolicy::AllowSameBar],
            max_bars_in_trade: vec![None, Some(8)],
            close_on_opposite_signal: vec![false],
        }
    }

    /// A small grid for quick checks: 3 × 3 × 2 × 3 = 54 combinations.
    pub fn compact() -> Self {
        Self {
            stop_loss_pct: vec![None, Some(0.01), Some(0.03)],
            take_profit_pct: vec![None, Some(0.015), Some(0.05)],
            reversal_policy: vec![ReversalPolicy::SkipSameBar, ReversalPolicy::AllowSameBar],
            trading_mode: vec![TradingMode::LongOnly, TradingMode::ShortOnly, TradingMode::Both],
            close_on_opposite_signal: vec![true],
            slippage: vec![0.0003],
            ..Self::default()
        }
    }

    /// Number of configurations [`Self::generate_configs`] yields.
    pub fn size(&self) -> usize {
        fn n<T>(values: &[T]) -> usize {
            values.len().max(1)
        }
        n(&self.leverage)
            * n(&self.taker_fee)
            * n(&self.slippage)
            * n(&self.position_size_pct)
            * n(&self.stop_loss_pct)
            * n(&self.take_profit_pct)
            * n(&self.trading_mode)
            * n(&self.intrabar_policy)
            * n(&self.reversal_policy)
            * n(&self.max_bars_in_trade)
            * n(&self.close_on_opposite_signal)
    }

    /// Expand to validated configs, in a stable order.
    ///
    /// Fails on the first combination that does not validate.
    pub fn generate_configs(&self, base: &RunConfigBuilder) -> Result<Vec<RunConfig>, ConfigError> {
        let mut builders = vec![base.clone()];

        builders = expand(builders, &self.leverage, RunConfigBuilder::leverage);
        builders = expand(builders, &self.taker_fee, RunConfigBuilder::taker_fee);
        builders = expand(builders, &self.slippage, RunConfigBuilder::slippage);
        builders = expand(builders, &self.position_size_pct, RunConfigBuilder::position_size_pct);
        builders = expand(builders, &self.stop_loss_pct, RunConfigBuilder::stop_loss_pct);
        builders = expand(builders, &self.take_profit_pct, RunConfigBuilder::take_profit_pct);
        builders = expand(builders, &self.trading_mode, RunConfigBuilder::trading_mode);
        builders = expand(builders, &self.intrabar_policy, RunConfigBuilder::intrabar_policy);
        builders = expand(builders, &self.reversal_policy, RunConfigBuilder::reversal_policy);
        builders = expand(builders, &self.max_bars_in_trade, RunConfigBuilder::max_bars_in_trade);
        builders = expand(
            builders,
            &self.close_on_opposite_signal,
            RunConfigBuilder::close_on_opposite_signal,
        );

        builders.into_iter().map(RunConfigBuilder::build).collect()
    }
}

fn expand<T: Copy>(
    builders: Vec<RunConfigBuilder>,
    values: &[T],
    set: fn(RunConfigBuilder, T) -> RunConfigBuilder,
) -> Vec<RunConfigBuilder> {
    if values.is_empty() {
        return builders;
    }
    builders
        .into_iter()
        .flat_map(|b| values.iter().map(move |&v| set(b.clone(), v)))
        .collect()
}
