//! Run configuration: validated, immutable simulation parameters.
//!
//! A [`RunConfig`] can only be obtained through [`RunConfigBuilder::build`]
//! (or deserialization, which goes through the same builder), so every
//! config an engine sees has already passed validation.

use crate::domain::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid configuration. Raised at construction; a simulation never starts
/// with a config that failed these checks.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("initial capital must be finite and positive, got {0}")]
    InvalidCapital(f64),
    #[error("leverage must be finite and >= 1, got {0}")]
    LeverageBelowOne(f64),
    #[error("{name} must be finite and >= 0, got {value}")]
    NegativeFee { name: &'static str, value: f64 },
    #[error("slippage fraction must be below 1, got {0}")]
    SlippageTooLarge(f64),
    #[error("position size fraction must be in (0, 1], got {0}")]
    PositionSizeOutOfRange(f64),
    #[error("stop-loss fraction must be in (0, 1), got {0}")]
    InvalidStopLoss(f64),
    #[error("take-profit fraction must be finite and positive, got {0}")]
    InvalidTakeProfit(f64),
    #[error("max bars in trade must be at least 1")]
    ZeroMaxBars,
}

/// Which directions may be entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingMode {
    #[default]
    LongOnly,
    ShortOnly,
    Both,
}

impl TradingMode {
    pub fn allows(self, side: Side) -> bool {
        match self {
            Self::LongOnly => side == Side::Long,
            Self::ShortOnly => side == Side::Short,
            Self::Both => true,
        }
    }
}

/// Resolution of a bar whose range touches both the stop-loss and the take-profit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    /// Adverse excursion happened first: the stop fills.
    #[default]
    FavorStopLoss,
    /// Favorable excursion happened first: the target fills.
    FavorTakeProfit,
}

/// Handling of an entry signal on the bar a position was closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReversalPolicy {
    /// Defer the entry to the next bar's open.
    #[default]
    SkipSameBar,
    /// Enter at this bar's close with the freed cash.
    AllowSameBar,
}

/// Validated, immutable simulation parameters.
///
/// Fractions are expressed as plain ratios: `taker_fee = 0.0004` is 4 bps,
/// `take_profit_pct = 0.015` is 1.5%.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RunConfigBuilder")]
pub struct RunConfig {
    initial_capital: f64,
    leverage: f64,
    taker_fee: f64,
    slippage: f64,
    position_size_pct: f64,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
    trading_mode: TradingMode,
    intrabar_policy: IntrabarPolicy,
    reversal_policy: ReversalPolicy,
    max_bars_in_trade: Option<usize>,
    close_on_opposite_signal: bool,
}

impl RunConfig {
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    pub fn initial_capital(&self) -> f64 {
        self.initial_capital
    }

    pub fn leverage(&self) -> f64 {
        self.leverage
    }

    pub fn taker_fee(&self) -> f64 {
        self.taker_fee
    }

    pub fn slippage(&self) -> f64 {
        self.slippage
    }

    pub fn position_size_pct(&self) -> f64 {
        self.position_size_pct
    }

    pub fn stop_loss_pct(&self) -> Option<f64> {
        self.stop_loss_pct
    }

    pub fn take_profit_pct(&self) -> Option<f64> {
        self.take_profit_pct
    }

    pub fn trading_mode(&self) -> TradingMode {
        self.trading_mode
    }

    pub fn intrabar_policy(&self) -> IntrabarPolicy {
        self.intrabar_policy
    }

    pub fn reversal_policy(&self) -> ReversalPolicy {
        self.reversal_policy
    }

    pub fn max_bars_in_trade(&self) -> Option<usize> {
        self.max_bars_in_trade
    }

    pub fn close_on_opposite_signal(&self) -> bool {
        self.close_on_opposite_signal
    }

    /// Builder pre-filled with this config's values, for deriving variants.
    pub fn to_builder(&self) -> RunConfigBuilder {
        RunConfigBuilder {
            initial_capital: self.initial_capital,
            leverage: self.leverage,
            taker_fee: self.taker_fee,
            slippage: self.slippage,
            position_size_pct: self.position_size_pct,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            trading_mode: self.trading_mode,
            intrabar_policy: self.intrabar_policy,
            reversal_policy: self.reversal_policy,
            max_bars_in_trade: self.max_bars_in_trade,
            close_on_opposite_signal: self.close_on_opposite_signal,
        }
    }

    /// Deterministic content hash, stable across runs and processes.
    pub fn run_id(&self) -> String {
        crate::fingerprint::config_hash(self)
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfigBuilder::default().freeze()
    }
}

/// Unvalidated parameters. Also the serde shape of a config file: every
/// field is optional and falls back to its default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfigBuilder {
    initial_capital: f64,
    leverage: f64,
    taker_fee: f64,
    slippage: f64,
    position_size_pct: f64,
    stop_loss_pct: Option<f64>,
    take_profit_pct: Option<f64>,
    trading_mode: TradingMode,
    intrabar_policy: IntrabarPolicy,
    reversal_policy: ReversalPolicy,
    max_bars_in_trade: Option<usize>,
    close_on_opposite_signal: bool,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            initial_capital: 10_000.0,
            leverage: 1.0,
            taker_fee: 0.0004,
            slippage: 0.0,
            position_size_pct: 1.0,
            stop_loss_pct: None,
            take_profit_pct: None,
            trading_mode: TradingMode::default(),
            intrabar_policy: IntrabarPolicy::default(),
            reversal_policy: ReversalPolicy::default(),
            max_bars_in_trade: None,
            close_on_opposite_signal: false,
        }
    }
}

impl RunConfigBuilder {
    pub fn initial_capital(mut self, value: f64) -> Self {
        self.initial_capital = value;
        self
    }

    pub fn leverage(mut self, value: f64) -> Self {
        self.leverage = value;
        self
    }

    pub fn taker_fee(mut self, value: f64) -> Self {
        self.taker_fee = value;
        self
    }

    pub fn slippage(mut self, value: f64) -> Self {
        self.slippage = value;
        self
    }

    pub fn position_size_pct(mut self, value: f64) -> Self {
        self.position_size_pct = value;
        self
    }

    pub fn stop_loss_pct(mut self, value: Option<f64>) -> Self {
        self.stop_loss_pct = value;
        self
    }

    pub fn take_profit_pct(mut self, value: Option<f64>) -> Self {
        self.take_profit_pct = value;
        self
    }

    pub fn trading_mode(mut self, value: TradingMode) -> Self {
        self.trading_mode = value;
        self
    }

    pub fn intrabar_policy(mut self, value: IntrabarPolicy) -> Self {
        self.intrabar_policy = value;
        self
    }

    pub fn reversal_policy(mut self, value: ReversalPolicy) -> Self {
        self.reversal_policy = value;
        self
    }

    pub fn max_bars_in_trade(mut self, value: Option<usize>) -> Self {
        self.max_bars_in_trade = value;
        self
    }

    pub fn close_on_opposite_signal(mut self, value: bool) -> Self {
        self.close_on_opposite_signal = value;
        self
    }

    /// Validate and freeze.
    pub fn build(self) -> Result<RunConfig, ConfigError> {
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(ConfigError::InvalidCapital(self.initial_capital));
        }
        if !(self.leverage.is_finite() && self.leverage >= 1.0) {
            return Err(ConfigError::LeverageBelowOne(self.leverage));
        }
        for (name, value) in [("taker fee", self.taker_fee), ("slippage", self.slippage)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::NegativeFee { name, value });
            }
        }
        // Sell-side fills are `price * (1 - slippage)` and must stay positive.
        if self.slippage >= 1.0 {
            return Err(ConfigError::SlippageTooLarge(self.slippage));
        }
        if !(self.position_size_pct > 0.0 && self.position_size_pct <= 1.0) {
            return Err(ConfigError::PositionSizeOutOfRange(self.position_size_pct));
        }
        if let Some(sl) = self.stop_loss_pct {
            if !(sl > 0.0 && sl < 1.0) {
                return Err(ConfigError::InvalidStopLoss(sl));
            }
        }
        if let Some(tp) = self.take_profit_pct {
            if !(tp.is_finite() && tp > 0.0) {
                return Err(ConfigError::InvalidTakeProfit(tp));
            }
        }
        if self.max_bars_in_trade == Some(0) {
            return Err(ConfigError::ZeroMaxBars);
        }

        Ok(self.freeze())
    }

    fn freeze(self) -> RunConfig {
        RunConfig {
            initial_capital: self.initial_capital,
            leverage: self.leverage,
            taker_fee: self.taker_fee,
            slippage: self.slippage,
            position_size_pct: self.position_size_pct,
            stop_loss_pct: self.stop_loss_pct,
            take_profit_pct: self.take_profit_pct,
            trading_mode: self.trading_mode,
            intrabar_policy: self.intrabar_policy,
            reversal_policy: self.reversal_policy,
            max_bars_in_trade: self.max_bars_in_trade,
            close_on_opposite_signal: self.close_on_opposite_signal,
        }
    }
}

impl TryFrom<RunConfigBuilder> for RunConfig {
    type Error = ConfigError;

    fn try_from(builder: RunConfigBuilder) -> Result<Self, Self::Error> {
        builder.build()
    }
}
