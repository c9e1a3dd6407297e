//! Run configuration files.
//!
//! A config file is TOML with the field names of [`RunConfig`]; every field
//! is optional and falls back to the builder default. Unknown keys are
//! rejected so typos do not silently run with defaults.
//!
//! ```toml
//! initial_capital = 10000.0
//! leverage = 2.0
//! taker_fee = 0.0004
//! stop_loss_pct = 0.02
//! take_profit_pct = 0.015
//! trading_mode = "both"
//! intrabar_policy = "favor_stop_loss"
//! reversal_policy = "allow_same_bar"
//! ```
//!
//! Sweep grids use the same format with a list per field; see
//! [`ParamGrid`].

use std::path::{Path, PathBuf};
use thiserror::Error;
use tradesim_core::config::{ConfigError, RunConfig, RunConfigBuilder};

use crate::grid::ParamGrid;

#[derive(Debug, Error)]
pub enum ConfigFileError {
    #[error("cannot read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] ConfigError),
}

/// Parse and validate a TOML run config.
pub fn parse_run_config(text: &str) -> Result<RunConfig, ConfigFileError> {
    let builder: RunConfigBuilder = toml::from_str(text)?;
    Ok(builder.build()?)
}

pub fn load_run_config(path: &Path) -> Result<RunConfig, ConfigFileError> {
    parse_run_config(&read(path)?)
}

/// Load a sweep grid. Values are validated when the grid is expanded.
pub fn load_param_grid(path: &Path) -> Result<ParamGrid, ConfigFileError> {
    Ok(toml::from_str(&read(path)?)?)
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Render a config back to TOML (round-trips through [`parse_run_config`]).
pub fn to_toml(config: &RunConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&config.to_builder())
}
