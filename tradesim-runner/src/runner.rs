//! Single-run orchestration: load inputs, simulate, summarize.
//!
//! Two entry points:
//! - [`run_files`]: reads a CSV bar file and an optional TOML config. Used by the CLI.
//! - [`run_simulation`]: takes a loaded series and config.

use serde::Serialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;
use tradesim_core::config::RunConfig;
use tradesim_core::domain::BarSeries;
use tradesim_core::engine::{EngineKind, SimulationResult};
use tradesim_core::fingerprint::dataset_hash;

use crate::config::{load_run_config, ConfigFileError};
use crate::data_loader::{load_bars_csv, LoadError};
use crate::metrics::PerformanceMetrics;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigFileError),
    #[error("data error: {0}")]
    Data(#[from] LoadError),
}

/// Identity and headline numbers of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub dataset_hash: String,
    pub ledger_fingerprint: String,
    pub engine: EngineKind,
    pub bar_count: usize,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub final_cash: f64,
    pub total_pnl: f64,
    pub total_fees: f64,
    pub has_open_trade: bool,
    pub metrics: PerformanceMetrics,
}

/// Full output of one run: summary plus the ledger and equity series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutput {
    pub summary: RunSummary,
    pub config: RunConfig,
    pub result: SimulationResult,
}

pub fn run_simulation(bars: &BarSeries, config: &RunConfig, engine: EngineKind) -> RunOutput {
    let result = engine.simulator().simulate(bars, config);
    let summary = summarize(bars, config, engine, &result);
    info!(
        run_id = %summary.run_id,
        engine = %engine,
        bars = summary.bar_count,
        trades = summary.metrics.trade_count,
        final_equity = summary.final_equity,
        "run complete"
    );
    RunOutput {
        summary,
        config: config.clone(),
        result,
    }
}

pub fn summarize(
    bars: &BarSeries,
    config: &RunConfig,
    engine: EngineKind,
    result: &SimulationResult,
) -> RunSummary {
    RunSummary {
        run_id: config.run_id(),
        dataset_hash: dataset_hash(bars),
        ledger_fingerprint: result.ledger.fingerprint(),
        engine,
        bar_count: bars.len(),
        initial_capital: config.initial_capital(),
        final_equity: result.final_equity(),
        final_cash: result.final_cash(),
        total_pnl: result.ledger.total_pnl(),
        total_fees: result.ledger.total_fees(),
        has_open_trade: result.ledger.open_trade().is_some(),
        metrics: PerformanceMetrics::compute(result),
    }
}

/// Load a CSV bar file and an optional TOML config (defaults otherwise), then run.
pub fn run_files(
    bars_path: &Path,
    config_path: Option<&Path>,
    engine: EngineKind,
) -> Result<RunOutput, RunError> {
    let config = match config_path {
        Some(path) => load_run_config(path)?,
        None => RunConfig::default(),
    };
    let bars = load_bars_csv(bars_path)?;
    Ok(run_simulation(&bars, &config, engine))
}
