//! TradeSim Runner: orchestration around the simulator.
//!
//! This crate builds on `tradesim-core` to provide:
//! - CSV bar loading and writing
//! - Run artifacts (summary, trades, equity) on disk
//! - TOML run-config files
//! - Deterministic synthetic bar series
//! - Single runs with summary metrics and fingerprints
//! - Parameter grids and rayon-parallel sweeps
//! - The parity battery over many configs and datasets

pub mod artifacts;
pub mod battery;
pub mod config;
pub mod data_loader;
pub mod grid;
pub mod metrics;
pub mod runner;
pub mod sweep;
pub mod synthetic;

pub use artifacts::{ArtifactPaths, ArtifactWriter};
pub use battery::{BatteryCase, BatteryConfig, BatteryError, BatteryReport, ParityBattery};
pub use config::{load_param_grid, load_run_config, parse_run_config, ConfigFileError};
pub use data_loader::{load_bars_csv, read_bars, write_bars, write_bars_csv, LoadError};
pub use grid::ParamGrid;
pub use metrics::PerformanceMetrics;
pub use runner::{run_files, run_simulation, RunError, RunOutput, RunSummary};
pub use sweep::{ParamSweep, SweepMode, SweepResults};
pub use synthetic::{derive_seed, SyntheticBars};
