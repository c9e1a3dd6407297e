//! Parity battery: the parity verifier over many configs and datasets.
//!
//! Each case is one (dataset, config) pair and runs the full
//! [`ParityVerifier`]. On top of that, every dataset runs all configs
//! through [`BatchEngine::run_batch`] in one pass and each lane is
//! compared with the reference result of its config, so the multi-lane
//! path is covered as well as the batch-of-one path.

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use tradesim_core::config::{ConfigError, RunConfig, RunConfigBuilder};
use tradesim_core::domain::{BarError, BarSeries};
use tradesim_core::engine::{BatchEngine, ReferenceEngine, Simulator};
use tradesim_core::fingerprint::dataset_hash;
use tradesim_core::parity::{self, Divergence, ParityError, ParityVerifier, DEFAULT_TOLERANCE};

use crate::grid::ParamGrid;
use crate::synthetic::{derive_seed, SyntheticBars};

#[derive(Debug, Error)]
pub enum BatteryError {
    #[error("invalid grid: {0}")]
    Grid(#[from] ConfigError),
    #[error("dataset generation failed: {0}")]
    Dataset(#[from] BarError),
    #[error(transparent)]
    Parity(#[from] ParityError),
}

/// Battery parameters.
#[derive(Debug, Clone)]
pub struct BatteryConfig {
    pub grid: ParamGrid,
    pub base: RunConfigBuilder,
    pub datasets: usize,
    pub bars_per_dataset: usize,
    pub master_seed: u64,
    pub tolerance: f64,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            grid: ParamGrid::parity_default(),
            base: RunConfig::builder(),
            datasets: 3,
            bars_per_dataset: 500,
            master_seed: 42,
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Outcome of one (dataset, config) case.
#[derive(Debug, Clone, Serialize)]
pub struct BatteryCase {
    pub dataset: usize,
    pub run_id: String,
    pub trades: usize,
    pub passed: bool,
    pub divergences: Vec<Divergence>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatteryReport {
    pub tolerance: f64,
    pub dataset_hashes: Vec<String>,
    pub combinations: usize,
    pub cases: Vec<BatteryCase>,
    /// Cases in which at least one trade was produced.
    pub cases_with_trades: usize,
    pub passed: usize,
    pub failed: usize,
}

impl BatteryReport {
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &BatteryCase> {
        self.cases.iter().filter(|c| !c.passed)
    }
}

pub struct ParityBattery {
    config: BatteryConfig,
}

impl ParityBattery {
    pub fn new(config: BatteryConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<BatteryReport, BatteryError> {
        let cfg = &self.config;
        let configs = cfg.grid.generate_configs(&cfg.base)?;
        let verifier = ParityVerifier::with_tolerance(cfg.tolerance)?;

        let datasets = (0..cfg.datasets)
            .map(|i| {
                SyntheticBars::new(derive_seed(cfg.master_seed, i as u64))
                    .with_len(cfg.bars_per_dataset)
                    .generate()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut cases: Vec<BatteryCase> = datasets
            .par_iter()
            .enumerate()
            .flat_map(|(d, bars)| {
                let lanes = batch_lane_divergences(bars, &configs, cfg.tolerance);
                configs
                    .par_iter()
                    .zip(lanes)
                    .map(|(config, lane_divergence)| {
                        run_case(&verifier, d, bars, config, lane_divergence)
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        cases.sort_by_key(|c| c.dataset);

        let failed = cases.iter().filter(|c| !c.passed).count();
        let report = BatteryReport {
            tolerance: cfg.tolerance,
            dataset_hashes: datasets.iter().map(dataset_hash).collect(),
            combinations: configs.len(),
            cases_with_trades: cases.iter().filter(|c| c.trades > 0).count(),
            passed: cases.len() - failed,
            failed,
            cases,
        };

        info!(
            datasets = cfg.datasets,
            combinations = report.combinations,
            passed = report.passed,
            failed = report.failed,
            "parity battery complete"
        );
        for case in report.failures() {
            warn!(dataset = case.dataset, run_id = %case.run_id, "parity case failed");
        }
        Ok(report)
    }
}

fn run_case(
    verifier: &ParityVerifier,
    dataset: usize,
    bars: &BarSeries,
    config: &RunConfig,
    lane_divergence: Option<Divergence>,
) -> BatteryCase {
    let report = verifier.verify(bars, config);
    let trades = report.baseline().result.ledger.all_trades().count();
    let mut divergences = report.divergences;
    divergences.extend(lane_divergence);
    BatteryCase {
        dataset,
        run_id: config.run_id(),
        trades,
        passed: divergences.is_empty(),
        divergences,
    }
}

/// Multi-lane batch run vs. one reference run per config.
fn batch_lane_divergences(
    bars: &BarSeries,
    configs: &[RunConfig],
    tolerance: f64,
) -> Vec<Option<Divergence>> {
    let lanes = BatchEngine.run_batch(bars, configs);
    configs
        .iter()
        .zip(&lanes)
        .map(|(config, lane)| {
            let reference = ReferenceEngine.simulate(bars, config);
            parity::compare(&reference, lane, tolerance, "batch_lanes")
        })
        .collect()
}
