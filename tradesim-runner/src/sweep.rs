//! Parameter sweeps: one bar series, every config of a grid.

use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;
use tradesim_core::config::{ConfigError, RunConfig, RunConfigBuilder};
use tradesim_core::domain::BarSeries;
use tradesim_core::engine::{BatchEngine, EngineKind};

use crate::grid::ParamGrid;
use crate::runner::{summarize, RunSummary};

/// How a sweep evaluates its configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepMode {
    /// One independent run per config, spread over the rayon pool.
    Parallel(EngineKind),
    /// One bar-major pass over all configs with [`BatchEngine`].
    Batch,
}

/// Parameter sweep executor.
pub struct ParamSweep {
    mode: SweepMode,
}

impl Default for ParamSweep {
    fn default() -> Self {
        Self {
            mode: SweepMode::Parallel(EngineKind::Reference),
        }
    }
}

impl ParamSweep {
    pub fn new(mode: SweepMode) -> Self {
        Self { mode }
    }

    /// Run every config of `grid` (applied over `base`) on `bars`.
    pub fn sweep(
        &self,
        bars: &BarSeries,
        grid: &ParamGrid,
        base: &RunConfigBuilder,
    ) -> Result<SweepResults, ConfigError> {
        let configs = grid.generate_configs(base)?;
        Ok(self.sweep_configs(bars, &configs))
    }

    pub fn sweep_configs(&self, bars: &BarSeries, configs: &[RunConfig]) -> SweepResults {
        let summaries: Vec<RunSummary> = match self.mode {
            SweepMode::Parallel(engine) => configs
                .par_iter()
                .map(|config| {
                    let result = engine.simulator().simulate(bars, config);
                    summarize(bars, config, engine, &result)
                })
                .collect(),
            SweepMode::Batch => {
                let results = BatchEngine.run_batch(bars, configs);
                configs
                    .iter()
                    .zip(results)
                    .map(|(config, result)| summarize(bars, config, EngineKind::Batch, &result))
                    .collect()
            }
        };

        info!(configs = configs.len(), bars = bars.len(), "sweep complete");
        SweepResults::new(summaries)
    }
}

/// Results from a parameter sweep, in grid order.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResults {
    results: Vec<RunSummary>,
    #[serde(skip)]
    by_run_id: HashMap<String, usize>,
}

impl SweepResults {
    fn new(results: Vec<RunSummary>) -> Self {
        let by_run_id = results
            .iter()
            .enumerate()
            .map(|(i, r)| (r.run_id.clone(), i))
            .collect();
        Self { results, by_run_id }
    }

    pub fn all(&self) -> &[RunSummary] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, run_id: &str) -> Option<&RunSummary> {
        self.by_run_id.get(run_id).map(|&i| &self.results[i])
    }

    /// Results sorted by final equity, best first.
    pub fn sorted_by_final_equity(&self) -> Vec<&RunSummary> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| b.final_equity.total_cmp(&a.final_equity));
        sorted
    }

    pub fn top_n(&self, n: usize) -> Vec<&RunSummary> {
        self.sorted_by_final_equity().into_iter().take(n).collect()
    }

    pub fn best(&self) -> Option<&RunSummary> {
        self.sorted_by_final_equity().into_iter().next()
    }
}
