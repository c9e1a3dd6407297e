//! Execution simulator: turns a bar series with entry/exit flags into a
//! trade ledger and an equity series.
//!
//! Three engines implement the same state machine:
//!
//! - [`ReferenceEngine`]: object-style loop over [`Position`](crate::domain::Position)
//! - [`KernelEngine`]: columnar inputs, primitive scalar state
//! - [`BatchEngine`]: many configurations per pass over the bars
//!
//! Per bar `i`, in order:
//! 0. Scheduled entry: fill at bar `i`'s open
//! 1. Exits: excursion tracking, SL/TP, signal close, time stop (same-bar settlement)
//! 2. Entries: immediate at close on an allowed reversal, otherwise scheduled for bar `i+1`
//! 3. Equity point at bar `i`'s close
//!
//! All arithmetic lives in [`kernel`] so the engines round identically.

pub mod batch;
pub mod compiled;
pub mod kernel;
pub mod reference;

pub use batch::BatchEngine;
pub use compiled::KernelEngine;
pub use reference::ReferenceEngine;

use crate::config::RunConfig;
use crate::domain::{BarSeries, EquitySeries, TradeLedger};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A simulator implementation. Stateless between runs.
pub trait Simulator: Send + Sync {
    fn name(&self) -> &'static str;

    fn simulate(&self, bars: &BarSeries, config: &RunConfig) -> SimulationResult;
}

/// Output of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub ledger: TradeLedger,
    pub equity: EquitySeries,
}

impl SimulationResult {
    pub fn into_parts(self) -> (TradeLedger, EquitySeries) {
        (self.ledger, self.equity)
    }

    pub fn final_equity(&self) -> f64 {
        self.equity.final_equity()
    }

    pub fn final_cash(&self) -> f64 {
        self.equity.final_cash()
    }
}

/// Run the reference engine.
pub fn simulate(bars: &BarSeries, config: &RunConfig) -> SimulationResult {
    ReferenceEngine.simulate(bars, config)
}

/// Engine selector for callers that pick an implementation by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Reference,
    Kernel,
    Batch,
}

impl EngineKind {
    pub const ALL: [EngineKind; 3] = [Self::Reference, Self::Kernel, Self::Batch];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Kernel => "kernel",
            Self::Batch => "batch",
        }
    }

    pub fn simulator(self) -> Box<dyn Simulator> {
        match self {
            Self::Reference => Box::new(ReferenceEngine),
            Self::Kernel => Box::new(KernelEngine),
            Self::Batch => Box::new(BatchEngine),
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown engine '{0}' (expected reference, kernel or batch)")]
pub struct UnknownEngine(pub String);

impl FromStr for EngineKind {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reference" => Ok(Self::Reference),
            "kernel" => Ok(Self::Kernel),
            "batch" => Ok(Self::Batch),
            _ => Err(UnknownEngine(s.to_string())),
        }
    }
}
