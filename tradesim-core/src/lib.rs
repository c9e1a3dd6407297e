//! TradeSim Core: execution simulator, trade ledger and parity verification.
//!
//! This crate contains the simulation itself and no I/O:
//! - Domain types (bars, positions, trades, ledger, equity)
//! - Validated, immutable run configuration
//! - Three interchangeable simulator engines over a shared accounting kernel
//! - Parity verifier comparing engines on identical inputs
//! - BLAKE3 fingerprints for configs, datasets and ledgers

pub mod config;
pub mod domain;
pub mod engine;
pub mod fingerprint;
pub mod parity;

pub use config::{
    ConfigError, IntrabarPolicy, ReversalPolicy, RunConfig, RunConfigBuilder, TradingMode,
};
pub use domain::{
    Bar, BarError, BarSeries, EquityPoint, EquitySeries, ExitReason, LedgerError, Side, Trade,
    TradeLedger,
};
pub use engine::{
    simulate, BatchEngine, EngineKind, KernelEngine, ReferenceEngine, SimulationResult, Simulator,
};
pub use parity::{Divergence, DivergenceField, ParityError, ParityReport, ParityVerifier};
