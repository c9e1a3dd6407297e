//! Parity verification across simulator implementations.
//!
//! Every engine runs the same bars and config (in parallel on rayon); the
//! first engine is the baseline and each other engine's output is compared
//! against it once all runs finish. Discrete fields must match exactly,
//! money fields within a relative tolerance.

use crate::config::RunConfig;
use crate::domain::{BarSeries, EquityPoint, Trade};
use crate::engine::{EngineKind, SimulationResult, Simulator};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum ParityError {
    #[error("parity needs at least two engines, got {0}")]
    TooFewEngines(usize),
    #[error("tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
    #[error("{} engine(s) diverged from {baseline}; first: {}", .divergences.len(), first_divergence(.divergences))]
    EngineDivergence {
        baseline: &'static str,
        divergences: Vec<Divergence>,
    },
}

fn first_divergence(divergences: &[Divergence]) -> String {
    divergences.first().map(ToString::to_string).unwrap_or_default()
}

/// Which field of the output disagreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DivergenceField {
    TradeCount,
    OpenTrade,
    Side,
    EntryBar,
    ExitBar,
    ExitReason,
    EntryPrice,
    ExitPrice,
    Size,
    Fees,
    Pnl,
    BarsHeld,
    Mae,
    Mfe,
    FinalEquity,
    FinalCash,
    EquityLength,
    EquityBarIndex,
    EquityCash,
    EquityValue,
}

impl DivergenceField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TradeCount => "trade_count",
            Self::OpenTrade => "open_trade",
            Self::Side => "side",
            Self::EntryBar => "entry_bar",
            Self::ExitBar => "exit_bar",
            Self::ExitReason => "exit_reason",
            Self::EntryPrice => "entry_price",
            Self::ExitPrice => "exit_price",
            Self::Size => "size",
            Self::Fees => "fees",
            Self::Pnl => "pnl",
            Self::BarsHeld => "bars_held",
            Self::Mae => "mae",
            Self::Mfe => "mfe",
            Self::FinalEquity => "final_equity",
            Self::FinalCash => "final_cash",
            Self::EquityLength => "equity_length",
            Self::EquityBarIndex => "equity_bar_index",
            Self::EquityCash => "equity_cash",
            Self::EquityValue => "equity_value",
        }
    }
}

/// First mismatch between a candidate engine and the baseline.
///
/// `trade_index` counts closed trades first; the end-of-data trade, when
/// present, has index `trades().len()`. `point_index` is set for
/// mismatches inside the equity series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Divergence {
    pub engine: String,
    pub trade_index: Option<usize>,
    #[serde(default)]
    pub point_index: Option<usize>,
    pub field: DivergenceField,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.engine, self.field.as_str())?;
        if let Some(i) = self.trade_index {
            write!(f, " of trade {i}")?;
        }
        if let Some(i) = self.point_index {
            write!(f, " at equity point {i}")?;
        }
        write!(f, " expected {} got {}", self.expected, self.actual)
    }
}

/// One engine's output inside a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineRun {
    pub engine: &'static str,
    pub result: SimulationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParityReport {
    pub tolerance: f64,
    /// Baseline first, then candidates in verifier order.
    pub runs: Vec<EngineRun>,
    pub divergences: Vec<Divergence>,
    pub passed: bool,
}

impl ParityReport {
    pub fn baseline(&self) -> &EngineRun {
        &self.runs[0]
    }

    pub fn into_result(self) -> Result<ParityReport, ParityError> {
        if self.passed {
            Ok(self)
        } else {
            Err(ParityError::EngineDivergence {
                baseline: self.runs[0].engine,
                divergences: self.divergences,
            })
        }
    }
}

/// Runs several simulators on the same input and compares their outputs.
pub struct ParityVerifier {
    engines: Vec<Box<dyn Simulator>>,
    tolerance: f64,
}

impl ParityVerifier {
    pub fn new(engines: Vec<Box<dyn Simulator>>, tolerance: f64) -> Result<Self, ParityError> {
        if engines.len() < 2 {
            return Err(ParityError::TooFewEngines(engines.len()));
        }
        if !(tolerance.is_finite() && tolerance >= 0.0) {
            return Err(ParityError::InvalidTolerance(tolerance));
        }
        Ok(Self { engines, tolerance })
    }

    /// Every built-in engine, reference first.
    pub fn with_tolerance(tolerance: f64) -> Result<Self, ParityError> {
        let engines = EngineKind::ALL.iter().map(|k| k.simulator()).collect();
        Self::new(engines, tolerance)
    }

    pub fn engine_names(&self) -> Vec<&'static str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    pub fn verify(&self, bars: &BarSeries, config: &RunConfig) -> ParityReport {
        let runs: Vec<EngineRun> = self
            .engines
            .par_iter()
            .map(|engine| EngineRun {
                engine: engine.name(),
                result: engine.simulate(bars, config),
            })
            .collect();

        let baseline = &runs[0].result;
        let divergences: Vec<Divergence> = runs[1..]
            .iter()
            .filter_map(|run| compare(baseline, &run.result, self.tolerance, run.engine))
            .collect();

        for d in &divergences {
            warn!(run_id = %config.run_id(), divergence = %d, "engine diverged from baseline");
        }
        let passed = divergences.is_empty();
        debug!(engines = runs.len(), passed, "parity check complete");

        ParityReport {
            tolerance: self.tolerance,
            runs,
            divergences,
            passed,
        }
    }
}

impl Default for ParityVerifier {
    fn default() -> Self {
        Self {
            engines: EngineKind::ALL.iter().map(|k| k.simulator()).collect(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// `|a - b| <= tol * max(|a|, |b|, 1)`.
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= tolerance * a.abs().max(b.abs()).max(1.0)
}

/// First divergence of `candidate` from `baseline`, if any.
pub fn compare(
    baseline: &SimulationResult,
    candidate: &SimulationResult,
    tolerance: f64,
    engine: &str,
) -> Option<Divergence> {
    let diverge = |trade_index, field, expected: String, actual: String| {
        Some(Divergence {
            engine: engine.to_string(),
            trade_index,
            point_index: None,
            field,
            expected,
            actual,
        })
    };

    let (expected, actual) = (&baseline.ledger, &candidate.ledger);
    if expected.len() != actual.len() {
        return diverge(
            None,
            DivergenceField::TradeCount,
            expected.len().to_string(),
            actual.len().to_string(),
        );
    }
    if expected.open_trade().is_some() != actual.open_trade().is_some() {
        return diverge(
            None,
            DivergenceField::OpenTrade,
            expected.open_trade().is_some().to_string(),
            actual.open_trade().is_some().to_string(),
        );
    }

    for (i, (e, a)) in expected.all_trades().zip(actual.all_trades()).enumerate() {
        if let Some((field, exp, act)) = compare_trade(e, a, tolerance) {
            return diverge(Some(i), field, exp, act);
        }
    }

    let money = [
        (
            DivergenceField::FinalEquity,
            baseline.final_equity(),
            candidate.final_equity(),
        ),
        (
            DivergenceField::FinalCash,
            baseline.final_cash(),
            candidate.final_cash(),
        ),
    ];
    for (field, e, a) in money {
        if !within_tolerance(e, a, tolerance) {
            return diverge(None, field, e.to_string(), a.to_string());
        }
    }

    if baseline.equity.len() != candidate.equity.len() {
        return diverge(
            None,
            DivergenceField::EquityLength,
            baseline.equity.len().to_string(),
            candidate.equity.len().to_string(),
        );
    }
    let points = baseline.equity.points().iter().zip(candidate.equity.points());
    for (i, (e, a)) in points.enumerate() {
        if let Some((field, expected, actual)) = compare_point(e, a, tolerance) {
            return Some(Divergence {
                engine: engine.to_string(),
                trade_index: None,
                point_index: Some(i),
                field,
                expected,
                actual,
            });
        }
    }
    None
}

type FieldMismatch = Option<(DivergenceField, String, String)>;

fn exact<T: PartialEq + fmt::Debug>(field: DivergenceField, e: T, a: T) -> FieldMismatch {
    (e != a).then(|| (field, format!("{e:?}"), format!("{a:?}")))
}

fn first_outside_tolerance<const N: usize>(
    pairs: [(DivergenceField, f64, f64); N],
    tolerance: f64,
) -> FieldMismatch {
    pairs
        .into_iter()
        .find(|&(_, x, y)| !within_tolerance(x, y, tolerance))
        .map(|(field, x, y)| (field, x.to_string(), y.to_string()))
}

fn compare_trade(e: &Trade, a: &Trade, tolerance: f64) -> FieldMismatch {
    exact(DivergenceField::Side, e.side, a.side)
        .or_else(|| exact(DivergenceField::EntryBar, e.entry_bar, a.entry_bar))
        .or_else(|| exact(DivergenceField::ExitBar, e.exit_bar, a.exit_bar))
        .or_else(|| exact(DivergenceField::ExitReason, e.exit_reason, a.exit_reason))
        .or_else(|| exact(DivergenceField::BarsHeld, e.bars_held, a.bars_held))
        .or_else(|| {
            first_outside_tolerance(
                [
                    (DivergenceField::EntryPrice, e.entry_price, a.entry_price),
                    (DivergenceField::ExitPrice, e.exit_price, a.exit_price),
                    (DivergenceField::Size, e.size, a.size),
                    (DivergenceField::Fees, e.fees_paid, a.fees_paid),
                    (DivergenceField::Pnl, e.pnl, a.pnl),
                    (DivergenceField::Mae, e.mae, a.mae),
                    (DivergenceField::Mfe, e.mfe, a.mfe),
                ],
                tolerance,
            )
        })
}

fn compare_point(e: &EquityPoint, a: &EquityPoint, tolerance: f64) -> FieldMismatch {
    exact(DivergenceField::EquityBarIndex, e.bar_index, a.bar_index).or_else(|| {
        first_outside_tolerance(
            [
                (DivergenceField::EquityCash, e.cash, a.cash),
                (DivergenceField::EquityValue, e.equity, a.equity),
            ],
            tolerance,
        )
    })
}
