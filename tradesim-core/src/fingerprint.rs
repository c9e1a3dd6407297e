//! Deterministic content hashes for configs, bar series and ledgers.
//!
//! - `config_hash`: identity of a [`RunConfig`] (cache keys, battery reports).
//! - `dataset_hash`: identity of a [`BarSeries`] (prices and flags, bit-exact).
//! - `ledger_hash`: identity of a [`TradeLedger`], used to check determinism.
//!
//! All three hash a canonical byte encoding with BLAKE3 and return lowercase hex.

use crate::config::RunConfig;
use crate::domain::{BarSeries, TradeLedger};

pub fn config_hash(config: &RunConfig) -> String {
    // Struct fields serialize in declaration order, so the JSON is canonical.
    let json = serde_json::to_vec(config).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}

/// Hash over every bar's index, timestamp, OHLC bits and flags.
pub fn dataset_hash(bars: &BarSeries) -> String {
    let mut hasher = blake3::Hasher::new();
    for bar in bars {
        hasher.update(&(bar.index as u64).to_le_bytes());
        hasher.update(&bar.timestamp.timestamp_micros().to_le_bytes());
        hasher.update(&bar.open.to_le_bytes());
        hasher.update(&bar.high.to_le_bytes());
        hasher.update(&bar.low.to_le_bytes());
        hasher.update(&bar.close.to_le_bytes());
        hasher.update(&[
            bar.long_entry as u8,
            bar.short_entry as u8,
            bar.long_exit as u8,
            bar.short_exit as u8,
        ]);
    }
    hasher.finalize().to_hex().to_string()
}

/// Hash over the ledger's JSON encoding.
///
/// serde_json writes floats with their shortest round-trip representation,
/// so two ledgers hash equal iff every field is bit-identical.
pub fn ledger_hash(ledger: &TradeLedger) -> String {
    let json = serde_json::to_vec(ledger).unwrap_or_default();
    blake3::hash(&json).to_hex().to_string()
}
