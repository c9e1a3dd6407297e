//! Bar: one OHLC candle plus its precomputed signal flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLC bar with the entry/exit flags produced by the external signal layer.
///
/// Flags describe what was known at the bar's close. The simulator only ever
/// reads a bar's `open` before that close (for next-open entry fills).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub long_entry: bool,
    pub short_entry: bool,
    #[serde(default)]
    pub long_exit: bool,
    #[serde(default)]
    pub short_exit: bool,
}

/// The four boolean flags of a bar, packed for columnar engines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SignalFlags {
    pub long_entry: bool,
    pub short_entry: bool,
    pub long_exit: bool,
    pub short_exit: bool,
}

impl Bar {
    pub fn flags(&self) -> SignalFlags {
        SignalFlags {
            long_entry: self.long_entry,
            short_entry: self.short_entry,
            long_exit: self.long_exit,
            short_exit: self.short_exit,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: high >= low, high >= open, high >= close, etc.
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.low > 0.0
    }
}

/// Reasons a sequence of bars cannot be used as a simulation input.
#[derive(Debug, Error, PartialEq)]
pub enum BarError {
    #[error("bar {index}: OHLC values are not finite, positive and ordered")]
    Insane { index: usize },
    #[error("bar {index}: timestamp {timestamp} does not follow {previous}")]
    NonIncreasingTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    #[error("bar index {found} follows {previous}; indices must be contiguous")]
    NonContiguousIndex { previous: usize, found: usize },
}

/// Ordered, gap-free, validated sequence of bars.
///
/// Materialized in memory and immutable; shared by reference across
/// concurrent runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BarSeries {
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(bars: Vec<Bar>) -> Result<Self, BarError> {
        for bar in &bars {
            if !bar.is_sane() {
                return Err(BarError::Insane { index: bar.index });
            }
        }
        for pair in bars.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.index != prev.index + 1 {
                return Err(BarError::NonContiguousIndex {
                    previous: prev.index,
                    found: next.index,
                });
            }
            if next.timestamp <= prev.timestamp {
                return Err(BarError::NonIncreasingTimestamp {
                    index: next.index,
                    previous: prev.timestamp,
                    timestamp: next.timestamp,
                });
            }
        }
        Ok(Self { bars })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bar> {
        self.bars.iter()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Series restricted to the first `len` bars (used by truncation tests).
    pub fn prefix(&self, len: usize) -> Self {
        Self {
            bars: self.bars[..len.min(self.bars.len())].to_vec(),
        }
    }
}

impl TryFrom<Vec<Bar>> for BarSeries {
    type Error = BarError;

    fn try_from(bars: Vec<Bar>) -> Result<Self, Self::Error> {
        Self::new(bars)
    }
}

impl<'a> IntoIterator for &'a BarSeries {
    type Item = &'a Bar;
    type IntoIter = std::slice::Iter<'a, Bar>;

    fn into_iter(self) -> Self::IntoIter {
        self.bars.iter()
    }
}
