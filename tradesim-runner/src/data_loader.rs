//! Bar loading for the runner.
//!
//! Bars come from CSV with a header row:
//!
//! ```text
//! timestamp,open,high,low,close,long_entry,short_entry[,long_exit,short_exit]
//! ```
//!
//! Timestamps are RFC 3339. Flags accept `true`/`false` or `1`/`0`; the two
//! close-condition columns are optional. Bar indices are assigned from row
//! order, starting at 0. The resulting series is validated by
//! [`BarSeries::new`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tradesim_core::domain::{Bar, BarError, BarSeries};

/// Errors from the data loading layer.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot open '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid bar series: {0}")]
    Bars(#[from] BarError),
}

/// One CSV row. Field names are the header names.
#[derive(Debug, Deserialize, Serialize)]
struct BarRecord {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(deserialize_with = "flag")]
    long_entry: bool,
    #[serde(deserialize_with = "flag")]
    short_entry: bool,
    #[serde(default, deserialize_with = "flag")]
    long_exit: bool,
    #[serde(default, deserialize_with = "flag")]
    short_exit: bool,
}

impl BarRecord {
    fn into_bar(self, index: usize) -> Bar {
        Bar {
            index,
            timestamp: self.timestamp,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            long_entry: self.long_entry,
            short_entry: self.short_entry,
            long_exit: self.long_exit,
            short_exit: self.short_exit,
        }
    }

    fn from_bar(bar: &Bar) -> Self {
        Self {
            timestamp: bar.timestamp,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            long_entry: bar.long_entry,
            short_entry: bar.short_entry,
            long_exit: bar.long_exit,
            short_exit: bar.short_exit,
        }
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" => Ok(true),
        "0" | "false" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid flag '{other}' (expected true/false or 1/0)"
        ))),
    }
}

/// Load a bar series from a CSV file.
pub fn load_bars_csv(path: &Path) -> Result<BarSeries, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let series = read_bars(file)?;
    debug!(path = %path.display(), bars = series.len(), "loaded bars");
    Ok(series)
}

/// Read a bar series from any CSV source.
pub fn read_bars<R: Read>(reader: R) -> Result<BarSeries, LoadError> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (index, row) in csv_reader.deserialize::<BarRecord>().enumerate() {
        bars.push(row?.into_bar(index));
    }
    Ok(BarSeries::new(bars)?)
}

/// Write a bar series as CSV (all four flag columns, `true`/`false`).
pub fn write_bars<W: Write>(writer: W, bars: &BarSeries) -> Result<(), LoadError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    for bar in bars {
        csv_writer.serialize(BarRecord::from_bar(bar))?;
    }
    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_bars_csv(path: &Path, bars: &BarSeries) -> Result<(), LoadError> {
    let file = File::create(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    write_bars(file, bars)
}
