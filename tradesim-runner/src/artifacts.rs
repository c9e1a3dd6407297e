//! Run artifacts: persisted outputs of a single run.
//!
//! Layout under the output directory:
//!
//! ```text
//! <run_id>/
//!   summary.json   RunSummary
//!   config.toml    the validated config, re-loadable with load_run_config
//!   trades.csv     one row per ledger entry, end-of-data trade last
//!   trades.json
//!   equity.csv     bar_index,cash,equity
//! ```

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tradesim_core::domain::{EquityPoint, Trade};

use crate::config::to_toml;
use crate::runner::RunOutput;

/// Artifact paths returned after a save.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactPaths {
    pub run_dir: PathBuf,
    pub summary_json: PathBuf,
    pub config_toml: PathBuf,
    pub trades_csv: PathBuf,
    pub trades_json: PathBuf,
    pub equity_csv: PathBuf,
}

/// Writes run artifacts below one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Result<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create output directory {}", output_dir.display()))?;
        Ok(Self { output_dir })
    }

    pub fn save_run(&self, output: &RunOutput) -> Result<ArtifactPaths> {
        let run_dir = self.output_dir.join(&output.summary.run_id);
        std::fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create run directory {}", run_dir.display()))?;

        let paths = ArtifactPaths {
            summary_json: run_dir.join("summary.json"),
            config_toml: run_dir.join("config.toml"),
            trades_csv: run_dir.join("trades.csv"),
            trades_json: run_dir.join("trades.json"),
            equity_csv: run_dir.join("equity.csv"),
            run_dir,
        };

        write_json(&paths.summary_json, &output.summary)?;

        let config = to_toml(&output.config).context("failed to serialize config")?;
        std::fs::write(&paths.config_toml, config)
            .with_context(|| format!("failed to write {}", paths.config_toml.display()))?;

        let trades: Vec<&Trade> = output.result.ledger.all_trades().collect();
        write_csv(&paths.trades_csv, &trades)?;
        write_json(&paths.trades_json, &trades)?;
        write_csv::<EquityPoint>(&paths.equity_csv, output.result.equity.points())?;

        info!(run_dir = %paths.run_dir.display(), "artifacts written");
        Ok(paths)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("failed to serialize JSON")?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))
}

fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_run_config;
    use crate::runner::run_simulation;
    use crate::synthetic::SyntheticBars;
    use tradesim_core::config::RunConfig;
    use tradesim_core::engine::EngineKind;

    #[test]
    fn save_run_writes_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let bars = SyntheticBars::new(3).with_len(120).generate().unwrap();
        let config = RunConfig::builder()
            .take_profit_pct(Some(0.02))
            .build()
            .unwrap();
        let output = run_simulation(&bars, &config, EngineKind::Reference);

        let paths = ArtifactWriter::new(dir.path()).unwrap().save_run(&output).unwrap();

        assert!(paths.run_dir.ends_with(&output.summary.run_id));
        assert_eq!(load_run_config(&paths.config_toml).unwrap(), config);

        let equity = std::fs::read_to_string(&paths.equity_csv).unwrap();
        assert!(equity.starts_with("bar_index,cash,equity"));
        assert_eq!(equity.lines().count(), 1 + output.result.equity.len());

        let trades = std::fs::read_to_string(&paths.trades_csv).unwrap();
        let expected_rows = output.result.ledger.all_trades().count();
        let rows = trades.lines().count().saturating_sub(1);
        assert_eq!(rows, expected_rows);

        let summary: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&paths.summary_json).unwrap()).unwrap();
        assert_eq!(summary["run_id"], output.summary.run_id.as_str());
    }
}
