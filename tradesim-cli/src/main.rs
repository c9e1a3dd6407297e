//! TradeSim CLI: run, parity, battery, sweep and synthetic-data commands.
//!
//! Commands:
//! - `run`: simulate a CSV bar file under a TOML config with one engine
//! - `parity`: run every engine on the same inputs and compare results
//! - `battery`: parity over a config grid and several synthetic datasets
//! - `sweep`: run a parameter grid over one bar file and rank the results
//! - `synth`: write a deterministic synthetic bar series as CSV
//!
//! Reports go to stdout (text, or JSON with `--json`); logs go to stderr.

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;
use tradesim_core::config::RunConfig;
use tradesim_core::engine::EngineKind;
use tradesim_core::parity::{ParityVerifier, DEFAULT_TOLERANCE};
use tradesim_runner::{
    load_bars_csv, load_param_grid, load_run_config, run_files, write_bars_csv, ArtifactWriter,
    BatteryConfig, ParamGrid, ParamSweep, ParityBattery, RunSummary, SweepMode, SyntheticBars,
};

use logging::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "tradesim", about = "TradeSim: bar-by-bar execution simulator")]
struct Cli {
    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Print reports as JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a bar file under a run config.
    Run {
        /// CSV bar file.
        #[arg(long)]
        bars: PathBuf,

        /// TOML run config. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Engine: reference, kernel or batch.
        #[arg(long, default_value = "reference")]
        engine: EngineKind,

        /// Write summary, config, trades and equity below this directory.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Run all engines on the same inputs and compare ledgers and equity.
    Parity {
        /// CSV bar file.
        #[arg(long)]
        bars: PathBuf,

        /// TOML run config. Defaults are used when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Relative tolerance for numeric fields.
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
    /// Parity over a config grid and several synthetic datasets.
    Battery {
        /// Number of synthetic datasets.
        #[arg(long, default_value_t = 3)]
        datasets: usize,

        /// Bars per dataset.
        #[arg(long, default_value_t = 500)]
        bars: usize,

        /// Master seed; dataset seeds are derived from it.
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Use the small built-in grid instead of the full one.
        #[arg(long, default_value_t = false, conflicts_with = "grid")]
        compact: bool,

        /// TOML grid file.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// Relative tolerance for numeric fields.
        #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
        tolerance: f64,
    },
    /// Run a parameter grid over one bar file.
    Sweep {
        /// CSV bar file.
        #[arg(long)]
        bars: PathBuf,

        /// TOML grid file. Defaults to the compact built-in grid.
        #[arg(long)]
        grid: Option<PathBuf>,

        /// TOML run config the grid is applied over.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Evaluate all configs in one bar-major pass.
        #[arg(long, default_value_t = false)]
        batch: bool,

        /// Number of results to report.
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Write a deterministic synthetic bar series as CSV.
    Synth {
        /// Output CSV path.
        #[arg(long)]
        output: PathBuf,

        /// Number of bars.
        #[arg(long, default_value_t = 500)]
        bars: usize,

        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Starting price.
        #[arg(long, default_value_t = 100.0)]
        start_price: f64,

        /// Maximum absolute return per bar.
        #[arg(long, default_value_t = 0.02)]
        volatility: f64,

        /// Probability of each signal flag per bar.
        #[arg(long, default_value_t = 0.08)]
        signal_rate: f64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    init_logging(&cli.log_level, format)?;

    match cli.command {
        Commands::Run {
            bars,
            config,
            engine,
            output_dir,
        } => run_cmd(&bars, config.as_deref(), engine, output_dir.as_deref(), cli.json),
        Commands::Parity {
            bars,
            config,
            tolerance,
        } => parity_cmd(&bars, config.as_deref(), tolerance, cli.json),
        Commands::Battery {
            datasets,
            bars,
            seed,
            compact,
            grid,
            tolerance,
        } => {
            let grid = match grid {
                Some(path) => load_param_grid(&path)?,
                None if compact => ParamGrid::compact(),
                None => ParamGrid::parity_default(),
            };
            battery_cmd(
                BatteryConfig {
                    grid,
                    datasets,
                    bars_per_dataset: bars,
                    master_seed: seed,
                    tolerance,
                    ..BatteryConfig::default()
                },
                cli.json,
            )
        }
        Commands::Sweep {
            bars,
            grid,
            config,
            batch,
            top,
        } => sweep_cmd(&bars, grid.as_deref(), config.as_deref(), batch, top, cli.json),
        Commands::Synth {
            output,
            bars,
            seed,
            start_price,
            volatility,
            signal_rate,
        } => {
            let series = SyntheticBars::new(seed)
                .with_len(bars)
                .with_start_price(start_price)
                .with_volatility(volatility)
                .with_signal_rate(signal_rate)
                .generate()?;
            write_bars_csv(&output, &series)?;
            info!(
                bars = series.len(),
                seed,
                path = %output.display(),
                "synthetic series written"
            );
            Ok(())
        }
    }
}

fn run_cmd(
    bars: &Path,
    config: Option<&Path>,
    engine: EngineKind,
    output_dir: Option<&Path>,
    json: bool,
) -> Result<()> {
    let output = run_files(bars, config, engine)?;

    if json {
        print_json(&output)?;
    } else {
        print_summary(&output.summary);
    }

    if let Some(dir) = output_dir {
        ArtifactWriter::new(dir)?.save_run(&output)?;
    }
    Ok(())
}

fn parity_cmd(bars: &Path, config: Option<&Path>, tolerance: f64, json: bool) -> Result<()> {
    let config = load_config(config)?;
    let series = load_bars_csv(bars)?;
    let verifier = ParityVerifier::with_tolerance(tolerance)?;
    let report = verifier.verify(&series, &config);

    if json {
        print_json(&report)?;
    } else {
        println!();
        println!("=== Parity ===");
        println!("Engines:        {}", verifier.engine_names().join(", "));
        println!("Tolerance:      {:e}", report.tolerance);
        println!("Trades:         {}", report.baseline().result.ledger.len());
        println!(
            "Final equity:   {:.2}",
            report.baseline().result.final_equity()
        );
        for divergence in &report.divergences {
            println!("DIVERGENCE: {divergence}");
        }
        println!();
    }

    report.into_result()?;
    Ok(())
}

fn battery_cmd(config: BatteryConfig, json: bool) -> Result<()> {
    let report = ParityBattery::new(config).run()?;

    if json {
        print_json(&report)?;
    } else {
        println!();
        println!("=== Parity Battery ===");
        println!("Datasets:       {}", report.dataset_hashes.len());
        println!("Combinations:   {}", report.combinations);
        println!("Cases:          {}", report.cases.len());
        println!("With trades:    {}", report.cases_with_trades);
        println!("Passed:         {}", report.passed);
        println!("Failed:         {}", report.failed);
        for case in report.failures() {
            println!("FAILED dataset {} config {}:", case.dataset, case.run_id);
            for divergence in &case.divergences {
                println!("  {divergence}");
            }
        }
        println!();
    }

    if !report.all_passed() {
        bail!("{} of {} parity cases failed", report.failed, report.cases.len());
    }
    Ok(())
}

fn sweep_cmd(
    bars: &Path,
    grid: Option<&Path>,
    config: Option<&Path>,
    batch: bool,
    top: usize,
    json: bool,
) -> Result<()> {
    let grid = match grid {
        Some(path) => load_param_grid(path)?,
        None => ParamGrid::compact(),
    };
    let base = load_config(config)?.to_builder();
    let series = load_bars_csv(bars)?;
    let mode = if batch {
        SweepMode::Batch
    } else {
        SweepMode::Parallel(EngineKind::Reference)
    };

    let results = ParamSweep::new(mode)
        .sweep(&series, &grid, &base)
        .context("invalid sweep grid")?;
    let ranked = results.top_n(top);

    if json {
        print_json(&ranked)?;
    } else {
        println!();
        println!("=== Sweep: top {} of {} ===", ranked.len(), results.len());
        println!(
            "{:<18} {:>14} {:>9} {:>8} {:>9}",
            "Run", "Final Equity", "Return", "Trades", "Max DD"
        );
        println!("{}", "-".repeat(62));
        for summary in ranked {
            println!(
                "{:<18} {:>14.2} {:>8.2}% {:>8} {:>8.2}%",
                &summary.run_id[..summary.run_id.len().min(16)],
                summary.final_equity,
                summary.metrics.total_return * 100.0,
                summary.metrics.trade_count,
                summary.metrics.max_drawdown * 100.0,
            );
        }
        println!();
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<RunConfig> {
    Ok(match path {
        Some(path) => load_run_config(path)?,
        None => RunConfig::default(),
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let metrics = &summary.metrics;
    println!();
    println!("=== Simulation Result ===");
    println!("Run:            {}", summary.run_id);
    println!("Dataset:        {}", summary.dataset_hash);
    println!("Engine:         {}", summary.engine);
    println!("Bars:           {}", summary.bar_count);
    println!("Trades:         {}", metrics.trade_count);
    if summary.has_open_trade {
        println!("Open at end:    yes (valued at last close)");
    }
    println!();
    println!("--- Performance ---");
    println!("Initial:        {:.2}", summary.initial_capital);
    println!("Final Equity:   {:.2}", summary.final_equity);
    println!("Final Cash:     {:.2}", summary.final_cash);
    println!("Total Return:   {:.2}%", metrics.total_return * 100.0);
    println!("Max Drawdown:   {:.2}%", metrics.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", metrics.win_rate * 100.0);
    match metrics.profit_factor {
        Some(pf) => println!("Profit Factor:  {pf:.2}"),
        None => println!("Profit Factor:  n/a (no losing trades)"),
    }
    println!("Avg Bars Held:  {:.1}", metrics.avg_bars_held);
    println!("Max Consec Loss:{}", metrics.max_consecutive_losses);
    println!("Stop Exits:     {}", metrics.stop_loss_exits);
    println!("Target Exits:   {}", metrics.take_profit_exits);
    println!("Total Fees:     {:.2}", summary.total_fees);
    println!("Ledger:         {}", summary.ledger_fingerprint);
    println!();
}
