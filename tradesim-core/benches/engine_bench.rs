//! Criterion benchmarks for the simulator hot paths.
//!
//! Benchmarks:
//! 1. Single run per engine (reference, kernel, batch-of-one)
//! 2. Batch engine vs. repeated reference runs over a config grid
//! 3. Parity verification (all engines on one input)

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use tradesim_core::config::{RunConfig, TradingMode};
use tradesim_core::domain::{Bar, BarSeries};
use tradesim_core::engine::{BatchEngine, EngineKind, ReferenceEngine, Simulator};
use tradesim_core::parity::ParityVerifier;

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> BarSeries {
    let t0 = Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap();
    let bars = (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            let open = close - 0.3;
            Bar {
                index: i,
                timestamp: t0 + Duration::minutes(5 * i as i64),
                open,
                high: close + 1.5,
                low: close - 1.5,
                close,
                long_entry: i % 17 == 0,
                short_entry: i % 23 == 0,
                long_exit: i % 29 == 0,
                short_exit: i % 31 == 0,
            }
        })
        .collect();
    BarSeries::new(bars).unwrap()
}

fn bench_config() -> RunConfig {
    RunConfig::builder()
        .trading_mode(TradingMode::Both)
        .stop_loss_pct(Some(0.02))
        .take_profit_pct(Some(0.04))
        .build()
        .unwrap()
}

fn config_grid() -> Vec<RunConfig> {
    let mut configs = Vec::new();
    for sl in [0.01, 0.02, 0.03, 0.05] {
        for tp in [0.02, 0.04, 0.08] {
            for leverage in [1.0, 3.0] {
                configs.push(
                    RunConfig::builder()
                        .trading_mode(TradingMode::Both)
                        .stop_loss_pct(Some(sl))
                        .take_profit_pct(Some(tp))
                        .leverage(leverage)
                        .build()
                        .unwrap(),
                );
            }
        }
    }
    configs
}

// ── 1. Single run ────────────────────────────────────────────────────

fn bench_engines(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_run");
    let config = bench_config();

    for &bar_count in &[1_000, 10_000, 100_000] {
        let bars = make_bars(bar_count);
        for kind in EngineKind::ALL {
            let engine = kind.simulator();
            group.bench_with_input(BenchmarkId::new(kind.as_str(), bar_count), &bars, |b, bars| {
                b.iter(|| engine.simulate(black_box(bars), black_box(&config)))
            });
        }
    }
    group.finish();
}

// ── 2. Config grid ───────────────────────────────────────────────────

fn bench_grid(c: &mut Criterion) {
    let mut group = c.benchmark_group("config_grid");
    let bars = make_bars(10_000);
    let configs = config_grid();

    group.bench_function("batch", |b| {
        b.iter(|| BatchEngine.run_batch(black_box(&bars), black_box(&configs)))
    });
    group.bench_function("reference_loop", |b| {
        b.iter(|| {
            configs
                .iter()
                .map(|config| ReferenceEngine.simulate(black_box(&bars), config))
                .collect::<Vec<_>>()
        })
    });
    group.finish();
}

// ── 3. Parity ────────────────────────────────────────────────────────

fn bench_parity(c: &mut Criterion) {
    let bars = make_bars(10_000);
    let config = bench_config();
    let verifier = ParityVerifier::default();

    c.bench_function("parity_verify_10k", |b| {
        b.iter(|| verifier.verify(black_box(&bars), black_box(&config)))
    });
}

criterion_group!(benches, bench_engines, bench_grid, bench_parity);
criterion_main!(benches);
