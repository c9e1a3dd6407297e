//! Deterministic synthetic bar series.
//!
//! A seeded random walk with random entry/exit flags, for the parity
//! battery, benchmarks and demos. The same seed always yields the same
//! series; distinct datasets in a battery get seeds derived with BLAKE3.

use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tradesim_core::domain::{Bar, BarError, BarSeries};

/// Generator parameters. Build with [`SyntheticBars::new`] and the `with_*` setters.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticBars {
    seed: u64,
    len: usize,
    start_price: f64,
    /// Maximum absolute close-to-close return per bar.
    volatility: f64,
    /// Probability of each flag being set on a bar.
    signal_rate: f64,
    interval: Duration,
    start: DateTime<Utc>,
}

impl SyntheticBars {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            len: 500,
            start_price: 100.0,
            volatility: 0.02,
            signal_rate: 0.08,
            interval: Duration::hours(1),
            start: Utc
                .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    pub fn with_volatility(mut self, volatility: f64) -> Self {
        self.volatility = volatility;
        self
    }

    pub fn with_signal_rate(mut self, rate: f64) -> Self {
        self.signal_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Generate the series.
    ///
    /// Fails only if the parameters produce invalid bars (non-positive start
    /// price, or a non-positive interval).
    pub fn generate(&self) -> Result<BarSeries, BarError> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut bars = Vec::with_capacity(self.len);
        let mut price = self.start_price;
        let mut timestamp = self.start;
        let vol = self.volatility.abs();

        for index in 0..self.len {
            let ret: f64 = if vol > 0.0 { rng.gen_range(-vol..vol) } else { 0.0 };
            let open = price;
            let close = (open * (1.0 + ret)).max(open * 0.5);
            let wick_up: f64 = rng.gen_range(0.0..=vol * 0.5);
            let wick_down: f64 = rng.gen_range(0.0..=vol * 0.5);

            bars.push(Bar {
                index,
                timestamp,
                open,
                high: open.max(close) * (1.0 + wick_up),
                low: open.min(close) * (1.0 - wick_down),
                close,
                long_entry: rng.gen_bool(self.signal_rate),
                short_entry: rng.gen_bool(self.signal_rate),
                long_exit: rng.gen_bool(self.signal_rate),
                short_exit: rng.gen_bool(self.signal_rate),
            });

            price = close;
            timestamp += self.interval;
        }

        BarSeries::new(bars)
    }
}

/// Seed for dataset `index` of a family rooted at `master_seed`.
///
/// Derived by hashing, so it does not depend on generation order.
pub fn derive_seed(master_seed: u64, index: u64) -> u64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&master_seed.to_le_bytes());
    hasher.update(&index.to_le_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(bytes)
}
