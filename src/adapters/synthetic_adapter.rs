//! Deterministic synthetic market data.
//!
//! Daily bars (weekends included) follow a bounded random walk around a
//! per-symbol base price. The walk always starts at [`epoch`], so a given
//! seed produces the same bar for a given date no matter which range is
//! requested.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::error::FundsimError;
use crate::domain::ohlcv::{OhlcvBar, Series};
use crate::ports::data_port::DataPort;

/// Symbols the generator knows, with their base prices.
const BASE_PRICES: &[(&str, f64)] = &[
    ("ADA", 0.45),
    ("AVAX", 40.0),
    ("BNB", 230.0),
    ("BTC", 43_000.0),
    ("DOGE", 0.095),
    ("DOT", 7.5),
    ("ETH", 2_250.0),
    ("MATIC", 0.8),
    ("SOL", 70.0),
    ("XRP", 0.6),
];

const MAX_DAILY_MOVE: f64 = 0.03;
const PRICE_FLOOR: f64 = 0.8;
const PRICE_CEILING: f64 = 1.2;

/// First date of every generated walk.
pub fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub struct SyntheticAdapter {
    seed: u64,
}

impl SyntheticAdapter {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    fn base_price(symbol: &str) -> Option<f64> {
        BASE_PRICES
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, p)| *p)
    }

    /// FNV-1a over the symbol, mixed with the configured seed.
    fn symbol_seed(&self, symbol: &str) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in symbol.bytes() {
            hash ^= u64::from(byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        hash ^ self.seed
    }

    fn generate(&self, symbol: &str, base: f64, end: NaiveDate) -> Vec<OhlcvBar> {
        let mut rng = StdRng::seed_from_u64(self.symbol_seed(symbol));
        let trend: f64 = rng.gen_range(-0.2..0.2);
        let volatility: f64 = rng.gen_range(0.005..0.015);
        let drift = trend / 250.0;

        let min_price = base * PRICE_FLOOR;
        let max_price = base * PRICE_CEILING;

        let mut bars = Vec::new();
        let mut price = base;
        let mut date = epoch();

        while date <= end {
            let change = (rng.gen_range(-volatility..volatility) + drift)
                .clamp(-MAX_DAILY_MOVE, MAX_DAILY_MOVE);
            price = (price * (1.0 + change)).clamp(min_price, max_price);

            let daily_vol = volatility * rng.gen_range(0.5..1.5);
            let open = price * (1.0 + rng.gen_range(-daily_vol..daily_vol));
            let high = open.max(price) * (1.0 + rng.gen_range(0.0..daily_vol));
            let low = open.min(price) * (1.0 - rng.gen_range(0.0..daily_vol));
            let volume = base * 1_000_000.0 * (1.0 + change.abs() * 5.0) * rng.gen_range(0.8..1.2);

            bars.push(OhlcvBar {
                date,
                open,
                high,
                low,
                close: price,
                volume,
            });
            date += Duration::days(1);
        }

        bars
    }
}

#[async_trait]
impl DataPort for SyntheticAdapter {
    async fn fetch_series(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Series, FundsimError> {
        let base = Self::base_price(symbol).ok_or_else(|| FundsimError::UnknownSymbol {
            symbol: symbol.to_string(),
            reason: "unsupported symbol".to_string(),
        })?;

        let start = start_date.max(epoch());
        if start > end_date {
            return Err(FundsimError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no synthetic bars before {}", epoch()),
            });
        }

        let bars: Vec<OhlcvBar> = self
            .generate(symbol, base, end_date)
            .into_iter()
            .filter(|b| b.date >= start)
            .collect();

        log::debug!(
            "Generated {} synthetic bars for {} ({} to {})",
            bars.len(),
            symbol,
            start,
            end_date
        );
        Series::new(symbol, bars)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FundsimError> {
        Ok(BASE_PRICES.iter().map(|(s, _)| s.to_string()).collect())
    }
}
