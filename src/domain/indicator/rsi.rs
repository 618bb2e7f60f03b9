//! RSI (Relative Strength Index) indicator implementation.
//!
//! Two smoothing conventions are supported, selected per call:
//!
//! - [`RsiSmoothing::Wilder`] (default): the first average is the simple
//!   mean of the first n gains/losses, then
//!   `avg = (prev_avg * (n-1) + current) / n`.
//! - [`RsiSmoothing::Simple`]: each average is the plain mean of the last n
//!   gains/losses.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100
//!
//! The first bar has no prior close and contributes no change.
//! Warmup: first n bars are invalid (need n price changes).

use std::fmt;
use std::str::FromStr;

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RsiSmoothing {
    #[default]
    Wilder,
    Simple,
}

impl fmt::Display for RsiSmoothing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RsiSmoothing::Wilder => write!(f, "wilder"),
            RsiSmoothing::Simple => write!(f, "simple"),
        }
    }
}

impl FromStr for RsiSmoothing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wilder" => Ok(RsiSmoothing::Wilder),
            "simple" | "sma" => Ok(RsiSmoothing::Simple),
            other => Err(format!("unknown RSI smoothing '{}'", other)),
        }
    }
}

pub fn calculate_rsi(bars: &[OhlcvBar], period: usize, smoothing: RsiSmoothing) -> IndicatorSeries {
    let indicator_type = IndicatorType::Rsi { period, smoothing };
    let invalid = |bar: &OhlcvBar| IndicatorPoint {
        date: bar.date,
        valid: false,
        value: IndicatorValue::Simple(0.0),
    };

    if period == 0 || bars.len() < 2 {
        return IndicatorSeries {
            indicator_type,
            values: bars.iter().map(invalid).collect(),
        };
    }

    let mut gains: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    let mut losses: Vec<f64> = Vec::with_capacity(bars.len() - 1);
    for pair in bars.windows(2) {
        let change = pair[1].close - pair[0].close;
        gains.push(change.max(0.0));
        losses.push((-change).max(0.0));
    }

    let mut values = Vec::with_capacity(bars.len());
    values.push(invalid(&bars[0]));

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for (i, bar) in bars.iter().enumerate().skip(1) {
        let gain_idx = i - 1;

        if gain_idx + 1 < period {
            values.push(invalid(bar));
            continue;
        }

        let window_start = gain_idx + 1 - period;
        match smoothing {
            RsiSmoothing::Wilder if gain_idx + 1 > period => {
                avg_gain = (avg_gain * (period - 1) as f64 + gains[gain_idx]) / period as f64;
                avg_loss = (avg_loss * (period - 1) as f64 + losses[gain_idx]) / period as f64;
            }
            _ => {
                avg_gain = gains[window_start..=gain_idx].iter().sum::<f64>() / period as f64;
                avg_loss = losses[window_start..=gain_idx].iter().sum::<f64>() / period as f64;
            }
        }

        let rsi = if avg_loss == 0.0 {
            100.0
        } else {
            100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
        };
        values.push(IndicatorPoint {
            date: bar.date,
            valid: true,
            value: IndicatorValue::Simple(rsi),
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}
