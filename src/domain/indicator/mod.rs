//! Technical indicator implementations.
//!
//! Every `calculate_*` function is pure: it takes a bar slice and its
//! parameters and returns one [`IndicatorPoint`] per bar. A point is
//! `valid` only once the window behind it is full, and it is computed from
//! that bar and earlier bars only. Callers that pass a prefix ending at
//! date *d* (see [`crate::domain::ohlcv::Series::through`]) therefore get
//! values that cannot see the future.
//!
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters
//! - `IndicatorSeries`: A time series of indicator values
//! - `IndicatorSnapshot`: The value of one indicator at one date, if any

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod rsi;

pub use bollinger::calculate_bollinger;
pub use ema::calculate_ema;
pub use macd::calculate_macd;
pub use obv::calculate_obv;
pub use rsi::{RsiSmoothing, calculate_rsi};

use chrono::NaiveDate;
use std::fmt;

use crate::domain::ohlcv::OhlcvBar;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

impl IndicatorValue {
    pub fn as_simple(&self) -> Option<f64> {
        match self {
            IndicatorValue::Simple(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi {
        period: usize,
        smoothing: RsiSmoothing,
    },
    Obv,
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    /// Value of the last point, or `None` if it is still warming up.
    pub fn latest(&self) -> Option<IndicatorValue> {
        self.values.last().filter(|p| p.valid).map(|p| p.value)
    }

    /// Value of the point `back` bars before the last one, if valid.
    pub fn nth_back(&self, back: usize) -> Option<IndicatorValue> {
        let idx = self.values.len().checked_sub(back + 1)?;
        let point = &self.values[idx];
        point.valid.then_some(point.value)
    }
}

/// One indicator's value at one date. `value` is `None` when the bars up
/// to `date` are too few for the indicator's window.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSnapshot {
    pub date: NaiveDate,
    pub indicator_type: IndicatorType,
    pub value: Option<IndicatorValue>,
}

/// Compute any supported indicator over `bars`.
pub fn compute(bars: &[OhlcvBar], indicator_type: &IndicatorType) -> IndicatorSeries {
    match *indicator_type {
        IndicatorType::Ema(period) => calculate_ema(bars, period),
        IndicatorType::Rsi { period, smoothing } => calculate_rsi(bars, period, smoothing),
        IndicatorType::Obv => calculate_obv(bars),
        IndicatorType::Macd { fast, slow, signal } => calculate_macd(bars, fast, slow, signal),
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => calculate_bollinger(bars, period, stddev_mult_x100),
    }
}

/// Snapshot of `indicator_type` at the last bar of `bars`.
///
/// Returns `None` for an empty slice, since there is no date to report.
pub fn snapshot(bars: &[OhlcvBar], indicator_type: &IndicatorType) -> Option<IndicatorSnapshot> {
    let date = bars.last()?.date;
    let series = compute(bars, indicator_type);
    Some(IndicatorSnapshot {
        date,
        indicator_type: indicator_type.clone(),
        value: series.latest(),
    })
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi { period, smoothing } => {
                write!(f, "RSI({},{})", period, smoothing)
            }
            IndicatorType::Obv => write!(f, "OBV"),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => {
                let mult = *stddev_mult_x100 as f64 / 100.0;
                write!(f, "BOLLINGER({},{})", period, mult)
            }
        }
    }
}

impl fmt::Display for IndicatorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorValue::Simple(v) => write!(f, "{:.4}", v),
            IndicatorValue::Macd {
                line,
                signal,
                histogram,
            } => write!(
                f,
                "line={:.4} signal={:.4} histogram={:.4}",
                line, signal, histogram
            ),
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => write!(
                f,
                "upper={:.4} middle={:.4} lower={:.4}",
                upper, middle, lower
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_bars(prices: &[f64]) -> Vec<OhlcvBar> {
        prices
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcvBar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
                    + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    #[test]
    fn indicator_type_display_macd() {
        let macd = IndicatorType::Macd {
            fast: 12,
            slow: 26,
            signal: 9,
        };
        assert_eq!(macd.to_string(), "MACD(12,26,9)");
    }

    #[test]
    fn indicator_type_display_bollinger() {
        let boll = IndicatorType::Bollinger {
            period: 20,
            stddev_mult_x100: 200,
        };
        assert_eq!(boll.to_string(), "BOLLINGER(20,2)");
    }

    #[test]
    fn indicator_type_display_rsi() {
        let rsi = IndicatorType::Rsi {
            period: 14,
            smoothing: RsiSmoothing::Wilder,
        };
        assert_eq!(rsi.to_string(), "RSI(14,wilder)");
    }

    #[test]
    fn snapshot_reports_insufficient_data() {
        let bars = make_bars(&[1.0, 2.0]);
        let snap = snapshot(&bars, &IndicatorType::Ema(5)).unwrap();
        assert_eq!(snap.date, bars[1].date);
        assert!(snap.value.is_none());
    }

    #[test]
    fn snapshot_of_empty_prefix_is_none() {
        assert!(snapshot(&[], &IndicatorType::Obv).is_none());
    }

    #[test]
    fn snapshot_ignores_bars_after_prefix() {
        let mut bars = make_bars(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0]);
        let ema = IndicatorType::Ema(3);
        let before = snapshot(&bars[..4], &ema).unwrap();

        bars[4].close = 1_000.0;
        bars[5].close = 0.0;
        let after = snapshot(&bars[..4], &ema).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn nth_back_walks_from_the_end() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0]);
        let series = calculate_ema(&bars, 3);
        assert!(series.nth_back(0).is_some());
        assert!(series.nth_back(1).is_some());
        assert!(series.nth_back(2).is_none());
        assert!(series.nth_back(10).is_none());
    }
}
