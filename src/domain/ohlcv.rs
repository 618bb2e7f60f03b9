//! OHLCV bars and the validated per-symbol series.

use chrono::NaiveDate;

use super::error::FundsimError;

#[derive(Debug, Clone, PartialEq)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl OhlcvBar {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }
}

/// Ordered bars for one symbol.
///
/// Dates are strictly increasing and every value is finite and
/// non-negative; construction through [`Series::new`] enforces both.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    symbol: String,
    bars: Vec<OhlcvBar>,
}

impl Series {
    pub fn new(symbol: impl Into<String>, bars: Vec<OhlcvBar>) -> Result<Self, FundsimError> {
        let symbol = symbol.into();

        for bar in &bars {
            if !bar.is_well_formed() {
                return Err(FundsimError::InvalidSeries {
                    symbol,
                    reason: format!("malformed bar on {}", bar.date),
                });
            }
        }

        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                let reason = if pair[1].date == pair[0].date {
                    format!("duplicate date {}", pair[1].date)
                } else {
                    format!("date {} follows {}", pair[1].date, pair[0].date)
                };
                return Err(FundsimError::InvalidSeries { symbol, reason });
            }
        }

        Ok(Series { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[OhlcvBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    /// All bars dated on or before `date`. Later bars are never visible
    /// through the returned slice.
    pub fn through(&self, date: NaiveDate) -> &[OhlcvBar] {
        let end = self.bars.partition_point(|b| b.date <= date);
        &self.bars[..end]
    }

    /// Bars dated within `[start, end]`.
    pub fn within(&self, start: NaiveDate, end: NaiveDate) -> &[OhlcvBar] {
        let from = self.bars.partition_point(|b| b.date < start);
        let to = self.bars.partition_point(|b| b.date <= end);
        if from >= to {
            return &[];
        }
        &self.bars[from..to]
    }

    /// Largest calendar gap in days between consecutive bars inside
    /// `[start, end]`, with the gap found on the later date.
    pub fn largest_gap(&self, start: NaiveDate, end: NaiveDate) -> Option<(NaiveDate, i64)> {
        self.within(start, end)
            .windows(2)
            .map(|w| (w[1].date, (w[1].date - w[0].date).num_days()))
            .max_by_key(|&(_, days)| days)
    }
}
