//! Portfolio state and equity tracking.

use chrono::NaiveDate;
use serde::Serialize;

use super::position::Position;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Cash plus a single-symbol position, valued at one date.
///
/// Owned by one backtest run. Stages only ever see a copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PortfolioState {
    pub cash: f64,
    pub initial_cash: f64,
    pub position: Position,
    pub valuation_date: Option<NaiveDate>,
    pub valuation_price: f64,
}

impl PortfolioState {
    pub fn new(initial_cash: f64) -> Self {
        PortfolioState {
            cash: initial_cash,
            initial_cash,
            position: Position::default(),
            valuation_date: None,
            valuation_price: 0.0,
        }
    }

    /// Mark the portfolio to `price` on `date`.
    pub fn revalue(&mut self, date: NaiveDate, price: f64) {
        self.valuation_date = Some(date);
        self.valuation_price = price;
    }

    pub fn equity_at(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    /// Equity at the last valuation price.
    pub fn total_equity(&self) -> f64 {
        self.equity_at(self.valuation_price)
    }

    /// Open position gain at the last valuation price.
    pub fn unrealized_pnl(&self) -> f64 {
        self.position.unrealized_pnl(self.valuation_price)
    }

    /// Units of the symbol `cash` can pay for at `price`.
    pub fn affordable_quantity(&self, price: f64) -> f64 {
        if price > 0.0 { self.cash / price } else { 0.0 }
    }
}
