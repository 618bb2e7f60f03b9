//! Long-only position with weighted-average cost basis.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Position {
    pub quantity: f64,
    pub avg_cost: f64,
}

impl Position {
    pub fn is_flat(&self) -> bool {
        self.quantity <= 0.0
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity * price
    }

    pub fn cost_basis(&self) -> f64 {
        self.quantity * self.avg_cost
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.quantity * (price - self.avg_cost)
    }

    /// Add `quantity` units bought at `price`, re-weighting the cost basis.
    pub fn add(&mut self, quantity: f64, price: f64) {
        if quantity <= 0.0 {
            return;
        }
        let total = self.quantity + quantity;
        self.avg_cost = (self.cost_basis() + quantity * price) / total;
        self.quantity = total;
    }

    /// Remove up to `quantity` units and return `(removed, cost_basis_removed)`.
    ///
    /// The average cost of the remaining units is unchanged; a position that
    /// goes flat resets its cost basis.
    pub fn remove(&mut self, quantity: f64) -> (f64, f64) {
        let removed = quantity.clamp(0.0, self.quantity);
        let basis = removed * self.avg_cost;
        self.quantity -= removed;
        if self.quantity <= 0.0 {
            self.quantity = 0.0;
            self.avg_cost = 0.0;
        }
        (removed, basis)
    }
}
