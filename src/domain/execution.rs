//! Applying a [`Decision`] to the portfolio.
//!
//! Every fill happens at the close of the simulated date. There is no
//! slippage model and no commission: the close is the execution price.
//!
//! Requests that would overdraw cash or oversell the position are clamped
//! and the clamp is reported as an [`ExecutionWarning`] rather than dropped.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

use super::portfolio::PortfolioState;
use super::signal::{Action, Decision};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionWarning {
    /// Buy reduced to what cash could pay for.
    BuyClamped { requested: f64, executed: f64 },
    /// Buy skipped entirely: no cash (or no valid price).
    InsufficientCash { requested: f64 },
    /// Sell reduced to the held quantity.
    SellClamped { requested: f64, executed: f64 },
    /// Sell skipped entirely: nothing held.
    NothingToSell { requested: f64 },
}

impl fmt::Display for ExecutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionWarning::BuyClamped {
                requested,
                executed,
            } => write!(f, "buy clamped from {} to {}", requested, executed),
            ExecutionWarning::InsufficientCash { requested } => {
                write!(f, "buy of {} rejected: insufficient cash", requested)
            }
            ExecutionWarning::SellClamped {
                requested,
                executed,
            } => write!(f, "sell clamped from {} to {}", requested, executed),
            ExecutionWarning::NothingToSell { requested } => {
                write!(f, "sell of {} rejected: no position", requested)
            }
        }
    }
}

/// What actually happened when a decision was applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// `Hold` when nothing was executed, even if a trade was requested.
    pub action: Action,
    pub quantity: f64,
    pub price: f64,
    pub value: f64,
    /// Proceeds minus cost basis of the units sold; sells only.
    pub realized_pnl: Option<f64>,
    pub warning: Option<ExecutionWarning>,
}

impl Fill {
    fn none(price: f64, warning: Option<ExecutionWarning>) -> Self {
        Fill {
            action: Action::Hold,
            quantity: 0.0,
            price,
            value: 0.0,
            realized_pnl: None,
            warning,
        }
    }
}

/// Apply `decision` at `price` on `date`.
///
/// The portfolio is updated all at once at the end, and it is revalued at
/// `price` whatever the outcome.
pub fn execute(
    portfolio: &mut PortfolioState,
    decision: Decision,
    date: NaiveDate,
    price: f64,
) -> Fill {
    // Stages can build a raw Decision; normalize before touching cash.
    let decision = Decision::new(decision.action, decision.quantity);
    let mut next = *portfolio;
    next.revalue(date, price);

    let fill = match decision.action {
        Action::Hold => Fill::none(price, None),
        Action::Buy => buy(&mut next, decision.quantity, price),
        Action::Sell => sell(&mut next, decision.quantity, price),
    };

    if let Some(warning) = fill.warning {
        log::warn!("{}: {}", date, warning);
    }

    *portfolio = next;
    fill
}

fn buy(portfolio: &mut PortfolioState, requested: f64, price: f64) -> Fill {
    let affordable = portfolio.affordable_quantity(price);
    if affordable <= 0.0 {
        return Fill::none(price, Some(ExecutionWarning::InsufficientCash { requested }));
    }

    let (quantity, warning) = if requested > affordable {
        (
            affordable,
            Some(ExecutionWarning::BuyClamped {
                requested,
                executed: affordable,
            }),
        )
    } else {
        (requested, None)
    };

    let value = quantity * price;
    portfolio.cash = (portfolio.cash - value).max(0.0);
    portfolio.position.add(quantity, price);

    Fill {
        action: Action::Buy,
        quantity,
        price,
        value,
        realized_pnl: None,
        warning,
    }
}

fn sell(portfolio: &mut PortfolioState, requested: f64, price: f64) -> Fill {
    if portfolio.position.is_flat() {
        return Fill::none(price, Some(ExecutionWarning::NothingToSell { requested }));
    }

    let (quantity, basis) = portfolio.position.remove(requested);
    let warning = (quantity < requested).then_some(ExecutionWarning::SellClamped {
        requested,
        executed: quantity,
    });

    let value = quantity * price;
    portfolio.cash += value;

    Fill {
        action: Action::Sell,
        quantity,
        price,
        value,
        realized_pnl: Some(value - basis),
        warning,
    }
}
