//! Summary statistics over a finished run.
//!
//! Conventions:
//!
//! - returns and drawdowns are percentages
//! - per-period returns come from the equity curve, one point per
//!   simulated date, and are annualized by the sampling frequency inferred
//!   from the curve's median date spacing
//! - no risk-free rate is subtracted
//! - a ratio whose denominator is zero is `None`, never 0 or infinity

use chrono::NaiveDate;
use serde::Serialize;

use super::backtest::TradeRecord;
use super::portfolio::EquityPoint;
use super::signal::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SamplingFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl SamplingFrequency {
    pub fn periods_per_year(self) -> f64 {
        match self {
            SamplingFrequency::Daily => 252.0,
            SamplingFrequency::Weekly => 52.0,
            SamplingFrequency::Monthly => 12.0,
        }
    }

    /// Infer from the median calendar gap between consecutive dates.
    /// Daily when there are fewer than two dates.
    pub fn infer(dates: &[NaiveDate]) -> Self {
        let mut gaps: Vec<i64> = dates
            .windows(2)
            .map(|w| (w[1] - w[0]).num_days())
            .collect();
        if gaps.is_empty() {
            return SamplingFrequency::Daily;
        }
        gaps.sort_unstable();
        match gaps[gaps.len() / 2] {
            ..=3 => SamplingFrequency::Daily,
            4..=10 => SamplingFrequency::Weekly,
            _ => SamplingFrequency::Monthly,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statistics {
    /// Non-hold records.
    pub total_trades: usize,
    pub buys: usize,
    pub sells: usize,
    /// Sells whose proceeds exceeded the cost basis of the units sold.
    pub profitable_sells: usize,
    /// `profitable_sells / sells`.
    pub win_rate: Option<f64>,
    pub realized_pnl: f64,
    /// Records carrying an execution warning.
    pub clamped_executions: usize,
    pub initial_cash: f64,
    pub final_equity: f64,
    pub total_return_pct: f64,
    pub annualized_return_pct: f64,
    pub max_drawdown_pct: f64,
    /// Longest run of periods spent below a prior peak.
    pub max_drawdown_duration: i64,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub frequency: SamplingFrequency,
}

impl Statistics {
    pub fn compute(records: &[TradeRecord], equity_curve: &[EquityPoint], initial_cash: f64) -> Self {
        let mut buys = 0usize;
        let mut sells = 0usize;
        let mut profitable_sells = 0usize;
        let mut realized_pnl = 0.0_f64;
        let mut clamped_executions = 0usize;

        for record in records {
            match record.action {
                Action::Buy => buys += 1,
                Action::Sell => {
                    sells += 1;
                    let pnl = record.realized_pnl.unwrap_or(0.0);
                    realized_pnl += pnl;
                    if pnl > 0.0 {
                        profitable_sells += 1;
                    }
                }
                Action::Hold => {}
            }
            if record.warning.is_some() {
                clamped_executions += 1;
            }
        }

        let win_rate = (sells > 0).then(|| profitable_sells as f64 / sells as f64);

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_cash);

        let total_return = if initial_cash > 0.0 {
            final_equity / initial_cash - 1.0
        } else {
            0.0
        };

        let dates: Vec<NaiveDate> = equity_curve.iter().map(|p| p.date).collect();
        let frequency = SamplingFrequency::infer(&dates);
        let periods_per_year = frequency.periods_per_year();

        let periods = equity_curve.len().saturating_sub(1) as f64;
        let years = periods / periods_per_year;
        let annualized_return = if years > 0.0 && total_return > -1.0 {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(equity_curve);
        let (sharpe_ratio, sortino_ratio) = compute_risk_adjusted(equity_curve, periods_per_year);

        Statistics {
            total_trades: buys + sells,
            buys,
            sells,
            profitable_sells,
            win_rate,
            realized_pnl,
            clamped_executions,
            initial_cash,
            final_equity,
            total_return_pct: total_return * 100.0,
            annualized_return_pct: annualized_return * 100.0,
            max_drawdown_pct: max_drawdown * 100.0,
            max_drawdown_duration,
            sharpe_ratio,
            sortino_ratio,
            frequency,
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak, and the
/// longest stretch below a peak in periods.
fn compute_drawdown(equity_curve: &[EquityPoint]) -> (f64, i64) {
    let Some(first) = equity_curve.first() else {
        return (0.0, 0);
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0i64;
    let mut current_dd_duration = 0i64;

    for point in equity_curve {
        if point.equity >= peak {
            peak = point.equity;
            current_dd_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
            current_dd_duration += 1;
            max_dd_duration = max_dd_duration.max(current_dd_duration);
        }
    }

    (max_dd, max_dd_duration)
}

fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            if prev > 0.0 {
                w[1].equity / prev - 1.0
            } else {
                0.0
            }
        })
        .collect()
}

fn compute_risk_adjusted(
    equity_curve: &[EquityPoint],
    periods_per_year: f64,
) -> (Option<f64>, Option<f64>) {
    let returns = period_returns(equity_curve);
    if returns.len() < 2 {
        return (None, None);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;
    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let annualize = periods_per_year.sqrt();

    // Constant curves can leave float dust in the variance.
    let sharpe = (stddev > 1e-12).then(|| mean / stddev * annualize);

    let downside_variance: f64 = returns
        .iter()
        .filter(|&&r| r < 0.0)
        .map(|r| r.powi(2))
        .sum::<f64>()
        / n;
    let downside = downside_variance.sqrt();
    let sortino = (downside > 1e-12).then(|| mean / downside * annualize);

    (sharpe, sortino)
}
