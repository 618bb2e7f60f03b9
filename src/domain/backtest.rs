//! Backtest engine.
//!
//! One engine owns one run: `Initialized -> Running -> Completed`, or
//! `Initialized -> Failed` when the market data cannot cover the requested
//! range. Dates are simulated strictly in order and each date only ever
//! sees bars up to and including itself.
//!
//! Fills happen at the close of the simulated date with no slippage and
//! no fees.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::fmt;

use super::error::FundsimError;
use super::execution::{ExecutionWarning, execute};
use super::metrics::Statistics;
use super::ohlcv::Series;
use super::pipeline::Pipeline;
use super::portfolio::{EquityPoint, PortfolioState};
use super::signal::{Action, AgentSignal, StageId};
use crate::ports::data_port::DataPort;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub starting_cash: f64,
    /// Days of history before `start_date` fetched for indicator warm-up.
    pub lookback_days: i64,
    /// Record hold days too, not only trades.
    pub record_holds: bool,
    /// Largest calendar gap tolerated between bars in the range.
    pub max_gap_days: i64,
}

impl BacktestConfig {
    pub fn new(symbol: impl Into<String>, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        BacktestConfig {
            symbol: symbol.into(),
            start_date,
            end_date,
            starting_cash: 100_000.0,
            lookback_days: 60,
            record_holds: true,
            max_gap_days: 7,
        }
    }

    /// First date fetched from the data port.
    pub fn fetch_start(&self) -> NaiveDate {
        self.start_date - Duration::days(self.lookback_days.max(0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Initialized,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineState::Initialized => write!(f, "initialized"),
            EngineState::Running => write!(f, "running"),
            EngineState::Completed => write!(f, "completed"),
            EngineState::Failed => write!(f, "failed"),
        }
    }
}

/// One simulated day, after execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub date: NaiveDate,
    pub symbol: String,
    /// What was executed; a rejected trade is recorded as `Hold` with a
    /// warning.
    pub action: Action,
    pub price: f64,
    pub quantity: f64,
    pub trade_value: f64,
    pub cash_after: f64,
    pub quantity_after: f64,
    pub equity_after: f64,
    pub realized_pnl: Option<f64>,
    pub warning: Option<ExecutionWarning>,
    pub degraded_stages: Vec<StageId>,
    /// Every stage's signal for the day, in pipeline order.
    pub signals: Vec<AgentSignal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub records: Vec<TradeRecord>,
    /// One point per simulated date, whether or not it was recorded.
    pub equity_curve: Vec<EquityPoint>,
    pub statistics: Statistics,
    /// Dates on which at least one stage degraded.
    pub degraded_days: Vec<NaiveDate>,
    pub final_portfolio: PortfolioState,
}

pub struct BacktestEngine<'p> {
    config: BacktestConfig,
    pipeline: &'p Pipeline,
    state: EngineState,
}

impl<'p> BacktestEngine<'p> {
    pub fn new(config: BacktestConfig, pipeline: &'p Pipeline) -> Self {
        BacktestEngine {
            config,
            pipeline,
            state: EngineState::Initialized,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    fn transition(&mut self, next: EngineState) {
        log::info!(
            "backtest {}: {} -> {}",
            self.config.symbol,
            self.state,
            next
        );
        self.state = next;
    }

    fn fail(&mut self, err: FundsimError) -> FundsimError {
        log::error!("backtest {} failed: {}", self.config.symbol, err);
        self.transition(EngineState::Failed);
        err
    }

    /// Fetch the series from `data` and run over it.
    pub async fn run(&mut self, data: &dyn DataPort) -> Result<BacktestResult, FundsimError> {
        if self.config.start_date > self.config.end_date {
            let err = FundsimError::InvalidRange {
                start: self.config.start_date,
                end: self.config.end_date,
            };
            return Err(self.fail(err));
        }

        log::info!(
            "backtest {}: {} to {}, starting cash {:.2}",
            self.config.symbol,
            self.config.start_date,
            self.config.end_date,
            self.config.starting_cash
        );

        let fetched = data
            .fetch_series(
                &self.config.symbol,
                self.config.fetch_start(),
                self.config.end_date,
            )
            .await;
        match fetched {
            Ok(series) => self.run_series(&series).await,
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Run over an already loaded series. Bars before `start_date` only
    /// feed the indicators.
    pub async fn run_series(&mut self, series: &Series) -> Result<BacktestResult, FundsimError> {
        if self.state != EngineState::Initialized {
            return Err(FundsimError::EngineReused {
                symbol: self.config.symbol.clone(),
                state: self.state.to_string(),
            });
        }
        if let Err(err) = check_coverage(&self.config, series) {
            return Err(self.fail(err));
        }

        self.transition(EngineState::Running);
        let result = self.simulate(series).await;
        self.transition(EngineState::Completed);

        log::info!(
            "backtest {}: {} days, {} trades, return {:.2}%, {} degraded days",
            self.config.symbol,
            result.equity_curve.len(),
            result.statistics.total_trades,
            result.statistics.total_return_pct,
            result.degraded_days.len()
        );
        Ok(result)
    }

    async fn simulate(&self, series: &Series) -> BacktestResult {
        let config = &self.config;
        let mut portfolio = PortfolioState::new(config.starting_cash);
        let mut records = Vec::new();
        let mut equity_curve = Vec::new();
        let mut degraded_days = Vec::new();

        for bar in series.within(config.start_date, config.end_date) {
            let visible = series.through(bar.date);
            let outcome = self
                .pipeline
                .run(&config.symbol, bar.date, visible, portfolio)
                .await;

            let fill = execute(&mut portfolio, outcome.decision, bar.date, bar.close);
            let equity = portfolio.total_equity();

            log::debug!(
                "{} {}: {} {:.6} @ {:.2}, cash {:.2}, qty {:.6}, equity {:.2}",
                bar.date,
                config.symbol,
                fill.action,
                fill.quantity,
                bar.close,
                portfolio.cash,
                portfolio.position.quantity,
                equity
            );

            if !outcome.degraded.is_empty() {
                degraded_days.push(bar.date);
            }
            equity_curve.push(EquityPoint {
                date: bar.date,
                equity,
            });

            if config.record_holds || fill.action != Action::Hold || fill.warning.is_some() {
                records.push(TradeRecord {
                    date: bar.date,
                    symbol: config.symbol.clone(),
                    action: fill.action,
                    price: fill.price,
                    quantity: fill.quantity,
                    trade_value: fill.value,
                    cash_after: portfolio.cash,
                    quantity_after: portfolio.position.quantity,
                    equity_after: equity,
                    realized_pnl: fill.realized_pnl,
                    warning: fill.warning,
                    degraded_stages: outcome.degraded,
                    signals: outcome.signals,
                });
            }
        }

        let statistics = Statistics::compute(&records, &equity_curve, config.starting_cash);
        BacktestResult {
            config: config.clone(),
            records,
            equity_curve,
            statistics,
            degraded_days,
            final_portfolio: portfolio,
        }
    }
}

/// Fetch, validate and simulate in one call.
pub async fn run_backtest(
    data: &dyn DataPort,
    config: BacktestConfig,
    pipeline: &Pipeline,
) -> Result<BacktestResult, FundsimError> {
    BacktestEngine::new(config, pipeline).run(data).await
}

/// The series must have bars in the range, and no stretch of the range,
/// including its two ends, may go longer than `max_gap_days` without one.
fn check_coverage(config: &BacktestConfig, series: &Series) -> Result<(), FundsimError> {
    let (start, end) = (config.start_date, config.end_date);
    if start > end {
        return Err(FundsimError::InvalidRange { start, end });
    }
    let in_range = series.within(start, end);

    let (Some(first), Some(last)) = (in_range.first(), in_range.last()) else {
        return Err(FundsimError::DataUnavailable {
            symbol: config.symbol.clone(),
            reason: format!("no bars between {} and {}", start, end),
        });
    };

    let missing = |reason: String| FundsimError::InvalidSeries {
        symbol: config.symbol.clone(),
        reason,
    };
    let max_gap = config.max_gap_days.max(1);

    let lead = (first.date - start).num_days();
    if lead >= max_gap {
        return Err(missing(format!(
            "missing data: first bar {} is {} days after start {}",
            first.date, lead, start
        )));
    }
    let tail = (end - last.date).num_days();
    if tail >= max_gap {
        return Err(missing(format!(
            "missing data: last bar {} is {} days before end {}",
            last.date, tail, end
        )));
    }
    match series.largest_gap(start, end) {
        Some((date, days)) if days > max_gap => Err(missing(format!(
            "missing data: {} day gap before {}",
            days, date
        ))),
        _ => Ok(()),
    }
}
