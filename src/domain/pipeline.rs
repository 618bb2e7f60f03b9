//! Agent pipeline driver.
//!
//! A pipeline is an ordered list of stage groups. Stages inside one group
//! run concurrently and only see signals from earlier groups; groups run
//! one after another. Signals are appended in declared stage order, never
//! completion order, so a run is deterministic whatever the scheduling.
//!
//! A stage that fails or overruns its timeout, after its retry budget, is
//! replaced by a neutral signal and the step is logged as degraded. The
//! pipeline itself never fails.

use async_trait::async_trait;
use chrono::NaiveDate;
use futures::future::join_all;
use std::time::Duration;

use super::error::StageError;
use super::ohlcv::OhlcvBar;
use super::portfolio::PortfolioState;
use super::retry::RetryPolicy;
use super::signal::{AgentSignal, Decision, StageId};

/// Read-only view handed to each stage for one simulated date.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub symbol: &'a str,
    pub date: NaiveDate,
    /// Every bar up to and including `date`, nothing after it.
    pub bars: &'a [OhlcvBar],
    /// Signals already emitted for `date` by earlier groups.
    pub signals: &'a [AgentSignal],
    pub portfolio: PortfolioState,
}

impl AnalysisContext<'_> {
    pub fn close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    /// Latest signal emitted by `stage`, if it has run.
    pub fn signal(&self, stage: StageId) -> Option<&AgentSignal> {
        self.signals.iter().rev().find(|s| s.stage == stage)
    }
}

/// One decision step. Implementations must be deterministic for a
/// deterministic backtest.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub stage_timeout: Duration,
    pub stage_retry: RetryPolicy,
    /// When false every stage becomes its own group.
    pub parallel_analysts: bool,
    /// Force a hold on any date where at least one stage degraded.
    pub hold_on_degraded: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            stage_timeout: Duration::from_millis(5000),
            stage_retry: RetryPolicy::none(),
            parallel_analysts: true,
            hold_on_degraded: false,
        }
    }
}

/// Result of running every stage for one date.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub decision: Decision,
    pub signals: Vec<AgentSignal>,
    pub degraded: Vec<StageId>,
}

pub struct Pipeline {
    config: PipelineConfig,
    groups: Vec<Vec<Box<dyn Stage>>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Pipeline {
            config,
            groups: Vec::new(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Append a stage as its own sequential group.
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.groups.push(vec![Box::new(stage)]);
        self
    }

    /// Append stages that may run concurrently. Split into sequential
    /// groups when `parallel_analysts` is off.
    pub fn then_group(mut self, stages: Vec<Box<dyn Stage>>) -> Self {
        if stages.is_empty() {
            return self;
        }
        if self.config.parallel_analysts {
            self.groups.push(stages);
        } else {
            self.groups.extend(stages.into_iter().map(|s| vec![s]));
        }
        self
    }

    /// Stage ids grouped the way they will run.
    pub fn layout(&self) -> Vec<Vec<StageId>> {
        self.groups
            .iter()
            .map(|g| g.iter().map(|s| s.id()).collect())
            .collect()
    }

    pub fn contains(&self, id: StageId) -> bool {
        self.groups.iter().flatten().any(|s| s.id() == id)
    }

    /// Run all groups for `date` and derive the final decision.
    ///
    /// The decision comes from the last portfolio manager signal. When the
    /// pipeline has a risk stage, the decision quantity is capped by the
    /// risk bound, and a missing bound means no trade.
    pub async fn run(
        &self,
        symbol: &str,
        date: NaiveDate,
        bars: &[OhlcvBar],
        portfolio: PortfolioState,
    ) -> PipelineOutcome {
        let mut signals: Vec<AgentSignal> = Vec::new();

        for group in &self.groups {
            let emitted = {
                let ctx = AnalysisContext {
                    symbol,
                    date,
                    bars,
                    signals: &signals,
                    portfolio,
                };
                join_all(group.iter().map(|stage| self.evaluate(stage.as_ref(), &ctx))).await
            };
            signals.extend(emitted);
        }

        for s in &signals {
            log::debug!(
                "{} {} score={:.2} confidence={:.2}: {}",
                date,
                s.stage,
                s.score,
                s.confidence,
                s.rationale
            );
        }

        let degraded: Vec<StageId> = signals
            .iter()
            .filter(|s| s.degraded)
            .map(|s| s.stage)
            .collect();

        let mut decision = signals
            .iter()
            .rev()
            .find(|s| s.stage == StageId::PortfolioManager)
            .and_then(AgentSignal::decision)
            .map(|d| Decision::new(d.action, d.quantity))
            .unwrap_or_else(Decision::hold);

        if self.contains(StageId::Risk) {
            let bound = signals
                .iter()
                .rev()
                .find(|s| s.stage == StageId::Risk)
                .and_then(AgentSignal::max_position_delta)
                .unwrap_or(0.0);
            decision = decision.clamped(bound.max(0.0));
        }

        if self.config.hold_on_degraded && !degraded.is_empty() {
            decision = Decision::hold();
        }

        PipelineOutcome {
            decision,
            signals,
            degraded,
        }
    }

    async fn evaluate(&self, stage: &dyn Stage, ctx: &AnalysisContext<'_>) -> AgentSignal {
        let id = stage.id();
        let timeout = self.config.stage_timeout;
        let context = format!("{} stage on {}", id, ctx.date);

        let result = self
            .config
            .stage_retry
            .run(&context, move |_| async move {
                match tokio::time::timeout(timeout, stage.evaluate(ctx)).await {
                    Ok(result) => result,
                    Err(_) => Err(StageError::TimedOut {
                        after_ms: timeout.as_millis() as u64,
                    }),
                }
            })
            .await;

        match result {
            Ok(mut signal) => {
                signal.stage = id;
                signal
            }
            Err(e) => {
                log::warn!(
                    "degraded step: date={} stage={} reason={}",
                    ctx.date,
                    id,
                    e
                );
                AgentSignal::neutral(id, e.to_string())
            }
        }
    }
}
