#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use fundsim::domain::error::{FundsimError, StageError};
pub use fundsim::domain::ohlcv::{OhlcvBar, Series};
use fundsim::domain::pipeline::{AnalysisContext, Pipeline, PipelineConfig, Stage};
use fundsim::domain::signal::{AgentSignal, Decision, Recommendation, StageId};
use fundsim::ports::data_port::DataPort;
use std::collections::HashMap;
use std::time::Duration;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

#[async_trait]
impl DataPort for MockDataPort {
    async fn fetch_series(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Series, FundsimError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(FundsimError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: reason.clone(),
            });
        }
        let bars: Vec<OhlcvBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(FundsimError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: "no bars".to_string(),
            });
        }
        Series::new(symbol, bars)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FundsimError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `n` days after 2024-01-01.
pub fn day(n: i64) -> NaiveDate {
    date(2024, 1, 1) + chrono::Duration::days(n)
}

pub fn make_bar(date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1000.0,
    }
}

/// One bar per calendar day starting at `start`.
pub fn daily_bars(start: NaiveDate, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(start + chrono::Duration::days(i as i64), close))
        .collect()
}

/// Gently trending closes with a repeating wobble.
pub fn wavy_closes(n: usize, base: f64) -> Vec<f64> {
    (0..n)
        .map(|i| base + (i as f64) * 0.3 + ((i % 7) as f64 - 3.0) * 1.5)
        .collect()
}

/// Portfolio manager that replays a fixed decision per date, holding
/// otherwise, and fails on the listed dates.
pub struct ScriptedManager {
    pub script: HashMap<NaiveDate, Decision>,
    pub fail_on: Vec<NaiveDate>,
}

impl ScriptedManager {
    pub fn new(script: Vec<(NaiveDate, Decision)>) -> Self {
        Self {
            script: script.into_iter().collect(),
            fail_on: Vec::new(),
        }
    }

    pub fn failing_on(mut self, date: NaiveDate) -> Self {
        self.fail_on.push(date);
        self
    }
}

#[async_trait]
impl Stage for ScriptedManager {
    fn id(&self) -> StageId {
        StageId::PortfolioManager
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        if self.fail_on.contains(&ctx.date) {
            return Err(StageError::unavailable("scripted outage"));
        }
        let decision = self
            .script
            .get(&ctx.date)
            .copied()
            .unwrap_or_else(Decision::hold);
        Ok(AgentSignal::new(StageId::PortfolioManager, 0.0, 1.0, "scripted")
            .with_recommendation(Recommendation::Trade(decision)))
    }
}

/// Analyst that always fails.
pub struct FailingStage(pub StageId);

#[async_trait]
impl Stage for FailingStage {
    fn id(&self) -> StageId {
        self.0
    }

    async fn evaluate(&self, _ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        Err(StageError::unavailable("provider down"))
    }
}

/// Analyst that sleeps before answering.
pub struct SlowStage {
    pub id: StageId,
    pub delay: Duration,
}

#[async_trait]
impl Stage for SlowStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn evaluate(&self, _ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        tokio::time::sleep(self.delay).await;
        Ok(AgentSignal::new(self.id, 0.5, 1.0, "late"))
    }
}

pub fn scripted_pipeline(script: Vec<(NaiveDate, Decision)>) -> Pipeline {
    Pipeline::new(PipelineConfig::default()).then(ScriptedManager::new(script))
}
