//! Sentiment stage and its pluggable source.
//!
//! [`SentimentSource`] is the seam for model-backed or external scorers.
//! The stage itself only wraps a source's reading into a signal, so a
//! source failure degrades like any other stage failure.

use async_trait::async_trait;
use std::sync::Arc;

use super::SentimentParams;
use crate::domain::error::StageError;
use crate::domain::pipeline::{AnalysisContext, Stage};
use crate::domain::signal::{AgentSignal, StageId};

#[derive(Debug, Clone, PartialEq)]
pub struct SentimentReading {
    /// -1 (fearful) to 1 (greedy).
    pub score: f64,
    pub confidence: f64,
    pub summary: String,
}

#[async_trait]
pub trait SentimentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn read(&self, ctx: &AnalysisContext<'_>) -> Result<SentimentReading, StageError>;
}

pub struct SentimentStage {
    source: Arc<dyn SentimentSource>,
}

impl SentimentStage {
    pub fn new(source: Arc<dyn SentimentSource>) -> Self {
        SentimentStage { source }
    }
}

#[async_trait]
impl Stage for SentimentStage {
    fn id(&self) -> StageId {
        StageId::Sentiment
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        let reading = self.source.read(ctx).await?;
        Ok(AgentSignal::new(
            StageId::Sentiment,
            reading.score,
            reading.confidence,
            format!("{}: {}", self.source.name(), reading.summary),
        ))
    }
}

/// Deterministic stand-in for a crowd sentiment feed: the share of
/// up-closes over the last `window` moves, mapped onto [-1, 1].
#[derive(Debug, Clone, Copy)]
pub struct PriceActionSentiment {
    window: usize,
}

impl PriceActionSentiment {
    pub fn new(params: SentimentParams) -> Self {
        PriceActionSentiment {
            window: params.window.max(1),
        }
    }
}

#[async_trait]
impl SentimentSource for PriceActionSentiment {
    fn name(&self) -> &str {
        "price action"
    }

    async fn read(&self, ctx: &AnalysisContext<'_>) -> Result<SentimentReading, StageError> {
        if ctx.bars.len() < 2 {
            return Err(StageError::unavailable(
                "price action sentiment needs at least two bars",
            ));
        }

        let start = ctx.bars.len().saturating_sub(self.window + 1);
        let (ups, downs) = ctx.bars[start..]
            .windows(2)
            .fold((0usize, 0usize), |(ups, downs), w| {
                if w[1].close > w[0].close {
                    (ups + 1, downs)
                } else if w[1].close < w[0].close {
                    (ups, downs + 1)
                } else {
                    (ups, downs)
                }
            });

        let moves = ups + downs;
        if moves == 0 {
            return Ok(SentimentReading {
                score: 0.0,
                confidence: 0.0,
                summary: "no directional moves".to_string(),
            });
        }

        let share = ups as f64 / moves as f64;
        Ok(SentimentReading {
            score: 2.0 * share - 1.0,
            confidence: moves as f64 / self.window as f64,
            summary: format!("{} up / {} down closes", ups, downs),
        })
    }
}
