//! Price and volume preprocessing stage.

use async_trait::async_trait;

use crate::domain::error::StageError;
use crate::domain::pipeline::{AnalysisContext, Stage};
use crate::domain::signal::{AgentSignal, StageId};

/// Bars back for the weekly change and the volume baseline.
pub const WEEK: usize = 7;

/// Scores short-term momentum from the latest closes.
///
/// The score is the 7-bar change scaled so that a 20% move saturates it;
/// confidence grows with volume relative to its 7-bar mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarketDataStage;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketSummary {
    pub close: f64,
    pub change_1d: f64,
    pub change_7d: f64,
    pub volume_ratio: f64,
}

impl MarketDataStage {
    /// Summarize the last bars of `ctx`. Fails when there is no bar for
    /// the context date itself.
    pub fn summarize(ctx: &AnalysisContext<'_>) -> Result<MarketSummary, StageError> {
        let last = ctx
            .bars
            .last()
            .filter(|b| b.date == ctx.date)
            .ok_or_else(|| StageError::unavailable(format!("no bar for {}", ctx.date)))?;

        let n = ctx.bars.len();
        let change_from = |back: usize| -> f64 {
            let idx = n.saturating_sub(back + 1);
            let base = ctx.bars[idx].close;
            if base > 0.0 { last.close / base - 1.0 } else { 0.0 }
        };

        let recent = &ctx.bars[n.saturating_sub(WEEK)..];
        let mean_volume = recent.iter().map(|b| b.volume).sum::<f64>() / recent.len() as f64;
        let volume_ratio = if mean_volume > 0.0 {
            last.volume / mean_volume
        } else {
            1.0
        };

        Ok(MarketSummary {
            close: last.close,
            change_1d: change_from(1),
            change_7d: change_from(WEEK),
            volume_ratio,
        })
    }
}

#[async_trait]
impl Stage for MarketDataStage {
    fn id(&self) -> StageId {
        StageId::MarketData
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        let summary = Self::summarize(ctx)?;

        let label = if summary.change_1d > 0.0 {
            "bullish momentum"
        } else {
            "bearish pressure"
        };
        let rationale = format!(
            "{}: close {:.2}, 1d {:+.2}%, 7d {:+.2}%, volume {:.2}x 7d avg",
            label,
            summary.close,
            summary.change_1d * 100.0,
            summary.change_7d * 100.0,
            summary.volume_ratio
        );

        Ok(AgentSignal::new(
            StageId::MarketData,
            summary.change_7d * 5.0,
            0.5 * summary.volume_ratio,
            rationale,
        ))
    }
}
