//! Final buy/sell/hold synthesis.

use async_trait::async_trait;

use super::PortfolioParams;
use crate::domain::error::StageError;
use crate::domain::pipeline::{AnalysisContext, Stage};
use crate::domain::signal::{AgentSignal, Decision, Recommendation, StageId};

/// Combines analyst signals into one confidence-weighted score and trades
/// when it crosses a threshold.
///
/// Buys `bound × |score|` units, never more than cash covers. Sells the
/// held quantity, never more than the bound. Without a risk signal in the
/// context only cash and holdings limit the trade.
pub struct PortfolioManagerStage {
    params: PortfolioParams,
}

impl PortfolioManagerStage {
    pub fn new(params: PortfolioParams) -> Self {
        PortfolioManagerStage { params }
    }
}

/// Confidence-weighted mean score of the analyst stages.
///
/// Returns `(score, mean_confidence)`; both zero without any confident
/// analyst.
pub fn combine(signals: &[AgentSignal]) -> (f64, f64) {
    let analysts: Vec<&AgentSignal> = signals
        .iter()
        .filter(|s| {
            matches!(
                s.stage,
                StageId::MarketData | StageId::Sentiment | StageId::Technical
            )
        })
        .collect();
    let weight: f64 = analysts.iter().map(|s| s.confidence).sum();
    if analysts.is_empty() || weight <= 0.0 {
        return (0.0, 0.0);
    }
    let score = analysts.iter().map(|s| s.score * s.confidence).sum::<f64>() / weight;
    (score, weight / analysts.len() as f64)
}

#[async_trait]
impl Stage for PortfolioManagerStage {
    fn id(&self) -> StageId {
        StageId::PortfolioManager
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        let close = ctx
            .close()
            .filter(|c| *c > 0.0)
            .ok_or_else(|| StageError::unavailable("no valid close to trade at"))?;

        let (score, confidence) = combine(ctx.signals);
        let bound = match ctx.signal(StageId::Risk) {
            Some(risk) => risk.max_position_delta().unwrap_or(0.0),
            None => f64::INFINITY,
        };
        let held = ctx.portfolio.position.quantity;

        let decision = if score > self.params.buy_threshold {
            let affordable = ctx.portfolio.affordable_quantity(close);
            Decision::buy((bound * score.abs()).min(affordable))
        } else if score < self.params.sell_threshold {
            Decision::sell(held.min(bound))
        } else {
            Decision::hold()
        };

        let rationale = format!(
            "{} {:.4}: combined score {:+.3} (buy > {}, sell < {}), bound {:.4}, held {:.4}",
            decision.action,
            decision.quantity,
            score,
            self.params.buy_threshold,
            self.params.sell_threshold,
            bound,
            held
        );

        Ok(
            AgentSignal::new(StageId::PortfolioManager, score, confidence, rationale)
                .with_recommendation(Recommendation::Trade(decision)),
        )
    }
}
