//! Risk-adjusted position sizing stage.

use async_trait::async_trait;
use std::fmt;

use super::RiskParams;
use crate::domain::error::StageError;
use crate::domain::pipeline::{AnalysisContext, Stage};
use crate::domain::signal::{AgentSignal, Bias, Recommendation, StageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RiskLevel {
    Low,
    Moderate,
    High,
}

impl RiskLevel {
    /// Share of the base position budget allowed at this level.
    pub fn scale(self) -> f64 {
        match self {
            RiskLevel::Low => 1.0,
            RiskLevel::Moderate => 0.5,
            RiskLevel::High => 0.25,
        }
    }

    fn raised(self) -> Self {
        match self {
            RiskLevel::Low => RiskLevel::Moderate,
            RiskLevel::Moderate | RiskLevel::High => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Moderate => write!(f, "moderate"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Population stdev of the last `window` close-to-close returns.
///
/// `None` with fewer than two returns.
pub fn volatility(closes: &[f64], window: usize) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let recent = &returns[returns.len().saturating_sub(window)..];
    if recent.len() < 2 {
        return None;
    }
    let n = recent.len() as f64;
    let mean = recent.iter().sum::<f64>() / n;
    let variance = recent.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt())
}

/// Bounds the day's position change by volatility and portfolio size.
///
/// The base budget is `max_position_pct` of equity in units at the close,
/// scaled down by the risk level. Sentiment and technical signals that
/// point in opposite directions raise the level by one step.
pub struct RiskStage {
    params: RiskParams,
}

impl RiskStage {
    pub fn new(params: RiskParams) -> Self {
        RiskStage { params }
    }

    pub fn level_for(&self, volatility: f64) -> RiskLevel {
        if volatility >= self.params.high_volatility {
            RiskLevel::High
        } else if volatility <= self.params.low_volatility {
            RiskLevel::Low
        } else {
            RiskLevel::Moderate
        }
    }
}

fn analysts_conflict(ctx: &AnalysisContext<'_>) -> bool {
    let bias = |stage| ctx.signal(stage).map(AgentSignal::bias);
    matches!(
        (bias(StageId::Sentiment), bias(StageId::Technical)),
        (Some(Bias::Bullish), Some(Bias::Bearish)) | (Some(Bias::Bearish), Some(Bias::Bullish))
    )
}

#[async_trait]
impl Stage for RiskStage {
    fn id(&self) -> StageId {
        StageId::Risk
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        let close = ctx
            .close()
            .filter(|c| *c > 0.0)
            .ok_or_else(|| StageError::unavailable("no valid close to size against"))?;

        let closes: Vec<f64> = ctx.bars.iter().map(|b| b.close).collect();
        let vol = volatility(&closes, self.params.volatility_window).ok_or_else(|| {
            StageError::unavailable(format!(
                "volatility needs 3 bars, have {}",
                ctx.bars.len()
            ))
        })?;

        let mut level = self.level_for(vol);
        let conflict = analysts_conflict(ctx);
        if conflict {
            level = level.raised();
        }

        let equity = ctx.portfolio.equity_at(close);
        let bound = (self.params.max_position_pct * equity / close * level.scale()).max(0.0);

        let analysts = ctx
            .signals
            .iter()
            .filter(|s| s.stage != StageId::MarketData)
            .count();
        let degraded = ctx.signals.iter().filter(|s| s.degraded).count();
        let confidence = if ctx.signals.is_empty() {
            1.0
        } else {
            1.0 - degraded as f64 / ctx.signals.len() as f64
        };

        let rationale = format!(
            "{} risk: volatility {:.2}%{}, held {:.4}, max delta {:.4} ({} analyst signals)",
            level,
            vol * 100.0,
            if conflict { ", analysts conflict" } else { "" },
            ctx.portfolio.position.quantity,
            bound,
            analysts
        );

        Ok(AgentSignal::new(StageId::Risk, 0.0, confidence, rationale)
            .with_recommendation(Recommendation::MaxPositionDelta(bound)))
    }
}
