//! Values exchanged between pipeline stages: signals and decisions.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
            Action::Hold => write!(f, "hold"),
        }
    }
}

/// Terminal output of one pipeline run. `quantity` is zero iff the action
/// is [`Action::Hold`]; the constructors maintain that.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Decision {
    pub action: Action,
    pub quantity: f64,
}

impl Decision {
    pub fn hold() -> Self {
        Decision {
            action: Action::Hold,
            quantity: 0.0,
        }
    }

    pub fn buy(quantity: f64) -> Self {
        Self::new(Action::Buy, quantity)
    }

    pub fn sell(quantity: f64) -> Self {
        Self::new(Action::Sell, quantity)
    }

    /// A trade of `quantity` units. Non-positive or non-finite quantities,
    /// and any `Hold`, collapse to a plain hold.
    pub fn new(action: Action, quantity: f64) -> Self {
        if action == Action::Hold || !quantity.is_finite() || quantity <= 0.0 {
            return Self::hold();
        }
        Decision { action, quantity }
    }

    /// The same decision with its quantity capped at `max`.
    pub fn clamped(self, max: f64) -> Self {
        Self::new(self.action, self.quantity.min(max))
    }

    pub fn is_hold(&self) -> bool {
        self.action == Action::Hold
    }
}

/// Role of a stage in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    MarketData,
    Sentiment,
    Technical,
    Risk,
    PortfolioManager,
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageId::MarketData => "market_data",
            StageId::Sentiment => "sentiment",
            StageId::Technical => "technical",
            StageId::Risk => "risk",
            StageId::PortfolioManager => "portfolio_manager",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Recommendation {
    /// Largest absolute change in position, in units, allowed for the date.
    MaxPositionDelta(f64),
    Trade(Decision),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
        }
    }
}

/// One stage's contribution for one date.
///
/// `score` runs from -1 (bearish) to 1 (bullish); `confidence` from 0 to 1.
/// Both are clamped on construction, and NaN becomes 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSignal {
    pub stage: StageId,
    pub score: f64,
    pub confidence: f64,
    pub rationale: String,
    pub recommendation: Option<Recommendation>,
    pub degraded: bool,
}

impl AgentSignal {
    pub fn new(stage: StageId, score: f64, confidence: f64, rationale: impl Into<String>) -> Self {
        AgentSignal {
            stage,
            score: bounded(score, -1.0, 1.0),
            confidence: bounded(confidence, 0.0, 1.0),
            rationale: rationale.into(),
            recommendation: None,
            degraded: false,
        }
    }

    /// Hold-biased placeholder for a stage that could not produce a signal.
    pub fn neutral(stage: StageId, reason: impl Into<String>) -> Self {
        AgentSignal {
            degraded: true,
            ..AgentSignal::new(stage, 0.0, 0.0, reason)
        }
    }

    pub fn with_recommendation(mut self, recommendation: Recommendation) -> Self {
        self.recommendation = Some(recommendation);
        self
    }

    pub fn bias(&self) -> Bias {
        if self.score > 0.0 {
            Bias::Bullish
        } else if self.score < 0.0 {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }

    pub fn max_position_delta(&self) -> Option<f64> {
        match self.recommendation {
            Some(Recommendation::MaxPositionDelta(delta)) => Some(delta),
            _ => None,
        }
    }

    pub fn decision(&self) -> Option<Decision> {
        match self.recommendation {
            Some(Recommendation::Trade(decision)) => Some(decision),
            _ => None,
        }
    }
}

fn bounded(value: f64, lo: f64, hi: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(lo, hi) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_hold_has_zero_quantity() {
        assert_eq!(Decision::new(Action::Hold, 5.0), Decision::hold());
        assert_eq!(Decision::buy(0.0), Decision::hold());
        assert_eq!(Decision::sell(-1.0), Decision::hold());
        assert_eq!(Decision::buy(f64::NAN), Decision::hold());
        assert!(Decision::hold().is_hold());
    }

    #[test]
    fn decision_clamped_to_bound() {
        let d = Decision::buy(3.0).clamped(1.25);
        assert_eq!(d.action, Action::Buy);
        assert_eq!(d.quantity, 1.25);

        assert_eq!(Decision::sell(3.0).clamped(0.0), Decision::hold());
        assert_eq!(Decision::buy(0.5).clamped(2.0), Decision::buy(0.5));
    }

    #[test]
    fn signal_values_are_bounded() {
        let s = AgentSignal::new(StageId::Technical, 3.0, -0.5, "x");
        assert_eq!(s.score, 1.0);
        assert_eq!(s.confidence, 0.0);

        let s = AgentSignal::new(StageId::Technical, f64::NAN, 2.0, "x");
        assert_eq!(s.score, 0.0);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn neutral_signal_is_degraded_and_flat() {
        let s = AgentSignal::neutral(StageId::Sentiment, "provider down");
        assert!(s.degraded);
        assert_eq!(s.bias(), Bias::Neutral);
        assert_eq!(s.confidence, 0.0);
        assert!(s.recommendation.is_none());
    }

    #[test]
    fn recommendation_accessors() {
        let risk = AgentSignal::new(StageId::Risk, 0.0, 1.0, "ok")
            .with_recommendation(Recommendation::MaxPositionDelta(2.0));
        assert_eq!(risk.max_position_delta(), Some(2.0));
        assert_eq!(risk.decision(), None);

        let pm = AgentSignal::new(StageId::PortfolioManager, 0.5, 0.5, "buy")
            .with_recommendation(Recommendation::Trade(Decision::buy(1.0)));
        assert_eq!(pm.decision(), Some(Decision::buy(1.0)));
        assert_eq!(pm.max_position_delta(), None);
    }

    #[test]
    fn display_names() {
        assert_eq!(Action::Sell.to_string(), "sell");
        assert_eq!(StageId::PortfolioManager.to_string(), "portfolio_manager");
        assert_eq!(Bias::Bullish.to_string(), "bullish");
    }
}
