//! Indicator-driven scoring stage.
//!
//! Four indicators each cast a bullish, bearish or neutral vote:
//!
//! - MACD: line crossing above (below) the signal line between the
//!   previous and the current bar
//! - RSI: below the oversold (above the overbought) level
//! - Bollinger: close below the lower (above the upper) band
//! - OBV: mean change over the last `obv_slope_window` bars positive
//!   (negative)
//!
//! An indicator without enough history votes neutral. The overall bias is
//! the majority, confidence is the share of indicators agreeing with it,
//! and the score is `(bullish - bearish) / 4`.

use async_trait::async_trait;

use super::TechnicalParams;
use crate::domain::error::StageError;
use crate::domain::indicator::{
    IndicatorValue, calculate_bollinger, calculate_macd, calculate_obv, calculate_rsi,
};
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::pipeline::{AnalysisContext, Stage};
use crate::domain::signal::{AgentSignal, Bias, StageId};

const INDICATOR_COUNT: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TechnicalVotes {
    pub macd: Bias,
    pub rsi: Bias,
    pub bollinger: Bias,
    pub obv: Bias,
    pub rsi_value: Option<f64>,
    pub obv_slope: Option<f64>,
}

impl TechnicalVotes {
    pub fn compute(bars: &[OhlcvBar], params: &TechnicalParams) -> Self {
        let rsi_value = calculate_rsi(bars, params.rsi_period, params.rsi_smoothing)
            .latest()
            .and_then(|v| v.as_simple());
        let obv_slope = obv_slope(bars, params.obv_slope_window);

        TechnicalVotes {
            macd: macd_vote(bars, params),
            rsi: match rsi_value {
                Some(v) if v < params.rsi_oversold => Bias::Bullish,
                Some(v) if v > params.rsi_overbought => Bias::Bearish,
                _ => Bias::Neutral,
            },
            bollinger: bollinger_vote(bars, params),
            obv: match obv_slope {
                Some(s) if s > 0.0 => Bias::Bullish,
                Some(s) if s < 0.0 => Bias::Bearish,
                _ => Bias::Neutral,
            },
            rsi_value,
            obv_slope,
        }
    }

    fn all(&self) -> [Bias; 4] {
        [self.macd, self.rsi, self.bollinger, self.obv]
    }

    pub fn bullish(&self) -> usize {
        self.all().iter().filter(|b| **b == Bias::Bullish).count()
    }

    pub fn bearish(&self) -> usize {
        self.all().iter().filter(|b| **b == Bias::Bearish).count()
    }

    pub fn overall(&self) -> Bias {
        match self.bullish().cmp(&self.bearish()) {
            std::cmp::Ordering::Greater => Bias::Bullish,
            std::cmp::Ordering::Less => Bias::Bearish,
            std::cmp::Ordering::Equal => Bias::Neutral,
        }
    }

    pub fn confidence(&self) -> f64 {
        self.bullish().max(self.bearish()) as f64 / INDICATOR_COUNT
    }

    pub fn score(&self) -> f64 {
        (self.bullish() as f64 - self.bearish() as f64) / INDICATOR_COUNT
    }
}

fn macd_vote(bars: &[OhlcvBar], params: &TechnicalParams) -> Bias {
    let series = calculate_macd(bars, params.macd_fast, params.macd_slow, params.macd_signal);
    match (series.nth_back(1), series.latest()) {
        (
            Some(IndicatorValue::Macd {
                line: prev_line,
                signal: prev_signal,
                ..
            }),
            Some(IndicatorValue::Macd { line, signal, .. }),
        ) => {
            if prev_line < prev_signal && line > signal {
                Bias::Bullish
            } else if prev_line > prev_signal && line < signal {
                Bias::Bearish
            } else {
                Bias::Neutral
            }
        }
        _ => Bias::Neutral,
    }
}

fn bollinger_vote(bars: &[OhlcvBar], params: &TechnicalParams) -> Bias {
    let Some(close) = bars.last().map(|b| b.close) else {
        return Bias::Neutral;
    };
    match calculate_bollinger(bars, params.bollinger_period, params.bollinger_mult_x100).latest() {
        Some(IndicatorValue::Bollinger { upper, lower, .. }) => {
            if close < lower {
                Bias::Bullish
            } else if close > upper {
                Bias::Bearish
            } else {
                Bias::Neutral
            }
        }
        _ => Bias::Neutral,
    }
}

/// Mean OBV change over the last `window` bars; `None` without any change.
fn obv_slope(bars: &[OhlcvBar], window: usize) -> Option<f64> {
    let obv: Vec<f64> = calculate_obv(bars)
        .values
        .iter()
        .filter_map(|p| p.value.as_simple())
        .collect();
    let diffs: Vec<f64> = obv.windows(2).map(|w| w[1] - w[0]).collect();
    let recent = &diffs[diffs.len().saturating_sub(window.max(1))..];
    if recent.is_empty() {
        return None;
    }
    Some(recent.iter().sum::<f64>() / recent.len() as f64)
}

pub struct TechnicalStage {
    params: TechnicalParams,
}

impl TechnicalStage {
    pub fn new(params: TechnicalParams) -> Self {
        TechnicalStage { params }
    }
}

#[async_trait]
impl Stage for TechnicalStage {
    fn id(&self) -> StageId {
        StageId::Technical
    }

    async fn evaluate(&self, ctx: &AnalysisContext<'_>) -> Result<AgentSignal, StageError> {
        if ctx.bars.is_empty() {
            return Err(StageError::unavailable("no bars for indicators"));
        }
        let votes = TechnicalVotes::compute(ctx.bars, &self.params);

        let rsi = votes
            .rsi_value
            .map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v));
        let rationale = format!(
            "{} ({}/4): MACD {}, RSI {} {}, Bollinger {}, OBV {}",
            votes.overall(),
            votes.bullish().max(votes.bearish()),
            votes.macd,
            rsi,
            votes.rsi,
            votes.bollinger,
            votes.obv
        );

        Ok(AgentSignal::new(
            StageId::Technical,
            votes.score(),
            votes.confidence(),
            rationale,
        ))
    }
}
