//! Concrete pipeline stages and their parameters.
//!
//! The default pipeline is
//! `[MarketData] -> [Sentiment, Technical] -> [Risk] -> [PortfolioManager]`.

pub mod market_data;
pub mod portfolio_manager;
pub mod risk;
pub mod sentiment;
pub mod technical;

pub use market_data::MarketDataStage;
pub use portfolio_manager::PortfolioManagerStage;
pub use risk::{RiskLevel, RiskStage};
pub use sentiment::{PriceActionSentiment, SentimentSource, SentimentStage};
pub use technical::TechnicalStage;

use std::sync::Arc;

use crate::domain::indicator::RsiSmoothing;
use crate::domain::indicator::bollinger::{DEFAULT_MULT_X100, DEFAULT_PERIOD};
use crate::domain::pipeline::{Pipeline, PipelineConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TechnicalParams {
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub rsi_period: usize,
    pub rsi_smoothing: RsiSmoothing,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bollinger_period: usize,
    pub bollinger_mult_x100: u32,
    pub obv_slope_window: usize,
}

impl Default for TechnicalParams {
    fn default() -> Self {
        TechnicalParams {
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            rsi_period: 14,
            rsi_smoothing: RsiSmoothing::Wilder,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bollinger_period: DEFAULT_PERIOD,
            bollinger_mult_x100: DEFAULT_MULT_X100,
            obv_slope_window: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentimentParams {
    pub window: usize,
}

impl Default for SentimentParams {
    fn default() -> Self {
        SentimentParams { window: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskParams {
    /// Largest share of equity one day's trade may move.
    pub max_position_pct: f64,
    pub volatility_window: usize,
    /// Daily return stdev at or above which risk is high.
    pub high_volatility: f64,
    /// Daily return stdev at or below which risk is low.
    pub low_volatility: f64,
}

impl Default for RiskParams {
    fn default() -> Self {
        RiskParams {
            max_position_pct: 0.25,
            volatility_window: 20,
            high_volatility: 0.04,
            low_volatility: 0.015,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortfolioParams {
    pub buy_threshold: f64,
    pub sell_threshold: f64,
}

impl Default for PortfolioParams {
    fn default() -> Self {
        PortfolioParams {
            buy_threshold: 0.2,
            sell_threshold: -0.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AgentParams {
    pub technical: TechnicalParams,
    pub sentiment: SentimentParams,
    pub risk: RiskParams,
    pub portfolio: PortfolioParams,
}

/// Build the standard five-stage pipeline.
///
/// `source` backs the sentiment stage; pass `None` for the built-in
/// price-action scorer.
pub fn standard_pipeline(
    config: PipelineConfig,
    params: &AgentParams,
    source: Option<Arc<dyn SentimentSource>>,
) -> Pipeline {
    let source = source.unwrap_or_else(|| Arc::new(PriceActionSentiment::new(params.sentiment)));

    Pipeline::new(config)
        .then(MarketDataStage)
        .then_group(vec![
            Box::new(SentimentStage::new(source)),
            Box::new(TechnicalStage::new(params.technical)),
        ])
        .then(RiskStage::new(params.risk))
        .then(PortfolioManagerStage::new(params.portfolio))
}
