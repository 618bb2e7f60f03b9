//! Core domain types and logic.

pub mod ohlcv;
pub mod position;
pub mod portfolio;
pub mod execution;
pub mod indicator;
pub mod signal;
pub mod retry;
pub mod pipeline;
pub mod agents;
pub mod backtest;
pub mod metrics;
pub mod config_validation;
pub mod error;
