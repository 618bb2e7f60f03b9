//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for fundsim.
#[derive(Debug, thiserror::Error)]
pub enum FundsimError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no market data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    #[error("unknown symbol {symbol}: {reason}")]
    UnknownSymbol { symbol: String, reason: String },

    #[error("invalid series for {symbol}: {reason}")]
    InvalidSeries { symbol: String, reason: String },

    #[error("invalid date range {start} to {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("backtest engine for {symbol} already {state}; engines run once")]
    EngineReused { symbol: String, state: String },

    #[error("report error: {reason}")]
    Report { reason: String },

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FundsimError {
    /// True for failures that prevent a run from starting at all.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FundsimError::DataUnavailable { .. }
                | FundsimError::UnknownSymbol { .. }
                | FundsimError::InvalidSeries { .. }
                | FundsimError::InvalidRange { .. }
        )
    }
}

impl From<&FundsimError> for std::process::ExitCode {
    fn from(err: &FundsimError) -> Self {
        let code: u8 = match err {
            FundsimError::Io(_) | FundsimError::Csv(_) | FundsimError::EngineReused { .. } => 1,
            FundsimError::ConfigParse { .. }
            | FundsimError::ConfigMissing { .. }
            | FundsimError::ConfigInvalid { .. } => 2,
            FundsimError::DataUnavailable { .. }
            | FundsimError::UnknownSymbol { .. }
            | FundsimError::InvalidSeries { .. }
            | FundsimError::InvalidRange { .. } => 5,
            FundsimError::Report { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}

/// Failure of a single pipeline stage for a single date.
///
/// Never escapes the pipeline driver: it is folded into a neutral,
/// degraded signal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("stage unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("stage timed out after {after_ms}ms")]
    TimedOut { after_ms: u64 },
}

impl StageError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        StageError::Unavailable {
            reason: reason.into(),
        }
    }
}
