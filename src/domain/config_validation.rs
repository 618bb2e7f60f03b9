//! Configuration validation.
//!
//! Validates every section before a run. Each check returns the first
//! offending key.

use crate::domain::error::FundsimError;
use crate::domain::indicator::RsiSmoothing;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_all(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    validate_backtest_config(config)?;
    validate_data_config(config)?;
    validate_pipeline_config(config)?;
    validate_agent_config(config)?;
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    validate_symbol(config)?;
    validate_dates(config)?;
    positive_double(config, "backtest", "starting_cash", 100_000.0)?;
    int_at_least(config, "backtest", "lookback_days", 60, 0)?;
    int_at_least(config, "backtest", "max_gap_days", 7, 1)?;
    Ok(())
}

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    match config.get_string("data", "source").as_deref().map(str::trim) {
        None | Some("csv") | Some("synthetic") => {}
        Some(other) => {
            return Err(invalid(
                "data",
                "source",
                format!("unknown source '{}', expected csv or synthetic", other),
            ));
        }
    }
    int_at_least(config, "data", "retry_attempts", 3, 1)?;
    int_at_least(config, "data", "retry_backoff_ms", 500, 0)?;
    Ok(())
}

pub fn validate_pipeline_config(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    int_at_least(config, "pipeline", "stage_timeout_ms", 5000, 1)?;
    int_at_least(config, "pipeline", "stage_attempts", 1, 1)?;
    int_at_least(config, "pipeline", "stage_backoff_ms", 0, 0)?;
    Ok(())
}

pub fn validate_agent_config(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    validate_technical(config)?;
    int_at_least(config, "sentiment", "window", 10, 1)?;
    validate_risk(config)?;
    validate_portfolio(config)?;
    Ok(())
}

fn validate_symbol(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    match config.get_string("backtest", "symbol") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(FundsimError::ConfigMissing {
            section: "backtest".to_string(),
            key: "symbol".to_string(),
        }),
    }
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date > end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must not be after end_date",
        ));
    }
    Ok(())
}

/// Parse a `[backtest]` date in `YYYY-MM-DD` form.
pub fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, FundsimError> {
    match value {
        None => Err(FundsimError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(
                "backtest",
                field,
                format!("invalid {} format, expected YYYY-MM-DD", field),
            )
        }),
    }
}

fn validate_technical(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    let fast = int_at_least(config, "technical", "macd_fast", 12, 1)?;
    let slow = int_at_least(config, "technical", "macd_slow", 26, 1)?;
    if fast >= slow {
        return Err(invalid(
            "technical",
            "macd_fast",
            "macd_fast must be shorter than macd_slow",
        ));
    }
    int_at_least(config, "technical", "macd_signal", 9, 1)?;
    int_at_least(config, "technical", "rsi_period", 14, 1)?;

    if let Some(s) = config.get_string("technical", "rsi_smoothing") {
        s.parse::<RsiSmoothing>()
            .map_err(|reason| invalid("technical", "rsi_smoothing", reason))?;
    }

    let oversold = config.get_double("technical", "rsi_oversold", 30.0);
    let overbought = config.get_double("technical", "rsi_overbought", 70.0);
    if !(0.0..=100.0).contains(&oversold) || !(0.0..=100.0).contains(&overbought) {
        return Err(invalid(
            "technical",
            "rsi_oversold",
            "RSI levels must be between 0 and 100",
        ));
    }
    if oversold >= overbought {
        return Err(invalid(
            "technical",
            "rsi_oversold",
            "rsi_oversold must be below rsi_overbought",
        ));
    }

    int_at_least(config, "technical", "bollinger_period", 20, 1)?;
    positive_double(config, "technical", "bollinger_mult", 2.0)?;
    int_at_least(config, "technical", "obv_slope_window", 5, 1)?;
    Ok(())
}

fn validate_risk(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    let pct = config.get_double("risk", "max_position_pct", 0.25);
    if pct <= 0.0 || pct > 1.0 {
        return Err(invalid(
            "risk",
            "max_position_pct",
            "max_position_pct must be in (0, 1]",
        ));
    }
    int_at_least(config, "risk", "volatility_window", 20, 2)?;
    let low = positive_double(config, "risk", "low_volatility", 0.015)?;
    let high = positive_double(config, "risk", "high_volatility", 0.04)?;
    if low >= high {
        return Err(invalid(
            "risk",
            "low_volatility",
            "low_volatility must be below high_volatility",
        ));
    }
    Ok(())
}

fn validate_portfolio(config: &dyn ConfigPort) -> Result<(), FundsimError> {
    let buy = config.get_double("portfolio", "buy_threshold", 0.2);
    let sell = config.get_double("portfolio", "sell_threshold", -0.2);
    if !(-1.0..=1.0).contains(&buy) || !(-1.0..=1.0).contains(&sell) {
        return Err(invalid(
            "portfolio",
            "buy_threshold",
            "thresholds must be between -1 and 1",
        ));
    }
    if sell >= buy {
        return Err(invalid(
            "portfolio",
            "sell_threshold",
            "sell_threshold must be below buy_threshold",
        ));
    }
    Ok(())
}

fn positive_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, FundsimError> {
    let value = config.get_double(section, key, default);
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(section, key, format!("{} must be positive", key)));
    }
    Ok(value)
}

fn int_at_least(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    min: i64,
) -> Result<i64, FundsimError> {
    let value = config.get_int(section, key, default);
    if value < min {
        return Err(invalid(
            section,
            key,
            format!("{} must be at least {}", key, min),
        ));
    }
    Ok(value)
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> FundsimError {
    FundsimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}
