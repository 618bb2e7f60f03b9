//! CSV trade log adapter implementing [`ReportPort`].

use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::domain::backtest::{BacktestResult, TradeRecord};
use crate::domain::error::FundsimError;
use crate::domain::signal::Action;
use crate::ports::report_port::ReportPort;

/// One line of the trade log.
#[derive(Debug, Serialize)]
struct TradeRow<'a> {
    date: String,
    symbol: &'a str,
    action: Action,
    quantity: f64,
    price: f64,
    trade_value: f64,
    cash: f64,
    position: f64,
    total_value: f64,
    realized_pnl: Option<f64>,
    warning: String,
    degraded_stages: String,
}

impl<'a> From<&'a TradeRecord> for TradeRow<'a> {
    fn from(record: &'a TradeRecord) -> Self {
        TradeRow {
            date: record.date.format("%Y-%m-%d").to_string(),
            symbol: &record.symbol,
            action: record.action,
            quantity: record.quantity,
            price: record.price,
            trade_value: record.trade_value,
            cash: record.cash_after,
            position: record.quantity_after,
            total_value: record.equity_after,
            realized_pnl: record.realized_pnl,
            warning: record
                .warning
                .as_ref()
                .map(|w| w.to_string())
                .unwrap_or_default(),
            degraded_stages: record
                .degraded_stages
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

pub struct CsvReportAdapter;

impl CsvReportAdapter {
    pub fn new() -> Self {
        Self
    }

    /// Render the trade log of `result` as CSV text.
    pub fn render(result: &BacktestResult) -> Result<String, FundsimError> {
        let mut wtr = csv::Writer::from_writer(vec![]);
        for record in &result.records {
            wtr.serialize(TradeRow::from(record))?;
        }
        let data = wtr.into_inner().map_err(|e| FundsimError::Report {
            reason: format!("failed to flush CSV writer: {}", e),
        })?;
        String::from_utf8(data).map_err(|e| FundsimError::Report {
            reason: format!("CSV output is not valid UTF-8: {}", e),
        })
    }
}

impl Default for CsvReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, result: &BacktestResult, output_path: &str) -> Result<(), FundsimError> {
        let content = Self::render(result)?;

        let path = Path::new(output_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| FundsimError::Report {
                reason: format!("cannot create {}: {}", parent.display(), e),
            })?;
        }
        fs::write(path, content).map_err(|e| FundsimError::Report {
            reason: format!("cannot write {}: {}", path.display(), e),
        })?;

        log::info!(
            "Wrote {} trade records to {}",
            result.records.len(),
            path.display()
        );
        Ok(())
    }
}
