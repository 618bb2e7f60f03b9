//! CSV directory market data adapter.
//!
//! One file per symbol, `<SYMBOL>.csv`, with the header
//! `date,open,high,low,close,volume` and ISO dates.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::error::FundsimError;
use crate::domain::ohlcv::{OhlcvBar, Series};
use crate::ports::data_port::DataPort;

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvBar> for OhlcvBar {
    fn from(row: CsvBar) -> Self {
        OhlcvBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn csv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{}.csv", symbol))
    }

    fn parse(symbol: &str, content: &str) -> Result<Vec<OhlcvBar>, FundsimError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut bars = Vec::new();
        for (idx, row) in rdr.deserialize::<CsvBar>().enumerate() {
            let row = row.map_err(|e| FundsimError::InvalidSeries {
                symbol: symbol.to_string(),
                reason: format!("row {}: {}", idx + 1, e),
            })?;
            bars.push(OhlcvBar::from(row));
        }
        Ok(bars)
    }
}

#[async_trait]
impl DataPort for CsvAdapter {
    async fn fetch_series(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Series, FundsimError> {
        let path = self.csv_path(symbol);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            let reason = format!("failed to read {}: {}", path.display(), e);
            if e.kind() == std::io::ErrorKind::NotFound {
                FundsimError::UnknownSymbol {
                    symbol: symbol.to_string(),
                    reason,
                }
            } else {
                FundsimError::DataUnavailable {
                    symbol: symbol.to_string(),
                    reason,
                }
            }
        })?;

        let mut bars = Self::parse(symbol, &content)?;
        bars.retain(|b| b.date >= start_date && b.date <= end_date);
        if bars.is_empty() {
            return Err(FundsimError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: format!("no bars between {} and {}", start_date, end_date),
            });
        }

        bars.sort_by_key(|b| b.date);
        Series::new(symbol, bars)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FundsimError> {
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;
        let mut symbols = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("csv") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                symbols.push(stem.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}
