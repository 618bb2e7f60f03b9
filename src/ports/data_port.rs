//! Market data access port.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::error::FundsimError;
use crate::domain::ohlcv::Series;

#[async_trait]
pub trait DataPort: Send + Sync {
    /// Bars for `symbol` dated within `[start_date, end_date]`.
    ///
    /// Fails with `DataUnavailable` when the symbol is unknown or the range
    /// holds no bars.
    async fn fetch_series(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Series, FundsimError>;

    async fn list_symbols(&self) -> Result<Vec<String>, FundsimError>;
}
