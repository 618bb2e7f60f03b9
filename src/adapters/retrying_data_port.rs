//! Retry decorator for any [`DataPort`].

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::domain::error::FundsimError;
use crate::domain::ohlcv::Series;
use crate::domain::retry::RetryPolicy;
use crate::ports::data_port::DataPort;

/// Wraps a data port and retries failed fetches with backoff.
///
/// Unknown symbols, malformed data and inverted ranges are returned at once.
pub struct RetryingDataPort<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: DataPort> RetryingDataPort<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

fn is_retryable(err: &FundsimError) -> bool {
    !matches!(
        err,
        FundsimError::UnknownSymbol { .. }
            | FundsimError::InvalidSeries { .. }
            | FundsimError::InvalidRange { .. }
    )
}

#[async_trait]
impl<P: DataPort> DataPort for RetryingDataPort<P> {
    async fn fetch_series(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Series, FundsimError> {
        let context = format!("fetch {} {}..{}", symbol, start_date, end_date);

        // Non-retryable errors end the loop as an inner `Err`.
        self.policy
            .run(&context, move |_| async move {
                match self.inner.fetch_series(symbol, start_date, end_date).await {
                    Err(e) if !is_retryable(&e) => Ok(Err(e)),
                    other => other.map(Ok),
                }
            })
            .await
            .and_then(|inner| inner)
    }

    async fn list_symbols(&self) -> Result<Vec<String>, FundsimError> {
        self.policy
            .run("list symbols", move |_| self.inner.list_symbols())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use crate::domain::ohlcv::OhlcvBar;

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyPort {
        failures: u32,
        error: fn() -> FundsimError,
        calls: AtomicU32,
    }

    impl FlakyPort {
        fn failing_with(failures: u32, error: fn() -> FundsimError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }

        fn unavailable(failures: u32) -> Self {
            Self::failing_with(failures, || FundsimError::DataUnavailable {
                symbol: "BTC".to_string(),
                reason: "connection reset".to_string(),
            })
        }

        fn malformed(failures: u32) -> Self {
            Self::failing_with(failures, || FundsimError::InvalidSeries {
                symbol: "BTC".to_string(),
                reason: "duplicate date".to_string(),
            })
        }

        fn unknown(failures: u32) -> Self {
            Self::failing_with(failures, || FundsimError::UnknownSymbol {
                symbol: "BTC".to_string(),
                reason: "no such file".to_string(),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        fn next_error(&self) -> FundsimError {
            (self.error)()
        }
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[async_trait]
    impl DataPort for FlakyPort {
        async fn fetch_series(
            &self,
            symbol: &str,
            start_date: NaiveDate,
            _end_date: NaiveDate,
        ) -> Result<Series, FundsimError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(self.next_error());
            }
            let bar = OhlcvBar {
                date: start_date,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 1.0,
            };
            Series::new(symbol, vec![bar])
        }

        async fn list_symbols(&self) -> Result<Vec<String>, FundsimError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(self.next_error());
            }
            Ok(vec!["BTC".to_string()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let port = RetryingDataPort::new(
            FlakyPort::unavailable(2),
            RetryPolicy::new(3, Duration::from_millis(100)),
        );

        let series = port.fetch_series("BTC", d(1), d(2)).await.unwrap();
        assert_eq!(series.len(), 1);
        assert_eq!(port.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let port = RetryingDataPort::new(
            FlakyPort::unavailable(5),
            RetryPolicy::new(3, Duration::from_millis(100)),
        );

        let err = port.fetch_series("BTC", d(1), d(2)).await.unwrap_err();
        assert!(matches!(err, FundsimError::DataUnavailable { .. }));
        assert_eq!(port.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_series_is_not_retried() {
        let port = RetryingDataPort::new(
            FlakyPort::malformed(5),
            RetryPolicy::new(3, Duration::from_millis(100)),
        );

        let err = port.fetch_series("BTC", d(1), d(2)).await.unwrap_err();
        assert!(matches!(err, FundsimError::InvalidSeries { .. }));
        assert_eq!(port.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_symbol_fails_without_backoff() {
        let port = RetryingDataPort::new(
            FlakyPort::unknown(5),
            RetryPolicy::new(3, Duration::from_millis(500)),
        );

        let started = tokio::time::Instant::now();
        let err = port.fetch_series("BTC", d(1), d(2)).await.unwrap_err();
        assert!(matches!(err, FundsimError::UnknownSymbol { .. }));
        assert_eq!(port.inner().calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn list_symbols_is_retried() {
        let port = RetryingDataPort::new(
            FlakyPort::unavailable(1),
            RetryPolicy::new(2, Duration::from_millis(10)),
        );

        assert_eq!(port.list_symbols().await.unwrap(), vec!["BTC"]);
        assert_eq!(port.inner().calls(), 2);
    }
}
