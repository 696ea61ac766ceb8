//! Yahoo Finance adapter for the [`PriceProvider`] port.
//!
//! The connector is async; pool workers are plain threads, so every call is
//! driven to completion on a tokio runtime [`Handle`]. Series are cached per
//! `(symbol, start)` for the lifetime of the provider.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use dashmap::DashMap;
use time::OffsetDateTime;
use tokio::runtime::Handle;

use crate::ports::{PriceProvider, ProviderError};
use crate::types::{DailyBar, DailySeries};

/// B3 trades on Brasília time (UTC-3, no DST since 2019).
pub const B3_UTC_OFFSET_SECONDS: i32 = -3 * 3600;

/// Failures of the Yahoo adapter before they cross the price port.
#[derive(thiserror::Error, Debug)]
pub enum YahooError {
    #[error("Invalid date: {0}")]
    InvalidDate(String),
    #[error(transparent)]
    Upstream(#[from] yahoo_finance_api::YahooError),
}

/// Convert chrono::NaiveDate to time::OffsetDateTime at UTC midnight.
pub fn date_to_offset_datetime(date: NaiveDate) -> Result<OffsetDateTime, YahooError> {
    let datetime = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| YahooError::InvalidDate(date.to_string()))?;
    OffsetDateTime::from_unix_timestamp(datetime.and_utc().timestamp())
        .map_err(|_| YahooError::InvalidDate(date.to_string()))
}

/// Unix seconds to a timestamp on the exchange's clock.
pub fn exchange_timestamp(unix: i64) -> Option<DateTime<FixedOffset>> {
    let offset = FixedOffset::east_opt(B3_UTC_OFFSET_SECONDS)?;
    DateTime::<Utc>::from_timestamp(unix, 0).map(|dt| dt.with_timezone(&offset))
}

/// Whether an upstream error means the symbol simply has no data, which the
/// price port reports as an empty series rather than a failure.
pub fn is_no_data(err: &yahoo_finance_api::YahooError) -> bool {
    use yahoo_finance_api::YahooError as Upstream;
    match err {
        Upstream::NoResult | Upstream::NoQuotes => true,
        Upstream::ApiError(msg) => {
            api_error_is_not_found(msg.code.as_deref(), msg.description.as_deref())
        }
        _ => false,
    }
}

/// Yahoo answers unknown and delisted symbols with a `Not Found` chart error.
fn api_error_is_not_found(code: Option<&str>, description: Option<&str>) -> bool {
    code.is_some_and(|c| c.eq_ignore_ascii_case("not found"))
        || description.is_some_and(|d| d.to_ascii_lowercase().contains("no data found"))
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

/// Daily price history from Yahoo Finance.
///
/// Bars are read from the `/chart` history endpoint from the requested start
/// date until now. Adjusted close is kept alongside close so the medianizer
/// can fall back when one is missing. A symbol Yahoo has no data for yields
/// an empty series; any other upstream failure surfaces as
/// [`ProviderError::Unavailable`].
pub struct YahooPriceProvider {
    connector: yahoo_finance_api::YahooConnector,
    runtime: Handle,
    cache: Arc<DashMap<(String, NaiveDate), DailySeries>>,
}

impl YahooPriceProvider {
    /// Must not be called from inside an async task that will later block on
    /// [`PriceProvider::history`]; use `spawn_blocking` for the pipeline.
    pub fn new(runtime: Handle) -> Result<Self, YahooError> {
        Ok(Self {
            connector: yahoo_finance_api::YahooConnector::new()?,
            runtime,
            cache: Arc::new(DashMap::new()),
        })
    }

    /// Fetch and convert the full history of `symbol` from `start`.
    async fn fetch(&self, symbol: &str, start: NaiveDate) -> Result<DailySeries, YahooError> {
        let start_dt = date_to_offset_datetime(start)?;
        let end_dt = OffsetDateTime::now_utc();
        let quotes = match self
            .connector
            .get_quote_history(symbol, start_dt, end_dt)
            .await
            .and_then(|response| response.quotes())
        {
            Ok(quotes) => quotes,
            Err(e) if is_no_data(&e) => {
                tracing::debug!(symbol, "no price data: {}", e);
                return Ok(DailySeries::empty(symbol));
            }
            Err(e) => return Err(e.into()),
        };

        let bars = quotes
            .iter()
            .filter_map(|q| {
                let timestamp = exchange_timestamp(q.timestamp as i64)?;
                Some(DailyBar {
                    timestamp,
                    adj_close: finite(q.adjclose),
                    close: finite(q.close),
                })
            })
            .collect();

        Ok(DailySeries {
            symbol: symbol.to_string(),
            bars,
        })
    }
}

impl PriceProvider for YahooPriceProvider {
    /// Cached per `(symbol, start)`. Blocks the calling thread on the runtime,
    /// so call it from pool workers or `spawn_blocking`, never from a task.
    fn history(&self, symbol: &str, start: NaiveDate) -> Result<DailySeries, ProviderError> {
        let key = (symbol.to_string(), start);
        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let series = self
            .runtime
            .block_on(self.fetch(symbol, start))
            .map_err(|e| ProviderError::Unavailable {
                symbol: symbol.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(symbol, bars = series.bars.len(), "price history fetched");
        self.cache.insert(key, series.clone());
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_date_to_offset_datetime_basic() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        let result = date_to_offset_datetime(date).unwrap();

        assert_eq!(result.year(), 2024);
        assert_eq!(result.month() as u32, 1);
        assert_eq!(result.day(), 15);
        assert_eq!(result.hour(), 0);
        assert_eq!(result.offset().whole_hours(), 0);
    }

    #[test]
    fn test_history_start_before_epoch() {
        let date = NaiveDate::from_ymd_opt(1950, 1, 1).unwrap();
        let result = date_to_offset_datetime(date).unwrap();
        assert!(result.unix_timestamp() < 0);
    }

    #[test]
    fn test_exchange_timestamp_keeps_brasilia_wall_clock() {
        // 2024-03-29 13:00 UTC is 10:00 in São Paulo.
        let ts = exchange_timestamp(1_711_717_200).unwrap();
        assert_eq!(ts.offset().local_minus_utc(), B3_UTC_OFFSET_SECONDS);
        assert_eq!(ts.hour(), 10);
        assert_eq!(ts.naive_local().date().day(), 29);
    }

    #[test]
    fn test_late_utc_bar_stays_in_local_quarter() {
        // 2024-04-01 01:00 UTC is still 2024-03-31 on the exchange clock.
        let ts = exchange_timestamp(1_711_933_200).unwrap();
        assert_eq!(ts.naive_local().date(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
    }

    #[test]
    fn test_missing_data_is_not_a_failure() {
        use yahoo_finance_api::YahooError as Upstream;
        assert!(is_no_data(&Upstream::NoResult));
        assert!(is_no_data(&Upstream::NoQuotes));
        assert!(!is_no_data(&Upstream::DataInconsistency));
        assert!(!is_no_data(&Upstream::FetchFailed("HTTP 503".into())));
        assert!(!is_no_data(&Upstream::TooManyRequests("chart".into())));
    }

    #[test]
    fn test_delisted_symbol_api_error_is_not_found() {
        assert!(api_error_is_not_found(
            Some("Not Found"),
            Some("No data found, symbol may be delisted")
        ));
        assert!(api_error_is_not_found(None, Some("No data found, symbol may be delisted")));
        assert!(!api_error_is_not_found(Some("Bad Request"), Some("Invalid interval")));
        assert!(!api_error_is_not_found(None, None));
    }

    #[test]
    fn test_non_finite_prices_are_missing() {
        assert_eq!(finite(f64::NAN), None);
        assert_eq!(finite(12.5), Some(12.5));
    }
}
