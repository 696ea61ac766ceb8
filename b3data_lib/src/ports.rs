//! Interfaces the pipeline consumes. Concrete adapters live in `db`,
//! `yahoo` and `logger`; tests substitute in-memory fakes.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::NaiveDate;

use crate::record::Record;
use crate::types::{DailySeries, WorkerTask};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("table '{table}' does not match the expected schema: {reason}")]
    Schema { table: String, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    #[error("price provider unavailable for {symbol}: {reason}")]
    Unavailable { symbol: String, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error("statement source failed for NSD {nsd}: {reason}")]
    Fetch { nsd: u64, reason: String },
}

/// Raw statement rows for one filing.
pub trait StatementSource: Sync {
    /// Rows of the filing identified by `task.data` (an NSD). Must be idempotent.
    fn fetch(&self, task: &WorkerTask<u64>) -> Result<Vec<Record>, SourceError>;
}

/// Daily price history.
pub trait PriceProvider: Sync {
    /// History of `symbol` from `start`. "No data" is an empty series, not an error.
    fn history(&self, symbol: &str, start: NaiveDate) -> Result<DailySeries, ProviderError>;
}

/// Row-oriented table store addressed by `(filepath, table)`.
pub trait Persister: Sync {
    fn load(&self, filepath: &Path, table: &str) -> Result<Vec<Record>, StoreError>;
    /// Replaces the table contents with `rows`.
    fn save(&self, filepath: &Path, table: &str, rows: &[Record]) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Position of a long-running loop, with a naive remaining-time estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
}

impl Progress {
    pub fn new(processed: usize, total: usize, elapsed: Duration) -> Self {
        Self {
            processed,
            total,
            elapsed,
        }
    }

    /// Linear extrapolation from the average time per processed item.
    pub fn remaining(&self) -> Duration {
        if self.processed == 0 || self.processed >= self.total {
            return Duration::ZERO;
        }
        let per_item = self.elapsed.as_secs_f64() / self.processed as f64;
        Duration::from_secs_f64(per_item * (self.total - self.processed) as f64)
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.processed as f64 * 100.0 / self.total as f64
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%) {:.1}s elapsed, ~{:.1}s left",
            self.processed,
            self.total,
            self.percent(),
            self.elapsed.as_secs_f64(),
            self.remaining().as_secs_f64()
        )
    }
}

/// Side-effect-only log sink. Implementations must not panic or fail.
pub trait Logger: Sync {
    fn log(
        &self,
        message: &str,
        level: LogLevel,
        progress: Option<&Progress>,
        extra: Option<&Record>,
        worker_id: Option<&str>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_extrapolates_linearly() {
        let p = Progress::new(25, 100, Duration::from_secs(10));
        assert_eq!(p.remaining(), Duration::from_secs(30));
        assert_eq!(p.percent(), 25.0);
    }

    #[test]
    fn remaining_is_zero_at_edges() {
        assert_eq!(
            Progress::new(0, 10, Duration::from_secs(3)).remaining(),
            Duration::ZERO
        );
        assert_eq!(
            Progress::new(10, 10, Duration::from_secs(3)).remaining(),
            Duration::ZERO
        );
    }

    #[test]
    fn display_mentions_counts() {
        let text = Progress::new(1, 4, Duration::from_secs(2)).to_string();
        assert!(text.starts_with("1/4 (25.0%)"));
        assert!(text.contains("~6.0s left"));
    }
}
