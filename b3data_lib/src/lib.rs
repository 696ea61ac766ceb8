//! Library layer for b3data: statement augmentation with quarterly median
//! prices, company sync and statement collection.
//!
//! The pipeline talks to the outside world only through the traits in
//! [`ports`]; [`db`], [`yahoo`] and [`logger`] provide the production adapters.

pub mod augment;
pub mod cleaner;
pub mod companies;
pub mod config;
pub mod db;
pub mod logger;
pub mod median;
pub mod ports;
pub mod record;
pub mod save_sink;
pub mod statements;
pub mod types;
pub mod worker;
pub mod yahoo;

pub use b3_api;

pub use augment::{AugmentError, AugmentSummary, StatementAugmenter};
pub use cleaner::DataCleaner;
pub use companies::{company_record_from_detail, load_companies, upsert_companies};
pub use config::{Config, ConfigError};
pub use db::SqliteStore;
pub use logger::TracingLogger;
pub use median::PriceMedianizer;
pub use ports::{
    LogLevel, Logger, Persister, PriceProvider, Progress, ProviderError, SourceError,
    StatementSource, StoreError,
};
pub use record::{Record, Scalar};
pub use save_sink::{SaveSink, SinkError};
pub use statements::{append_sink, collect_statements, CollectSummary};
pub use types::{CompanyRecord, DailyBar, DailySeries, QuarterPrice, StatementRow, WorkerTask};
pub use worker::{PoolStats, WorkerError, WorkerIdentity, WorkerPool};
pub use yahoo::{YahooError, YahooPriceProvider};
