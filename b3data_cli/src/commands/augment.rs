//! The `augment` subcommand: synthesize median quarterly quotation rows.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use b3data_lib::{
    AugmentError, Config, SqliteStore, StatementAugmenter, TracingLogger, YahooPriceProvider,
};
use clap::Args;

#[derive(Args)]
pub struct AugmentArgs {
    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Concurrent price fetches (overrides config)
    #[arg(long)]
    pub max_workers: Option<usize>,
}

pub async fn run(args: &AugmentArgs, mut config: Config) -> Result<()> {
    super::apply_overrides(&mut config, args.db.as_ref(), args.max_workers)?;

    eprintln!(
        "Augmenting {} in {} with {} workers",
        config.statements_table,
        config.db_path.display(),
        config.max_workers
    );

    let provider = YahooPriceProvider::new(tokio::runtime::Handle::current())
        .map_err(|e| anyhow!("Failed to create Yahoo client: {}", e))?;
    let cancel = super::cancel_on_ctrl_c();

    // The pool blocks on the runtime handle, so it must run off the async workers.
    let outcome = tokio::task::spawn_blocking(move || {
        let store = SqliteStore::new();
        let logger = TracingLogger;
        StatementAugmenter::new(&config, &store, &provider, &logger).run(&cancel)
    })
    .await?;

    match outcome {
        Ok(summary) => {
            eprintln!(
                "Augment complete: {} rows loaded, {} tickers fetched ({} failed), {} rows synthesized ({} without price), {} rows written",
                summary.rows_loaded,
                summary.tickers_fetched,
                summary.tickers_failed,
                summary.rows_synthesized,
                summary.rows_without_price,
                summary.rows_written
            );
            Ok(())
        }
        Err(AugmentError::Cancelled) => {
            eprintln!("Augment cancelled, nothing was written");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
