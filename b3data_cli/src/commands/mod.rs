//! CLI subcommand implementations.

pub mod augment;
pub mod companies;
pub mod sync_companies;

use std::path::PathBuf;

use b3data_lib::Config;
use tokio_util::sync::CancellationToken;

/// A token that fires on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing in-flight work...");
            trigger.cancel();
        }
    });
    cancel
}

/// Applies the flags shared by pipeline subcommands on top of the loaded config.
pub fn apply_overrides(
    config: &mut Config,
    db: Option<&PathBuf>,
    max_workers: Option<usize>,
) -> Result<(), b3data_lib::ConfigError> {
    if let Some(db) = db {
        config.db_path = db.clone();
    }
    if let Some(n) = max_workers {
        config.max_workers = n;
    }
    config.validate()
}
