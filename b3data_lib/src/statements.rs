//! Statement collection: fan a [`StatementSource`] out over filings and stream
//! the rows into the store.

use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::db::SqliteStore;
use crate::ports::{StatementSource, StoreError};
use crate::record::{Record, Scalar};
use crate::save_sink::{SaveSink, SinkError};
use crate::worker::WorkerPool;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectSummary {
    pub filings: usize,
    pub filings_failed: usize,
    pub rows: usize,
}

/// Fetches every NSD in `nsds` over `pool` and feeds the rows through `sink`.
///
/// Per-filing failures are logged and skipped. Rows missing an `nsd` column
/// get the filing's number. The sink is finalized before returning, also when
/// the run was cancelled part way. A sink failure stops the remaining fetches
/// but leaves `cancel` untouched.
pub fn collect_statements<E>(
    source: &dyn StatementSource,
    nsds: Vec<u64>,
    pool: &WorkerPool,
    sink: &mut SaveSink<'_, Record, E>,
    cancel: &CancellationToken,
) -> Result<CollectSummary, E> {
    let mut summary = CollectSummary::default();
    let mut failure: Option<E> = None;
    // Stops this collection on a sink failure without cancelling the caller.
    let run = cancel.child_token();

    pool.run(
        nsds,
        &run,
        |task| (task.data, task.worker_id.clone(), source.fetch(&task)),
        |(nsd, worker_id, result)| {
            if failure.is_some() {
                return;
            }
            match result {
                Ok(rows) => {
                    summary.filings += 1;
                    for mut row in rows {
                        row.entry("nsd".to_string())
                            .or_insert(Scalar::Integer(nsd as i64));
                        summary.rows += 1;
                        if let Err(e) = sink.handle(Some(row)) {
                            failure = Some(e);
                            run.cancel();
                            return;
                        }
                    }
                }
                Err(e) => {
                    summary.filings_failed += 1;
                    tracing::error!(worker = %worker_id, nsd, "statements: {}", e);
                }
            }
        },
    );

    if let Some(e) = failure {
        return Err(e);
    }
    sink.finalize()?;
    Ok(summary)
}

/// A sink that appends each batch to `table` in the SQLite file at `filepath`.
pub fn append_sink<'a>(
    store: &'a SqliteStore,
    filepath: &'a Path,
    table: &'a str,
    threshold: usize,
) -> Result<SaveSink<'a, Record, StoreError>, SinkError> {
    SaveSink::new(
        move |batch: &[Record]| store.append(filepath, table, batch),
        threshold,
    )
}
