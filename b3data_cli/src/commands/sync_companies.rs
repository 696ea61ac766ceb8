//! The `sync-companies` subcommand: ingest the B3 company listing into SQLite.

use std::path::PathBuf;

use anyhow::Result;
use b3data_lib::b3_api::types::{CompanyDetail, CompanySummary};
use b3data_lib::b3_api::{self, Client, CompanyDetailQuery, CompanyListQuery};
use b3data_lib::{
    company_record_from_detail, upsert_companies, CompanyRecord, Config, DataCleaner, SaveSink,
    SqliteStore, WorkerPool, WorkerTask,
};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct SyncCompaniesArgs {
    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Concurrent detail lookups (overrides config)
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Only sync the first N companies of the listing
    #[arg(long)]
    pub limit: Option<usize>,

    /// Override the B3 proxy base URL
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(Debug, Default)]
struct SyncResult {
    stored: usize,
    incomplete: usize,
    failed: usize,
}

pub async fn run(args: &SyncCompaniesArgs, mut config: Config) -> Result<()> {
    super::apply_overrides(&mut config, args.db.as_ref(), args.max_workers)?;

    let base_url = args
        .base_url
        .clone()
        .or_else(|| std::env::var("B3DATA_BASE_URL").ok())
        .unwrap_or_else(|| config.b3_base_url.clone());
    let client = Client::with_base_url(&base_url);

    let mut summaries = fetch_listing(&client, &config).await?;
    if let Some(limit) = args.limit {
        summaries.truncate(limit);
    }
    if summaries.is_empty() {
        eprintln!("No companies listed");
        return Ok(());
    }

    eprintln!(
        "Fetching details for {} companies into {}",
        summaries.len(),
        config.db_path.display()
    );

    let handle = Handle::current();
    let cancel = super::cancel_on_ctrl_c();
    let result = tokio::task::spawn_blocking(move || {
        sync_details(&client, summaries, &config, &handle, &cancel)
    })
    .await??;

    eprintln!(
        "Sync complete: {} companies stored, {} skipped (missing name or ticker), {} lookups failed",
        result.stored, result.incomplete, result.failed
    );
    Ok(())
}

async fn fetch_listing(client: &Client, config: &Config) -> Result<Vec<CompanySummary>> {
    let mut page = 1;
    let mut summaries = Vec::new();
    loop {
        let query = CompanyListQuery::default()
            .with_page(page)
            .with_page_size(config.page_size as i64)
            .with_language(&config.language);
        let resp = client.get_initial_companies(&query).await?;
        let total_pages = resp.page.total_pages;
        let fetched = resp.results.len();
        summaries.extend(resp.results);
        eprintln!(
            "Page {}/{}: {} companies",
            page,
            total_pages.max(1),
            fetched
        );
        if fetched == 0 || page >= total_pages {
            break;
        }
        page += 1;
    }
    Ok(summaries)
}

fn sync_details(
    client: &Client,
    summaries: Vec<CompanySummary>,
    config: &Config,
    handle: &Handle,
    cancel: &CancellationToken,
) -> Result<SyncResult> {
    let pool = WorkerPool::new(config.max_workers)?;
    let store = SqliteStore::new();
    let cleaner = DataCleaner;
    let mut result = SyncResult::default();
    let mut sink_error = None;
    let stop = cancel.child_token();

    let pb = ProgressBar::new(summaries.len() as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} ({eta}) {msg}",
        )?,
    );
    pb.set_message("fetching company details...");

    {
        let mut sink = SaveSink::new(
            |batch: &[CompanyRecord]| {
                upsert_companies(&store, &config.db_path, &config.companies_table, batch)
                    .map(|_| ())
            },
            config.batch_size,
        )?;

        pool.run(
            summaries,
            &stop,
            |task: WorkerTask<CompanySummary>| {
                let query =
                    CompanyDetailQuery::new(&task.data.code_cvm).with_language(&config.language);
                let detail: Result<CompanyDetail, b3_api::Error> =
                    handle.block_on(client.get_company_detail(&query));
                (task, detail)
            },
            |(task, detail)| {
                pb.inc(1);
                if sink_error.is_some() {
                    return;
                }
                match detail {
                    Ok(detail) => match company_record_from_detail(&task.data, &detail, &cleaner) {
                        Some(record) => {
                            result.stored += 1;
                            if let Err(e) = sink.handle(Some(record)) {
                                sink_error = Some(e);
                                stop.cancel();
                            }
                        }
                        None => result.incomplete += 1,
                    },
                    Err(e) => {
                        result.failed += 1;
                        tracing::error!(
                            worker = %task.worker_id,
                            code_cvm = %task.data.code_cvm,
                            "sync-companies: detail lookup failed: {}",
                            e
                        );
                    }
                }
            },
        );

        if let Some(e) = sink_error {
            pb.abandon_with_message("store write failed");
            return Err(e.into());
        }
        sink.finalize()?;
    }

    pb.finish_with_message("done");
    Ok(result)
}
