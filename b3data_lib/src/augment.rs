//! Quarterly median quotation synthesis over the statements table.
//!
//! A run loads statements and companies, joins them, fetches one daily price
//! series per referenced ticker over the worker pool, reduces each series to
//! quarterly medians and writes one `99.<class>` row per
//! (company, quarter, ticker) next to the original rows. The merged table is
//! sorted, deduplicated (last row wins) and saved back in one write.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::time::Instant;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use crate::cleaner::DataCleaner;
use crate::config::Config;
use crate::median::PriceMedianizer;
use crate::ports::{LogLevel, Logger, Persister, PriceProvider, Progress, StoreError};
use crate::record::{compare_on, Record, Scalar};
use crate::types::{
    decode_list, QuarterPrice, StatementRow, QUOTATION_ACCOUNT_PREFIX, QUOTATION_FRAME,
    QUOTATION_TYPE,
};
use crate::worker::{WorkerError, WorkerPool};

const COMPONENT: &str = "augment";

#[derive(thiserror::Error, Debug)]
pub enum AugmentError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error("augmentation cancelled")]
    Cancelled,
}

/// Counters reported by [`StatementAugmenter::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AugmentSummary {
    pub rows_loaded: usize,
    pub tickers_fetched: usize,
    pub tickers_failed: usize,
    pub rows_synthesized: usize,
    /// Synthesized rows whose quarter had no price.
    pub rows_without_price: usize,
    pub rows_written: usize,
}

/// Splits `PETR4` into `("PETR", "4")`. `None` when there is no digit suffix.
pub fn split_ticker(ticker: &str) -> Option<(&str, &str)> {
    let prefix_len = ticker.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if prefix_len == ticker.len() {
        return None;
    }
    Some(ticker.split_at(prefix_len))
}

/// Stable-sorts `rows` on `keys` and keeps the last row of every equal-key run.
pub fn sort_dedupe_keep_last(mut rows: Vec<Record>, keys: &[String]) -> Vec<Record> {
    rows.sort_by(|a, b| compare_on(a, b, keys));
    let mut out: Vec<Record> = Vec::with_capacity(rows.len());
    for row in rows {
        match out.last_mut() {
            Some(last) if compare_on(last, &row, keys).is_eq() => *last = row,
            _ => out.push(row),
        }
    }
    out
}

/// One synthesized row to build: which ticker, and which original row to copy.
struct Planned<'r> {
    ticker: String,
    template: &'r StatementRow,
}

pub struct StatementAugmenter<'a> {
    config: &'a Config,
    persister: &'a dyn Persister,
    provider: &'a dyn PriceProvider,
    logger: &'a dyn Logger,
    medianizer: PriceMedianizer,
}

impl<'a> StatementAugmenter<'a> {
    pub fn new(
        config: &'a Config,
        persister: &'a dyn Persister,
        provider: &'a dyn PriceProvider,
        logger: &'a dyn Logger,
    ) -> Self {
        Self {
            config,
            persister,
            provider,
            logger,
            medianizer: PriceMedianizer,
        }
    }

    pub fn run(&self, cancel: &CancellationToken) -> Result<AugmentSummary, AugmentError> {
        let started = Instant::now();
        let mut summary = AugmentSummary::default();
        let db = self.config.db_path.as_path();

        if cancel.is_cancelled() {
            return Err(AugmentError::Cancelled);
        }

        // Load
        let mut rows = self.load_statements(db)?;
        let companies = self.persister.load(db, &self.config.companies_table)?;
        summary.rows_loaded = rows.len();
        self.join_companies(&mut rows, &companies);
        self.log(
            &format!(
                "loaded {} statement rows and {} companies",
                rows.len(),
                companies.len()
            ),
            LogLevel::Info,
            None,
            None,
        );

        if cancel.is_cancelled() {
            return Err(AugmentError::Cancelled);
        }

        // Price
        let tickers = distinct_tickers(&rows);
        let prices = self.fetch_prices(tickers, cancel, &mut summary)?;

        if cancel.is_cancelled() {
            return Err(AugmentError::Cancelled);
        }

        // Synthesis
        let synthesized = self.synthesize(&rows, &prices, cancel, started, &mut summary)?;

        // Merge
        let merged = sort_dedupe_keep_last(
            rows.iter()
                .chain(synthesized.iter())
                .map(StatementRow::to_record)
                .collect(),
            &self.config.statements_order,
        );

        if cancel.is_cancelled() {
            return Err(AugmentError::Cancelled);
        }

        // Persist
        self.persister
            .save(db, &self.config.statements_table, &merged)?;
        summary.rows_written = merged.len();
        self.log(
            &format!(
                "wrote {} rows ({} synthesized, {} without price) in {:.1}s",
                summary.rows_written,
                summary.rows_synthesized,
                summary.rows_without_price,
                started.elapsed().as_secs_f64()
            ),
            LogLevel::Info,
            None,
            None,
        );
        Ok(summary)
    }

    fn load_statements(&self, db: &Path) -> Result<Vec<StatementRow>, StoreError> {
        let table = &self.config.statements_table;
        self.persister
            .load(db, table)?
            .into_iter()
            .map(|record| {
                StatementRow::from_record(record).map_err(|e| StoreError::Schema {
                    table: table.clone(),
                    reason: e.to_string(),
                })
            })
            .collect()
    }

    /// Left join: company columns overwrite statement columns when present.
    fn join_companies(&self, rows: &mut [StatementRow], companies: &[Record]) {
        let keys = &self.config.historical_columns_both;
        let mut index: HashMap<Vec<String>, &Record> = HashMap::new();
        for company in companies {
            let key: Vec<String> = keys
                .iter()
                .map(|k| company.get(k).map(Scalar::to_display).unwrap_or_default())
                .collect();
            index.entry(key).or_insert(company);
        }

        for row in rows.iter_mut() {
            let key: Vec<String> = keys.iter().map(|k| row.get(k).to_display()).collect();
            let Some(company) = index.get(&key) else {
                continue;
            };
            for column in &self.config.historical_columns_new {
                match company.get(column) {
                    Some(Scalar::Null) | None => {}
                    Some(Scalar::Text(s)) if s.trim().is_empty() => {}
                    Some(value) => row.set(column, value.clone()),
                }
            }
        }
    }

    fn fetch_prices(
        &self,
        tickers: Vec<String>,
        cancel: &CancellationToken,
        summary: &mut AugmentSummary,
    ) -> Result<HashMap<String, Vec<QuarterPrice>>, AugmentError> {
        let pool = WorkerPool::new(self.config.max_workers)?;
        let suffix = self.config.price_symbol_suffix.as_str();
        let start = self.config.price_start_date;
        let mut prices = HashMap::with_capacity(tickers.len());

        let stats = pool.run(
            tickers,
            cancel,
            |task| {
                let symbol = format!("{}{}", task.data, suffix);
                let result = self
                    .provider
                    .history(&symbol, start)
                    .map(|series| self.medianizer.medianize(&series));
                (task.data, task.worker_id, result)
            },
            |(ticker, worker_id, result)| match result {
                Ok(quarters) => {
                    summary.tickers_fetched += 1;
                    prices.insert(ticker, quarters);
                }
                Err(e) => {
                    summary.tickers_failed += 1;
                    let mut extra = Record::new();
                    extra.insert("component".into(), COMPONENT.into());
                    extra.insert("ticker".into(), ticker.clone().into());
                    self.logger.log(
                        &format!("{}: price fetch failed for {}: {}", COMPONENT, ticker, e),
                        LogLevel::Error,
                        None,
                        Some(&extra),
                        Some(&worker_id),
                    );
                }
            },
        );
        tracing::debug!(
            submitted = stats.submitted,
            completed = stats.completed,
            skipped = stats.skipped,
            "price phase finished"
        );
        Ok(prices)
    }

    fn synthesize(
        &self,
        rows: &[StatementRow],
        prices: &HashMap<String, Vec<QuarterPrice>>,
        cancel: &CancellationToken,
        started: Instant,
        summary: &mut AugmentSummary,
    ) -> Result<Vec<StatementRow>, AugmentError> {
        let plan = plan_synthesis(rows);
        let total = plan.len();
        let batch = self.config.batch_size.max(1);
        let mut out = Vec::with_capacity(total);

        for (done, planned) in plan.iter().enumerate() {
            let template = planned.template;
            match self.synthesize_one(planned, prices) {
                Ok(row) => {
                    if row.value.is_none() {
                        summary.rows_without_price += 1;
                    }
                    out.push(row);
                }
                Err(reason) => {
                    let mut extra = Record::new();
                    extra.insert("component".into(), COMPONENT.into());
                    extra.insert("ticker".into(), planned.ticker.clone().into());
                    extra.insert("company".into(), template.company_name.clone().into());
                    extra.insert("quarter".into(), template.quarter.clone().into());
                    self.log(
                        &format!(
                            "{}: skipping {} / {} / {}: {}",
                            COMPONENT, template.company_name, template.quarter, planned.ticker, reason
                        ),
                        LogLevel::Error,
                        None,
                        Some(&extra),
                    );
                }
            }

            let counter = done + 1;
            if counter % batch == 0 || counter == total {
                if cancel.is_cancelled() {
                    return Err(AugmentError::Cancelled);
                }
                let progress = Progress::new(counter, total, started.elapsed());
                let last_value = out
                    .last()
                    .and_then(|r| r.value)
                    .map(|v| format!("{:.2}", v))
                    .unwrap_or_else(|| "null".to_string());
                self.log(
                    &format!(
                        "{} {} {} {} {}",
                        template.get("sector").to_display(),
                        planned.ticker,
                        template.company_name,
                        quarter_label(&template.quarter),
                        last_value
                    ),
                    LogLevel::Info,
                    Some(&progress),
                    None,
                );
            }
        }

        summary.rows_synthesized = out.len();
        Ok(out)
    }

    fn synthesize_one(
        &self,
        planned: &Planned<'_>,
        prices: &HashMap<String, Vec<QuarterPrice>>,
    ) -> Result<StatementRow, String> {
        let (_, class) = split_ticker(&planned.ticker)
            .ok_or_else(|| format!("ticker '{}' has no class digits", planned.ticker))?;
        let quarter_end = quarter_date(&planned.template.quarter)
            .ok_or_else(|| format!("unparseable quarter '{}'", planned.template.quarter))?;

        let median = prices.get(&planned.ticker).and_then(|quarters| {
            quarters
                .iter()
                .find(|q| q.quarter_end_date == quarter_end)
                .map(|q| q.median)
        });
        let mut row = planned.template.clone();
        row.set("type", QUOTATION_TYPE.into());
        row.set("frame", QUOTATION_FRAME.into());
        row.set("account", format!("{}{}", QUOTATION_ACCOUNT_PREFIX, class).into());
        row.set("description", self.config.share_class(class).into());
        row.set("value", median.into());
        Ok(row)
    }

    fn log(&self, message: &str, level: LogLevel, progress: Option<&Progress>, extra: Option<&Record>) {
        self.logger.log(message, level, progress, extra, None);
    }
}

/// Bare tickers referenced by any row, each once, sorted.
fn distinct_tickers(rows: &[StatementRow]) -> Vec<String> {
    let triples: BTreeSet<(&str, Option<&str>, &str)> = rows
        .iter()
        .map(|r| (r.company_name.as_str(), r.ticker_codes.as_deref(), r.quarter.as_str()))
        .collect();
    triples
        .into_iter()
        .flat_map(|(_, codes, _)| decode_list(codes))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// One entry per (company, quarter, ticker), copying the first row of that
/// company and quarter whose ticker list contains the ticker.
fn plan_synthesis(rows: &[StatementRow]) -> Vec<Planned<'_>> {
    let mut groups: BTreeMap<(&str, &str), Vec<&StatementRow>> = BTreeMap::new();
    for row in rows {
        groups
            .entry((row.company_name.as_str(), row.quarter.as_str()))
            .or_default()
            .push(row);
    }

    let mut plan = Vec::new();
    for group in groups.values() {
        let mut seen = BTreeSet::new();
        for row in group.iter().copied() {
            for ticker in row.tickers() {
                if seen.insert(ticker.clone()) {
                    plan.push(Planned {
                        ticker,
                        template: row,
                    });
                }
            }
        }
    }
    plan
}

/// Date portion of a statement quarter timestamp.
fn quarter_date(quarter: &str) -> Option<NaiveDate> {
    DataCleaner.clean_date(Some(quarter)).map(|dt| dt.date())
}

/// `YYYY-MM` label used in progress lines.
fn quarter_label(quarter: &str) -> String {
    quarter_date(quarter)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|| quarter.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Scalar::from(*v)))
            .collect()
    }

    fn keys(k: &[&str]) -> Vec<String> {
        k.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn split_ticker_cases() {
        assert_eq!(split_ticker("PETR4"), Some(("PETR", "4")));
        assert_eq!(split_ticker("TAEE11"), Some(("TAEE", "11")));
        assert_eq!(split_ticker("ABCD"), None);
        assert_eq!(split_ticker(""), None);
    }

    #[test]
    fn dedupe_keeps_last_of_equal_keys() {
        let rows = vec![
            rec(&[("k", "b"), ("v", "old")]),
            rec(&[("k", "a"), ("v", "x")]),
            rec(&[("k", "b"), ("v", "new")]),
        ];
        let out = sort_dedupe_keep_last(rows, &keys(&["k"]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["k"], Scalar::from("a"));
        assert_eq!(out[1]["v"], Scalar::from("new"));
    }

    #[test]
    fn dedupe_is_idempotent() {
        let rows = vec![
            rec(&[("k", "b"), ("v", "1")]),
            rec(&[("k", "a"), ("v", "2")]),
            rec(&[("k", "b"), ("v", "3")]),
        ];
        let once = sort_dedupe_keep_last(rows, &keys(&["k"]));
        let twice = sort_dedupe_keep_last(once.clone(), &keys(&["k"]));
        assert_eq!(once, twice);
    }

    #[test]
    fn quarter_label_formats_year_month() {
        assert_eq!(quarter_label("2024-03-31T00:00:00"), "2024-03");
        assert_eq!(quarter_label("not a date"), "not a date");
    }

    #[test]
    fn plan_uses_first_row_containing_ticker() {
        let base = |account: &str, codes: &str| {
            StatementRow::from_record(rec(&[
                ("company_name", "ACME"),
                ("ticker_codes", codes),
                ("quarter", "2024-03-31T00:00:00"),
                ("type", "DRE"),
                ("frame", "Individual"),
                ("account", account),
            ]))
            .unwrap()
        };
        let rows = vec![
            base("1.01", "[\"ACME3\"]"),
            base("1.02", "[\"ACME3\",\"ACME4\"]"),
        ];
        let plan = plan_synthesis(&rows);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].ticker, "ACME3");
        assert_eq!(plan[0].template.account, "1.01");
        assert_eq!(plan[1].ticker, "ACME4");
        assert_eq!(plan[1].template.account, "1.02");
    }

    #[test]
    fn distinct_tickers_are_deduplicated() {
        let row = |quarter: &str| {
            StatementRow::from_record(rec(&[
                ("company_name", "ACME"),
                ("ticker_codes", "[\"ACME3\",\"ACME4\"]"),
                ("quarter", quarter),
                ("type", "DRE"),
                ("frame", "Individual"),
                ("account", "1"),
            ]))
            .unwrap()
        };
        let rows = vec![row("2024-03-31T00:00:00"), row("2024-06-30T00:00:00")];
        assert_eq!(distinct_tickers(&rows), vec!["ACME3", "ACME4"]);
    }
}
