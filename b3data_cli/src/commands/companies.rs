//! The `companies` subcommand: list companies stored by `sync-companies`.

use std::path::PathBuf;

use anyhow::Result;
use b3data_lib::{load_companies, CompanyRecord, Config, SqliteStore};
use clap::Args;

use crate::output::{print_companies_csv, print_companies_table, print_json, OutputFormat};

#[derive(Args)]
pub struct CompaniesArgs {
    /// SQLite database path (overrides config)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Filter by sector (case-insensitive substring)
    #[arg(long)]
    pub sector: Option<String>,

    /// Filter by ticker root or class code (e.g. PETR or PETR4)
    #[arg(long)]
    pub ticker: Option<String>,
}

pub fn run(args: &CompaniesArgs, config: &Config, format: &OutputFormat) -> Result<()> {
    let db = args.db.clone().unwrap_or_else(|| config.db_path.clone());
    let store = SqliteStore::new();
    let companies: Vec<CompanyRecord> = load_companies(&store, &db, &config.companies_table)?
        .into_iter()
        .filter(|c| matches_filters(c, args))
        .collect();

    if companies.is_empty() {
        eprintln!("No companies found in {}", db.display());
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_companies_table(&companies),
        OutputFormat::Json => print_json(&companies),
        OutputFormat::Csv => print_companies_csv(&companies)?,
    }
    eprintln!("{} companies", companies.len());
    Ok(())
}

fn matches_filters(company: &CompanyRecord, args: &CompaniesArgs) -> bool {
    if let Some(sector) = &args.sector {
        let wanted = sector.to_lowercase();
        let found = company
            .sector()
            .is_some_and(|s| s.to_lowercase().contains(&wanted));
        if !found {
            return false;
        }
    }
    if let Some(ticker) = &args.ticker {
        let ticker = ticker.trim();
        let found = company.ticker().eq_ignore_ascii_case(ticker)
            || company
                .ticker_codes()
                .iter()
                .any(|c| c.eq_ignore_ascii_case(ticker));
        if !found {
            return false;
        }
    }
    true
}
