mod commands;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use b3data_lib::Config;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "b3data")]
#[command(about = "Sync B3 listed companies and augment statements with quarterly median prices")]
struct Cli {
    /// Output format: table, json or csv
    #[arg(long, default_value = "table", global = true)]
    output: String,

    /// Config file (defaults to ./b3data.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the B3 company listing and details into the companies table
    SyncCompanies(commands::sync_companies::SyncCompaniesArgs),
    /// Add median quarterly quotation rows to the statements table
    Augment(commands::augment::AugmentArgs),
    /// List stored companies
    Companies(commands::companies::CompaniesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("b3data=info".parse()?)
                .add_directive("b3_api=warn".parse()?),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let format = match cli.output.as_str() {
        "json" => OutputFormat::Json,
        "csv" => OutputFormat::Csv,
        _ => OutputFormat::Table,
    };

    let config = Config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::SyncCompanies(args) => commands::sync_companies::run(args, config).await?,
        Commands::Augment(args) => commands::augment::run(args, config).await?,
        Commands::Companies(args) => commands::companies::run(args, &config, &format)?,
    }

    Ok(())
}
