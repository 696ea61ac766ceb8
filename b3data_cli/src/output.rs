use anyhow::Result;
use b3data_lib::CompanyRecord;
use serde::Serialize;
use tabled::{Table, Tabled};

#[derive(Clone, Debug)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Tabled, Serialize)]
struct CompanyRow {
    #[tabled(rename = "Ticker")]
    #[serde(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Company")]
    #[serde(rename = "Company")]
    company: String,
    #[tabled(rename = "CVM")]
    #[serde(rename = "CVM")]
    cvm_code: String,
    #[tabled(rename = "Classes")]
    #[serde(rename = "Classes")]
    classes: String,
    #[tabled(rename = "Sector")]
    #[serde(rename = "Sector")]
    sector: String,
    #[tabled(rename = "Segment")]
    #[serde(rename = "Segment")]
    segment: String,
    #[tabled(rename = "Listing")]
    #[serde(rename = "Listing")]
    listing: String,
}

fn build_company_rows(companies: &[CompanyRecord]) -> Vec<CompanyRow> {
    companies
        .iter()
        .map(|c| CompanyRow {
            ticker: c.ticker().to_string(),
            company: c.company_name().to_string(),
            cvm_code: c.cvm_code().unwrap_or_default().to_string(),
            classes: c.ticker_codes().join(", "),
            sector: c.sector().unwrap_or_default().to_string(),
            segment: c.segment().unwrap_or_default().to_string(),
            listing: c.listing().unwrap_or_default().to_string(),
        })
        .collect()
}

pub fn print_companies_table(companies: &[CompanyRecord]) {
    println!("{}", Table::new(build_company_rows(companies)));
}

pub fn print_companies_csv(companies: &[CompanyRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    for row in build_company_rows(companies) {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}
