//! Value types shared across the pipeline.

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::cleaner::DataCleaner;
use crate::record::{text_field, Record, Scalar};

/// Account type assigned to synthesized quotation rows.
pub const QUOTATION_TYPE: &str = "Cotações Históricas";
/// Frame assigned to synthesized quotation rows.
pub const QUOTATION_FRAME: &str = "Cotação Mediana do Trimestre";
/// Account prefix of synthesized quotation rows; the ticker class digits follow.
pub const QUOTATION_ACCOUNT_PREFIX: &str = "99.";

/// Errors raised when a record cannot be viewed as a typed row.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum RowError {
    #[error("missing required column '{0}'")]
    MissingColumn(&'static str),
    #[error("company name and ticker must be non-empty")]
    EmptyIdentity,
}

/// A company listed at B3, as assembled by the company scraper.
///
/// Construction enforces a non-empty name and ticker. The record is never
/// mutated afterwards: fields are private and the `with_*` builders consume
/// the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    company_name: String,
    ticker: String,
    cvm_code: Option<String>,
    ticker_codes: Vec<String>,
    isin_codes: Vec<String>,
    trading_name: Option<String>,
    sector: Option<String>,
    subsector: Option<String>,
    segment: Option<String>,
    listing: Option<String>,
    activity: Option<String>,
    registrar: Option<String>,
    cnpj: Option<String>,
    website: Option<String>,
}

macro_rules! optional_text {
    ($($field:ident => $setter:ident),* $(,)?) => {
        $(
            pub fn $setter(mut self, value: Option<String>) -> Self {
                self.$field = value;
                self
            }

            pub fn $field(&self) -> Option<&str> {
                self.$field.as_deref()
            }
        )*
    };
}

impl CompanyRecord {
    pub fn new(company_name: &str, ticker: &str) -> Result<Self, RowError> {
        let company_name = company_name.trim();
        let ticker = ticker.trim();
        if company_name.is_empty() || ticker.is_empty() {
            return Err(RowError::EmptyIdentity);
        }
        Ok(Self {
            company_name: company_name.to_string(),
            ticker: ticker.to_string(),
            cvm_code: None,
            ticker_codes: Vec::new(),
            isin_codes: Vec::new(),
            trading_name: None,
            sector: None,
            subsector: None,
            segment: None,
            listing: None,
            activity: None,
            registrar: None,
            cnpj: None,
            website: None,
        })
    }

    pub fn company_name(&self) -> &str {
        &self.company_name
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn ticker_codes(&self) -> &[String] {
        &self.ticker_codes
    }

    pub fn isin_codes(&self) -> &[String] {
        &self.isin_codes
    }

    pub fn with_ticker_codes(mut self, codes: Vec<String>) -> Self {
        self.ticker_codes = codes;
        self
    }

    pub fn with_isin_codes(mut self, codes: Vec<String>) -> Self {
        self.isin_codes = codes;
        self
    }

    optional_text! {
        cvm_code => with_cvm_code,
        trading_name => with_trading_name,
        sector => with_sector,
        subsector => with_subsector,
        segment => with_segment,
        listing => with_listing,
        activity => with_activity,
        registrar => with_registrar,
        cnpj => with_cnpj,
        website => with_website,
    }

    /// Flattens the record into a table row. Code lists are stored as JSON arrays.
    pub fn to_record(&self) -> Record {
        let mut r = Record::new();
        r.insert("company_name".into(), self.company_name.clone().into());
        r.insert("ticker".into(), self.ticker.clone().into());
        r.insert("cvm_code".into(), self.cvm_code.clone().into());
        r.insert(
            "ticker_codes".into(),
            Scalar::Text(encode_list(&self.ticker_codes)),
        );
        r.insert("isin_codes".into(), Scalar::Text(encode_list(&self.isin_codes)));
        r.insert("trading_name".into(), self.trading_name.clone().into());
        r.insert("sector".into(), self.sector.clone().into());
        r.insert("subsector".into(), self.subsector.clone().into());
        r.insert("segment".into(), self.segment.clone().into());
        r.insert("listing".into(), self.listing.clone().into());
        r.insert("activity".into(), self.activity.clone().into());
        r.insert("registrar".into(), self.registrar.clone().into());
        r.insert("cnpj".into(), self.cnpj.clone().into());
        r.insert("website".into(), self.website.clone().into());
        r
    }

    /// Rebuilds a record from a stored row.
    pub fn from_record(record: &Record) -> Result<Self, RowError> {
        let name = text_field(record, "company_name").ok_or(RowError::MissingColumn("company_name"))?;
        let ticker = text_field(record, "ticker").ok_or(RowError::MissingColumn("ticker"))?;
        let owned = |key: &str| text_field(record, key).map(str::to_string);
        Ok(Self::new(name, ticker)?
            .with_cvm_code(owned("cvm_code"))
            .with_ticker_codes(decode_list(text_field(record, "ticker_codes")))
            .with_isin_codes(decode_list(text_field(record, "isin_codes")))
            .with_trading_name(owned("trading_name"))
            .with_sector(owned("sector"))
            .with_subsector(owned("subsector"))
            .with_segment(owned("segment"))
            .with_listing(owned("listing"))
            .with_activity(owned("activity"))
            .with_registrar(owned("registrar"))
            .with_cnpj(owned("cnpj"))
            .with_website(owned("website")))
    }
}

/// Encodes a code list as a JSON array string.
pub fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Decodes a JSON array of strings; anything else yields an empty list.
pub fn decode_list(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// A unit of work handed to a pool worker, tagged with the worker's short name.
#[derive(Debug, Clone)]
pub struct WorkerTask<T> {
    pub index: usize,
    pub data: T,
    pub worker_id: String,
}

/// Median price of a ticker over one calendar quarter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuarterPrice {
    pub quarter_end_date: NaiveDate,
    pub median: f64,
}

/// One daily observation from the market-data provider.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyBar {
    pub timestamp: DateTime<FixedOffset>,
    pub adj_close: Option<f64>,
    pub close: Option<f64>,
}

impl DailyBar {
    /// Adjusted close, falling back to close. NaN counts as missing.
    pub fn value(&self) -> Option<f64> {
        self.adj_close
            .filter(|v| v.is_finite())
            .or(self.close.filter(|v| v.is_finite()))
    }
}

/// Daily price history for one symbol, in source order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DailySeries {
    pub symbol: String,
    pub bars: Vec<DailyBar>,
}

impl DailySeries {
    pub fn empty(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            bars: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// A quarterly statement line.
///
/// Filings carry different column sets, so the row keeps every stored cell
/// as loaded and exposes the well-known columns as parsed views. Change cells
/// through [`StatementRow::set`] so both stay in step. Writing back an
/// untouched row yields exactly the cells it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    pub company_name: String,
    /// JSON list of ticker symbols; absent when no company matched the join.
    pub ticker_codes: Option<String>,
    /// ISO-8601 timestamp of the quarter end.
    pub quarter: String,
    pub kind: String,
    pub frame: String,
    pub account: String,
    pub description: String,
    /// `None` is the explicit null sentinel, and also what unparseable text reads as.
    pub value: Option<f64>,
    cells: Record,
}

const REQUIRED_COLUMNS: &[&str] = &["company_name", "quarter", "type", "frame", "account"];

impl StatementRow {
    pub fn from_record(record: Record) -> Result<Self, RowError> {
        let mut row = Self {
            company_name: String::new(),
            ticker_codes: None,
            quarter: String::new(),
            kind: String::new(),
            frame: String::new(),
            account: String::new(),
            description: String::new(),
            value: None,
            cells: record,
        };
        for key in REQUIRED_COLUMNS {
            match row.cells.get(*key) {
                Some(Scalar::Text(s)) if !s.trim().is_empty() => {}
                Some(Scalar::Integer(_) | Scalar::Real(_)) => {}
                _ => return Err(RowError::MissingColumn(*key)),
            }
        }
        for key in REQUIRED_COLUMNS.iter().chain(["ticker_codes", "description", "value"].iter()) {
            row.refresh(key);
        }
        Ok(row)
    }

    /// The stored cells, including any column set since loading.
    pub fn to_record(&self) -> Record {
        self.cells.clone()
    }

    /// Cell lookup by column name. Missing columns read as null.
    pub fn get(&self, key: &str) -> Scalar {
        self.cells.get(key).cloned().unwrap_or_default()
    }

    /// Sets a cell and refreshes the typed view of well-known columns.
    pub fn set(&mut self, key: &str, value: Scalar) {
        self.cells.insert(key.to_string(), value);
        self.refresh(key);
    }

    fn refresh(&mut self, key: &str) {
        let cell = self.cells.get(key);
        let text = || cell.map(Scalar::to_display).unwrap_or_default();
        match key {
            "company_name" => self.company_name = text(),
            "quarter" => self.quarter = text(),
            "type" => self.kind = text(),
            "frame" => self.frame = text(),
            "account" => self.account = text(),
            "description" => self.description = text(),
            "ticker_codes" => {
                self.ticker_codes = match cell {
                    Some(Scalar::Text(s)) if !s.trim().is_empty() => Some(s.clone()),
                    _ => None,
                }
            }
            "value" => {
                self.value = match cell {
                    Some(Scalar::Text(s)) => DataCleaner.clean_number(Some(s)),
                    Some(other) => other.as_f64().filter(|v| v.is_finite()),
                    None => None,
                }
            }
            _ => {}
        }
    }

    /// Tickers referenced by this row.
    pub fn tickers(&self) -> Vec<String> {
        decode_list(self.ticker_codes.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement_record() -> Record {
        let mut r = Record::new();
        r.insert("company_name".into(), "ACME".into());
        r.insert("ticker_codes".into(), r#"["ACME3","ACME4"]"#.into());
        r.insert("quarter".into(), "2024-03-31T00:00:00".into());
        r.insert("type".into(), "DRE".into());
        r.insert("frame".into(), "Consolidado".into());
        r.insert("account".into(), "3.01".into());
        r.insert("description".into(), "Receita".into());
        r.insert("value".into(), Scalar::Real(1500.0));
        r.insert("nsd".into(), Scalar::Integer(991));
        r
    }

    #[test]
    fn company_requires_name_and_ticker() {
        assert_eq!(CompanyRecord::new("", "ACME"), Err(RowError::EmptyIdentity));
        assert_eq!(CompanyRecord::new("ACME", "  "), Err(RowError::EmptyIdentity));
        assert!(CompanyRecord::new("ACME", "ACME").is_ok());
    }

    #[test]
    fn company_record_round_trips_through_row() {
        let company = CompanyRecord::new("ACME S.A.", "ACME")
            .unwrap()
            .with_ticker_codes(vec!["ACME3".into(), "ACME4".into()])
            .with_sector(Some("Financeiro".into()));
        let row = company.to_record();
        assert_eq!(row["ticker_codes"], Scalar::Text(r#"["ACME3","ACME4"]"#.into()));
        assert_eq!(row["website"], Scalar::Null);
        assert_eq!(CompanyRecord::from_record(&row).unwrap(), company);
    }

    #[test]
    fn statement_row_keeps_extra_columns() {
        let row = StatementRow::from_record(statement_record()).unwrap();
        assert_eq!(row.kind, "DRE");
        assert_eq!(row.value, Some(1500.0));
        assert_eq!(row.get("nsd"), Scalar::Integer(991));
        assert_eq!(row.tickers(), vec!["ACME3", "ACME4"]);
        assert_eq!(row.to_record(), statement_record());
    }

    #[test]
    fn statement_row_missing_required_column() {
        let mut r = statement_record();
        r.remove("frame");
        assert_eq!(
            StatementRow::from_record(r),
            Err(RowError::MissingColumn("frame"))
        );
    }

    #[test]
    fn statement_row_parses_text_value() {
        let mut r = statement_record();
        r.insert("value".into(), "1.234,5".into());
        let row = StatementRow::from_record(r).unwrap();
        assert_eq!(row.value, Some(1234.5));
    }

    #[test]
    fn statement_row_keeps_raw_cells() {
        let mut r = statement_record();
        r.insert("description".into(), Scalar::Null);
        r.insert("value".into(), "n/d".into());
        r.insert("account".into(), Scalar::Integer(3));
        let row = StatementRow::from_record(r.clone()).unwrap();
        assert_eq!(row.value, None);
        assert_eq!(row.description, "");
        assert_eq!(row.account, "3");
        assert_eq!(row.to_record(), r);
    }

    #[test]
    fn statement_row_set_updates_cell_and_view() {
        let mut row = StatementRow::from_record(statement_record()).unwrap();
        row.set("value", Scalar::Null);
        row.set("account", "99.4".into());
        row.set("sector", "Financeiro".into());
        assert_eq!(row.value, None);
        assert_eq!(row.account, "99.4");
        assert_eq!(row.get("sector"), Scalar::from("Financeiro"));
        assert_eq!(row.to_record()["value"], Scalar::Null);
    }

    #[test]
    fn bar_value_falls_back_to_close() {
        let ts = DateTime::parse_from_rfc3339("2024-01-02T10:00:00-03:00").unwrap();
        let bar = DailyBar {
            timestamp: ts,
            adj_close: Some(f64::NAN),
            close: Some(10.0),
        };
        assert_eq!(bar.value(), Some(10.0));
    }

    #[test]
    fn decode_list_tolerates_garbage() {
        assert!(decode_list(Some("not json")).is_empty());
        assert!(decode_list(None).is_empty());
        assert_eq!(decode_list(Some(r#"[" X3 ",""]"#)), vec!["X3"]);
    }
}
