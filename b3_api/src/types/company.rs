//! Company types returned by the listed-companies proxy.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One row of the `GetInitialCompanies` listing.
///
/// The proxy returns empty strings rather than nulls for most absent
/// values, so every text field defaults to an empty string when missing.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompanySummary {
    /// CVM registration code, the key for detail lookups.
    #[serde(rename = "codeCVM")]
    pub code_cvm: String,

    /// Four-letter ticker root (e.g. `PETR`).
    #[serde(default)]
    pub issuing_company: String,

    /// Legal company name.
    #[serde(default)]
    pub company_name: String,

    #[serde(default)]
    pub trading_name: String,

    #[serde(default)]
    pub cnpj: String,

    #[serde(default)]
    pub market_indicator: String,

    #[serde(rename = "typeBDR", default)]
    pub type_bdr: String,

    /// Listing date as `DD/MM/YYYY`.
    #[serde(default)]
    pub date_listing: String,

    #[serde(default)]
    pub status: String,

    /// Listing segment (e.g. `Novo Mercado`).
    #[serde(default)]
    pub segment: String,

    #[serde(default)]
    pub segment_eng: String,

    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub market: String,
}

impl CompanySummary {
    /// Parses the `DD/MM/YYYY` listing date, if present and valid.
    pub fn listing_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date_listing.trim(), "%d/%m/%Y").ok()
    }
}

/// A traded instrument of a company: ticker plus ISIN.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct OtherCode {
    pub code: String,
    #[serde(default)]
    pub isin: String,
}

/// Response of the `GetDetail` call.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CompanyDetail {
    #[serde(default)]
    pub issuing_company: Option<String>,

    #[serde(default)]
    pub company_name: Option<String>,

    #[serde(default)]
    pub trading_name: Option<String>,

    #[serde(default)]
    pub cnpj: Option<String>,

    /// `sector / subsector / segment`, slash separated.
    #[serde(default)]
    pub industry_classification: Option<String>,

    #[serde(default)]
    pub industry_classification_eng: Option<String>,

    #[serde(default)]
    pub activity: Option<String>,

    #[serde(default)]
    pub website: Option<String>,

    #[serde(default)]
    pub has_quotation: Option<bool>,

    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub market_indicator: Option<String>,

    /// Listing segment name (e.g. `Nível 2`).
    #[serde(default)]
    pub market: Option<String>,

    /// Share registrar for common stock.
    #[serde(default)]
    pub institution_common: Option<String>,

    #[serde(default)]
    pub institution_preferred: Option<String>,

    /// Most liquid ticker.
    #[serde(default)]
    pub code: Option<String>,

    #[serde(rename = "codeCVM", default)]
    pub code_cvm: Option<String>,

    #[serde(default)]
    pub last_date: Option<String>,

    /// Every traded class, one entry per ticker.
    #[serde(default)]
    pub other_codes: Option<Vec<OtherCode>>,

    #[serde(default)]
    pub has_emissions: Option<bool>,

    #[serde(rename = "hasBDR", default)]
    pub has_bdr: Option<bool>,

    #[serde(rename = "typeBDR", default)]
    pub type_bdr: Option<String>,
}

impl CompanyDetail {
    /// Tickers of every traded class, in the order the proxy lists them.
    pub fn tickers(&self) -> Vec<String> {
        self.other_codes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.code.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// ISIN codes of every traded class.
    pub fn isins(&self) -> Vec<String> {
        self.other_codes
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|c| c.isin.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }
}
