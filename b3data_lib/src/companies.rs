//! Company records built from B3 listing data, and their upsert into the store.

use std::collections::HashMap;
use std::path::Path;

use b3_api::types::{CompanyDetail, CompanySummary};

use crate::cleaner::DataCleaner;
use crate::ports::{Persister, StoreError};
use crate::record::{text_field, Record};
use crate::types::CompanyRecord;

/// Boilerplate B3 appends to registrar names.
const REGISTRAR_NOISE: &[&str] = &["S.A.", "S/A"];

/// Splits `"Financeiro / Intermediários Financeiros / Bancos"` into sector,
/// subsector and segment. Missing levels are `None`.
pub fn split_classification(
    cleaner: &DataCleaner,
    raw: Option<&str>,
) -> (Option<String>, Option<String>, Option<String>) {
    let mut parts = raw
        .unwrap_or_default()
        .split('/')
        .map(|p| cleaner.clean_text(Some(p), &[]));
    let sector = parts.next().flatten();
    let subsector = parts.next().flatten();
    let segment = parts.next().flatten();
    (sector, subsector, segment)
}

/// Assembles a [`CompanyRecord`] from a listing row and its detail lookup.
///
/// `None` when either the company name or the ticker root is missing.
pub fn company_record_from_detail(
    summary: &CompanySummary,
    detail: &CompanyDetail,
    cleaner: &DataCleaner,
) -> Option<CompanyRecord> {
    let name = cleaner
        .clean_text(Some(&summary.company_name), &[])
        .or_else(|| cleaner.clean_text(detail.company_name.as_deref(), &[]))?;
    let ticker = cleaner
        .clean_text(Some(&summary.issuing_company), &[])
        .or_else(|| cleaner.clean_text(detail.issuing_company.as_deref(), &[]))?;

    let (sector, subsector, segment) =
        split_classification(cleaner, detail.industry_classification.as_deref());
    let text = |value: Option<&str>| cleaner.clean_text(value, &[]);

    let record = CompanyRecord::new(&name, &ticker).ok()?
        .with_cvm_code(text(Some(&summary.code_cvm)).or_else(|| text(detail.code_cvm.as_deref())))
        .with_ticker_codes(detail.tickers())
        .with_isin_codes(detail.isins())
        .with_trading_name(text(Some(&summary.trading_name)).or_else(|| text(detail.trading_name.as_deref())))
        .with_sector(sector)
        .with_subsector(subsector)
        .with_segment(segment)
        .with_listing(text(Some(&summary.segment)).or_else(|| text(detail.market.as_deref())))
        .with_activity(text(detail.activity.as_deref()))
        .with_registrar(cleaner.clean_text(detail.institution_common.as_deref(), REGISTRAR_NOISE))
        .with_cnpj(text(Some(&summary.cnpj)).or_else(|| text(detail.cnpj.as_deref())))
        .with_website(text(detail.website.as_deref()));
    Some(record)
}

/// Identity used for upserts: CVM code when known, company name otherwise.
fn upsert_key(record: &Record) -> Option<String> {
    text_field(record, "cvm_code")
        .map(|code| format!("cvm:{}", code))
        .or_else(|| text_field(record, "company_name").map(|name| format!("name:{}", name)))
}

/// Merges `batch` into the companies table, replacing rows with the same
/// identity. Returns the table size after the write.
pub fn upsert_companies(
    store: &dyn Persister,
    filepath: &Path,
    table: &str,
    batch: &[CompanyRecord],
) -> Result<usize, StoreError> {
    let mut rows = store.load(filepath, table)?;
    let mut positions: HashMap<String, usize> = rows
        .iter()
        .enumerate()
        .filter_map(|(i, row)| upsert_key(row).map(|k| (k, i)))
        .collect();

    for company in batch {
        let row = company.to_record();
        let key = upsert_key(&row);
        match key.as_ref().and_then(|k| positions.get(k).copied()) {
            Some(i) => rows[i] = row,
            None => {
                if let Some(k) = key {
                    positions.insert(k, rows.len());
                }
                rows.push(row);
            }
        }
    }

    store.save(filepath, table, &rows)?;
    tracing::debug!(table, upserted = batch.len(), total = rows.len(), "companies upserted");
    Ok(rows.len())
}

/// Every stored company, in table order.
pub fn load_companies(
    store: &dyn Persister,
    filepath: &Path,
    table: &str,
) -> Result<Vec<CompanyRecord>, StoreError> {
    store
        .load(filepath, table)?
        .iter()
        .map(|row| {
            CompanyRecord::from_record(row).map_err(|e| StoreError::Schema {
                table: table.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<Vec<Record>>,
    }

    impl Persister for MemoryStore {
        fn load(&self, _: &Path, _: &str) -> Result<Vec<Record>, StoreError> {
            Ok(self.rows.lock().unwrap().clone())
        }

        fn save(&self, _: &Path, _: &str, rows: &[Record]) -> Result<(), StoreError> {
            *self.rows.lock().unwrap() = rows.to_vec();
            Ok(())
        }
    }

    fn summary() -> CompanySummary {
        serde_json::from_value(serde_json::json!({
            "codeCVM": "9512",
            "issuingCompany": "PETR",
            "companyName": "PETROLEO  BRASILEIRO S.A. PETROBRAS",
            "tradingName": "PETROBRAS",
            "cnpj": "33000167000101",
            "segment": "Nível 2"
        }))
        .unwrap()
    }

    fn detail() -> CompanyDetail {
        serde_json::from_value(serde_json::json!({
            "industryClassification": "Petróleo. Gás e Biocombustíveis / Petróleo. Gás e Biocombustíveis / Exploração. Refino e Distribuição",
            "activity": "Exploração de petróleo",
            "website": "www.petrobras.com.br",
            "institutionCommon": "BANCO BRADESCO S.A.",
            "otherCodes": [
                {"code": "PETR3", "isin": "BRPETRACNOR9"},
                {"code": "PETR4", "isin": "BRPETRACNPR6"}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn record_from_detail_maps_fields() {
        let record = company_record_from_detail(&summary(), &detail(), &DataCleaner).unwrap();
        assert_eq!(record.company_name(), "PETROLEO BRASILEIRO S.A. PETROBRAS");
        assert_eq!(record.ticker(), "PETR");
        assert_eq!(record.cvm_code(), Some("9512"));
        assert_eq!(record.ticker_codes(), ["PETR3", "PETR4"]);
        assert_eq!(record.isin_codes(), ["BRPETRACNOR9", "BRPETRACNPR6"]);
        assert_eq!(record.sector(), Some("Petróleo. Gás e Biocombustíveis"));
        assert_eq!(record.segment(), Some("Exploração. Refino e Distribuição"));
        assert_eq!(record.listing(), Some("Nível 2"));
        assert_eq!(record.registrar(), Some("BANCO BRADESCO"));
    }

    #[test]
    fn record_requires_name_and_ticker() {
        let mut s = summary();
        s.issuing_company = "  ".into();
        assert!(company_record_from_detail(&s, &detail(), &DataCleaner).is_none());
    }

    #[test]
    fn classification_with_missing_levels() {
        let (sector, subsector, segment) =
            split_classification(&DataCleaner, Some("Financeiro / Bancos"));
        assert_eq!(sector.as_deref(), Some("Financeiro"));
        assert_eq!(subsector.as_deref(), Some("Bancos"));
        assert_eq!(segment, None);
        assert_eq!(split_classification(&DataCleaner, None), (None, None, None));
    }

    #[test]
    fn upsert_replaces_by_cvm_code_and_appends_new() {
        let store = MemoryStore::default();
        let path = Path::new("unused.db");
        let petr = CompanyRecord::new("PETROBRAS", "PETR")
            .unwrap()
            .with_cvm_code(Some("9512".into()));
        let vale = CompanyRecord::new("VALE", "VALE")
            .unwrap()
            .with_cvm_code(Some("4170".into()));
        assert_eq!(upsert_companies(&store, path, "companies", &[petr, vale]).unwrap(), 2);

        let renamed = CompanyRecord::new("PETROBRAS S.A.", "PETR")
            .unwrap()
            .with_cvm_code(Some("9512".into()));
        let no_code = CompanyRecord::new("ACME", "ACME").unwrap();
        assert_eq!(
            upsert_companies(&store, path, "companies", &[renamed, no_code.clone()]).unwrap(),
            3
        );
        assert_eq!(upsert_companies(&store, path, "companies", &[no_code]).unwrap(), 3);

        let stored = load_companies(&store, path, "companies").unwrap();
        assert_eq!(stored[0].company_name(), "PETROBRAS S.A.");
        assert_eq!(stored[2].company_name(), "ACME");
    }
}
