//! Query payloads for the B3 listed-companies proxy.
//!
//! The proxy does not take query strings. Each call serializes a small JSON
//! object, base64-encodes it and appends it as the last path segment.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;

use crate::Error;

/// The proxy only serves Portuguese content reliably.
pub const DEFAULT_LANGUAGE: &str = "pt-br";

/// Trait implemented by all query payloads.
pub trait Query: Serialize {
    /// Encodes the payload into the path segment expected by the proxy.
    fn encode(&self) -> Result<String, Error> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }
}

/// Paged listing of every company registered at B3.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyListQuery {
    pub language: String,
    pub page_number: i64,
    pub page_size: i64,
}

impl Default for CompanyListQuery {
    fn default() -> Self {
        Self {
            language: DEFAULT_LANGUAGE.to_string(),
            page_number: 1,
            page_size: 120,
        }
    }
}

impl CompanyListQuery {
    /// Sets the page number (1-indexed).
    pub fn with_page(mut self, page_number: i64) -> Self {
        self.page_number = page_number;
        self
    }

    /// Sets the number of results per page.
    pub fn with_page_size(mut self, page_size: i64) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }
}

impl Query for CompanyListQuery {}

/// Detail lookup for a single company by CVM code.
#[derive(Clone, Debug, Serialize)]
pub struct CompanyDetailQuery {
    #[serde(rename = "codeCVM")]
    pub code_cvm: String,
    pub language: String,
}

impl CompanyDetailQuery {
    pub fn new(code_cvm: &str) -> Self {
        Self {
            code_cvm: code_cvm.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }
}

impl Query for CompanyDetailQuery {}
