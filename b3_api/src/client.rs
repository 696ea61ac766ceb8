//! HTTP client for the B3 listed-companies proxy.

use std::time::Duration;

use serde::de::DeserializeOwned;
use url::Url;

use crate::{
    query::{CompanyDetailQuery, CompanyListQuery, Query},
    types::{CompanyDetail, CompanySummary, PaginatedResponse},
    user_agent::get_user_agent,
    Error,
};

const COMPANY_CALL_PATH: &str = "/listedCompaniesProxy/CompanyCall";

/// HTTP client for the B3 listed-companies proxy.
///
/// Sends requests with browser-like headers and a randomized user agent.
/// Each request builds a fresh `reqwest::Client` with a 30-second timeout.
pub struct Client {
    /// Base URL for the API. Defaults to `https://sistemaswebb3-listados.b3.com.br`.
    base_api_url: String,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    /// Creates a new client pointing at the production B3 proxy.
    pub fn new() -> Self {
        Self {
            base_api_url: "https://sistemaswebb3-listados.b3.com.br".to_string(),
        }
    }

    /// Creates a new client with a custom base URL. Used for testing with wiremock.
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_api_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn get_url(&self, call: &str, query: &impl Query) -> Result<Url, Error> {
        let encoded = query.encode()?;
        Url::parse(&format!(
            "{}{}/{}/{}",
            self.base_api_url, COMPANY_CALL_PATH, call, encoded
        ))
        .map_err(|e| {
            tracing::error!("Invalid URL constructed: {}", e);
            Error::RequestFailed
        })
    }

    async fn get<T>(&self, url: Url) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        let client = reqwest::Client::builder()
            .user_agent(get_user_agent())
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| {
                tracing::error!("Failed to build HTTP client: {}", e);
                Error::RequestFailed
            })?;
        let resp = client
            .get(url)
            .header("accept", "application/json, text/plain, */*")
            .header("accept-language", "pt-BR,pt;q=0.9")
            .header("referer", "https://sistemaswebb3-listados.b3.com.br/")
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to get resource: {}", e);
                Error::RequestFailed
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            tracing::error!("Failed to read response body: {}", e);
            Error::RequestFailed
        })?;

        if !status.is_success() {
            let snippet = truncate_body(&body);
            tracing::error!("Request failed with status {}: {}", status, snippet);
            return Err(Error::HttpStatus {
                status: status.as_u16(),
                body: snippet,
            });
        }

        serde_json::from_str::<T>(&body).map_err(|e| {
            let snippet = truncate_body(&body);
            tracing::error!("Failed to parse resource: {} | body: {}", e, snippet);
            Error::Parse(e.to_string())
        })
    }

    /// Fetches one page of the company listing.
    pub async fn get_initial_companies(
        &self,
        query: &CompanyListQuery,
    ) -> Result<PaginatedResponse<CompanySummary>, Error> {
        let url = self.get_url("GetInitialCompanies", query)?;
        self.get(url).await
    }

    /// Fetches the detail record of a single company by CVM code.
    pub async fn get_company_detail(
        &self,
        query: &CompanyDetailQuery,
    ) -> Result<CompanyDetail, Error> {
        let url = self.get_url("GetDetail", query)?;
        self.get(url).await
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 2000;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...[truncated]", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("ok"), "ok");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "ç".repeat(1500);
        let out = truncate_body(&body);
        assert!(out.ends_with("...[truncated]"));
    }

    #[test]
    fn url_ends_with_encoded_payload() {
        let client = Client::with_base_url("http://localhost:1234/");
        let url = client
            .get_url("GetDetail", &CompanyDetailQuery::new("9512"))
            .unwrap();
        assert!(url
            .path()
            .starts_with("/listedCompaniesProxy/CompanyCall/GetDetail/"));
    }
}
