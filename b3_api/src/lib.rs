mod client;
mod errors;
mod nsd;
mod query;
pub mod types;
mod user_agent;
pub use self::client::Client;
pub use self::errors::Error;
pub use self::nsd::{nsd_document_url, CVM_RAD_BASE_URL};
pub use self::query::{CompanyDetailQuery, CompanyListQuery, Query, DEFAULT_LANGUAGE};
