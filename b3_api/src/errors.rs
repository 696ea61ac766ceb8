//! Error types for the API client.

/// Errors that can occur when making API requests.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An HTTP request failed (network error, timeout, or unreadable response).
    #[error("Request failed")]
    RequestFailed,
    /// The API returned a non-success status with a body snippet.
    #[error("Request failed with status {status}")]
    HttpStatus { status: u16, body: String },
    /// The response body was not the JSON shape we expected.
    #[error("Failed to parse response: {0}")]
    Parse(String),
    /// A query payload could not be encoded into the request path.
    #[error("Failed to encode query: {0}")]
    Encode(#[from] serde_json::Error),
}
