//! Error types for the network clients.

use thiserror::Error;

/// Errors from talking to the ledger node or the settlement backend.
#[derive(Debug, Error)]
pub enum NetError {
    /// Could not build the HTTP client or send the request.
    #[error("request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("server returned HTTP {0}")]
    Status(u16),

    /// The ledger node answered with an error object.
    #[error("rpc error: {0}")]
    Rpc(String),

    /// The response body did not have the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The configured base URL is empty or unusable.
    #[error("invalid url: {0:?}")]
    InvalidUrl(String),
}

impl From<reqwest::Error> for NetError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetError::Timeout
        } else if let Some(status) = e.status() {
            NetError::Status(status.as_u16())
        } else {
            NetError::Http(e.to_string())
        }
    }
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, NetError>;
