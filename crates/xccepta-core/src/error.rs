//! Error types for the XcceptaPay core.

use thiserror::Error;

/// Errors raised while interpreting claim material.
///
/// None of these are fatal: callers map each one to a terminal decline or
/// verify-error outcome for the claim being evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("missing or malformed claim fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),

    #[error("invalid channel id: {0}")]
    InvalidChannelId(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("bad hex encoding in {field}")]
    BadEncoding { field: &'static str },

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("amount {amount} does not advance past {current}")]
    NonMonotonic { current: u64, amount: u64 },

    #[error("settled amount {settled} exceeds last seen amount {last_seen}")]
    SettlementAhead { settled: u64, last_seen: u64 },

    #[error("json error: {0}")]
    Json(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Json(e.to_string())
    }
}
