//! Error types for the vend session.

use thiserror::Error;
use uuid::Uuid;

/// Transport-level failures. Every one of these leaves the session idle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VendError {
    /// No advertised device matched the name hint before the scan timed out.
    #[error("no device named {name_hint:?} found")]
    NotFound { name_hint: String },

    /// A vend was requested with no live session.
    #[error("not connected")]
    NotConnected,

    /// A connect was requested while another one is in progress.
    #[error("session busy: {0}")]
    Busy(&'static str),

    #[error("connect failed: {0}")]
    Connect(String),

    /// The device does not expose the expected characteristic.
    #[error("characteristic {0} missing")]
    CharacteristicMissing(Uuid),

    #[error("write failed: {0}")]
    Write(String),

    /// An operation exceeded its bound.
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// The link dropped underneath the session.
    #[error("link disconnected")]
    Disconnected,

    /// No usable adapter or platform error.
    #[error("adapter error: {0}")]
    Adapter(String),

    /// The command could not be serialized.
    #[error("encode failed: {0}")]
    Encode(String),

    /// The session thread is gone.
    #[error("vend session closed")]
    SessionClosed,

    #[error("failed to start session thread: {0}")]
    Spawn(String),
}

/// Result type for vend operations.
pub type Result<T> = std::result::Result<T, VendError>;
