//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Journal record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Journal entry not found.
    #[error("journal entry not found: {0}")]
    NotFound(String),

    /// Invalid data in storage, or an update that would break an invariant.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding the connection or map was poisoned.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// The blocking worker thread failed.
    #[error("blocking task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
