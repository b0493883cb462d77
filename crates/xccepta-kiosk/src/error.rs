//! Error types for the kiosk.

use thiserror::Error;
use xccepta_core::CoreError;
use xccepta_net::NetError;
use xccepta_store::StoreError;
use xccepta_vend::VendError;

/// Errors that stop the kiosk from doing its job.
///
/// A declined or unverifiable claim is not an error; see
/// [`Outcome`](xccepta_core::Outcome).
#[derive(Debug, Error)]
pub enum KioskError {
    /// Exposure state could not be read or written.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("network error: {0}")]
    Net(#[from] NetError),

    #[error("vend error: {0}")]
    Vend(#[from] VendError),

    #[error("invalid input: {0}")]
    Core(#[from] CoreError),

    /// Bad configuration file or environment.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for kiosk operations.
pub type Result<T> = std::result::Result<T, KioskError>;
