//! # XcceptaPay Vend
//!
//! Hands accepted claims to the vending hardware over a short-range
//! wireless link.
//!
//! ## Key Types
//!
//! - [`VendSession`] - handle to the session thread
//! - [`VendState`] - `Idle`, `Scanning`, `Connected`, `Sending`
//! - [`BleLink`] - transport trait; [`link::memory::MemoryLink`] for tests
//! - [`VendEvent`] - telemetry and link loss, delivered on a bounded channel
//!
//! With the `btleplug` feature, `BtleplugLink` drives a real adapter.
//!
//! A successful [`VendSession::send`] means the device acknowledged the
//! write, not that anything was dispensed.

pub mod error;
pub mod event;
pub mod link;
pub mod session;

#[cfg(feature = "btleplug")]
pub mod btle;

pub use error::{Result, VendError};
pub use event::{NotificationSink, VendEvent};
pub use link::{Advertisement, BleLink};
pub use session::{
    ConnectedDevice, Pending, VendSession, VendSessionConfig, VendState, DEFAULT_COMMAND_UUID,
    DEFAULT_NAME_HINT, DEFAULT_NOTIFY_UUID,
};

#[cfg(feature = "btleplug")]
pub use btle::BtleplugLink;
