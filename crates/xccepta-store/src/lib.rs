//! # XcceptaPay Store
//!
//! Durable exposure state for the kiosk. Provides a trait-based interface
//! over the per-channel `last_seen` / `settled` counters and the dispense
//! journal, with SQLite and in-memory implementations.
//!
//! ## Key Types
//!
//! - [`ExposureStore`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`JournalEntry`] - One accepted claim and the fate of its dispense
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xccepta_store::{ExposureStore, SqliteStore};
//! use xccepta_core::ChannelId;
//!
//! async fn example() {
//!     let store = SqliteStore::open("kiosk_state.db").unwrap();
//!     let channel: ChannelId = "AA".repeat(32).parse().unwrap();
//!     let state = store.get_state(&channel).await.unwrap();
//!     println!("{:?}", state);
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Atomic acceptance**: evaluate, advance and journal in one transaction
//! - **Compare-and-set**: `last_seen` only ever moves up
//! - **Settlement bound**: `settled` can never pass `last_seen`

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    last_seen_key, settled_key, DispenseStatus, ExposureStore, ExposureStoreExt, JournalEntry,
};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
