//! # XcceptaPay Kiosk
//!
//! Offline acceptance of payment-channel claims at a vending kiosk.
//!
//! ## Overview
//!
//! A buyer device presents a signed claim for a cumulative amount on a
//! payment channel. The kiosk decides, with no network round-trip, whether
//! the claim is authentic and safe to honor:
//!
//! - **Authentic**: the signature verifies over the ledger's canonical claim
//!   encoding, using the presented key or one resolved from the ledger
//! - **Fresh**: the amount strictly exceeds the last amount accepted on the
//!   channel
//! - **Bounded**: the unsettled amount on the channel stays within the
//!   kiosk's exposure cap
//!
//! An approved claim is recorded durably before the vending hardware is
//! told to dispense, and is then forwarded to the settlement backend on a
//! best-effort basis.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use xccepta_kiosk::{Kiosk, KioskConfig, KioskOptions};
//!
//! async fn example(claim_json: &str) -> xccepta_kiosk::Result<()> {
//!     let config = KioskConfig::load(None)?;
//!     let kiosk = Kiosk::open(config, KioskOptions::default())?;
//!
//!     let report = kiosk.process_json(claim_json).await?;
//!     println!("{}", report.outcome);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `xccepta_kiosk::core` - claims, encoding, verification, exposure policy
//! - `xccepta_kiosk::store` - durable exposure state
//! - `xccepta_kiosk::net` - key resolver and settlement client
//! - `xccepta_kiosk::vend` - vending hardware session

pub mod config;
pub mod error;
pub mod intake;
pub mod kiosk;
pub mod ledger;
pub mod logging;

pub use config::KioskConfig;
pub use error::{KioskError, Result};
pub use intake::{ClaimIntake, IntakeConfig, ProcessReport, SinkStatus, VendDelivery};
pub use kiosk::{Kiosk, KioskOptions};
pub use ledger::ExposureLedger;
pub use logging::{init_logging, LogFormat};

pub use xccepta_core as core;
pub use xccepta_net as net;
pub use xccepta_store as store;
pub use xccepta_vend as vend;

pub use xccepta_core::{ChannelId, ClaimPayload, DeclineReason, Drops, Outcome, VerifyErrorKind};
