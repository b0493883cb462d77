//! # XcceptaPay Core
//!
//! Pure primitives for the kiosk claim engine: payment-channel claims, the
//! canonical claim-signing encoding, Ed25519 verification, and the exposure
//! policy that decides whether an authentic claim may be honored.
//!
//! This crate contains no I/O, no storage, no networking. Everything here is
//! deterministic computation over untrusted input.
//!
//! ## Key Types
//!
//! - [`ChannelId`] - 32-byte payment channel identifier
//! - [`Drops`] - Normalized cumulative amount in the ledger's smallest unit
//! - [`Claim`] - A structurally validated claim presented by a buyer device
//! - [`VerifierChain`] - Ordered list of total verification strategies
//! - [`ChannelExposureState`] - Per-channel monotonicity and exposure state
//! - [`VendCommand`] - Bounded dispense instruction for the hardware
//!
//! ## Canonical Encoding
//!
//! Claims are signed over `CLM\0 || channel(32) || amount(u64 BE)`. See the
//! [`canonical`] module.

pub mod amount;
pub mod canonical;
pub mod claim;
pub mod crypto;
pub mod error;
pub mod exposure;
pub mod outcome;
pub mod types;
pub mod vend;
pub mod verify;

pub use amount::{normalize_amount, Drops, IntoDrops};
pub use canonical::{claim_signing_bytes, encode_for_signing_claim};
pub use claim::{Claim, ClaimPayload};
pub use crypto::{verify, ClaimDigest, Ed25519PublicKey, Ed25519Signature, Keypair};
pub use error::CoreError;
pub use exposure::{ChannelExposureState, ExposureDecision, PolicyDecline};
pub use outcome::{DeclineReason, Outcome, VerifyErrorKind};
pub use types::ChannelId;
pub use vend::{VendCommand, VendPayload, VEND_ACTION};
pub use verify::{RawEd25519, TaggedEd25519, VerificationStrategy, VerifierChain, VerifyVerdict};
