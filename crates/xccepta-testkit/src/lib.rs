//! # XcceptaPay Testkit
//!
//! Testing utilities for the kiosk crates.
//!
//! ## Overview
//!
//! - **Golden vectors**: fixed claim encodings and RFC 8032 signatures that
//!   any implementation must reproduce byte for byte
//! - **Generators**: proptest strategies for channels, amounts and claims
//! - **Fixtures**: deterministic buyers that sign (and mis-sign) claims
//!
//! ## Golden Vectors
//!
//! ```rust
//! use xccepta_testkit::golden::{claim_vectors, encode_vector};
//!
//! for vector in claim_vectors() {
//!     assert_eq!(hex::encode_upper(encode_vector(&vector)), vector.expected_message);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use xccepta_testkit::generators::ClaimParams;
//!
//! proptest! {
//!     #[test]
//!     fn signed_claims_verify(params: ClaimParams) {
//!         let claim = params.sign();
//!         // ...
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod golden;

pub use fixtures::{seeded_store, BuyerFixture};
pub use generators::ClaimParams;
pub use golden::{claim_vectors, rfc8032_vectors, ClaimVector, SignatureVector};
