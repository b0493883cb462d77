//! Claim evaluation outcomes and their wire reason codes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::exposure::PolicyDecline;

/// Terminal reasons a claim is declined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclineReason {
    MissingFields,
    NoPubkey,
    SignatureInvalid,
    StaleOrLowerAmount,
    ExposureCapExceeded,
}

impl DeclineReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclineReason::MissingFields => "missing_fields",
            DeclineReason::NoPubkey => "no_pubkey",
            DeclineReason::SignatureInvalid => "signature_invalid",
            DeclineReason::StaleOrLowerAmount => "stale_or_lower_amount",
            DeclineReason::ExposureCapExceeded => "exposure_cap_exceeded",
        }
    }
}

impl From<PolicyDecline> for DeclineReason {
    fn from(decline: PolicyDecline) -> Self {
        match decline {
            PolicyDecline::StaleOrLowerAmount => DeclineReason::StaleOrLowerAmount,
            PolicyDecline::ExposureCapExceeded => DeclineReason::ExposureCapExceeded,
        }
    }
}

impl fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures to even reconstruct the signed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyErrorKind {
    BadEncoding,
}

impl VerifyErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyErrorKind::BadEncoding => "bad_encoding",
        }
    }
}

impl fmt::Display for VerifyErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The decision for one claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Approved,
    Declined(DeclineReason),
    VerifyError(VerifyErrorKind),
}

impl Outcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Outcome::Approved)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Approved => f.write_str("approved"),
            Outcome::Declined(reason) => write!(f, "declined: {}", reason),
            Outcome::VerifyError(kind) => write!(f, "verify error: {}", kind),
        }
    }
}
