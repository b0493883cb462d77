//! Cumulative claim amounts, measured in drops.
//!
//! The signed message depends on the exact amount, so both the buyer and the
//! kiosk must normalize the decimal text identically before encoding: trim
//! surrounding whitespace, accept ASCII digits only, drop leading zeros.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A cumulative amount in drops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Drops(pub u64);

impl Drops {
    pub const ZERO: Self = Self(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// `self - other`, floored at zero.
    pub const fn saturating_sub(self, other: Drops) -> Drops {
        Drops(self.0.saturating_sub(other.0))
    }
}

impl fmt::Display for Drops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Drops {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for Drops {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize_amount(s).map(|(drops, _)| drops)
    }
}

/// Normalize decimal amount text.
///
/// Returns the parsed value together with its minimal decimal form, so
/// `"  007 "` yields `(Drops(7), "7")`.
pub fn normalize_amount(raw: &str) -> Result<(Drops, String), CoreError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidAmount("empty amount".into()));
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoreError::InvalidAmount(format!(
            "non-numeric amount {:?}",
            trimmed
        )));
    }

    let stripped = trimmed.trim_start_matches('0');
    let minimal = if stripped.is_empty() { "0" } else { stripped };
    let value: u64 = minimal
        .parse()
        .map_err(|_| CoreError::InvalidAmount(format!("amount {} overflows u64", minimal)))?;

    Ok((Drops(value), minimal.to_string()))
}

/// Anything the encoder accepts as an amount: decimal text or an integer.
pub trait IntoDrops {
    fn into_drops(self) -> Result<Drops, CoreError>;
}

impl IntoDrops for Drops {
    fn into_drops(self) -> Result<Drops, CoreError> {
        Ok(self)
    }
}

impl IntoDrops for u64 {
    fn into_drops(self) -> Result<Drops, CoreError> {
        Ok(Drops(self))
    }
}

impl IntoDrops for &str {
    fn into_drops(self) -> Result<Drops, CoreError> {
        self.parse()
    }
}

impl IntoDrops for &String {
    fn into_drops(self) -> Result<Drops, CoreError> {
        self.as_str().parse()
    }
}

impl IntoDrops for String {
    fn into_drops(self) -> Result<Drops, CoreError> {
        self.as_str().parse()
    }
}
