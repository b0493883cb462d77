//! Strong type definitions for payment channel identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Length of a channel identifier in bytes.
pub const CHANNEL_ID_LEN: usize = 32;

/// A 32-byte payment channel identifier, assigned by the ledger.
///
/// Rendered as 64 uppercase hex characters, which is also the form used as a
/// persistence key. Parsing is case-insensitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub [u8; CHANNEL_ID_LEN]);

impl ChannelId {
    /// Create a new ChannelId from raw bytes.
    pub const fn from_bytes(bytes: [u8; CHANNEL_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; CHANNEL_ID_LEN] {
        &self.0
    }

    /// Convert to uppercase hex string.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }

    /// Parse from hex string, ignoring surrounding whitespace.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let s = s.trim();
        if s.len() != CHANNEL_ID_LEN * 2 {
            return Err(CoreError::InvalidChannelId(format!(
                "expected {} hex characters, got {}",
                CHANNEL_ID_LEN * 2,
                s.len()
            )));
        }
        let mut arr = [0u8; CHANNEL_ID_LEN];
        hex::decode_to_slice(s, &mut arr)
            .map_err(|e| CoreError::InvalidChannelId(e.to_string()))?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({}..)", &self.to_hex()[..16])
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ChannelId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl AsRef<[u8]> for ChannelId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; CHANNEL_ID_LEN]> for ChannelId {
    fn from(bytes: [u8; CHANNEL_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for ChannelId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ChannelId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_id_hex_roundtrip() {
        let id = ChannelId::from_bytes([0x42; 32]);
        let recovered = ChannelId::from_hex(&id.to_hex()).unwrap();
        assert_eq!(id, recovered);
    }

    #[test]
    fn test_channel_id_case_insensitive() {
        let upper = ChannelId::from_hex(&"AB".repeat(32)).unwrap();
        let lower = ChannelId::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(lower.to_string(), "AB".repeat(32));
    }

    #[test]
    fn test_channel_id_rejects_wrong_length() {
        assert!(matches!(
            ChannelId::from_hex("ABCD"),
            Err(CoreError::InvalidChannelId(_))
        ));
        assert!(ChannelId::from_hex(&"A".repeat(66)).is_err());
    }

    #[test]
    fn test_channel_id_rejects_non_hex() {
        assert!(ChannelId::from_hex(&"G".repeat(64)).is_err());
    }

    #[test]
    fn test_channel_id_debug_is_truncated() {
        let id = ChannelId::from_bytes([0xcd; 32]);
        assert_eq!(format!("{:?}", id), "ChannelId(CDCDCDCDCDCDCDCD..)");
    }
}
