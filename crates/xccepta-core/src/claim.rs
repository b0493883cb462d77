//! Claims: the buyer's signed authorization for a cumulative amount.
//!
//! A [`ClaimPayload`] is the structured text a buyer device hands the kiosk,
//! deserialized as-is. [`ClaimPayload::into_claim`] applies the structural
//! gate and yields an immutable [`Claim`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::amount::normalize_amount;
use crate::error::CoreError;

/// `key_type` value emitted by buyer devices for Ed25519 keys.
pub const KEY_TYPE_ED25519: &str = "ed25519";

/// The claim payload as transmitted by a buyer device.
///
/// All fields are optional at this layer so that missing fields can be
/// reported together. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,

    /// Cumulative amount; accepted as a JSON string or integer.
    #[serde(
        default,
        deserialize_with = "string_or_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_drops: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,

    /// Informational only; never verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

fn string_or_integer<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Text(s)) => Some(s),
        Some(Raw::Unsigned(n)) => Some(n.to_string()),
        Some(Raw::Signed(n)) => Some(n.to_string()),
        None => None,
    })
}

impl ClaimPayload {
    /// Parse a payload from JSON text.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to pretty JSON, the format buyer tools write to disk.
    pub fn to_json_pretty(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Attach an informational timestamp.
    pub fn with_generated_at(mut self, generated_at: impl Into<String>) -> Self {
        self.generated_at = Some(generated_at.into());
        self
    }

    /// Apply the structural gate.
    ///
    /// Requires a non-empty channel id, a positive integer amount, and a
    /// non-empty signature. Hex well-formedness of the channel id is left to
    /// the encoder; an empty `pubkey` is treated as absent.
    pub fn into_claim(self) -> Result<Claim, CoreError> {
        let channel_id = non_empty(self.channel_id);
        let amount_drops = non_empty(self.amount_drops);
        let signature = non_empty(self.signature);

        let mut missing = Vec::new();
        if channel_id.is_none() {
            missing.push("channel_id");
        }
        match amount_drops.as_deref() {
            None => missing.push("amount_drops"),
            Some(amount) if !is_positive_integer(amount) => missing.push("amount_drops"),
            Some(_) => {}
        }
        if signature.is_none() {
            missing.push("signature");
        }

        match (channel_id, amount_drops, signature) {
            (Some(channel_id), Some(amount_drops), Some(signature)) if missing.is_empty() => {
                Ok(Claim {
                    channel_id,
                    amount_drops,
                    signature,
                    pubkey: non_empty(self.pubkey),
                    key_type: non_empty(self.key_type),
                    generated_at: self.generated_at,
                })
            }
            _ => Err(CoreError::MissingFields(missing)),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Digits only, and not all zeros. Overflow is caught later by the encoder.
fn is_positive_integer(text: &str) -> bool {
    !text.is_empty()
        && text.bytes().all(|b| b.is_ascii_digit())
        && text.bytes().any(|b| b != b'0')
}

/// A structurally valid claim.
///
/// Immutable once loaded; the only change the intake pipeline makes is to
/// attach a resolved public key via [`Claim::with_pubkey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Claim {
    channel_id: String,
    amount_drops: String,
    signature: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pubkey: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    key_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generated_at: Option<String>,
}

impl Claim {
    /// Parse and structurally validate a JSON claim.
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        ClaimPayload::from_json(text)?.into_claim()
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// The amount text as presented (trimmed, not yet normalized).
    pub fn amount_drops(&self) -> &str {
        &self.amount_drops
    }

    /// Minimal decimal form of the amount.
    pub fn normalized_amount(&self) -> Result<String, CoreError> {
        normalize_amount(&self.amount_drops).map(|(_, text)| text)
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn pubkey(&self) -> Option<&str> {
        self.pubkey.as_deref()
    }

    pub fn key_type(&self) -> Option<&str> {
        self.key_type.as_deref()
    }

    pub fn generated_at(&self) -> Option<&str> {
        self.generated_at.as_deref()
    }

    /// Back to the wire form, e.g. for forwarding to the settlement backend.
    pub fn to_payload(&self) -> ClaimPayload {
        ClaimPayload {
            channel_id: Some(self.channel_id.clone()),
            amount_drops: Some(self.amount_drops.clone()),
            signature: Some(self.signature.clone()),
            pubkey: self.pubkey.clone(),
            key_type: self.key_type.clone(),
            generated_at: self.generated_at.clone(),
        }
    }

    /// Fill in a key resolved from the ledger. An existing key is kept.
    pub fn with_pubkey(mut self, pubkey: impl Into<String>) -> Self {
        if self.pubkey.is_none() {
            self.pubkey = Some(pubkey.into());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_payload() {
        let json = r#"{
            "channel_id": "AAAA",
            "amount_drops": "2500000",
            "signature": "ABCD",
            "pubkey": "ED01",
            "key_type": "ed25519",
            "generated_at": "2025-01-01T00:00:00Z",
            "extra": 7
        }"#;
        let claim = Claim::from_json(json).unwrap();
        assert_eq!(claim.channel_id(), "AAAA");
        assert_eq!(claim.amount_drops(), "2500000");
        assert_eq!(claim.pubkey(), Some("ED01"));
        assert_eq!(claim.generated_at(), Some("2025-01-01T00:00:00Z"));
    }

    #[test]
    fn test_integer_amount_accepted() {
        let json = r#"{"channel_id":"AA","amount_drops":1000,"signature":"00"}"#;
        let claim = Claim::from_json(json).unwrap();
        assert_eq!(claim.amount_drops(), "1000");
        assert!(claim.pubkey().is_none());
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let err = Claim::from_json(r#"{"amount_drops":"5"}"#).unwrap_err();
        assert_eq!(err, CoreError::MissingFields(vec!["channel_id", "signature"]));
    }

    #[test]
    fn test_blank_fields_count_as_missing() {
        let err = Claim::from_json(r#"{"channel_id":"  ","amount_drops":"5","signature":""}"#)
            .unwrap_err();
        assert_eq!(err, CoreError::MissingFields(vec!["channel_id", "signature"]));
    }

    #[test]
    fn test_non_positive_amounts_rejected() {
        for amount in ["0", "000", "-3", "1.5", "abc"] {
            let json = format!(
                r#"{{"channel_id":"AA","amount_drops":"{}","signature":"00"}}"#,
                amount
            );
            assert_eq!(
                Claim::from_json(&json).unwrap_err(),
                CoreError::MissingFields(vec!["amount_drops"]),
                "amount {:?}",
                amount
            );
        }
        let negative = r#"{"channel_id":"AA","amount_drops":-3,"signature":"00"}"#;
        assert!(Claim::from_json(negative).is_err());
    }

    #[test]
    fn test_empty_pubkey_is_absent() {
        let json = r#"{"channel_id":"AA","amount_drops":"5","signature":"00","pubkey":""}"#;
        assert!(Claim::from_json(json).unwrap().pubkey().is_none());
    }

    #[test]
    fn test_with_pubkey_only_fills_absent_key() {
        let json = r#"{"channel_id":"AA","amount_drops":"5","signature":"00"}"#;
        let claim = Claim::from_json(json).unwrap().with_pubkey("ED11");
        assert_eq!(claim.pubkey(), Some("ED11"));
        let claim = claim.with_pubkey("ED22");
        assert_eq!(claim.pubkey(), Some("ED11"));
    }

    #[test]
    fn test_normalized_amount() {
        let json = r#"{"channel_id":"AA","amount_drops":" 0070 ","signature":"00"}"#;
        let claim = Claim::from_json(json).unwrap();
        assert_eq!(claim.amount_drops(), "0070");
        assert_eq!(claim.normalized_amount().unwrap(), "70");
    }

    #[test]
    fn test_bad_json_is_json_error() {
        assert!(matches!(Claim::from_json("{not json"), Err(CoreError::Json(_))));
    }
}
