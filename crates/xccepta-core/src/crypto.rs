//! Cryptographic primitives for claim verification.
//!
//! Wraps Ed25519 signing and Blake3 hashing with strong types. The ledger
//! marks Ed25519 public keys with a leading `0xED` tag byte, giving 33-byte
//! keys; the tag carries no key material and is stripped before use.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::amount::IntoDrops;
use crate::canonical::encode_for_signing_claim;
use crate::claim::{ClaimPayload, KEY_TYPE_ED25519};
use crate::error::CoreError;

/// Tag byte the ledger prepends to Ed25519 public keys.
pub const ED25519_KEY_TAG: u8 = 0xED;

/// Length of a tagged ledger public key.
pub const TAGGED_KEY_LEN: usize = 33;

/// A 32-byte Ed25519 public key, without the ledger tag.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse a key in the ledger's tagged form (`ED` + 32 bytes).
    pub fn from_tagged(bytes: &[u8]) -> Result<Self, CoreError> {
        match bytes {
            [ED25519_KEY_TAG, rest @ ..] if bytes.len() == TAGGED_KEY_LEN => {
                let arr: [u8; 32] = rest.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
                Ok(Self(arr))
            }
            _ => Err(CoreError::InvalidPublicKey),
        }
    }

    /// Parse a bare 32-byte key.
    pub fn from_raw(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidPublicKey)?;
        Ok(Self(arr))
    }

    /// Lowercase hex of the bare key.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Uppercase hex in the ledger's tagged form.
    pub fn to_ledger_hex(&self) -> String {
        let mut tagged = Vec::with_capacity(TAGGED_KEY_LEN);
        tagged.push(ED25519_KEY_TAG);
        tagged.extend_from_slice(&self.0);
        hex::encode_upper(tagged)
    }

    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<(), CoreError> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519PublicKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse from a byte slice of exactly 64 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// Uppercase hex, the form buyer devices transmit.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Ed25519Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Blake3 digest identifying one signed claim (message || signature).
///
/// Used as the key of the dispense journal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimDigest(pub [u8; 32]);

impl ClaimDigest {
    pub fn compute(message: &[u8], signature: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(message);
        hasher.update(signature);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut arr = [0u8; 32];
        hex::decode_to_slice(s, &mut arr)
            .map_err(|_| CoreError::BadEncoding { field: "digest" })?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for ClaimDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClaimDigest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for ClaimDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Verify an Ed25519 signature given hex-encoded signature and ledger key.
///
/// Total over untrusted input: malformed hex, a key that is not 33 bytes
/// with the `0xED` tag, or a failed check all return `false`.
pub fn verify(message: &[u8], signature_hex: &str, pubkey_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(pubkey) = hex::decode(pubkey_hex.trim()) else {
        return false;
    };
    let (Ok(key), Ok(sig)) = (
        Ed25519PublicKey::from_tagged(&pubkey),
        Ed25519Signature::from_slice(&signature),
    ) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

/// A keypair for signing claims on the buyer side.
///
/// This wraps ed25519-dalek's SigningKey.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing_key = SigningKey::generate(&mut rng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create from a hex-encoded 32-byte seed.
    pub fn from_seed_hex(seed_hex: &str) -> Result<Self, CoreError> {
        let mut seed = [0u8; 32];
        hex::decode_to_slice(seed_hex.trim(), &mut seed)
            .map_err(|_| CoreError::BadEncoding { field: "seed" })?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the public key.
    pub fn public_key(&self) -> Ed25519PublicKey {
        Ed25519PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        let sig = self.signing_key.sign(message);
        Ed25519Signature(sig.to_bytes())
    }

    /// Sign a cumulative claim and package it the way buyer devices do.
    pub fn sign_claim(
        &self,
        channel_id: &str,
        amount: impl IntoDrops,
    ) -> Result<ClaimPayload, CoreError> {
        let amount = amount.into_drops()?;
        let message = encode_for_signing_claim(channel_id, amount)?;
        let signature = self.sign(&message);

        Ok(ClaimPayload {
            channel_id: Some(channel_id.trim().to_ascii_uppercase()),
            amount_drops: Some(amount.to_string()),
            signature: Some(signature.to_hex()),
            pubkey: Some(self.public_key().to_ledger_hex()),
            key_type: Some(KEY_TYPE_ED25519.to_string()),
            generated_at: None,
        })
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({:?})", self.public_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::encode_for_signing_claim;

    fn channel() -> String {
        "A".repeat(64)
    }

    #[test]
    fn test_keypair_sign_verify() {
        let keypair = Keypair::generate();
        let message = b"hello world";
        let signature = keypair.sign(message);

        keypair
            .public_key()
            .verify(message, &signature)
            .expect("valid signature should verify");

        let tampered = b"hello worlD";
        assert!(keypair.public_key().verify(tampered, &signature).is_err());
    }

    #[test]
    fn test_keypair_deterministic_from_seed() {
        let kp1 = Keypair::from_seed(&[0x42u8; 32]);
        let kp2 = Keypair::from_seed_hex(&"42".repeat(32)).unwrap();
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_verify_with_tagged_key() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let msg = encode_for_signing_claim(&channel(), "2500000").unwrap();
        let sig = keypair.sign(&msg).to_hex();
        let pk = keypair.public_key().to_ledger_hex();

        assert!(pk.starts_with("ED"));
        assert_eq!(pk.len(), 66);
        assert!(verify(&msg, &sig, &pk));
        assert!(verify(&msg, &sig.to_lowercase(), &pk.to_lowercase()));
    }

    #[test]
    fn test_verify_rejects_untagged_key() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let msg = encode_for_signing_claim(&channel(), "1").unwrap();
        let sig = keypair.sign(&msg).to_hex();
        assert!(!verify(&msg, &sig, &keypair.public_key().to_hex()));
    }

    #[test]
    fn test_verify_is_total_on_garbage() {
        let msg = b"anything";
        let pk = Keypair::from_seed(&[3u8; 32]).public_key().to_ledger_hex();
        assert!(!verify(msg, "zz", "ED00"));
        assert!(!verify(msg, "", ""));
        assert!(!verify(msg, &"00".repeat(64), &pk));
        assert!(!verify(msg, &"00".repeat(10), &pk));
        assert!(!verify(msg, &"00".repeat(64), &format!("02{}", "11".repeat(32))));
    }

    #[test]
    fn test_sign_claim_payload_shape() {
        let keypair = Keypair::from_seed(&[9u8; 32]);
        let payload = keypair.sign_claim(&"ab".repeat(32), "000150").unwrap();
        assert_eq!(payload.channel_id.as_deref(), Some("AB".repeat(32).as_str()));
        assert_eq!(payload.amount_drops.as_deref(), Some("150"));
        assert_eq!(payload.key_type.as_deref(), Some("ed25519"));
        let sig = payload.signature.unwrap();
        assert_eq!(sig.len(), 128);
        assert_eq!(sig, sig.to_uppercase());
    }

    #[test]
    fn test_claim_digest_depends_on_signature() {
        let d1 = ClaimDigest::compute(b"msg", &[1u8; 64]);
        let d2 = ClaimDigest::compute(b"msg", &[2u8; 64]);
        assert_ne!(d1, d2);
        assert_eq!(ClaimDigest::from_hex(&d1.to_hex()).unwrap(), d1);
    }
}
