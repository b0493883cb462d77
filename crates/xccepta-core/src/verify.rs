//! Ordered signature verification strategies.
//!
//! Each strategy is total and answers with a tri-state verdict. A
//! [`VerifierChain`] asks its strategies in order and stops at the first one
//! that gives a definitive answer, so a strategy that does not understand a
//! key format simply steps aside.

use crate::crypto::{Ed25519PublicKey, Ed25519Signature, ED25519_KEY_TAG, TAGGED_KEY_LEN};

/// Answer from a single verification strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyVerdict {
    Valid,
    Invalid,
    /// The strategy does not handle this key format.
    Inapplicable,
}

impl VerifyVerdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyVerdict::Valid)
    }
}

/// One way of checking a signature. Must never panic on untrusted input.
pub trait VerificationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> VerifyVerdict;
}

/// Ledger-tagged Ed25519 keys: 33 bytes beginning with `0xED`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedEd25519;

impl VerificationStrategy for TaggedEd25519 {
    fn name(&self) -> &'static str {
        "ed25519-tagged"
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> VerifyVerdict {
        if public_key.len() != TAGGED_KEY_LEN || public_key[0] != ED25519_KEY_TAG {
            return VerifyVerdict::Inapplicable;
        }
        check(Ed25519PublicKey::from_tagged(public_key).ok(), message, signature)
    }
}

/// Bare 32-byte Ed25519 keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawEd25519;

impl VerificationStrategy for RawEd25519 {
    fn name(&self) -> &'static str {
        "ed25519-raw"
    }

    fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> VerifyVerdict {
        if public_key.len() != 32 {
            return VerifyVerdict::Inapplicable;
        }
        check(Ed25519PublicKey::from_raw(public_key).ok(), message, signature)
    }
}

fn check(key: Option<Ed25519PublicKey>, message: &[u8], signature: &[u8]) -> VerifyVerdict {
    let (Some(key), Ok(sig)) = (key, Ed25519Signature::from_slice(signature)) else {
        return VerifyVerdict::Invalid;
    };
    match key.verify(message, &sig) {
        Ok(()) => VerifyVerdict::Valid,
        Err(_) => VerifyVerdict::Invalid,
    }
}

/// Strategies tried in order until one is definitive.
pub struct VerifierChain {
    strategies: Vec<Box<dyn VerificationStrategy>>,
}

impl VerifierChain {
    pub fn new(strategies: Vec<Box<dyn VerificationStrategy>>) -> Self {
        Self { strategies }
    }

    /// Verify raw bytes. Returns `Inapplicable` if no strategy handles the key.
    pub fn verify(&self, message: &[u8], signature: &[u8], public_key: &[u8]) -> VerifyVerdict {
        for strategy in &self.strategies {
            match strategy.verify(message, signature, public_key) {
                VerifyVerdict::Inapplicable => continue,
                verdict => return verdict,
            }
        }
        VerifyVerdict::Inapplicable
    }

    /// Verify hex-encoded signature and key. Malformed hex is `Invalid`.
    pub fn verify_hex(&self, message: &[u8], signature_hex: &str, pubkey_hex: &str) -> VerifyVerdict {
        match (hex::decode(signature_hex.trim()), hex::decode(pubkey_hex.trim())) {
            (Ok(signature), Ok(public_key)) => self.verify(message, &signature, &public_key),
            _ => VerifyVerdict::Invalid,
        }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

impl Default for VerifierChain {
    /// Tagged ledger keys first, then bare Ed25519 keys.
    fn default() -> Self {
        Self::new(vec![Box::new(TaggedEd25519), Box::new(RawEd25519)])
    }
}

impl std::fmt::Debug for VerifierChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.strategy_names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::encode_for_signing_claim;
    use crate::crypto::Keypair;
    use proptest::prelude::*;

    fn signed(amount: &str) -> (Vec<u8>, Keypair, String) {
        let kp = Keypair::from_seed(&[0x42; 32]);
        let msg = encode_for_signing_claim(&"A".repeat(64), amount).unwrap().to_vec();
        let sig = kp.sign(&msg).to_hex();
        (msg, kp, sig)
    }

    #[test]
    fn test_chain_accepts_tagged_and_bare_keys() {
        let (msg, kp, sig) = signed("1000000");
        let chain = VerifierChain::default();
        assert_eq!(
            chain.verify_hex(&msg, &sig, &kp.public_key().to_ledger_hex()),
            VerifyVerdict::Valid
        );
        assert_eq!(
            chain.verify_hex(&msg, &sig, &kp.public_key().to_hex()),
            VerifyVerdict::Valid
        );
    }

    #[test]
    fn test_secp_keys_are_inapplicable() {
        let (msg, _, sig) = signed("1");
        let secp = format!("02{}", "11".repeat(32));
        assert_eq!(
            VerifierChain::default().verify_hex(&msg, &sig, &secp),
            VerifyVerdict::Inapplicable
        );
    }

    #[test]
    fn test_tagged_strategy_steps_aside_for_bare_key() {
        let (msg, kp, sig) = signed("1");
        let sig = hex::decode(sig).unwrap();
        assert_eq!(
            TaggedEd25519.verify(&msg, &sig, kp.public_key().as_bytes()),
            VerifyVerdict::Inapplicable
        );
    }

    #[test]
    fn test_tagged_only_chain_rejects_bare_key() {
        let (msg, kp, sig) = signed("1");
        let chain = VerifierChain::new(vec![Box::new(TaggedEd25519)]);
        assert!(!chain.verify_hex(&msg, &sig, &kp.public_key().to_hex()).is_valid());
    }

    #[test]
    fn test_malformed_hex_is_invalid() {
        let chain = VerifierChain::default();
        assert_eq!(chain.verify_hex(b"m", "xyz", "ED00"), VerifyVerdict::Invalid);
    }

    #[test]
    fn test_wrong_length_signature_is_invalid() {
        let (msg, kp, _) = signed("1");
        let chain = VerifierChain::default();
        assert_eq!(
            chain.verify_hex(&msg, &"AB".repeat(63), &kp.public_key().to_ledger_hex()),
            VerifyVerdict::Invalid
        );
    }

    #[test]
    fn test_default_chain_order() {
        assert_eq!(
            VerifierChain::default().strategy_names(),
            vec!["ed25519-tagged", "ed25519-raw"]
        );
    }

    proptest! {
        #[test]
        fn test_signature_bit_flip_detected(byte in 0usize..64, bit in 0u8..8) {
            let (msg, kp, sig) = signed("2500000");
            let mut raw = hex::decode(sig).unwrap();
            raw[byte] ^= 1 << bit;
            let verdict = VerifierChain::default().verify(&msg, &raw, &{
                let mut k = vec![ED25519_KEY_TAG];
                k.extend_from_slice(kp.public_key().as_bytes());
                k
            });
            prop_assert_eq!(verdict, VerifyVerdict::Invalid);
        }

        #[test]
        fn test_message_bit_flip_detected(byte in 4usize..44, bit in 0u8..8) {
            let (mut msg, kp, sig) = signed("2500000");
            msg[byte] ^= 1 << bit;
            let pk = kp.public_key().to_ledger_hex();
            prop_assert_eq!(
                VerifierChain::default().verify_hex(&msg, &sig, &pk),
                VerifyVerdict::Invalid
            );
        }
    }
}
