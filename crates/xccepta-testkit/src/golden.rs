//! Golden test vectors.
//!
//! Claim encodings must match the ledger byte for byte, and signatures must
//! match RFC 8032, or claims signed by real wallets will never verify.

use xccepta_core::canonical::{CLAIM_HASH_PREFIX, CLAIM_MESSAGE_LEN};
use xccepta_core::{encode_for_signing_claim, ChannelId, Drops};

/// A fixed claim and its expected signing bytes.
#[derive(Debug, Clone)]
pub struct ClaimVector {
    pub name: &'static str,
    pub channel_id: &'static str,
    pub amount: &'static str,
    /// Upper-case hex of `CLM\0 || channel || amount(BE)`.
    pub expected_message: &'static str,
}

/// Claim encoding vectors.
pub fn claim_vectors() -> Vec<ClaimVector> {
    vec![
        ClaimVector {
            name: "one XRP on the scenario channel",
            channel_id: "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            amount: "1000000",
            expected_message: "434C4D00\
                               AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\
                               00000000000F4240",
        },
        ClaimVector {
            name: "leading zeros and lower-case channel",
            channel_id: "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            amount: "0001000000",
            expected_message: "434C4D00\
                               AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA\
                               00000000000F4240",
        },
        ClaimVector {
            name: "one drop",
            channel_id: "0000000000000000000000000000000000000000000000000000000000000001",
            amount: "1",
            expected_message: "434C4D00\
                               0000000000000000000000000000000000000000000000000000000000000001\
                               0000000000000001",
        },
        ClaimVector {
            name: "maximum amount",
            channel_id: "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF",
            amount: "18446744073709551615",
            expected_message: "434C4D00\
                               FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF\
                               FFFFFFFFFFFFFFFF",
        },
    ]
}

/// Encode a vector's fields.
pub fn encode_vector(vector: &ClaimVector) -> Vec<u8> {
    match encode_for_signing_claim(vector.channel_id, vector.amount) {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => panic!("vector {:?} must encode: {e}", vector.name),
    }
}

/// Split signing bytes back into channel and amount.
///
/// `None` unless `message` is exactly one well-formed claim message.
pub fn decode_message(message: &[u8]) -> Option<(ChannelId, Drops)> {
    if message.len() != CLAIM_MESSAGE_LEN {
        return None;
    }
    let (prefix, rest) = message.split_at(CLAIM_HASH_PREFIX.len());
    if prefix != CLAIM_HASH_PREFIX {
        return None;
    }
    let (channel, amount) = rest.split_at(32);
    Some((
        ChannelId::from_bytes(channel.try_into().ok()?),
        Drops(u64::from_be_bytes(amount.try_into().ok()?)),
    ))
}

/// An Ed25519 test vector from RFC 8032 section 7.1.
#[derive(Debug, Clone)]
pub struct SignatureVector {
    pub name: &'static str,
    pub secret_key: &'static str,
    pub public_key: &'static str,
    pub message: &'static str,
    pub signature: &'static str,
}

/// RFC 8032 tests 1 and 2.
pub fn rfc8032_vectors() -> Vec<SignatureVector> {
    vec![
        SignatureVector {
            name: "TEST 1",
            secret_key: "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60",
            public_key: "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a",
            message: "",
            signature: "e5564300c360ac729086e2cc806e828a84877f1eb8e5d974d873e06522490155\
                        5fb8821590a33bacc61e39701cf9b46bd25bf5f0595bbe24655141438e7a100b",
        },
        SignatureVector {
            name: "TEST 2",
            secret_key: "4ccd089b28ff96da9db6c346ec114e0f5b8a319f35aba624da8cf6ed4fb8a6fb",
            public_key: "3d4017c3e843895a92b70aa74d1b7ebc9c982ccf2ec4968cc0cd55f12af4660c",
            message: "72",
            signature: "92a009a9f0d4cab8720e820b5f642540a2b27b5416503f8fb3762223ebdb69da\
                        085ac1e43e15996e458f3613d0f11d8c387b2eaeb4302aeeb00d291612bb0c00",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_wrong_prefix_and_length() {
        let mut message = encode_vector(&claim_vectors()[0]);
        assert!(decode_message(&message).is_some());
        assert!(decode_message(&message[..10]).is_none());
        message[0] = b'X';
        assert!(decode_message(&message).is_none());
    }

    #[test]
    fn test_vector_count() {
        assert!(claim_vectors().len() >= 4);
        assert_eq!(rfc8032_vectors().len(), 2);
    }
}
