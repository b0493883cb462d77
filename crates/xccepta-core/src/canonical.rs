//! Canonical claim-signing encoding.
//!
//! A payment channel claim authorizes a cumulative amount on one channel. The
//! ledger defines the signed bytes as its binary field encoding of the pair
//! `(Channel, Amount)` behind a hash prefix:
//!
//! ```text
//! 0x434C4D00 ("CLM\0")   4 bytes   hash prefix for channel claims
//! Channel (Hash256)      32 bytes  raw channel id
//! Amount  (UInt64)        8 bytes  big-endian drops
//! ```
//!
//! The format is fixed and versionless. Every function here is pure.

use bytes::{BufMut, Bytes, BytesMut};

use crate::amount::{Drops, IntoDrops};
use crate::error::CoreError;
use crate::types::{ChannelId, CHANNEL_ID_LEN};

/// Hash prefix the ledger uses for payment channel claim signatures.
pub const CLAIM_HASH_PREFIX: [u8; 4] = *b"CLM\0";

/// Total length of an encoded claim message.
pub const CLAIM_MESSAGE_LEN: usize = CLAIM_HASH_PREFIX.len() + CHANNEL_ID_LEN + 8;

/// Encode the signing bytes for an already-parsed channel and amount.
pub fn claim_signing_bytes(channel: &ChannelId, amount: Drops) -> Bytes {
    let mut buf = BytesMut::with_capacity(CLAIM_MESSAGE_LEN);
    buf.put_slice(&CLAIM_HASH_PREFIX);
    buf.put_slice(channel.as_bytes());
    buf.put_u64(amount.get());
    buf.freeze()
}

/// Encode the signing bytes from untrusted claim fields.
///
/// `amount` may be decimal text or an integer; text is normalized first so
/// `"007"` and `"7"` produce identical bytes.
pub fn encode_for_signing_claim(
    channel_id: &str,
    amount: impl IntoDrops,
) -> Result<Bytes, CoreError> {
    let channel = ChannelId::from_hex(channel_id)?;
    let amount = amount.into_drops()?;
    Ok(claim_signing_bytes(&channel, amount))
}
