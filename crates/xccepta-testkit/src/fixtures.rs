//! Test fixtures and helpers.

use xccepta_core::{ChannelId, ClaimPayload, Drops, Keypair};
use xccepta_store::{ExposureStore, MemoryStore, Result};

/// A buyer device: one key, one channel.
pub struct BuyerFixture {
    pub keypair: Keypair,
    pub channel: ChannelId,
}

impl BuyerFixture {
    pub fn new(seed: [u8; 32], channel: ChannelId) -> Self {
        Self {
            keypair: Keypair::from_seed(&seed),
            channel,
        }
    }

    /// The buyer used throughout the kiosk scenarios: channel `"A" * 64`.
    pub fn standard() -> Self {
        Self::new([0x42; 32], ChannelId::from_bytes([0xAA; 32]))
    }

    pub fn channel_hex(&self) -> String {
        self.channel.to_hex()
    }

    /// Key in the ledger's tagged form (`ED` + 32 bytes).
    pub fn ledger_pubkey(&self) -> String {
        self.keypair.public_key().to_ledger_hex()
    }

    /// A correctly signed claim carrying the tagged public key.
    pub fn claim(&self, amount: u64) -> ClaimPayload {
        match self.keypair.sign_claim(&self.channel_hex(), Drops(amount)) {
            Ok(claim) => claim,
            Err(e) => panic!("fixture channel must encode: {e}"),
        }
    }

    /// A signed claim with no `pubkey`, so the kiosk has to resolve it.
    pub fn claim_without_pubkey(&self, amount: u64) -> ClaimPayload {
        ClaimPayload {
            pubkey: None,
            ..self.claim(amount)
        }
    }

    /// A signed claim carrying the bare 32-byte key instead of the tagged one.
    pub fn claim_with_raw_key(&self, amount: u64) -> ClaimPayload {
        ClaimPayload {
            pubkey: Some(self.keypair.public_key().to_hex().to_uppercase()),
            ..self.claim(amount)
        }
    }

    /// A claim signed for `signed` but presented as `presented`.
    pub fn tampered_claim(&self, signed: u64, presented: u64) -> ClaimPayload {
        ClaimPayload {
            amount_drops: Some(presented.to_string()),
            ..self.claim(signed)
        }
    }

    /// A claim presenting a compressed secp256k1-style key.
    ///
    /// The kiosk verifies Ed25519 only, so this never verifies.
    pub fn claim_with_secp256k1_key(&self, amount: u64) -> ClaimPayload {
        ClaimPayload {
            pubkey: Some(format!("02{}", "1F".repeat(32))),
            key_type: Some("secp256k1".to_string()),
            ..self.claim(amount)
        }
    }
}

impl Default for BuyerFixture {
    fn default() -> Self {
        Self::standard()
    }
}

/// Distinct buyers on distinct channels.
pub fn buyers(count: usize) -> Vec<BuyerFixture> {
    (0..count)
        .map(|i| {
            let mut seed = [0u8; 32];
            seed[0] = i as u8;
            let mut channel = [0x10u8; 32];
            channel[31] = i as u8;
            BuyerFixture::new(seed, ChannelId::from_bytes(channel))
        })
        .collect()
}

/// A memory store with `channel` already at `last_seen` / `settled`.
pub async fn seeded_store(channel: &ChannelId, last_seen: u64, settled: u64) -> Result<MemoryStore> {
    let store = MemoryStore::new();
    if last_seen > 0 {
        store.advance_last_seen(channel, Drops(last_seen), 1).await?;
    }
    if settled > 0 {
        store.record_settlement(channel, Drops(settled), 2).await?;
    }
    Ok(store)
}
