//! Proptest generators for property-based testing.

use proptest::prelude::*;

use xccepta_core::{ChannelId, ClaimPayload, Drops, Keypair};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a random ChannelId.
pub fn channel_id() -> impl Strategy<Value = ChannelId> {
    any::<[u8; 32]>().prop_map(ChannelId::from_bytes)
}

/// Generate a positive amount.
pub fn amount() -> impl Strategy<Value = Drops> {
    (1u64..=u64::MAX).prop_map(Drops)
}

/// Generate a positive amount in kiosk-sized ranges.
pub fn small_amount() -> impl Strategy<Value = Drops> {
    (1u64..=10_000_000).prop_map(Drops)
}

/// Decimal text for `amount`, with up to three leading zeros.
pub fn amount_text(amount: Drops) -> impl Strategy<Value = String> {
    (0usize..=3).prop_map(move |zeros| format!("{}{}", "0".repeat(zeros), amount.get()))
}

/// Generate a sequence of claim amounts, not necessarily increasing.
pub fn amount_sequence(max_len: usize) -> impl Strategy<Value = Vec<Drops>> {
    prop::collection::vec(small_amount(), 1..=max_len)
}

/// Parameters for generating a signed claim.
#[derive(Debug, Clone)]
pub struct ClaimParams {
    pub seed: [u8; 32],
    pub channel: ChannelId,
    pub amount: Drops,
    /// Upper-case the channel hex as buyer devices do.
    pub upper: bool,
}

impl ClaimParams {
    pub fn keypair(&self) -> Keypair {
        Keypair::from_seed(&self.seed)
    }

    /// Sign the claim described by these parameters.
    pub fn sign(&self) -> ClaimPayload {
        let channel = if self.upper {
            self.channel.to_hex()
        } else {
            self.channel.to_hex().to_lowercase()
        };
        match self.keypair().sign_claim(&channel, self.amount) {
            Ok(claim) => claim,
            Err(e) => panic!("generated channel must encode: {e}"),
        }
    }
}

impl Arbitrary for ClaimParams {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        (any::<[u8; 32]>(), channel_id(), amount(), any::<bool>())
            .prop_map(|(seed, channel, amount, upper)| ClaimParams {
                seed,
                channel,
                amount,
                upper,
            })
            .boxed()
    }
}
