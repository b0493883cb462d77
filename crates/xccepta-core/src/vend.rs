//! Dispense commands sent from the kiosk to vending hardware.

use serde::{Deserialize, Serialize};

use crate::amount::Drops;
use crate::error::CoreError;
use crate::types::ChannelId;

/// Value of the `action` field in every vend payload.
pub const VEND_ACTION: &str = "vend";

/// A bounded dispense instruction for one accepted claim.
///
/// Created per accepted claim and discarded after a single send attempt.
/// The claim fields are echoed for the hardware's audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendCommand {
    pub slot: u32,
    pub pulse_ms: u32,
    pub claim_channel: ChannelId,
    pub claim_amount_drops: Drops,
    pub device_id: String,
}

/// Wire form of a [`VendCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendPayload {
    pub action: String,
    pub slot: u32,
    pub pulse_ms: u32,
    pub claim_channel: String,
    pub claim_amount_drops: String,
    pub device_id: String,
}

impl VendCommand {
    pub fn payload(&self) -> VendPayload {
        VendPayload {
            action: VEND_ACTION.to_string(),
            slot: self.slot,
            pulse_ms: self.pulse_ms,
            claim_channel: self.claim_channel.to_hex(),
            claim_amount_drops: self.claim_amount_drops.to_string(),
            device_id: self.device_id.clone(),
        }
    }

    /// Compact JSON bytes, ready for a characteristic write.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CoreError> {
        Ok(serde_json::to_vec(&self.payload())?)
    }
}
