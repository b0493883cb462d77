//! ExposureStore trait: the abstract interface for exposure persistence.
//!
//! State is a flat keyed map of integers, `last_seen:<CHANNEL>` and
//! `settled:<CHANNEL>`, plus a journal of accepted claims. Implementations
//! include SQLite (durable) and in-memory (for tests).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use xccepta_core::{ChannelExposureState, ChannelId, ClaimDigest, ClaimPayload, Drops, ExposureDecision};

use crate::error::Result;

/// Key prefix for the highest accepted amount of a channel.
pub const LAST_SEEN_PREFIX: &str = "last_seen:";

/// Key prefix for the highest settled amount of a channel.
pub const SETTLED_PREFIX: &str = "settled:";

/// `last_seen:<CHANNEL>`
pub fn last_seen_key(channel: &ChannelId) -> String {
    format!("{}{}", LAST_SEEN_PREFIX, channel.to_hex())
}

/// `settled:<CHANNEL>`
pub fn settled_key(channel: &ChannelId) -> String {
    format!("{}{}", SETTLED_PREFIX, channel.to_hex())
}

/// What happened to the dispense for an accepted claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispenseStatus {
    /// Accepted; hand-off to hardware not yet reported.
    Pending,
    /// Command written to the hardware link.
    Dispatched,
    /// Hand-off failed or was skipped; needs out-of-band reconciliation.
    Undispensed,
}

impl DispenseStatus {
    pub fn to_i64(self) -> i64 {
        match self {
            DispenseStatus::Pending => 0,
            DispenseStatus::Dispatched => 1,
            DispenseStatus::Undispensed => 2,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(DispenseStatus::Pending),
            1 => Some(DispenseStatus::Dispatched),
            2 => Some(DispenseStatus::Undispensed),
            _ => None,
        }
    }
}

/// One accepted claim, recorded in the same transaction as its acceptance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JournalEntry {
    pub digest: ClaimDigest,
    pub channel_id: ChannelId,
    pub amount: Drops,
    pub device_id: String,
    /// Local acceptance time (Unix ms).
    pub accepted_at: i64,
    pub status: DispenseStatus,
    /// Transport error text for undispensed entries.
    pub detail: Option<String>,
    /// The claim as presented, with any resolved key filled in.
    pub claim: ClaimPayload,
}

impl JournalEntry {
    pub fn pending(
        digest: ClaimDigest,
        channel_id: ChannelId,
        amount: Drops,
        device_id: impl Into<String>,
        claim: ClaimPayload,
        accepted_at: i64,
    ) -> Self {
        Self {
            digest,
            channel_id,
            amount,
            device_id: device_id.into(),
            accepted_at,
            status: DispenseStatus::Pending,
            detail: None,
            claim,
        }
    }
}

/// The ExposureStore trait: async interface for exposure persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Atomic decisions**: `try_accept` evaluates and records in a single
///   transaction, so no interleaving is possible between load and update.
/// - **Durability**: a returned acceptance is already on stable storage.
/// - **No torn reads**: `get_state` reads both counters in one snapshot.
#[async_trait]
pub trait ExposureStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Exposure State
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the state of a channel, or `None` if it was never accepted.
    async fn get_state(&self, channel: &ChannelId) -> Result<Option<ChannelExposureState>>;

    /// All channels with an accepted claim, ordered by channel id.
    async fn list_channels(&self) -> Result<Vec<ChannelExposureState>>;

    /// Evaluate `amount` against `cap` and, if accepted, durably advance
    /// `last_seen` and insert `journal` before returning.
    async fn try_accept(
        &self,
        channel: &ChannelId,
        amount: Drops,
        cap: Drops,
        journal: &JournalEntry,
    ) -> Result<ExposureDecision>;

    /// Compare-and-set advance of `last_seen`.
    ///
    /// Returns `false` without writing if the stored value is already
    /// `>= amount`.
    async fn advance_last_seen(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool>;

    /// Advance `settled` from an external confirmation.
    ///
    /// Returns `false` for a no-op; errors if `amount` exceeds `last_seen`.
    async fn record_settlement(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Dispense Journal
    // ─────────────────────────────────────────────────────────────────────────

    /// Update the dispense status of a journal entry.
    async fn mark_dispense(
        &self,
        digest: &ClaimDigest,
        status: DispenseStatus,
        detail: Option<&str>,
    ) -> Result<()>;

    /// Journal entries, optionally filtered by status, oldest first.
    async fn list_journal(&self, status: Option<DispenseStatus>) -> Result<Vec<JournalEntry>>;
}

/// Extension trait for common store patterns.
pub trait ExposureStoreExt: ExposureStore {
    /// State of a channel, defaulting to zeros for unknown channels.
    fn state_or_default(
        &self,
        channel: &ChannelId,
    ) -> impl std::future::Future<Output = Result<ChannelExposureState>> + Send;
}

impl<S: ExposureStore + ?Sized> ExposureStoreExt for S {
    async fn state_or_default(&self, channel: &ChannelId) -> Result<ChannelExposureState> {
        Ok(self
            .get_state(channel)
            .await?
            .unwrap_or_else(|| ChannelExposureState::new(*channel)))
    }
}

/// Encode a claim payload for the journal.
pub(crate) fn encode_claim(claim: &ClaimPayload) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(claim, &mut buf)
        .map_err(|e| crate::error::StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Decode a journal claim payload.
pub(crate) fn decode_claim(bytes: &[u8]) -> Result<ClaimPayload> {
    ciborium::from_reader(bytes).map_err(|e| crate::error::StoreError::Serialization(e.to_string()))
}
