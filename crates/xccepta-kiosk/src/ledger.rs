//! The exposure-control ledger.
//!
//! Wraps an [`ExposureStore`] with the kiosk's cap and a per-channel async
//! lock, so that the load, check and durable update for one channel never
//! interleave with another claim on the same channel. Different channels
//! proceed independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use xccepta_core::{ChannelExposureState, ChannelId, ClaimDigest, Drops, ExposureDecision};
use xccepta_net::SettlementReceipt;
use xccepta_store::{DispenseStatus, ExposureStore, ExposureStoreExt, JournalEntry, StoreError};

use crate::error::Result;

pub struct ExposureLedger<S: ExposureStore> {
    store: Arc<S>,
    cap: Drops,
    locks: Mutex<HashMap<ChannelId, Arc<AsyncMutex<()>>>>,
}

impl<S: ExposureStore> ExposureLedger<S> {
    pub fn new(store: S, cap: Drops) -> Self {
        Self::with_store(Arc::new(store), cap)
    }

    pub fn with_store(store: Arc<S>, cap: Drops) -> Self {
        Self {
            store,
            cap,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn cap(&self) -> Drops {
        self.cap
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Serialize all state changes for `channel` behind the returned guard.
    pub async fn lock(&self, channel: &ChannelId) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            locks.entry(*channel).or_default().clone()
        };
        Ok(lock.lock_owned().await)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────────────────────

    /// Read-only policy check against the current state.
    pub async fn evaluate(&self, channel: &ChannelId, amount: Drops) -> Result<ExposureDecision> {
        let state = self.store.state_or_default(channel).await?;
        Ok(state.evaluate(amount, self.cap))
    }

    /// Durably advance `last_seen` to `amount`.
    ///
    /// Returns `false` if another acceptance already reached `amount`; the
    /// caller must then treat the claim as stale.
    pub async fn record_accept(&self, channel: &ChannelId, amount: Drops) -> Result<bool> {
        let _guard = self.lock(channel).await?;
        Ok(self
            .store
            .advance_last_seen(channel, amount, xccepta_store::now_millis())
            .await?)
    }

    /// Evaluate and, on accept, persist `last_seen` and `journal` atomically.
    ///
    /// The acceptance is on stable storage before this returns.
    pub async fn try_accept(
        &self,
        channel: &ChannelId,
        amount: Drops,
        journal: &JournalEntry,
    ) -> Result<ExposureDecision> {
        let _guard = self.lock(channel).await?;
        let decision = self
            .store
            .try_accept(channel, amount, self.cap, journal)
            .await?;
        match decision {
            ExposureDecision::Accept => {
                tracing::debug!(channel = %channel, amount = %amount, "exposure advanced");
            }
            ExposureDecision::Decline(reason) => {
                tracing::debug!(channel = %channel, amount = %amount, reason = reason.as_str(), "exposure declined");
            }
        }
        Ok(decision)
    }

    /// Apply an external settlement confirmation.
    pub async fn record_settlement(&self, channel: &ChannelId, amount: Drops) -> Result<bool> {
        let _guard = self.lock(channel).await?;
        let advanced = self
            .store
            .record_settlement(channel, amount, xccepta_store::now_millis())
            .await?;
        if advanced {
            tracing::info!(channel = %channel, settled = %amount, "settlement recorded");
        }
        Ok(advanced)
    }

    /// Fold backend settlement receipts into the settled amounts.
    ///
    /// Receipts that cannot be read, or that cover more than this kiosk has
    /// accepted on the channel, are skipped. Returns how many advanced a
    /// channel.
    pub async fn apply_receipts(&self, receipts: &[SettlementReceipt]) -> Result<usize> {
        let mut applied = 0;
        for receipt in receipts {
            let (Some(channel), Some(amount)) = (receipt.channel(), receipt.amount()) else {
                tracing::debug!(?receipt, "skipping unreadable receipt");
                continue;
            };
            let state = self.status(&channel).await?;
            if amount > state.last_seen_amount {
                tracing::debug!(channel = %channel, %amount, "receipt exceeds accepted amount, skipping");
                continue;
            }
            if self.record_settlement(&channel, amount).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status
    // ─────────────────────────────────────────────────────────────────────────

    pub async fn status(&self, channel: &ChannelId) -> Result<ChannelExposureState> {
        Ok(self.store.state_or_default(channel).await?)
    }

    pub async fn channels(&self) -> Result<Vec<ChannelExposureState>> {
        Ok(self.store.list_channels().await?)
    }

    pub async fn mark_dispense(
        &self,
        digest: &ClaimDigest,
        status: DispenseStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        Ok(self.store.mark_dispense(digest, status, detail).await?)
    }

    /// Accepted claims whose dispense was never confirmed as handed off.
    pub async fn list_undispensed(&self) -> Result<Vec<JournalEntry>> {
        let mut entries = self.store.list_journal(Some(DispenseStatus::Undispensed)).await?;
        entries.extend(self.store.list_journal(Some(DispenseStatus::Pending)).await?);
        entries.sort_by_key(|e| e.accepted_at);
        Ok(entries)
    }
}
