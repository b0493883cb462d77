//! In-memory implementation of the ExposureStore trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use xccepta_core::{ChannelExposureState, ChannelId, ClaimDigest, Drops, ExposureDecision};

use crate::error::{Result, StoreError};
use crate::traits::{DispenseStatus, ExposureStore, JournalEntry};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Exposure state per channel.
    channels: BTreeMap<ChannelId, ChannelExposureState>,

    /// Journal in acceptance order.
    journal: Vec<JournalEntry>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

#[async_trait]
impl ExposureStore for MemoryStore {
    async fn get_state(&self, channel: &ChannelId) -> Result<Option<ChannelExposureState>> {
        Ok(self.read()?.channels.get(channel).cloned())
    }

    async fn list_channels(&self) -> Result<Vec<ChannelExposureState>> {
        Ok(self.read()?.channels.values().cloned().collect())
    }

    async fn try_accept(
        &self,
        channel: &ChannelId,
        amount: Drops,
        cap: Drops,
        journal: &JournalEntry,
    ) -> Result<ExposureDecision> {
        let mut inner = self.write()?;

        let mut state = inner
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| ChannelExposureState::new(*channel));

        let decision = state.evaluate(amount, cap);
        if decision.is_accept() {
            if inner.journal.iter().any(|e| e.digest == journal.digest) {
                return Err(StoreError::InvalidData(format!(
                    "duplicate journal digest {}",
                    journal.digest
                )));
            }
            state
                .record_accept(amount, journal.accepted_at)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?;
            inner.channels.insert(*channel, state);
            inner.journal.push(journal.clone());
        }
        Ok(decision)
    }

    async fn advance_last_seen(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool> {
        let mut inner = self.write()?;
        let mut state = inner
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| ChannelExposureState::new(*channel));
        if state.record_accept(amount, now).is_err() {
            return Ok(false);
        }
        inner.channels.insert(*channel, state);
        Ok(true)
    }

    async fn record_settlement(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool> {
        let mut inner = self.write()?;
        let mut state = inner
            .channels
            .get(channel)
            .cloned()
            .unwrap_or_else(|| ChannelExposureState::new(*channel));
        let advanced = state
            .record_settlement(amount, now)
            .map_err(|e| StoreError::InvalidData(e.to_string()))?;
        if advanced {
            inner.channels.insert(*channel, state);
        }
        Ok(advanced)
    }

    async fn mark_dispense(
        &self,
        digest: &ClaimDigest,
        status: DispenseStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        let mut inner = self.write()?;
        let entry = inner
            .journal
            .iter_mut()
            .find(|e| &e.digest == digest)
            .ok_or_else(|| StoreError::NotFound(digest.to_hex()))?;
        entry.status = status;
        entry.detail = detail.map(str::to_string);
        Ok(())
    }

    async fn list_journal(&self, status: Option<DispenseStatus>) -> Result<Vec<JournalEntry>> {
        Ok(self
            .read()?
            .journal
            .iter()
            .filter(|e| status.map_or(true, |s| e.status == s))
            .cloned()
            .collect())
    }
}
