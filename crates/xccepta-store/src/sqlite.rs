//! SQLite implementation of the ExposureStore trait.
//!
//! This is the durable backend used on the kiosk. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking. Writes run in
//! `IMMEDIATE` transactions with `synchronous=FULL`, so a decision returned to
//! the caller has reached stable storage.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use xccepta_core::{ChannelExposureState, ChannelId, ClaimDigest, Drops, ExposureDecision};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{
    decode_claim, encode_claim, last_seen_key, settled_key, DispenseStatus, ExposureStore,
    JournalEntry, LAST_SEEN_PREFIX, SETTLED_PREFIX,
};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened exposure store");
        Self::init(conn)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        tracing::trace!(journal_mode = %mode, "configured sqlite");
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection from a worker thread.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row helpers
// ─────────────────────────────────────────────────────────────────────────────

fn get_value(conn: &Connection, key: &str) -> Result<Option<(u64, i64)>> {
    let row = conn
        .query_row(
            "SELECT value, updated_at FROM exposure_kv WHERE key = ?1",
            params![key],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
        )
        .optional()?;
    Ok(row.map(|(value, at)| (value as u64, at)))
}

fn put_value(conn: &Connection, key: &str, value: u64, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO exposure_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, value as i64, now],
    )?;
    Ok(())
}

fn load_state(conn: &Connection, channel: &ChannelId) -> Result<Option<ChannelExposureState>> {
    let last_seen = get_value(conn, &last_seen_key(channel))?;
    let settled = get_value(conn, &settled_key(channel))?;
    if last_seen.is_none() && settled.is_none() {
        return Ok(None);
    }
    let (last_seen, seen_at) = last_seen.unwrap_or((0, 0));
    let (settled, settled_at) = settled.unwrap_or((0, 0));
    Ok(Some(ChannelExposureState {
        channel_id: *channel,
        last_seen_amount: Drops(last_seen),
        settled_amount: Drops(settled),
        updated_at: seen_at.max(settled_at),
    }))
}

fn insert_journal(tx: &Transaction<'_>, entry: &JournalEntry) -> Result<()> {
    let claim = encode_claim(&entry.claim)?;
    tx.execute(
        "INSERT INTO dispense_journal
            (digest, channel_id, amount, device_id, accepted_at, status, detail, claim)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.digest.0.as_slice(),
            entry.channel_id.to_hex(),
            entry.amount.get() as i64,
            entry.device_id,
            entry.accepted_at,
            entry.status.to_i64(),
            entry.detail,
            claim,
        ],
    )?;
    Ok(())
}

fn row_to_journal(row: &rusqlite::Row<'_>) -> Result<JournalEntry> {
    let digest: Vec<u8> = row.get("digest")?;
    let channel: String = row.get("channel_id")?;
    let status: i64 = row.get("status")?;
    let claim: Vec<u8> = row.get("claim")?;

    let digest: [u8; 32] = digest
        .try_into()
        .map_err(|_| StoreError::InvalidData("journal digest is not 32 bytes".into()))?;
    let channel_id = ChannelId::from_hex(&channel)
        .map_err(|e| StoreError::InvalidData(format!("journal channel: {}", e)))?;
    let status = DispenseStatus::from_i64(status)
        .ok_or_else(|| StoreError::InvalidData(format!("unknown dispense status {}", status)))?;

    Ok(JournalEntry {
        digest: ClaimDigest(digest),
        channel_id,
        amount: Drops(row.get::<_, i64>("amount")? as u64),
        device_id: row.get("device_id")?,
        accepted_at: row.get("accepted_at")?,
        status,
        detail: row.get("detail")?,
        claim: decode_claim(&claim)?,
    })
}

#[async_trait]
impl ExposureStore for SqliteStore {
    async fn get_state(&self, channel: &ChannelId) -> Result<Option<ChannelExposureState>> {
        let channel = *channel;
        self.run(move |conn| load_state(conn, &channel)).await
    }

    async fn list_channels(&self) -> Result<Vec<ChannelExposureState>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT key, value, updated_at FROM exposure_kv")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut states: BTreeMap<ChannelId, ChannelExposureState> = BTreeMap::new();
            for (key, value, updated_at) in rows {
                let (is_settled, hex) = if let Some(hex) = key.strip_prefix(LAST_SEEN_PREFIX) {
                    (false, hex)
                } else if let Some(hex) = key.strip_prefix(SETTLED_PREFIX) {
                    (true, hex)
                } else {
                    continue;
                };
                let channel = ChannelId::from_hex(hex)
                    .map_err(|e| StoreError::InvalidData(format!("key {}: {}", key, e)))?;
                let state = states
                    .entry(channel)
                    .or_insert_with(|| ChannelExposureState::new(channel));
                if is_settled {
                    state.settled_amount = Drops(value as u64);
                } else {
                    state.last_seen_amount = Drops(value as u64);
                }
                state.updated_at = state.updated_at.max(updated_at);
            }
            Ok(states.into_values().collect())
        })
        .await
    }

    async fn try_accept(
        &self,
        channel: &ChannelId,
        amount: Drops,
        cap: Drops,
        journal: &JournalEntry,
    ) -> Result<ExposureDecision> {
        let channel = *channel;
        let journal = journal.clone();
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut state =
                load_state(&tx, &channel)?.unwrap_or_else(|| ChannelExposureState::new(channel));

            let decision = state.evaluate(amount, cap);
            if decision.is_accept() {
                state
                    .record_accept(amount, journal.accepted_at)
                    .map_err(|e| StoreError::InvalidData(e.to_string()))?;
                put_value(&tx, &last_seen_key(&channel), amount.get(), journal.accepted_at)?;
                insert_journal(&tx, &journal)?;
                tx.commit()?;
            }
            Ok(decision)
        })
        .await
    }

    async fn advance_last_seen(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool> {
        let channel = *channel;
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let key = last_seen_key(&channel);
            let current = get_value(&tx, &key)?.map(|(v, _)| v).unwrap_or(0);
            if amount.get() <= current {
                return Ok(false);
            }
            put_value(&tx, &key, amount.get(), now)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn record_settlement(&self, channel: &ChannelId, amount: Drops, now: i64) -> Result<bool> {
        let channel = *channel;
        self.run(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut state =
                load_state(&tx, &channel)?.unwrap_or_else(|| ChannelExposureState::new(channel));
            let advanced = state
                .record_settlement(amount, now)
                .map_err(|e| StoreError::InvalidData(e.to_string()))?;
            if advanced {
                put_value(&tx, &settled_key(&channel), amount.get(), now)?;
                tx.commit()?;
            }
            Ok(advanced)
        })
        .await
    }

    async fn mark_dispense(
        &self,
        digest: &ClaimDigest,
        status: DispenseStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        let digest = *digest;
        let detail = detail.map(str::to_string);
        self.run(move |conn| {
            let updated = conn.execute(
                "UPDATE dispense_journal SET status = ?1, detail = ?2 WHERE digest = ?3",
                params![status.to_i64(), detail, digest.0.as_slice()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(digest.to_hex()));
            }
            Ok(())
        })
        .await
    }

    async fn list_journal(&self, status: Option<DispenseStatus>) -> Result<Vec<JournalEntry>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM dispense_journal
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY accepted_at, rowid",
            )?;
            let mut rows = stmt.query(params![status.map(DispenseStatus::to_i64)])?;
            let mut entries = Vec::new();
            while let Some(row) = rows.next()? {
                entries.push(row_to_journal(row)?);
            }
            Ok(entries)
        })
        .await
    }
}
