//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 2;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, crate::now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        2 => apply_v2(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: the exposure key-value table.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- last_seen:<CHANNEL> and settled:<CHANNEL>, amounts in drops
        CREATE TABLE exposure_kv (
            key TEXT PRIMARY KEY,
            value INTEGER NOT NULL,           -- u64 stored bit-for-bit
            updated_at INTEGER NOT NULL       -- local time of last change (Unix ms)
        );
        "#,
    )?;
    Ok(())
}

/// Migration v2: dispense journal.
fn apply_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE dispense_journal (
            digest BLOB PRIMARY KEY,          -- 32 bytes, Blake3 of message || signature
            channel_id TEXT NOT NULL,         -- uppercase hex
            amount INTEGER NOT NULL,
            device_id TEXT NOT NULL,
            accepted_at INTEGER NOT NULL,
            status INTEGER NOT NULL DEFAULT 0,  -- 0=pending, 1=dispatched, 2=undispensed
            detail TEXT,
            claim BLOB NOT NULL               -- CBOR claim payload
        );

        CREATE INDEX idx_journal_status ON dispense_journal(status, accepted_at);
        CREATE INDEX idx_journal_channel ON dispense_journal(channel_id);
        "#,
    )?;
    Ok(())
}
