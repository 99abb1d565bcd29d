//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL
//! string that transforms the schema from version N to N+1.

use rusqlite::Connection;

use basin_core::now_millis;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

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

    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Collections created by the client
        CREATE TABLE collections (
            name TEXT PRIMARY KEY,
            created_at INTEGER NOT NULL
        );

        -- Records: one row per (collection, key), tombstones included
        CREATE TABLE records (
            collection TEXT NOT NULL,
            key BLOB NOT NULL,
            value BLOB NOT NULL,              -- empty for tombstones
            version BLOB NOT NULL,            -- CBOR version vector
            timestamp INTEGER NOT NULL,       -- last mutation (Unix ms)
            origin BLOB NOT NULL,             -- 16 bytes, replica id
            tombstone INTEGER NOT NULL DEFAULT 0,
            last_seq INTEGER NOT NULL,        -- log seq of the last mutation

            PRIMARY KEY (collection, key)
        );

        -- Replication log: append-only per collection, pruned at stability
        CREATE TABLE log (
            collection TEXT NOT NULL,
            seq INTEGER NOT NULL,             -- dense local append sequence
            key BLOB NOT NULL,
            value BLOB,                       -- NULL encodes a tombstone
            version BLOB NOT NULL,            -- CBOR version vector
            timestamp INTEGER NOT NULL,
            origin BLOB NOT NULL,

            PRIMARY KEY (collection, seq)
        );

        -- Log heads survive pruning, so heads get their own table
        CREATE TABLE log_heads (
            collection TEXT PRIMARY KEY,
            head_seq INTEGER NOT NULL DEFAULT 0
        );

        -- Persisted per-peer sync cursors
        CREATE TABLE peers (
            peer BLOB NOT NULL,               -- 16 bytes, replica id
            collection TEXT NOT NULL,
            applied_seq INTEGER NOT NULL DEFAULT 0,
            acked_seq INTEGER NOT NULL DEFAULT 0,
            updated_at INTEGER NOT NULL,

            PRIMARY KEY (peer, collection)
        );

        -- Indexes for common queries
        CREATE INDEX idx_records_tombstone ON records(collection, tombstone, last_seq);
        CREATE INDEX idx_log_collection_seq ON log(collection, seq);
        "#,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"collections".to_string()));
        assert!(tables.contains(&"records".to_string()));
        assert!(tables.contains(&"log".to_string()));
        assert!(tables.contains(&"log_heads".to_string()));
        assert!(tables.contains(&"peers".to_string()));
        assert!(tables.contains(&"schema_migrations".to_string()));
    }

    #[test]
    fn test_migration_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();
        migrate(&mut conn).unwrap();

        let version: u32 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }
}
