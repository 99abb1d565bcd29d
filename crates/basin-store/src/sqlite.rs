//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend for basin. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking. Record
//! writes and log appends share one SQLite transaction, which gives the
//! crash-atomic commit the engine requires.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Value;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use basin_core::{now_millis, CollectionId, Key, LogEntry, Record, ReplicaId, VersionVector};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KeyRange, PeerState, Store};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking closure against the connection off the runtime.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|e| e.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

fn encode_version(version: &VersionVector) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(version, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_version(blob: &[u8]) -> rusqlite::Result<VersionVector> {
    ciborium::from_reader(blob).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

fn decode_replica(blob: Vec<u8>) -> rusqlite::Result<ReplicaId> {
    let arr: [u8; 16] = blob.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "replica id is not 16 bytes",
            )),
        )
    })?;
    Ok(ReplicaId::from_bytes(arr))
}

fn decode_key(blob: Vec<u8>) -> rusqlite::Result<Key> {
    Key::new(Bytes::from(blob)).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Blob,
            Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
        )
    })
}

// Row shape: key, value, version, timestamp, origin, tombstone
fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let key = decode_key(row.get::<_, Vec<u8>>("key")?)?;
    let value: Vec<u8> = row.get("value")?;
    let version = decode_version(&row.get::<_, Vec<u8>>("version")?)?;
    let timestamp_ms: i64 = row.get("timestamp")?;
    let origin = decode_replica(row.get::<_, Vec<u8>>("origin")?)?;
    let tombstone: bool = row.get("tombstone")?;

    Ok(if tombstone {
        Record::tombstone(key, version, timestamp_ms, origin)
    } else {
        Record::new(key, value, version, timestamp_ms, origin)
    })
}

// Row shape: seq, key, value, version, timestamp, origin
fn row_to_entry(collection: &CollectionId, row: &rusqlite::Row<'_>) -> rusqlite::Result<LogEntry> {
    let seq: i64 = row.get("seq")?;
    let key = decode_key(row.get::<_, Vec<u8>>("key")?)?;
    let value: Option<Vec<u8>> = row.get("value")?;
    let version = decode_version(&row.get::<_, Vec<u8>>("version")?)?;
    let timestamp_ms: i64 = row.get("timestamp")?;
    let origin = decode_replica(row.get::<_, Vec<u8>>("origin")?)?;

    Ok(LogEntry {
        collection: collection.clone(),
        seq: seq as u64,
        key,
        value: value.map(Bytes::from),
        version,
        timestamp_ms,
        origin,
    })
}

fn require_collection(conn: &Connection, collection: &CollectionId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
        params![collection.name()],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::CollectionNotFound(collection.to_string()))
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_collection(&self, collection: &CollectionId) -> Result<()> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                params![collection.name(), now_millis()],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO log_heads (collection, head_seq) VALUES (?1, 0)",
                params![collection.name()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn destroy_collection(&self, collection: &CollectionId) -> Result<()> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM records WHERE collection = ?1", params![collection.name()])?;
            tx.execute("DELETE FROM log WHERE collection = ?1", params![collection.name()])?;
            tx.execute("DELETE FROM log_heads WHERE collection = ?1", params![collection.name()])?;
            tx.execute("DELETE FROM peers WHERE collection = ?1", params![collection.name()])?;
            tx.execute("DELETE FROM collections WHERE name = ?1", params![collection.name()])?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn has_collection(&self, collection: &CollectionId) -> Result<bool> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
                params![collection.name()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            names
                .into_iter()
                .map(|n| CollectionId::new(n).map_err(StoreError::from))
                .collect()
        })
        .await
    }

    async fn get_record(&self, collection: &CollectionId, key: &Key) -> Result<Option<Record>> {
        let collection = collection.clone();
        let key = key.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;
            conn.query_row(
                "SELECT key, value, version, timestamp, origin, tombstone
                 FROM records WHERE collection = ?1 AND key = ?2",
                params![collection.name(), key.as_bytes()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn scan_records(
        &self,
        collection: &CollectionId,
        range: KeyRange,
    ) -> Result<Vec<Record>> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;

            let mut sql = String::from(
                "SELECT key, value, version, timestamp, origin, tombstone
                 FROM records WHERE collection = ?1",
            );
            let mut values: Vec<Value> = vec![Value::Text(collection.name().to_string())];

            if let Some(start) = &range.start {
                sql.push_str(if range.start_exclusive {
                    " AND key > ?"
                } else {
                    " AND key >= ?"
                });
                values.push(Value::Blob(start.as_bytes().to_vec()));
            }
            if let Some(end) = &range.end {
                sql.push_str(" AND key < ?");
                values.push(Value::Blob(end.as_bytes().to_vec()));
            }
            sql.push_str(" ORDER BY key");

            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(rusqlite::params_from_iter(values), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn commit_write(&self, collection: &CollectionId, record: &Record) -> Result<u64> {
        let collection = collection.clone();
        let record = record.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;

            let version_blob = encode_version(&record.version)?;
            let tx = conn.transaction()?;

            let head: i64 = tx
                .query_row(
                    "SELECT head_seq FROM log_heads WHERE collection = ?1",
                    params![collection.name()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            let seq = (head + 1) as u64;

            tx.execute(
                "INSERT INTO records (collection, key, value, version, timestamp, origin, tombstone, last_seq)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(collection, key) DO UPDATE SET
                    value = excluded.value,
                    version = excluded.version,
                    timestamp = excluded.timestamp,
                    origin = excluded.origin,
                    tombstone = excluded.tombstone,
                    last_seq = excluded.last_seq",
                params![
                    collection.name(),
                    record.key.as_bytes(),
                    record.value.as_ref(),
                    version_blob,
                    record.timestamp_ms,
                    record.origin.as_bytes().as_slice(),
                    record.tombstone,
                    seq as i64,
                ],
            )?;

            tx.execute(
                "INSERT INTO log (collection, seq, key, value, version, timestamp, origin)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    collection.name(),
                    seq as i64,
                    record.key.as_bytes(),
                    if record.tombstone { None } else { Some(record.value.as_ref()) },
                    version_blob,
                    record.timestamp_ms,
                    record.origin.as_bytes().as_slice(),
                ],
            )?;

            tx.execute(
                "INSERT INTO log_heads (collection, head_seq) VALUES (?1, ?2)
                 ON CONFLICT(collection) DO UPDATE SET head_seq = excluded.head_seq",
                params![collection.name(), seq as i64],
            )?;

            tx.commit()?;
            Ok(seq)
        })
        .await
    }

    async fn commit_batch(
        &self,
        collection: &CollectionId,
        records: &[Record],
    ) -> Result<Vec<u64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let collection = collection.clone();
        let records = records.to_vec();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;

            let tx = conn.transaction()?;

            let head: i64 = tx
                .query_row(
                    "SELECT head_seq FROM log_heads WHERE collection = ?1",
                    params![collection.name()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);

            let mut seq = head as u64;
            let mut seqs = Vec::with_capacity(records.len());
            for record in &records {
                let version_blob = encode_version(&record.version)?;
                seq += 1;

                tx.execute(
                    "INSERT INTO records (collection, key, value, version, timestamp, origin, tombstone, last_seq)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                     ON CONFLICT(collection, key) DO UPDATE SET
                        value = excluded.value,
                        version = excluded.version,
                        timestamp = excluded.timestamp,
                        origin = excluded.origin,
                        tombstone = excluded.tombstone,
                        last_seq = excluded.last_seq",
                    params![
                        collection.name(),
                        record.key.as_bytes(),
                        record.value.as_ref(),
                        version_blob,
                        record.timestamp_ms,
                        record.origin.as_bytes().as_slice(),
                        record.tombstone,
                        seq as i64,
                    ],
                )?;

                tx.execute(
                    "INSERT INTO log (collection, seq, key, value, version, timestamp, origin)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        collection.name(),
                        seq as i64,
                        record.key.as_bytes(),
                        if record.tombstone { None } else { Some(record.value.as_ref()) },
                        version_blob,
                        record.timestamp_ms,
                        record.origin.as_bytes().as_slice(),
                    ],
                )?;

                seqs.push(seq);
            }

            tx.execute(
                "INSERT INTO log_heads (collection, head_seq) VALUES (?1, ?2)
                 ON CONFLICT(collection) DO UPDATE SET head_seq = excluded.head_seq",
                params![collection.name(), seq as i64],
            )?;

            tx.commit()?;
            Ok(seqs)
        })
        .await
    }

    async fn log_entries_since(
        &self,
        collection: &CollectionId,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;

            let mut stmt = conn.prepare(
                "SELECT seq, key, value, version, timestamp, origin
                 FROM log WHERE collection = ?1 AND seq > ?2
                 ORDER BY seq LIMIT ?3",
            )?;
            let entries = stmt
                .query_map(
                    params![collection.name(), after_seq as i64, limit as i64],
                    |row| row_to_entry(&collection, row),
                )?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(entries)
        })
        .await
    }

    async fn log_head(&self, collection: &CollectionId) -> Result<u64> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;
            let head: i64 = conn
                .query_row(
                    "SELECT head_seq FROM log_heads WHERE collection = ?1",
                    params![collection.name()],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            Ok(head as u64)
        })
        .await
    }

    async fn prune_log(&self, collection: &CollectionId, up_to_seq: u64) -> Result<u64> {
        let collection = collection.clone();
        self.with_conn(move |conn| {
            require_collection(conn, &collection)?;

            let tx = conn.transaction()?;
            let pruned = tx.execute(
                "DELETE FROM log WHERE collection = ?1 AND seq <= ?2",
                params![collection.name(), up_to_seq as i64],
            )?;
            tx.execute(
                "DELETE FROM records
                 WHERE collection = ?1 AND tombstone = 1 AND last_seq <= ?2",
                params![collection.name(), up_to_seq as i64],
            )?;
            tx.commit()?;

            if pruned > 0 {
                debug!(collection = %collection, up_to_seq, pruned, "log entries pruned");
            }
            Ok(pruned as u64)
        })
        .await
    }

    async fn peer_state(&self, peer: &ReplicaId) -> Result<Option<PeerState>> {
        let peer = *peer;
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT collection, applied_seq, acked_seq, updated_at
                 FROM peers WHERE peer = ?1",
            )?;
            let rows = stmt
                .query_map(params![peer.as_bytes().as_slice()], |row| {
                    let collection: String = row.get(0)?;
                    let applied_seq: i64 = row.get(1)?;
                    let acked_seq: i64 = row.get(2)?;
                    let updated_at: i64 = row.get(3)?;
                    Ok((collection, applied_seq as u64, acked_seq as u64, updated_at))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            if rows.is_empty() {
                return Ok(None);
            }

            let mut state = PeerState::new(peer, 0);
            for (name, applied_seq, acked_seq, updated_at) in rows {
                let collection = CollectionId::new(name)?;
                let cursor = state.cursors.entry(collection).or_default();
                cursor.applied_seq = applied_seq;
                cursor.acked_seq = acked_seq;
                state.updated_at = state.updated_at.max(updated_at);
            }
            Ok(Some(state))
        })
        .await
    }

    async fn upsert_peer_state(&self, state: &PeerState) -> Result<()> {
        let state = state.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM peers WHERE peer = ?1",
                params![state.peer.as_bytes().as_slice()],
            )?;
            for (collection, cursor) in &state.cursors {
                tx.execute(
                    "INSERT INTO peers (peer, collection, applied_seq, acked_seq, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        state.peer.as_bytes().as_slice(),
                        collection.name(),
                        cursor.applied_seq as i64,
                        cursor.acked_seq as i64,
                        state.updated_at,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn list_peers(&self) -> Result<Vec<ReplicaId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT DISTINCT peer FROM peers")?;
            let peers = stmt
                .query_map([], |row| decode_replica(row.get::<_, Vec<u8>>(0)?))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(peers)
        })
        .await
    }

    async fn approximate_size(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let size: i64 = conn.query_row(
                "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0)
                 FROM records WHERE tombstone = 0",
                [],
                |row| row.get(0),
            )?;
            Ok(size as u64)
        })
        .await
    }
}
