//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use basin_core::{CollectionId, Key, LogEntry, Record, ReplicaId};

use crate::error::{Result, StoreError};
use crate::traits::{KeyRange, PeerState, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
/// An optional capacity limit makes `commit_write` fail with
/// `StorageFull`, matching the durable backend's behavior on a full disk.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    capacity_bytes: Option<u64>,
}

struct Inner {
    /// Collections in name order.
    collections: BTreeMap<CollectionId, CollectionData>,

    /// Persisted peer sync state.
    peers: HashMap<ReplicaId, PeerState>,

    /// Live record bytes (keys + values), for the capacity check.
    used_bytes: u64,
}

#[derive(Default)]
struct CollectionData {
    /// Records in key order. Tombstones included until pruned.
    records: BTreeMap<Key, StoredRecord>,

    /// Replication log, keyed by seq. Pruned entries are removed.
    log: BTreeMap<u64, LogEntry>,

    /// Highest assigned log seq (0 when nothing was ever appended).
    head_seq: u64,
}

struct StoredRecord {
    record: Record,
    /// Log seq of the last mutation, used for tombstone reclamation.
    last_seq: u64,
}

fn record_bytes(record: &Record) -> u64 {
    (record.key.len() + record.value.len()) as u64
}

impl MemoryStore {
    /// Create a new empty in-memory store with no capacity limit.
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a store that fails with `StorageFull` once live record
    /// bytes would exceed `capacity_bytes`.
    pub fn with_capacity(capacity_bytes: Option<u64>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                collections: BTreeMap::new(),
                peers: HashMap::new(),
                used_bytes: 0,
            }),
            capacity_bytes,
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_collection(&self, collection: &CollectionId) -> Result<()> {
        let mut inner = self.write();
        inner
            .collections
            .entry(collection.clone())
            .or_insert_with(CollectionData::default);
        Ok(())
    }

    async fn destroy_collection(&self, collection: &CollectionId) -> Result<()> {
        let mut inner = self.write();
        if let Some(data) = inner.collections.remove(collection) {
            let freed: u64 = data.records.values().map(|sr| record_bytes(&sr.record)).sum();
            inner.used_bytes = inner.used_bytes.saturating_sub(freed);
        }
        for state in inner.peers.values_mut() {
            state.cursors.remove(collection);
        }
        Ok(())
    }

    async fn has_collection(&self, collection: &CollectionId) -> Result<bool> {
        Ok(self.read().collections.contains_key(collection))
    }

    async fn list_collections(&self) -> Result<Vec<CollectionId>> {
        Ok(self.read().collections.keys().cloned().collect())
    }

    async fn get_record(&self, collection: &CollectionId, key: &Key) -> Result<Option<Record>> {
        let inner = self.read();
        let data = inner
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(data.records.get(key).map(|sr| sr.record.clone()))
    }

    async fn scan_records(
        &self,
        collection: &CollectionId,
        range: KeyRange,
    ) -> Result<Vec<Record>> {
        let inner = self.read();
        let data = inner
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        // Materializing under the read lock fixes the snapshot: no later
        // write can appear in this result set.
        Ok(data
            .records
            .range(range.as_bounds())
            .map(|(_, sr)| sr.record.clone())
            .collect())
    }

    async fn commit_write(&self, collection: &CollectionId, record: &Record) -> Result<u64> {
        let mut inner = self.write();

        let incoming = record_bytes(record);
        let existing = inner
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?
            .records
            .get(&record.key)
            .map(|sr| record_bytes(&sr.record))
            .unwrap_or(0);

        if let Some(capacity) = self.capacity_bytes {
            let projected = inner.used_bytes.saturating_sub(existing) + incoming;
            if projected > capacity {
                return Err(StoreError::StorageFull(format!(
                    "{} bytes needed, {} byte capacity",
                    projected, capacity
                )));
            }
        }

        let data = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let seq = data.head_seq + 1;
        let entry = LogEntry::for_record(collection.clone(), seq, record);

        data.records.insert(
            record.key.clone(),
            StoredRecord {
                record: record.clone(),
                last_seq: seq,
            },
        );
        data.log.insert(seq, entry);
        data.head_seq = seq;

        inner.used_bytes = inner.used_bytes.saturating_sub(existing) + incoming;
        Ok(seq)
    }

    async fn commit_batch(
        &self,
        collection: &CollectionId,
        records: &[Record],
    ) -> Result<Vec<u64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut inner = self.write();

        // Whole-batch capacity check before any mutation: the batch
        // commits entirely or not at all.
        if let Some(capacity) = self.capacity_bytes {
            let data = inner
                .collections
                .get(collection)
                .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

            let mut projected = inner.used_bytes;
            let mut batch_sizes: HashMap<&Key, u64> = HashMap::new();
            for record in records {
                let existing = batch_sizes.get(&record.key).copied().unwrap_or_else(|| {
                    data.records
                        .get(&record.key)
                        .map(|sr| record_bytes(&sr.record))
                        .unwrap_or(0)
                });
                projected = projected.saturating_sub(existing) + record_bytes(record);
                batch_sizes.insert(&record.key, record_bytes(record));
            }
            if projected > capacity {
                return Err(StoreError::StorageFull(format!(
                    "{} bytes needed, {} byte capacity",
                    projected, capacity
                )));
            }
        }

        let mut used = inner.used_bytes;
        let data = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let mut seqs = Vec::with_capacity(records.len());
        for record in records {
            let incoming = record_bytes(record);
            let existing = data
                .records
                .get(&record.key)
                .map(|sr| record_bytes(&sr.record))
                .unwrap_or(0);

            let seq = data.head_seq + 1;
            let entry = LogEntry::for_record(collection.clone(), seq, record);

            data.records.insert(
                record.key.clone(),
                StoredRecord {
                    record: record.clone(),
                    last_seq: seq,
                },
            );
            data.log.insert(seq, entry);
            data.head_seq = seq;

            used = used.saturating_sub(existing) + incoming;
            seqs.push(seq);
        }
        inner.used_bytes = used;
        Ok(seqs)
    }

    async fn log_entries_since(
        &self,
        collection: &CollectionId,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>> {
        let inner = self.read();
        let data = inner
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        Ok(data
            .log
            .range((after_seq + 1)..)
            .take(limit)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn log_head(&self, collection: &CollectionId) -> Result<u64> {
        let inner = self.read();
        let data = inner
            .collections
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(data.head_seq)
    }

    async fn prune_log(&self, collection: &CollectionId, up_to_seq: u64) -> Result<u64> {
        let mut inner = self.write();
        let data = inner
            .collections
            .get_mut(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;

        let keep = data.log.split_off(&(up_to_seq + 1));
        let pruned = data.log.len() as u64;
        data.log = keep;

        // Tombstones whose last mutation is stable can be reclaimed.
        let reclaimed: Vec<Key> = data
            .records
            .iter()
            .filter(|(_, sr)| sr.record.tombstone && sr.last_seq <= up_to_seq)
            .map(|(key, _)| key.clone())
            .collect();
        let mut freed = 0u64;
        for key in reclaimed {
            if let Some(sr) = data.records.remove(&key) {
                freed += record_bytes(&sr.record);
            }
        }
        inner.used_bytes = inner.used_bytes.saturating_sub(freed);

        Ok(pruned)
    }

    async fn peer_state(&self, peer: &ReplicaId) -> Result<Option<PeerState>> {
        Ok(self.read().peers.get(peer).cloned())
    }

    async fn upsert_peer_state(&self, state: &PeerState) -> Result<()> {
        self.write().peers.insert(state.peer, state.clone());
        Ok(())
    }

    async fn list_peers(&self) -> Result<Vec<ReplicaId>> {
        Ok(self.read().peers.keys().copied().collect())
    }

    async fn approximate_size(&self) -> Result<u64> {
        Ok(self.read().used_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::{now_millis, VersionVector};

    fn collection() -> CollectionId {
        CollectionId::new("test").unwrap()
    }

    fn key(s: &str) -> Key {
        Key::from_str_key(s).unwrap()
    }

    fn make_record(k: &str, v: &str, replica: u8) -> Record {
        let origin = ReplicaId::from_bytes([replica; 16]);
        let mut version = VersionVector::new();
        version.bump(origin);
        Record::new(key(k), v.to_string(), version, now_millis(), origin)
    }

    #[tokio::test]
    async fn test_commit_and_get() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        let record = make_record("k", "v", 1);
        let seq = store.commit_write(&collection(), &record).await.unwrap();
        assert_eq!(seq, 1);

        let got = store.get_record(&collection(), &key("k")).await.unwrap().unwrap();
        assert_eq!(got, record);
        assert_eq!(store.log_head(&collection()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_log_seq_is_dense_across_keys() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            let seq = store
                .commit_write(&collection(), &make_record(k, "v", 1))
                .await
                .unwrap();
            assert_eq!(seq, i as u64 + 1);
        }

        let entries = store
            .log_entries_since(&collection(), 0, 100)
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].seq, 1);
        assert_eq!(entries[2].seq, 3);
    }

    #[tokio::test]
    async fn test_scan_is_key_ordered() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        for k in ["c", "a", "b"] {
            store
                .commit_write(&collection(), &make_record(k, "v", 1))
                .await
                .unwrap();
        }

        let records = store
            .scan_records(&collection(), KeyRange::all())
            .await
            .unwrap();
        let keys: Vec<_> = records.iter().map(|r| r.key.clone()).collect();
        assert_eq!(keys, vec![key("a"), key("b"), key("c")]);
    }

    #[tokio::test]
    async fn test_batch_seqs_are_dense_and_ordered() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        store
            .commit_write(&collection(), &make_record("before", "v", 1))
            .await
            .unwrap();

        let batch = vec![
            make_record("a", "1", 1),
            make_record("b", "2", 1),
            make_record("c", "3", 1),
        ];
        let seqs = store.commit_batch(&collection(), &batch).await.unwrap();
        assert_eq!(seqs, vec![2, 3, 4]);
        assert_eq!(store.log_head(&collection()).await.unwrap(), 4);

        let entries = store
            .log_entries_since(&collection(), 1, 100)
            .await
            .unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].key, key("a"));
        assert_eq!(entries[2].key, key("c"));
    }

    #[tokio::test]
    async fn test_batch_over_capacity_commits_nothing() {
        let store = MemoryStore::with_capacity(Some(12));
        store.create_collection(&collection()).await.unwrap();

        // 5 + 5 + 5 bytes would exceed the 12-byte capacity.
        let batch = vec![
            make_record("a", "1234", 1),
            make_record("b", "1234", 1),
            make_record("c", "1234", 1),
        ];
        let err = store.commit_batch(&collection(), &batch).await.unwrap_err();
        assert!(matches!(err, StoreError::StorageFull(_)));

        assert!(store
            .get_record(&collection(), &key("a"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.log_head(&collection()).await.unwrap(), 0);
        assert_eq!(store.approximate_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_capacity_limit() {
        let store = MemoryStore::with_capacity(Some(8));
        store.create_collection(&collection()).await.unwrap();

        // key "k" (1) + value "1234" (4) = 5 bytes: fits.
        store
            .commit_write(&collection(), &make_record("k", "1234", 1))
            .await
            .unwrap();

        // Another 5-byte record would exceed 8 bytes.
        let err = store
            .commit_write(&collection(), &make_record("j", "1234", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StorageFull(_)));

        // Overwriting the first key stays within capacity.
        store
            .commit_write(&collection(), &make_record("k", "12345", 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_prune_reclaims_stable_tombstones() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        store
            .commit_write(&collection(), &make_record("k", "v", 1))
            .await
            .unwrap();

        let origin = ReplicaId::from_bytes([1; 16]);
        let mut version = VersionVector::new();
        version.bump(origin);
        version.bump(origin);
        let tombstone = Record::tombstone(key("k"), version, now_millis(), origin);
        store.commit_write(&collection(), &tombstone).await.unwrap();

        // Not yet stable: tombstone still visible.
        let got = store.get_record(&collection(), &key("k")).await.unwrap();
        assert!(got.unwrap().tombstone);

        let pruned = store.prune_log(&collection(), 2).await.unwrap();
        assert_eq!(pruned, 2);

        // Physically reclaimed.
        assert!(store
            .get_record(&collection(), &key("k"))
            .await
            .unwrap()
            .is_none());
        assert!(store
            .log_entries_since(&collection(), 0, 100)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_destroy_collection_drops_peer_cursors() {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();

        let peer = ReplicaId::from_bytes([9; 16]);
        let mut state = PeerState::new(peer, 0);
        state.set_applied(collection(), 4, 1);
        store.upsert_peer_state(&state).await.unwrap();

        store.destroy_collection(&collection()).await.unwrap();

        let state = store.peer_state(&peer).await.unwrap().unwrap();
        assert!(state.cursors.is_empty());
    }
}
