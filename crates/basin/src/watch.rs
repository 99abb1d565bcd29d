//! Watch notifications.
//!
//! Every committed mutation, local or sync-applied, emits a
//! [`WatchChange`] on the collection's broadcast channel. The emission
//! point is the store wrapper, so the two write paths cannot diverge.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use basin_core::{CollectionId, Key, LogEntry, Record, ReplicaId, VersionVector};
use basin_store::{KeyRange, PeerState, Result as StoreResult, Store};

/// The kind of change a watch event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A value was written.
    Put,
    /// The key was deleted (tombstoned).
    Delete,
}

/// A committed mutation, delivered to watch subscribers.
#[derive(Debug, Clone)]
pub struct WatchChange {
    /// The collection the change belongs to.
    pub collection: CollectionId,
    /// The mutated key.
    pub key: Key,
    /// Put or Delete.
    pub kind: ChangeKind,
    /// The new value (`None` for deletes).
    pub value: Option<Bytes>,
    /// Version vector of the committed record.
    pub version: VersionVector,
    /// Whether the change arrived through sync rather than a local call.
    ///
    /// Derived from the record's origin replica, so a merge that resolves
    /// in favor of the local record is reported as local.
    pub from_sync: bool,
}

/// Per-collection broadcast senders.
pub(crate) struct WatchHub {
    senders: Mutex<HashMap<CollectionId, broadcast::Sender<WatchChange>>>,
    buffer: usize,
}

impl WatchHub {
    pub(crate) fn new(buffer: usize) -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub(crate) fn subscribe(&self, collection: &CollectionId) -> broadcast::Receiver<WatchChange> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders
            .entry(collection.clone())
            .or_insert_with(|| broadcast::channel(self.buffer).0)
            .subscribe()
    }

    pub(crate) fn emit(&self, change: WatchChange) {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = senders.get(&change.collection) {
            // No subscribers is fine.
            let _ = sender.send(change);
        }
    }

    pub(crate) fn drop_collection(&self, collection: &CollectionId) {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        senders.remove(collection);
    }
}

/// Store wrapper that emits watch events on every committed write.
///
/// All other operations delegate untouched. Sync sessions run against
/// this wrapper, so changes applied from a peer notify watchers exactly
/// like local writes do.
pub(crate) struct WatchedStore<S> {
    inner: Arc<S>,
    local_id: ReplicaId,
    hub: Arc<WatchHub>,
}

impl<S> WatchedStore<S> {
    pub(crate) fn new(inner: Arc<S>, local_id: ReplicaId, hub: Arc<WatchHub>) -> Self {
        Self { inner, local_id, hub }
    }

    fn change_for(&self, collection: &CollectionId, record: &Record) -> WatchChange {
        WatchChange {
            collection: collection.clone(),
            key: record.key.clone(),
            kind: if record.tombstone {
                ChangeKind::Delete
            } else {
                ChangeKind::Put
            },
            value: if record.tombstone {
                None
            } else {
                Some(record.value.clone())
            },
            version: record.version.clone(),
            from_sync: record.origin != self.local_id,
        }
    }
}

#[async_trait]
impl<S: Store> Store for WatchedStore<S> {
    async fn create_collection(&self, collection: &CollectionId) -> StoreResult<()> {
        self.inner.create_collection(collection).await
    }

    async fn destroy_collection(&self, collection: &CollectionId) -> StoreResult<()> {
        self.inner.destroy_collection(collection).await?;
        self.hub.drop_collection(collection);
        Ok(())
    }

    async fn has_collection(&self, collection: &CollectionId) -> StoreResult<bool> {
        self.inner.has_collection(collection).await
    }

    async fn list_collections(&self) -> StoreResult<Vec<CollectionId>> {
        self.inner.list_collections().await
    }

    async fn get_record(
        &self,
        collection: &CollectionId,
        key: &Key,
    ) -> StoreResult<Option<Record>> {
        self.inner.get_record(collection, key).await
    }

    async fn scan_records(
        &self,
        collection: &CollectionId,
        range: KeyRange,
    ) -> StoreResult<Vec<Record>> {
        self.inner.scan_records(collection, range).await
    }

    async fn commit_write(&self, collection: &CollectionId, record: &Record) -> StoreResult<u64> {
        let seq = self.inner.commit_write(collection, record).await?;
        self.hub.emit(self.change_for(collection, record));
        Ok(seq)
    }

    async fn commit_batch(
        &self,
        collection: &CollectionId,
        records: &[Record],
    ) -> StoreResult<Vec<u64>> {
        let seqs = self.inner.commit_batch(collection, records).await?;
        // One event per key, emitted only after the batch committed.
        for record in records {
            self.hub.emit(self.change_for(collection, record));
        }
        Ok(seqs)
    }

    async fn log_entries_since(
        &self,
        collection: &CollectionId,
        after_seq: u64,
        limit: usize,
    ) -> StoreResult<Vec<LogEntry>> {
        self.inner.log_entries_since(collection, after_seq, limit).await
    }

    async fn log_head(&self, collection: &CollectionId) -> StoreResult<u64> {
        self.inner.log_head(collection).await
    }

    async fn prune_log(&self, collection: &CollectionId, up_to_seq: u64) -> StoreResult<u64> {
        self.inner.prune_log(collection, up_to_seq).await
    }

    async fn peer_state(&self, peer: &ReplicaId) -> StoreResult<Option<PeerState>> {
        self.inner.peer_state(peer).await
    }

    async fn upsert_peer_state(&self, state: &PeerState) -> StoreResult<()> {
        self.inner.upsert_peer_state(state).await
    }

    async fn list_peers(&self) -> StoreResult<Vec<ReplicaId>> {
        self.inner.list_peers().await
    }

    async fn approximate_size(&self) -> StoreResult<u64> {
        self.inner.approximate_size().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_store::MemoryStore;

    fn collection() -> CollectionId {
        CollectionId::new("c").unwrap()
    }

    #[tokio::test]
    async fn test_commit_emits_watch_event() {
        let local = ReplicaId::from_bytes([1; 16]);
        let hub = Arc::new(WatchHub::new(16));
        let store = WatchedStore::new(Arc::new(MemoryStore::new()), local, Arc::clone(&hub));

        store.create_collection(&collection()).await.unwrap();
        let mut rx = hub.subscribe(&collection());

        let mut version = VersionVector::new();
        version.bump(local);
        let record = Record::new(
            Key::from_str_key("k").unwrap(),
            "v".to_string(),
            version.clone(),
            100,
            local,
        );
        store.commit_write(&collection(), &record).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Put);
        assert_eq!(change.value.as_deref(), Some(b"v".as_slice()));
        assert_eq!(change.version, version);
        assert!(!change.from_sync);
    }

    #[tokio::test]
    async fn test_foreign_origin_marks_from_sync() {
        let local = ReplicaId::from_bytes([1; 16]);
        let remote = ReplicaId::from_bytes([2; 16]);
        let hub = Arc::new(WatchHub::new(16));
        let store = WatchedStore::new(Arc::new(MemoryStore::new()), local, Arc::clone(&hub));

        store.create_collection(&collection()).await.unwrap();
        let mut rx = hub.subscribe(&collection());

        let mut version = VersionVector::new();
        version.bump(remote);
        let record = Record::tombstone(Key::from_str_key("k").unwrap(), version, 100, remote);
        store.commit_write(&collection(), &record).await.unwrap();

        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, ChangeKind::Delete);
        assert!(change.value.is_none());
        assert!(change.from_sync);
    }
}
