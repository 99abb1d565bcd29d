//! The unified client API.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use basin_core::{now_millis, CollectionId, Key, Record, ReplicaId, VersionVector};
use basin_merge::{MergePolicy, PolicyRegistry};
use basin_store::{KeyLocks, KeyRange, Store};
use basin_sync::{SyncReport, SyncSession, Transport};

use crate::batch::{BatchOp, WriteBatch};
use crate::config::Config;
use crate::error::{DbError, Result};
use crate::scan::Scan;
use crate::watch::{WatchChange, WatchHub, WatchedStore};

/// Identifier of a running sync session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

struct SessionHandle {
    cancel: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

/// A local replica of the store: the application-facing entry point.
///
/// One `Database` per device. All mutation goes through the per-key
/// write locks, commits a record together with its replication log entry,
/// and notifies watchers; sync sessions share the same paths.
pub struct Database<S: Store> {
    replica_id: ReplicaId,
    store: Arc<WatchedStore<S>>,
    locks: Arc<KeyLocks>,
    policies: Arc<PolicyRegistry>,
    hub: Arc<WatchHub>,
    config: Config,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    next_session_id: AtomicU64,
}

impl<S: Store + 'static> Database<S> {
    /// Create a database over a storage backend.
    pub fn new(replica_id: ReplicaId, store: S, config: Config) -> Self {
        let hub = Arc::new(WatchHub::new(config.watch_buffer));
        let store = Arc::new(WatchedStore::new(
            Arc::new(store),
            replica_id,
            Arc::clone(&hub),
        ));
        Self {
            replica_id,
            store,
            locks: Arc::new(KeyLocks::default()),
            policies: Arc::new(PolicyRegistry::new()),
            hub,
            config,
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// This replica's identity.
    pub fn replica_id(&self) -> ReplicaId {
        self.replica_id
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Collections
    // ─────────────────────────────────────────────────────────────────────────

    /// Open a collection, creating it if missing.
    pub async fn open_collection(&self, name: &str) -> Result<Collection<'_, S>> {
        let id = CollectionId::new(name)?;
        self.store.create_collection(&id).await?;
        Ok(Collection { db: self, id })
    }

    /// Destroy a collection and everything in it.
    pub async fn destroy_collection(&self, collection: &CollectionId) -> Result<()> {
        self.store.destroy_collection(collection).await?;
        info!(collection = %collection, "collection destroyed");
        Ok(())
    }

    /// All collections, in name order.
    pub async fn collections(&self) -> Result<Vec<CollectionId>> {
        Ok(self.store.list_collections().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────────

    /// Write a value. Returns the record's new version vector.
    pub async fn put(
        &self,
        collection: &CollectionId,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<VersionVector> {
        let key = Key::new(key)?;
        let value: Bytes = value.into();

        // The capacity gate runs under the write lock: two writers to the
        // same key cannot both see the pre-commit size.
        let _guard = self.locks.lock(collection, &key).await;
        self.check_capacity(key.len() as u64 + value.len() as u64).await?;

        let current = self.store.get_record(collection, &key).await?;
        let mut version = current
            .map(|r| r.version)
            .unwrap_or_else(VersionVector::new);
        version.bump(self.replica_id);

        let record = Record::new(key, value, version.clone(), now_millis(), self.replica_id);
        self.store.commit_write(collection, &record).await?;
        Ok(version)
    }

    /// Read a value with its version vector.
    ///
    /// Absent and tombstoned keys both surface `NotFound`.
    pub async fn get(
        &self,
        collection: &CollectionId,
        key: impl Into<Bytes>,
    ) -> Result<(Bytes, VersionVector)> {
        let key = Key::new(key)?;
        match self.store.get_record(collection, &key).await? {
            Some(record) if !record.tombstone => Ok((record.value, record.version)),
            _ => Err(DbError::NotFound),
        }
    }

    /// Whether a live value exists for the key.
    pub async fn exists(&self, collection: &CollectionId, key: impl Into<Bytes>) -> Result<bool> {
        let key = Key::new(key)?;
        Ok(matches!(
            self.store.get_record(collection, &key).await?,
            Some(record) if !record.tombstone
        ))
    }

    /// Delete a key (soft delete: a tombstone is written and replicated).
    ///
    /// Deleting an absent or already-deleted key is `NotFound`.
    pub async fn delete(
        &self,
        collection: &CollectionId,
        key: impl Into<Bytes>,
    ) -> Result<VersionVector> {
        let key = Key::new(key)?;
        let _guard = self.locks.lock(collection, &key).await;

        let current = match self.store.get_record(collection, &key).await? {
            Some(record) if !record.tombstone => record,
            _ => return Err(DbError::NotFound),
        };

        let mut version = current.version;
        version.bump(self.replica_id);

        let record = Record::tombstone(key, version.clone(), now_millis(), self.replica_id);
        self.store.commit_write(collection, &record).await?;
        Ok(version)
    }

    /// Stage an atomic multi-key batch against a collection.
    ///
    /// See [`WriteBatch`] for staging and commit semantics.
    pub fn batch(&self, collection: &CollectionId) -> WriteBatch<'_, S> {
        WriteBatch::new(self, collection.clone())
    }

    pub(crate) async fn commit_batch(
        &self,
        collection: &CollectionId,
        ops: BTreeMap<Key, BatchOp>,
    ) -> Result<Vec<VersionVector>> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let _guards = self.locks.lock_many(collection, ops.keys()).await;

        let incoming: u64 = ops
            .iter()
            .map(|(key, op)| match op {
                BatchOp::Put(value) => key.len() as u64 + value.len() as u64,
                BatchOp::Delete => 0,
            })
            .sum();
        self.check_capacity(incoming).await?;

        let now = now_millis();
        let mut records = Vec::with_capacity(ops.len());
        let mut versions = Vec::with_capacity(ops.len());
        for (key, op) in ops {
            let current = self.store.get_record(collection, &key).await?;
            match op {
                BatchOp::Put(value) => {
                    let mut version = current
                        .map(|r| r.version)
                        .unwrap_or_else(VersionVector::new);
                    version.bump(self.replica_id);
                    versions.push(version.clone());
                    records.push(Record::new(key, value, version, now, self.replica_id));
                }
                BatchOp::Delete => {
                    let current = match current {
                        Some(record) if !record.tombstone => record,
                        // One bad delete fails the whole batch; nothing
                        // has been committed yet.
                        _ => return Err(DbError::NotFound),
                    };
                    let mut version = current.version;
                    version.bump(self.replica_id);
                    versions.push(version.clone());
                    records.push(Record::tombstone(key, version, now, self.replica_id));
                }
            }
        }

        self.store.commit_batch(collection, &records).await?;
        Ok(versions)
    }

    /// Scan live records in key order, snapshot-isolated.
    pub async fn scan(&self, collection: &CollectionId, range: KeyRange) -> Result<Scan> {
        let records = self.store.scan_records(collection, range).await?;
        Ok(Scan::new(records))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Watch
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe to committed mutations on a collection.
    pub fn watch(&self, collection: &CollectionId) -> broadcast::Receiver<WatchChange> {
        self.hub.subscribe(collection)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    /// Run a single sync round over the transport and return its report.
    pub async fn sync_once<T: Transport>(&self, transport: T) -> Result<SyncReport> {
        let mut session = SyncSession::new(
            self.replica_id,
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.policies),
            transport,
            self.config.sync.clone(),
        );
        Ok(session.run().await?)
    }

    /// Start a background sync session over the transport.
    ///
    /// The session runs one round; retryable failures re-enter idle and
    /// retry after a backoff until the round succeeds, a terminal error
    /// occurs, or [`cancel_sync`](Self::cancel_sync) is called.
    pub fn start_sync<T: Transport + 'static>(&self, transport: T) -> SessionId {
        let id = SessionId(self.next_session_id.fetch_add(1, Ordering::Relaxed));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut session = SyncSession::new(
            self.replica_id,
            Arc::clone(&self.store),
            Arc::clone(&self.locks),
            Arc::clone(&self.policies),
            transport,
            self.config.sync.clone(),
        )
        .with_cancellation(cancel_rx.clone());

        let backoff = self.config.sync_retry_backoff;
        let mut cancel_rx = cancel_rx;
        let task = tokio::spawn(async move {
            loop {
                match session.run().await {
                    Ok(report) => {
                        debug!(%id, applied = report.applied_count, "sync round complete");
                        break;
                    }
                    Err(e) if e.is_retryable() => {
                        warn!(%id, error = %e, "sync round failed, retrying");
                        tokio::select! {
                            _ = cancel_rx.changed() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                        if *cancel_rx.borrow() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(%id, error = %e, "sync session ended");
                        break;
                    }
                }
            }
        });

        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                SessionHandle {
                    cancel: cancel_tx,
                    task,
                },
            );
        id
    }

    /// Cancel a running sync session.
    ///
    /// The session stops at its next step; cursors keep their last
    /// committed values, so a future session resumes without duplicating
    /// work.
    pub fn cancel_sync(&self, id: SessionId) -> Result<()> {
        let handle = self
            .sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id)
            .ok_or(DbError::SessionNotFound(id.0))?;

        // The receiver may already be gone if the task finished.
        let _ = handle.cancel.send(true);
        handle.task.abort();
        info!(%id, "sync session cancelled");
        Ok(())
    }

    /// Set the conflict resolution policy for a collection.
    ///
    /// Applies to conflicts detected from now on; last-writer-wins is the
    /// default when no policy is set.
    pub fn set_resolution_policy(&self, collection: CollectionId, policy: Arc<dyn MergePolicy>) {
        self.policies.set(collection, policy);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Maintenance
    // ─────────────────────────────────────────────────────────────────────────

    /// Prune replication logs and reclaim tombstones past causal
    /// stability: entries every known peer has acknowledged.
    ///
    /// With no known peers nothing is stable, and nothing is pruned.
    pub async fn collect_garbage(&self) -> Result<u64> {
        let peers = self.store.list_peers().await?;
        if peers.is_empty() {
            return Ok(0);
        }

        let mut states = Vec::with_capacity(peers.len());
        for peer in &peers {
            states.push(self.store.peer_state(peer).await?);
        }

        let mut total = 0;
        for collection in self.store.list_collections().await? {
            let stable = states
                .iter()
                .map(|s| {
                    s.as_ref()
                        .map(|s| s.cursor(&collection).acked_seq)
                        .unwrap_or(0)
                })
                .min()
                .unwrap_or(0);

            if stable > 0 {
                let pruned = self.store.prune_log(&collection, stable).await?;
                if pruned > 0 {
                    debug!(collection = %collection, through = stable, pruned, "garbage collected");
                }
                total += pruned;
            }
        }
        Ok(total)
    }

    async fn check_capacity(&self, incoming: u64) -> Result<()> {
        if let Some(capacity) = self.config.capacity_bytes {
            let used = self.store.approximate_size().await?;
            if used.saturating_add(incoming) > capacity {
                return Err(DbError::StorageFull);
            }
        }
        Ok(())
    }
}

/// Handle to one collection of a [`Database`].
///
/// Thin sugar over the database methods, bound to a validated collection
/// id.
pub struct Collection<'db, S: Store> {
    db: &'db Database<S>,
    id: CollectionId,
}

impl<'db, S: Store + 'static> Collection<'db, S> {
    /// The collection's id.
    pub fn id(&self) -> &CollectionId {
        &self.id
    }

    pub async fn put(
        &self,
        key: impl Into<Bytes>,
        value: impl Into<Bytes>,
    ) -> Result<VersionVector> {
        self.db.put(&self.id, key, value).await
    }

    pub async fn get(&self, key: impl Into<Bytes>) -> Result<(Bytes, VersionVector)> {
        self.db.get(&self.id, key).await
    }

    pub async fn exists(&self, key: impl Into<Bytes>) -> Result<bool> {
        self.db.exists(&self.id, key).await
    }

    pub async fn delete(&self, key: impl Into<Bytes>) -> Result<VersionVector> {
        self.db.delete(&self.id, key).await
    }

    /// Stage an atomic multi-key batch against this collection.
    pub fn batch(&self) -> WriteBatch<'_, S> {
        self.db.batch(&self.id)
    }

    pub async fn scan(&self, range: KeyRange) -> Result<Scan> {
        self.db.scan(&self.id, range).await
    }

    pub fn watch(&self) -> broadcast::Receiver<WatchChange> {
        self.db.watch(&self.id)
    }

    /// Destroy the collection, consuming the handle.
    pub async fn destroy(self) -> Result<()> {
        self.db.destroy_collection(&self.id).await
    }
}
