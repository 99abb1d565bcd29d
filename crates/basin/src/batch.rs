//! Atomic multi-key writes.
//!
//! A [`WriteBatch`] stages puts and deletes against one collection and
//! commits them in a single store transaction. Each key still gets its
//! own record and log entry, so peers reconcile batch writes key by key.

use std::collections::BTreeMap;

use bytes::Bytes;

use basin_core::{CollectionId, Key, VersionVector};
use basin_store::Store;

use crate::database::Database;
use crate::error::Result;

pub(crate) enum BatchOp {
    Put(Bytes),
    Delete,
}

/// A staged set of writes committed together.
///
/// Nothing is visible, replicated, or delivered to watchers until
/// [`commit`](WriteBatch::commit); then every staged operation lands in
/// one transaction or none do. A later operation on a key replaces an
/// earlier one in the same batch. Dropping the batch, or calling
/// [`abort`](WriteBatch::abort), discards it without writing.
pub struct WriteBatch<'db, S: Store> {
    db: &'db Database<S>,
    collection: CollectionId,
    ops: BTreeMap<Key, BatchOp>,
}

impl<'db, S: Store + 'static> WriteBatch<'db, S> {
    pub(crate) fn new(db: &'db Database<S>, collection: CollectionId) -> Self {
        Self {
            db,
            collection,
            ops: BTreeMap::new(),
        }
    }

    /// Stage a write.
    pub fn put(&mut self, key: impl Into<Bytes>, value: impl Into<Bytes>) -> Result<&mut Self> {
        let key = Key::new(key)?;
        self.ops.insert(key, BatchOp::Put(value.into()));
        Ok(self)
    }

    /// Stage a delete.
    ///
    /// The key must hold a live value at commit time; otherwise the whole
    /// batch fails with `NotFound` and nothing is written.
    pub fn delete(&mut self, key: impl Into<Bytes>) -> Result<&mut Self> {
        let key = Key::new(key)?;
        self.ops.insert(key, BatchOp::Delete);
        Ok(self)
    }

    /// Number of staged operations, counting one per distinct key.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Commit every staged operation atomically.
    ///
    /// Returns the new version vector of each written key, in key order.
    pub async fn commit(self) -> Result<Vec<VersionVector>> {
        self.db.commit_batch(&self.collection, self.ops).await
    }

    /// Discard the batch without writing anything.
    pub fn abort(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::ErrorKind;
    use crate::watch::ChangeKind;
    use basin_core::ReplicaId;
    use basin_store::MemoryStore;

    fn db(id: u8) -> Database<MemoryStore> {
        Database::new(
            ReplicaId::from_bytes([id; 16]),
            MemoryStore::new(),
            Config::default(),
        )
    }

    async fn collection(db: &Database<MemoryStore>) -> CollectionId {
        db.open_collection("todos").await.unwrap().id().clone()
    }

    #[tokio::test]
    async fn test_batch_commits_all_keys_together() {
        let db = db(1);
        let collection = collection(&db).await;

        let mut batch = db.batch(&collection);
        batch.put("a", "1").unwrap();
        batch.put("b", "2").unwrap();
        batch.put("c", "3").unwrap();
        let versions = batch.commit().await.unwrap();

        assert_eq!(versions.len(), 3);
        for version in &versions {
            assert_eq!(version.get(&db.replica_id()), 1);
        }
        for (k, v) in [("a", "1"), ("b", "2"), ("c", "3")] {
            let (value, _) = db.get(&collection, k).await.unwrap();
            assert_eq!(value, v);
        }
    }

    #[tokio::test]
    async fn test_batch_abort_writes_nothing() {
        let db = db(1);
        let collection = collection(&db).await;

        let mut batch = db.batch(&collection);
        batch.put("a", "1").unwrap();
        batch.abort();

        assert!(!db.exists(&collection, "a").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_last_op_per_key_wins() {
        let db = db(1);
        let collection = collection(&db).await;

        let mut batch = db.batch(&collection);
        batch.put("k", "first").unwrap();
        batch.put("k", "second").unwrap();
        assert_eq!(batch.len(), 1);
        batch.commit().await.unwrap();

        let (value, _) = db.get(&collection, "k").await.unwrap();
        assert_eq!(value, "second");
    }

    #[tokio::test]
    async fn test_batch_mixes_puts_and_deletes() {
        let db = db(1);
        let collection = collection(&db).await;
        db.put(&collection, "old", "v").await.unwrap();

        let mut batch = db.batch(&collection);
        batch.put("new", "v").unwrap();
        batch.delete("old").unwrap();
        batch.commit().await.unwrap();

        assert!(db.exists(&collection, "new").await.unwrap());
        assert!(!db.exists(&collection, "old").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_delete_of_absent_key_aborts_everything() {
        let db = db(1);
        let collection = collection(&db).await;

        let mut batch = db.batch(&collection);
        batch.put("kept", "v").unwrap();
        batch.delete("missing").unwrap();
        let err = batch.commit().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Nothing from the failed batch landed.
        assert!(!db.exists(&collection, "kept").await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_notifies_watchers_per_key() {
        let db = db(1);
        let collection = collection(&db).await;
        let mut rx = db.watch(&collection);

        let mut batch = db.batch(&collection);
        batch.put("a", "1").unwrap();
        batch.put("b", "2").unwrap();
        batch.commit().await.unwrap();

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.kind, ChangeKind::Put);
        assert_eq!(second.kind, ChangeKind::Put);
        assert_ne!(first.key, second.key);
    }

    #[tokio::test]
    async fn test_empty_batch_is_a_no_op() {
        let db = db(1);
        let collection = collection(&db).await;

        let batch = db.batch(&collection);
        assert!(batch.is_empty());
        let versions = batch.commit().await.unwrap();
        assert!(versions.is_empty());
    }
}
