//! Per-key write serialization.
//!
//! Writers to the same key must be serialized to preserve the
//! read-bump-commit sequence; writers to different keys proceed in
//! parallel. A fixed pool of sharded async mutexes gives per-key
//! granularity without a lock table that grows with the key space.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

use basin_core::{CollectionId, Key};

/// Default number of lock shards.
pub const DEFAULT_SHARDS: usize = 128;

/// Sharded per-key write locks.
///
/// Two distinct keys may map to the same shard; that costs parallelism,
/// never correctness. Holding a guard across an await point is fine:
/// these are tokio mutexes.
pub struct KeyLocks {
    shards: Vec<Mutex<()>>,
}

impl KeyLocks {
    /// Create a lock pool with the given shard count (minimum 1).
    pub fn new(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Acquire the write lock for a (collection, key) pair.
    pub async fn lock(&self, collection: &CollectionId, key: &Key) -> MutexGuard<'_, ()> {
        self.shards[self.shard_index(collection, key)].lock().await
    }

    /// Acquire the write locks covering a set of keys, for multi-key
    /// commits. Shards are locked in index order and each at most once,
    /// so two overlapping batches cannot deadlock each other.
    pub async fn lock_many<'a, I>(
        &self,
        collection: &CollectionId,
        keys: I,
    ) -> Vec<MutexGuard<'_, ()>>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut indices: Vec<usize> = keys
            .into_iter()
            .map(|key| self.shard_index(collection, key))
            .collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for index in indices {
            guards.push(self.shards[index].lock().await);
        }
        guards
    }

    fn shard_index(&self, collection: &CollectionId, key: &Key) -> usize {
        let mut hasher = DefaultHasher::new();
        collection.hash(&mut hasher);
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_same_key_serializes() {
        let locks = Arc::new(KeyLocks::new(8));
        let collection = CollectionId::new("c").unwrap();
        let key = Key::from_str_key("k").unwrap();

        let guard = locks.lock(&collection, &key).await;

        let locks2 = Arc::clone(&locks);
        let collection2 = collection.clone();
        let key2 = key.clone();
        let contender = tokio::spawn(async move {
            let _g = locks2.lock(&collection2, &key2).await;
        });

        // The contender cannot finish while we hold the guard.
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_many_collapses_colliding_shards() {
        // More keys than shards: every shard index appears repeatedly,
        // but each shard is taken once and acquisition completes.
        let locks = KeyLocks::new(2);
        let collection = CollectionId::new("c").unwrap();
        let keys: Vec<Key> = (0..8)
            .map(|i| Key::from_str_key(&format!("k{}", i)).unwrap())
            .collect();

        let guards = locks.lock_many(&collection, keys.iter()).await;
        assert!(guards.len() <= 2);
    }

    #[tokio::test]
    async fn test_shard_index_is_stable() {
        let locks = KeyLocks::new(16);
        let collection = CollectionId::new("c").unwrap();
        let key = Key::from_str_key("k").unwrap();
        assert_eq!(
            locks.shard_index(&collection, &key),
            locks.shard_index(&collection, &key)
        );
    }
}
