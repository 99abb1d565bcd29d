//! Convergence verification.
//!
//! After a full exchange, two replicas can verify they hold identical
//! collection contents by comparing deterministic state hashes, without
//! shipping the records again.

use basin_core::CollectionId;
use basin_store::{KeyRange, Store};

use crate::error::Result;

/// A blake3 digest over a collection's visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub [u8; 32]);

impl StateHash {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Compute a deterministic state hash for a collection.
///
/// Hashes the key-ordered sequence of (key, version, tombstone, value)
/// tuples with length prefixes, so the digest is injective over record
/// sets. Tombstones participate: replicas differing only in an
/// unreclaimed deletion do not compare as converged.
pub async fn collection_state_hash<S: Store + ?Sized>(
    store: &S,
    collection: &CollectionId,
) -> Result<StateHash> {
    let records = store.scan_records(collection, KeyRange::all()).await?;

    let mut hasher = blake3::Hasher::new();
    hasher.update(b"basin-state-v1:");
    hasher.update(collection.name().as_bytes());

    for record in records {
        hasher.update(&(record.key.len() as u64).to_be_bytes());
        hasher.update(record.key.as_bytes());

        hasher.update(&(record.version.len() as u64).to_be_bytes());
        for (replica, counter) in record.version.iter() {
            hasher.update(replica.as_bytes());
            hasher.update(&counter.to_be_bytes());
        }

        hasher.update(&[record.tombstone as u8]);
        hasher.update(&(record.value.len() as u64).to_be_bytes());
        hasher.update(&record.value);
    }

    Ok(StateHash(*hasher.finalize().as_bytes()))
}

/// Whether two stores hold identical state for a collection.
pub async fn verify_convergence<A: Store + ?Sized, B: Store + ?Sized>(
    a: &A,
    b: &B,
    collection: &CollectionId,
) -> Result<bool> {
    let hash_a = collection_state_hash(a, collection).await?;
    let hash_b = collection_state_hash(b, collection).await?;
    Ok(hash_a == hash_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::{Key, Record, ReplicaId, VersionVector};
    use basin_store::MemoryStore;

    fn collection() -> CollectionId {
        CollectionId::new("c").unwrap()
    }

    fn record(k: &str, v: &str, counter: u64) -> Record {
        let origin = ReplicaId::from_bytes([1; 16]);
        let mut version = VersionVector::new();
        for _ in 0..counter {
            version.bump(origin);
        }
        Record::new(Key::from_str_key(k).unwrap(), v.to_string(), version, 100, origin)
    }

    async fn fresh_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_collection(&collection()).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_state_hash_deterministic() {
        let store = fresh_store().await;
        store.commit_write(&collection(), &record("a", "1", 1)).await.unwrap();
        store.commit_write(&collection(), &record("b", "2", 2)).await.unwrap();

        let h1 = collection_state_hash(&store, &collection()).await.unwrap();
        let h2 = collection_state_hash(&store, &collection()).await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn test_identical_contents_converge_regardless_of_write_order() {
        let a = fresh_store().await;
        let b = fresh_store().await;

        a.commit_write(&collection(), &record("x", "1", 1)).await.unwrap();
        a.commit_write(&collection(), &record("y", "2", 2)).await.unwrap();

        b.commit_write(&collection(), &record("y", "2", 2)).await.unwrap();
        b.commit_write(&collection(), &record("x", "1", 1)).await.unwrap();

        assert!(verify_convergence(&a, &b, &collection()).await.unwrap());
    }

    #[tokio::test]
    async fn test_differing_values_do_not_converge() {
        let a = fresh_store().await;
        let b = fresh_store().await;

        a.commit_write(&collection(), &record("x", "1", 1)).await.unwrap();
        b.commit_write(&collection(), &record("x", "2", 1)).await.unwrap();

        assert!(!verify_convergence(&a, &b, &collection()).await.unwrap());
    }

    #[tokio::test]
    async fn test_tombstone_affects_hash() {
        let a = fresh_store().await;
        let b = fresh_store().await;

        let live = record("x", "1", 1);
        a.commit_write(&collection(), &live).await.unwrap();
        b.commit_write(&collection(), &live).await.unwrap();

        let mut version = live.version.clone();
        version.bump(live.origin);
        let dead = Record::tombstone(live.key.clone(), version, 200, live.origin);
        b.commit_write(&collection(), &dead).await.unwrap();

        assert!(!verify_convergence(&a, &b, &collection()).await.unwrap());
    }
}
