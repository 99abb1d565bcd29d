//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use basin::{Config, Database, SyncReport};
use basin_core::{CollectionId, ReplicaId};
use basin_store::MemoryStore;
use basin_sync::transport::memory::duplex_pair;

/// One replica over a memory store, with a deterministic identity.
pub struct ReplicaFixture {
    pub db: Database<MemoryStore>,
}

impl ReplicaFixture {
    /// Create a replica whose id is the seed byte repeated.
    pub fn new(seed: u8) -> Self {
        Self::with_config(seed, Config::default())
    }

    /// Create a replica with explicit configuration.
    pub fn with_config(seed: u8, config: Config) -> Self {
        Self {
            db: Database::new(
                ReplicaId::from_bytes([seed; 16]),
                MemoryStore::new(),
                config,
            ),
        }
    }

    pub fn replica_id(&self) -> ReplicaId {
        self.db.replica_id()
    }

    /// Create (or open) a collection on this replica.
    pub async fn create_collection(&self, name: &str) -> CollectionId {
        let collection = self.db.open_collection(name).await.expect("open collection");
        collection.id().clone()
    }
}

/// Create replicas with seeds 1..=count.
pub fn multi_replica_fixtures(count: u8) -> Vec<ReplicaFixture> {
    (1..=count).map(ReplicaFixture::new).collect()
}

/// Run one full sync round between two replicas over an in-memory link.
pub async fn sync_round(a: &ReplicaFixture, b: &ReplicaFixture) -> (SyncReport, SyncReport) {
    let (ta, tb) = duplex_pair();
    let (ra, rb) = tokio::join!(a.db.sync_once(ta), b.db.sync_once(tb));
    (ra.expect("sync side a"), rb.expect("sync side b"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ids_are_deterministic() {
        let a = ReplicaFixture::new(1);
        let b = ReplicaFixture::new(1);
        assert_eq!(a.replica_id(), b.replica_id());
    }

    #[tokio::test]
    async fn test_sync_round_links_two_replicas() {
        let a = ReplicaFixture::new(1);
        let b = ReplicaFixture::new(2);
        let collection = a.create_collection("c").await;
        b.create_collection("c").await;

        a.db.put(&collection, "k", "v").await.unwrap();
        let (ra, _rb) = sync_round(&a, &b).await;
        assert_eq!(ra.sent_count, 1);

        let (value, _) = b.db.get(&collection, "k").await.unwrap();
        assert_eq!(value, "v");
    }
}
