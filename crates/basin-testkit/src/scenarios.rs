//! Multi-replica convergence scenarios.
//!
//! Deterministic setups shared by integration tests: apply workloads,
//! sync pairs, and compare the visible state of replicas.

use bytes::Bytes;
use basin_core::{CollectionId, Key, VersionVector};

use crate::fixtures::{sync_round, ReplicaFixture};

/// Apply an ordered write workload to one replica.
pub async fn apply_workload(
    replica: &ReplicaFixture,
    collection: &CollectionId,
    writes: &[(String, Vec<u8>)],
) {
    for (key, value) in writes {
        replica
            .db
            .put(collection, key.as_bytes().to_vec(), value.clone())
            .await
            .expect("workload write");
    }
}

/// The visible (live) contents of a collection: key, value, version.
pub async fn visible_state(
    replica: &ReplicaFixture,
    collection: &CollectionId,
) -> Vec<(Key, Bytes, VersionVector)> {
    replica
        .db
        .scan(collection, basin_store::KeyRange::all())
        .await
        .expect("scan")
        .map(|r| (r.key, r.value, r.version))
        .collect()
}

/// Panic unless two replicas hold identical visible state.
pub async fn assert_converged(
    a: &ReplicaFixture,
    b: &ReplicaFixture,
    collection: &CollectionId,
) {
    let state_a = visible_state(a, collection).await;
    let state_b = visible_state(b, collection).await;
    assert_eq!(
        state_a,
        state_b,
        "replicas {} and {} did not converge on {}",
        a.replica_id(),
        b.replica_id(),
        collection
    );
}

/// Two replicas that concurrently wrote the same key before ever
/// syncing: the canonical conflict setup.
///
/// Replica 1 writes `value_a` at timestamp 1000, replica 2 writes
/// `value_b` at a later wall-clock instant, so last-writer-wins picks
/// `value_b` on both sides.
pub async fn concurrent_write_pair(
    key: &str,
    value_a: &str,
    value_b: &str,
) -> (ReplicaFixture, ReplicaFixture, CollectionId) {
    let a = ReplicaFixture::new(1);
    let b = ReplicaFixture::new(2);
    let collection = a.create_collection("shared").await;
    b.create_collection("shared").await;

    a.db.put(&collection, key.to_string(), value_a.to_string())
        .await
        .expect("write on a");
    // Wall clocks tick in ms; make sure b's write is strictly later.
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    b.db.put(&collection, key.to_string(), value_b.to_string())
        .await
        .expect("write on b");

    (a, b, collection)
}

/// Drive pairwise syncs until every replica has seen every other, then
/// assert all pairs converged.
pub async fn converge_all(replicas: &[ReplicaFixture], collection: &CollectionId) {
    // Two passes of a ring of pairwise syncs propagate every write to
    // every replica (entries re-enter logs on application).
    for _ in 0..2 {
        for pair in replicas.windows(2) {
            sync_round(&pair[0], &pair[1]).await;
        }
    }

    for pair in replicas.windows(2) {
        assert_converged(&pair[0], &pair[1], collection).await;
    }
}
