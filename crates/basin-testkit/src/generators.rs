//! Proptest generators for property-based testing.

use proptest::prelude::*;

use basin_core::{CollectionId, Key, LogEntry, Record, ReplicaId, VersionVector};

/// Generate a random replica id.
pub fn replica_id() -> impl Strategy<Value = ReplicaId> {
    any::<[u8; 16]>().prop_map(ReplicaId::from_bytes)
}

/// Generate a valid key (1..=64 bytes).
pub fn key() -> impl Strategy<Value = Key> {
    prop::collection::vec(any::<u8>(), 1..=64)
        .prop_map(|bytes| Key::new(bytes).expect("generated key within bounds"))
}

/// Generate a short printable key, for scenarios where readable
/// failure output matters.
pub fn printable_key() -> impl Strategy<Value = Key> {
    "[a-z][a-z0-9/_-]{0,15}".prop_map(|s| Key::from_str_key(&s).expect("printable key"))
}

/// Generate value bytes up to `max_len`.
pub fn value(max_len: usize) -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..=max_len)
}

/// Generate a valid collection name.
pub fn collection_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,31}".prop_map(String::from)
}

/// Generate a collection id.
pub fn collection_id() -> impl Strategy<Value = CollectionId> {
    collection_name().prop_map(|n| CollectionId::new(n).expect("generated name is valid"))
}

/// Generate a version vector with up to `max_replicas` coordinates.
pub fn version_vector(max_replicas: usize) -> impl Strategy<Value = VersionVector> {
    prop::collection::btree_map(replica_id(), 1u64..=1000, 0..=max_replicas)
        .prop_map(|m| m.into_iter().collect())
}

/// Generate a reasonable wall-clock timestamp (Unix ms).
pub fn timestamp() -> impl Strategy<Value = i64> {
    1_500_000_000_000i64..=2_000_000_000_000
}

/// Generate a record (live or tombstone).
pub fn record() -> impl Strategy<Value = Record> {
    (
        key(),
        value(128),
        version_vector(4),
        timestamp(),
        replica_id(),
        any::<bool>(),
    )
        .prop_map(|(key, value, version, ts, origin, tombstone)| {
            if tombstone {
                Record::tombstone(key, version, ts, origin)
            } else {
                Record::new(key, value, version, ts, origin)
            }
        })
}

/// Generate a log entry for a fixed collection.
pub fn log_entry(collection: CollectionId) -> impl Strategy<Value = LogEntry> {
    (record(), 1u64..=10_000)
        .prop_map(move |(record, seq)| LogEntry::for_record(collection.clone(), seq, &record))
}

/// A write workload: ordered (key, value) pairs over a small key space,
/// so generated runs revisit keys and produce overwrite and conflict
/// cases.
pub fn workload(max_writes: usize) -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::vec(
        ("k[0-9]".prop_map(String::from), value(32)),
        0..=max_writes,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_keys_are_valid(k in key()) {
            prop_assert!(!k.is_empty());
            prop_assert!(k.len() <= basin_core::MAX_KEY_LEN);
        }

        #[test]
        fn generated_collection_names_are_valid(name in collection_name()) {
            prop_assert!(CollectionId::new(name).is_ok());
        }

        #[test]
        fn generated_vectors_join_idempotently(v in version_vector(4)) {
            prop_assert_eq!(v.join(&v), v.clone());
        }

        #[test]
        fn tombstone_records_have_empty_values(r in record()) {
            if r.tombstone {
                prop_assert!(r.value.is_empty());
            }
        }
    }
}
