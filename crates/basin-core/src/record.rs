//! Records: key-value rows with version metadata.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{Key, ReplicaId};
use crate::version::VersionVector;

/// A single row in a collection.
///
/// Deleted rows are kept as tombstones until the deletion is causally
/// stable at every known peer, then physically reclaimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// The record key, unique within its collection.
    pub key: Key,
    /// The opaque value payload. Empty for tombstones.
    pub value: Bytes,
    /// Version vector at the time of the last mutation.
    pub version: VersionVector,
    /// Wall-clock timestamp of the last mutation (Unix ms).
    ///
    /// Secondary ordering input for last-writer-wins resolution; the
    /// version vector remains the primary causal order.
    pub timestamp_ms: i64,
    /// Replica that performed the last mutation.
    pub origin: ReplicaId,
    /// Whether this record is a tombstone (soft-deleted).
    pub tombstone: bool,
}

impl Record {
    /// Create a live record.
    pub fn new(
        key: Key,
        value: impl Into<Bytes>,
        version: VersionVector,
        timestamp_ms: i64,
        origin: ReplicaId,
    ) -> Self {
        Self {
            key,
            value: value.into(),
            version,
            timestamp_ms,
            origin,
            tombstone: false,
        }
    }

    /// Create a tombstone record.
    pub fn tombstone(
        key: Key,
        version: VersionVector,
        timestamp_ms: i64,
        origin: ReplicaId,
    ) -> Self {
        Self {
            key,
            value: Bytes::new(),
            version,
            timestamp_ms,
            origin,
            tombstone: true,
        }
    }

    /// Last-writer-wins comparison: later timestamp wins, ties break on
    /// the larger origin replica id. Deterministic for any pair, so both
    /// sides of a sync resolve a conflict to the same record.
    pub fn wins_over(&self, other: &Record) -> bool {
        match self.timestamp_ms.cmp(&other.timestamp_ms) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.origin > other.origin,
        }
    }
}
