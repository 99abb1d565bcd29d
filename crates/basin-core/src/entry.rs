//! Replication log entries.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::types::{CollectionId, Key, ReplicaId};
use crate::version::VersionVector;

/// An immutable description of a single mutation.
///
/// Entries are appended to the per-collection replication log atomically
/// with the record write they describe, and are never mutated afterwards.
/// They are garbage-collected only once every known peer has acknowledged
/// receipt (causal stability).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Collection the mutation applies to.
    pub collection: CollectionId,
    /// Position in the local append sequence (dense, starting at 1).
    pub seq: u64,
    /// The mutated key.
    pub key: Key,
    /// The new value, or `None` for a tombstone.
    pub value: Option<Bytes>,
    /// Version vector at the time of the write.
    pub version: VersionVector,
    /// Wall-clock timestamp of the write (Unix ms).
    pub timestamp_ms: i64,
    /// Replica that originated the mutation.
    pub origin: ReplicaId,
}

impl LogEntry {
    /// Whether this entry records a deletion.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// The record this entry produces when applied.
    pub fn to_record(&self) -> Record {
        match &self.value {
            Some(value) => Record::new(
                self.key.clone(),
                value.clone(),
                self.version.clone(),
                self.timestamp_ms,
                self.origin,
            ),
            None => Record::tombstone(
                self.key.clone(),
                self.version.clone(),
                self.timestamp_ms,
                self.origin,
            ),
        }
    }

    /// Build the entry describing a record mutation at a log position.
    pub fn for_record(collection: CollectionId, seq: u64, record: &Record) -> Self {
        Self {
            collection,
            seq,
            key: record.key.clone(),
            value: if record.tombstone {
                None
            } else {
                Some(record.value.clone())
            },
            version: record.version.clone(),
            timestamp_ms: record.timestamp_ms,
            origin: record.origin,
        }
    }
}
