//! Store trait: the abstract interface for record and log persistence.
//!
//! This trait is the injected durable ordered-map collaborator. It keeps
//! the engine storage-agnostic: implementations include SQLite (primary)
//! and in-memory (for tests).

use std::collections::BTreeMap;
use std::ops::Bound;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use basin_core::{CollectionId, Key, LogEntry, Record, ReplicaId};

use crate::error::Result;

/// A half-open key range for scans.
///
/// `start` is inclusive, `end` exclusive. Unbounded on either side by
/// default. A scan is restarted from where it left off by issuing a new
/// scan with [`KeyRange::after`] the last key seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRange {
    /// Inclusive lower bound, or unbounded.
    pub start: Option<Key>,
    /// Exclusive upper bound, or unbounded.
    pub end: Option<Key>,
    /// When set, the lower bound is exclusive (used for scan resumption).
    pub start_exclusive: bool,
}

impl KeyRange {
    /// The full key space.
    pub fn all() -> Self {
        Self::default()
    }

    /// Keys in `[start, end)`.
    pub fn between(start: Key, end: Key) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            start_exclusive: false,
        }
    }

    /// Keys `>= start`.
    pub fn from(start: Key) -> Self {
        Self {
            start: Some(start),
            end: None,
            start_exclusive: false,
        }
    }

    /// Keys strictly after `key`: resume point for an interrupted scan.
    pub fn after(key: Key) -> Self {
        Self {
            start: Some(key),
            end: None,
            start_exclusive: true,
        }
    }

    /// Whether a key falls inside the range.
    pub fn contains(&self, key: &Key) -> bool {
        if let Some(start) = &self.start {
            if self.start_exclusive {
                if key <= start {
                    return false;
                }
            } else if key < start {
                return false;
            }
        }
        if let Some(end) = &self.end {
            if key >= end {
                return false;
            }
        }
        true
    }

    /// Bounds in `std::ops` form, for BTreeMap range queries.
    pub fn as_bounds(&self) -> (Bound<&Key>, Bound<&Key>) {
        let start = match (&self.start, self.start_exclusive) {
            (Some(k), true) => Bound::Excluded(k),
            (Some(k), false) => Bound::Included(k),
            (None, _) => Bound::Unbounded,
        };
        let end = match &self.end {
            Some(k) => Bound::Excluded(k),
            None => Bound::Unbounded,
        };
        (start, end)
    }
}

/// Per-collection sync cursor against one peer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCursor {
    /// Highest remote log seq we have applied locally.
    pub applied_seq: u64,
    /// Highest local log seq the peer has acknowledged receiving.
    pub acked_seq: u64,
}

/// Persisted sync state for one peer pair.
///
/// Cursors advance only after successful application or acknowledgement;
/// an interrupted session resumes from the last committed value without
/// re-sending history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerState {
    /// The remote replica.
    pub peer: ReplicaId,
    /// Cursor per collection.
    pub cursors: BTreeMap<CollectionId, PeerCursor>,
    /// When this state was last committed (Unix ms).
    pub updated_at: i64,
}

impl PeerState {
    /// Fresh state for a newly met peer.
    pub fn new(peer: ReplicaId, now: i64) -> Self {
        Self {
            peer,
            cursors: BTreeMap::new(),
            updated_at: now,
        }
    }

    /// Cursor for a collection; zero for collections never synced.
    pub fn cursor(&self, collection: &CollectionId) -> PeerCursor {
        self.cursors.get(collection).copied().unwrap_or_default()
    }

    /// Record that remote entries through `seq` have been applied.
    pub fn set_applied(&mut self, collection: CollectionId, seq: u64, now: i64) {
        let cursor = self.cursors.entry(collection).or_default();
        if seq > cursor.applied_seq {
            cursor.applied_seq = seq;
        }
        self.updated_at = now;
    }

    /// Record that the peer acknowledged our entries through `seq`.
    pub fn set_acked(&mut self, collection: CollectionId, seq: u64, now: i64) {
        let cursor = self.cursors.entry(collection).or_default();
        if seq > cursor.acked_seq {
            cursor.acked_seq = seq;
        }
        self.updated_at = now;
    }
}

/// The Store trait: async interface for record and log persistence.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the
/// runtime.
///
/// # Design Notes
///
/// - **Atomic commits**: `commit_write` persists the record and appends
///   the log entry in one transaction; the log seq is assigned by the
///   store so concurrent writers to different keys never collide.
/// - **Tombstones**: deleted records stay visible (with `tombstone: true`)
///   until `prune_log` reclaims them past the stable point.
/// - **Snapshot scans**: `scan_records` returns a result set fixed at call
///   time; a concurrent write is either entirely visible or entirely
///   absent, never half-applied.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Collection Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a collection. Idempotent: creating an existing collection
    /// is a no-op.
    async fn create_collection(&self, collection: &CollectionId) -> Result<()>;

    /// Destroy a collection and everything in it, including its log and
    /// any peer cursors referencing it.
    async fn destroy_collection(&self, collection: &CollectionId) -> Result<()>;

    /// Whether the collection exists.
    async fn has_collection(&self, collection: &CollectionId) -> Result<bool>;

    /// List all collections in name order.
    async fn list_collections(&self) -> Result<Vec<CollectionId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Record Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a record by key. Tombstones are returned; the caller decides
    /// whether they are visible.
    async fn get_record(&self, collection: &CollectionId, key: &Key) -> Result<Option<Record>>;

    /// Scan records in key order within a range, snapshot-isolated.
    /// Tombstones are included; callers filter as needed.
    async fn scan_records(&self, collection: &CollectionId, range: KeyRange)
        -> Result<Vec<Record>>;

    /// Persist a record mutation and append the matching log entry
    /// atomically. Returns the assigned log sequence number.
    async fn commit_write(&self, collection: &CollectionId, record: &Record) -> Result<u64>;

    /// Persist several record mutations and their log entries in one
    /// transaction. Entries get consecutive seqs in slice order; either
    /// every record commits or none do. Returns the assigned seqs.
    async fn commit_batch(
        &self,
        collection: &CollectionId,
        records: &[Record],
    ) -> Result<Vec<u64>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Replication Log Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Entries with `seq > after_seq`, ordered by seq, at most `limit`.
    async fn log_entries_since(
        &self,
        collection: &CollectionId,
        after_seq: u64,
        limit: usize,
    ) -> Result<Vec<LogEntry>>;

    /// Highest assigned log seq for a collection (0 if the log is empty
    /// and nothing was ever appended).
    async fn log_head(&self, collection: &CollectionId) -> Result<u64>;

    /// Drop log entries with `seq <= up_to_seq` and physically reclaim
    /// tombstoned records whose last mutation is at or before that point.
    /// Returns the number of entries removed.
    async fn prune_log(&self, collection: &CollectionId, up_to_seq: u64) -> Result<u64>;

    // ─────────────────────────────────────────────────────────────────────────
    // Peer Sync State
    // ─────────────────────────────────────────────────────────────────────────

    /// Persisted sync state for a peer, if we have met it before.
    async fn peer_state(&self, peer: &ReplicaId) -> Result<Option<PeerState>>;

    /// Commit updated peer sync state.
    async fn upsert_peer_state(&self, state: &PeerState) -> Result<()>;

    /// All peers with persisted sync state.
    async fn list_peers(&self) -> Result<Vec<ReplicaId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Capacity
    // ─────────────────────────────────────────────────────────────────────────

    /// Approximate bytes of live record data (keys + values).
    async fn approximate_size(&self) -> Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Key {
        Key::from_str_key(s).unwrap()
    }

    #[test]
    fn test_key_range_contains() {
        let range = KeyRange::between(key("b"), key("d"));
        assert!(!range.contains(&key("a")));
        assert!(range.contains(&key("b")));
        assert!(range.contains(&key("c")));
        assert!(!range.contains(&key("d")));
    }

    #[test]
    fn test_key_range_after_is_exclusive() {
        let range = KeyRange::after(key("b"));
        assert!(!range.contains(&key("b")));
        assert!(range.contains(&key("c")));
    }

    #[test]
    fn test_peer_cursor_never_regresses() {
        let collection = CollectionId::new("c").unwrap();
        let mut state = PeerState::new(ReplicaId::ZERO, 0);
        state.set_applied(collection.clone(), 5, 1);
        state.set_applied(collection.clone(), 3, 2);
        assert_eq!(state.cursor(&collection).applied_seq, 5);
    }
}
