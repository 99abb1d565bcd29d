//! Sync protocol message types.
//!
//! These messages are exchanged between replicas to converge collection
//! contents. The codec is CBOR; see `framed` for the byte-stream framing.

use serde::{Deserialize, Serialize};

use basin_core::{CollectionId, LogEntry, ReplicaId};

/// Current protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Message size limits.
pub mod limits {
    /// Max collections in Hello.collections and Cursors.cursors.
    pub const MAX_COLLECTIONS: usize = 256;
    /// Max log entries in Entries.entries.
    pub const MAX_ENTRIES_PER_MESSAGE: usize = 256;
    /// Max encoded size of a single framed message.
    pub const MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;
}

/// One side's applied cursor for one collection.
///
/// `applied_seq` is the highest entry of the *peer's* log that the sender
/// has applied; the peer streams entries strictly after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionCursor {
    /// The collection.
    pub collection: CollectionId,
    /// Highest peer-log seq already applied by the sender.
    pub applied_seq: u64,
}

/// Sync protocol messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Handshake: introduce yourself.
    Hello {
        /// The sender's replica identity.
        replica_id: ReplicaId,
        /// Protocol version for compatibility checking.
        protocol_version: u8,
        /// Collections the sender wants to sync.
        collections: Vec<CollectionId>,
    },

    /// Handshake: report applied cursors so the peer knows where to
    /// resume streaming from.
    Cursors {
        /// One cursor per shared collection.
        cursors: Vec<CollectionCursor>,
    },

    /// A batch of replication-log entries, in seq order.
    Entries {
        /// The collection these entries belong to.
        collection: CollectionId,
        /// The entries, ordered by `seq`.
        entries: Vec<LogEntry>,
        /// Whether this is the sender's final batch for the collection.
        done: bool,
    },

    /// Acknowledge application of the peer's entries through a seq.
    Ack {
        /// The collection being acknowledged.
        collection: CollectionId,
        /// Highest contiguous peer-log seq applied.
        through_seq: u64,
    },

    /// The sender has nothing more to send or acknowledge.
    Bye,

    /// Error condition.
    Error {
        /// Error code for programmatic handling.
        code: SyncErrorCode,
        /// Human-readable description.
        message: String,
    },
}

impl SyncMessage {
    /// Check that this message respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        match self {
            SyncMessage::Hello { collections, .. } => {
                if collections.len() > limits::MAX_COLLECTIONS {
                    return Err("too many collections in Hello");
                }
            }
            SyncMessage::Cursors { cursors } => {
                if cursors.len() > limits::MAX_COLLECTIONS {
                    return Err("too many cursors");
                }
            }
            SyncMessage::Entries { entries, .. } => {
                if entries.len() > limits::MAX_ENTRIES_PER_MESSAGE {
                    return Err("too many entries");
                }
            }
            SyncMessage::Ack { .. } | SyncMessage::Bye | SyncMessage::Error { .. } => {}
        }
        Ok(())
    }
}

/// Error codes for the sync protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u16)]
pub enum SyncErrorCode {
    /// Unknown/unspecified error.
    Unknown = 0,
    /// Protocol version mismatch.
    VersionMismatch = 1,
    /// Message too large.
    MessageTooLarge = 2,
    /// Invalid message format.
    InvalidMessage = 3,
    /// Conflict resolution failed on the sender's side.
    ConflictUnresolved = 4,
    /// Internal error on peer.
    InternalError = 5,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_limits_valid() {
        let msg = SyncMessage::Hello {
            replica_id: ReplicaId::ZERO,
            protocol_version: PROTOCOL_VERSION,
            collections: vec![],
        };
        assert!(msg.validate_limits().is_ok());
    }

    #[test]
    fn test_message_limits_exceeded() {
        let collection = CollectionId::new("c").unwrap();
        let msg = SyncMessage::Hello {
            replica_id: ReplicaId::ZERO,
            protocol_version: PROTOCOL_VERSION,
            collections: vec![collection; limits::MAX_COLLECTIONS + 1],
        };
        assert!(msg.validate_limits().is_err());
    }

    #[test]
    fn test_cbor_roundtrip() {
        let msg = SyncMessage::Ack {
            collection: CollectionId::new("todos").unwrap(),
            through_seq: 42,
        };

        let mut buf = Vec::new();
        ciborium::into_writer(&msg, &mut buf).unwrap();
        let decoded: SyncMessage = ciborium::from_reader(buf.as_slice()).unwrap();

        match decoded {
            SyncMessage::Ack { collection, through_seq } => {
                assert_eq!(collection.name(), "todos");
                assert_eq!(through_seq, 42);
            }
            other => panic!("expected Ack, got {:?}", other),
        }
    }
}
