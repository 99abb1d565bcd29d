//! The client-facing error surface.
//!
//! Lower layers keep their own error enums; `DbError` flattens them into
//! the taxonomy callers branch on, with [`DbError::kind`] as the stable
//! programmatic handle.

use thiserror::Error;

use basin_core::CoreError;
use basin_store::StoreError;
use basin_sync::SyncError;

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Stable classification of a database error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Key absent or tombstoned.
    NotFound,
    /// Key failed validation.
    InvalidKey,
    /// Collection name failed validation or collection does not exist.
    InvalidCollection,
    /// Local capacity exhausted.
    StorageFull,
    /// A merge policy failed to resolve a concurrent pair.
    ConflictUnresolved,
    /// A sync session was cancelled.
    SessionCancelled,
    /// The peer cannot be reached (retryable).
    PeerUnreachable,
    /// Peer speaks an incompatible protocol version.
    ProtocolMismatch,
    /// Anything else.
    Internal,
}

/// Errors surfaced by [`Database`](crate::Database) operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// The key does not exist (or is deleted).
    #[error("key not found")]
    NotFound,

    /// The key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The collection name failed validation.
    #[error("invalid collection: {0}")]
    InvalidCollection(String),

    /// The collection has not been created.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Local storage capacity is exhausted.
    #[error("storage full")]
    StorageFull,

    /// A concurrent pair could not be resolved.
    #[error("conflict unresolved: {0}")]
    ConflictUnresolved(String),

    /// The sync session was cancelled before completing.
    #[error("sync session cancelled")]
    SessionCancelled,

    /// No sync session with the given id.
    #[error("no such sync session: {0}")]
    SessionNotFound(u64),

    /// The peer cannot be reached.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// The peer speaks an incompatible protocol version.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    ProtocolMismatch { local: u8, peer: u8 },

    /// Timed out waiting for the peer.
    #[error("sync timeout: {0}")]
    Timeout(String),

    /// Storage-layer failure without a more specific mapping.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Sync-layer failure without a more specific mapping.
    #[error("sync error: {0}")]
    Sync(SyncError),
}

impl DbError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound => ErrorKind::NotFound,
            DbError::SessionNotFound(_) => ErrorKind::NotFound,
            DbError::InvalidKey(_) => ErrorKind::InvalidKey,
            DbError::InvalidCollection(_) => ErrorKind::InvalidCollection,
            DbError::CollectionNotFound(_) => ErrorKind::InvalidCollection,
            DbError::StorageFull => ErrorKind::StorageFull,
            DbError::ConflictUnresolved(_) => ErrorKind::ConflictUnresolved,
            DbError::SessionCancelled => ErrorKind::SessionCancelled,
            DbError::PeerUnreachable(_) => ErrorKind::PeerUnreachable,
            DbError::ProtocolMismatch { .. } => ErrorKind::ProtocolMismatch,
            DbError::Timeout(_) => ErrorKind::PeerUnreachable,
            DbError::Store(_) | DbError::Sync(_) => ErrorKind::Internal,
        }
    }

    /// Whether retrying the operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::PeerUnreachable(_) | DbError::Timeout(_))
    }
}

impl From<CoreError> for DbError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidKey(msg) => DbError::InvalidKey(msg),
            CoreError::InvalidCollection(msg) => DbError::InvalidCollection(msg),
        }
    }
}

impl From<StoreError> for DbError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => DbError::NotFound,
            StoreError::InvalidKey(msg) => DbError::InvalidKey(msg),
            StoreError::InvalidCollection(msg) => DbError::InvalidCollection(msg),
            StoreError::CollectionNotFound(name) => DbError::CollectionNotFound(name),
            StoreError::StorageFull(_) => DbError::StorageFull,
            other => DbError::Store(other),
        }
    }
}

impl From<SyncError> for DbError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::ProtocolMismatch { local, peer } => {
                DbError::ProtocolMismatch { local, peer }
            }
            SyncError::Cancelled => DbError::SessionCancelled,
            SyncError::PeerUnreachable(msg) => DbError::PeerUnreachable(msg),
            SyncError::Timeout(msg) => DbError::Timeout(msg),
            SyncError::Merge(e) => DbError::ConflictUnresolved(e.to_string()),
            SyncError::Store(e) => DbError::from(e),
            other => DbError::Sync(other),
        }
    }
}
