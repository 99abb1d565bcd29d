//! Error types for the sync module.

use thiserror::Error;

use crate::messages::SyncErrorCode;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Protocol version mismatch with peer. Session-terminal: retrying
    /// cannot help until one side upgrades.
    #[error("protocol version mismatch: local={local}, peer={peer}")]
    ProtocolMismatch { local: u8, peer: u8 },

    /// The peer cannot be reached or the connection dropped.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// Timeout waiting for a peer message.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The session was cancelled by the caller.
    #[error("sync session cancelled")]
    Cancelled,

    /// Message validation failed.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// The peer reported an error.
    #[error("peer error ({code:?}): {message}")]
    PeerError { code: SyncErrorCode, message: String },

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] basin_store::StoreError),

    /// Conflict resolution failed. Session-terminal: the same pair would
    /// fail again on retry.
    #[error(transparent)]
    Merge(#[from] basin_merge::MergeError),
}

impl SyncError {
    /// Whether a failed session may succeed if retried later.
    ///
    /// Transient connectivity failures are retryable; the session returns
    /// to idle with cursors at their last committed values and a later
    /// round resumes from there. Protocol mismatches and unresolvable
    /// conflicts are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::PeerUnreachable(_) | SyncError::Timeout(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SyncError::PeerUnreachable("gone".into()).is_retryable());
        assert!(SyncError::Timeout("hello".into()).is_retryable());
        assert!(!SyncError::ProtocolMismatch { local: 1, peer: 2 }.is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }
}
