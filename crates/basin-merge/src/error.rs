//! Error types for conflict resolution.

use thiserror::Error;

/// Result type for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors from conflict resolution.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The policy failed to produce a valid merged record. This is
    /// session-terminal: the conflicting pair stays unresolved and the
    /// sync session that hit it cannot complete.
    #[error("conflict unresolved for key {key}: {reason}")]
    ConflictUnresolved {
        /// Debug rendering of the conflicting key.
        key: String,
        /// Why resolution failed.
        reason: String,
    },
}
