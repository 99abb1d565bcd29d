//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record at the requested key (or the record is tombstoned).
    #[error("not found: {0}")]
    NotFound(String),

    /// Key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Collection name failed validation.
    #[error("invalid collection name: {0}")]
    InvalidCollection(String),

    /// The collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// Durable space is exhausted.
    #[error("storage full: {0}")]
    StorageFull(String),

    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(rusqlite::Error),

    /// Serialization/deserialization error for stored blobs.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        // SQLITE_FULL is part of the error taxonomy, not an opaque failure.
        if let rusqlite::Error::SqliteFailure(e, ref msg) = err {
            if e.code == rusqlite::ErrorCode::DiskFull {
                return StoreError::StorageFull(
                    msg.clone().unwrap_or_else(|| "disk full".to_string()),
                );
            }
        }
        StoreError::Database(err)
    }
}

impl From<basin_core::CoreError> for StoreError {
    fn from(err: basin_core::CoreError) -> Self {
        match err {
            basin_core::CoreError::InvalidKey(msg) => StoreError::InvalidKey(msg),
            basin_core::CoreError::InvalidCollection(msg) => StoreError::InvalidCollection(msg),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
