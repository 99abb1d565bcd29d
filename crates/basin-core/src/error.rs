//! Error types for core primitives.

use thiserror::Error;

/// Errors produced by core validation and construction.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Collection name failed validation.
    #[error("invalid collection name: {0}")]
    InvalidCollection(String),
}
