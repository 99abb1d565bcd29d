//! Validation rules for keys and collection names.

use crate::error::CoreError;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 1024;

/// Maximum collection name length in bytes.
pub const MAX_COLLECTION_NAME_LEN: usize = 64;

/// Validate a record key: non-empty and bounded.
pub fn validate_key(key: &[u8]) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::InvalidKey("key is empty".into()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(CoreError::InvalidKey(format!(
            "key length {} exceeds maximum {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    Ok(())
}

/// Validate a collection name: non-empty, bounded, ASCII alphanumeric
/// plus `-` and `_`, starting with an alphanumeric character.
pub fn validate_collection_name(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::InvalidCollection("name is empty".into()));
    }
    if name.len() > MAX_COLLECTION_NAME_LEN {
        return Err(CoreError::InvalidCollection(format!(
            "name length {} exceeds maximum {}",
            name.len(),
            MAX_COLLECTION_NAME_LEN
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap_or('_');
    if !first.is_ascii_alphanumeric() {
        return Err(CoreError::InvalidCollection(format!(
            "name must start with an alphanumeric character: {:?}",
            name
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(CoreError::InvalidCollection(format!(
            "name contains invalid characters: {:?}",
            name
        )));
    }
    Ok(())
}
