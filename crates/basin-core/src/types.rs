//! Strong type definitions for basin.
//!
//! All identifiers are newtypes to prevent misuse at compile time.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;
use crate::validation::{validate_collection_name, validate_key};

/// A 16-byte replica identifier.
///
/// Identifies a device-local instance of the store. Replica ids are stable
/// for the lifetime of a replica and index the coordinates of every
/// version vector. The `Ord` impl gives the deterministic tie-break used
/// by last-writer-wins resolution.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplicaId(pub [u8; 16]);

impl ReplicaId {
    /// Create a new ReplicaId from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Generate a random replica ID.
    pub fn random() -> Self {
        use rand::Rng;
        Self(rand::thread_rng().gen())
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 16 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 16];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// The zero replica ID (used as a sentinel in tests).
    pub const ZERO: Self = Self([0u8; 16]);
}

impl fmt::Debug for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReplicaId({})", &self.to_hex()[..8])
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..8])
    }
}

impl AsRef<[u8]> for ReplicaId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 16]> for ReplicaId {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

/// An opaque record key: a byte sequence, unique within a collection.
///
/// Keys order records within a collection; scans iterate in key order.
/// Construction validates the key (non-empty, bounded length).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Key(Bytes);

impl Key {
    /// Create a key from bytes, validating length bounds.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self, CoreError> {
        let bytes = bytes.into();
        validate_key(&bytes)?;
        Ok(Self(bytes))
    }

    /// Create a key from a UTF-8 string, validating length bounds.
    pub fn from_str_key(s: &str) -> Result<Self, CoreError> {
        Self::new(Bytes::copy_from_slice(s.as_bytes()))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty (never true for a validated key).
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Key({:?})", s),
            Err(_) => write!(f, "Key(0x{})", hex::encode(&self.0)),
        }
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A validated collection name.
///
/// Collections are named, ordered sets of records, created and destroyed
/// explicitly by the client. Names are ASCII alphanumeric plus `-` and `_`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionId(String);

impl CollectionId {
    /// Create a collection id, validating the name.
    pub fn new(name: impl Into<String>) -> Result<Self, CoreError> {
        let name = name.into();
        validate_collection_name(&name)?;
        Ok(Self(name))
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionId({})", self.0)
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CollectionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
