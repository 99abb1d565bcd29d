//! # Basin Core
//!
//! Pure primitives for basin: replica identities, version vectors, records,
//! and replication log entries.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the data model of a convergent key-value store.
//!
//! ## Key Types
//!
//! - [`ReplicaId`] - Stable identity of a device-local replica
//! - [`VersionVector`] - Per-replica counters determining causal order
//! - [`Record`] - A key-value row with version metadata and tombstone flag
//! - [`LogEntry`] - Immutable description of a single mutation
//!
//! ## Causality
//!
//! Two writes are ordered by comparing their version vectors under the
//! standard partial order; see [`Causality`] and [`VersionVector::compare`].

pub mod entry;
pub mod error;
pub mod record;
pub mod time;
pub mod types;
pub mod validation;
pub mod version;

pub use entry::LogEntry;
pub use error::CoreError;
pub use record::Record;
pub use time::now_millis;
pub use types::{CollectionId, Key, ReplicaId};
pub use validation::{validate_collection_name, validate_key, MAX_COLLECTION_NAME_LEN, MAX_KEY_LEN};
pub use version::{Causality, VersionVector};
