//! # Basin Store
//!
//! Persistence for basin: the [`Store`] trait, the per-collection
//! replication log, and the two shipped backends.
//!
//! ## Backends
//!
//! - [`SqliteStore`] - durable, crash-atomic storage on SQLite (primary)
//! - [`MemoryStore`] - same semantics, no persistence (tests and caches)
//!
//! ## Transaction boundary
//!
//! [`Store::commit_write`] persists a record mutation and appends the
//! matching replication log entry in a single transaction: both succeed
//! or both are rolled back. This is the invariant everything above the
//! store relies on for convergence.

pub mod error;
pub mod locks;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use locks::KeyLocks;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{KeyRange, PeerCursor, PeerState, Store};
