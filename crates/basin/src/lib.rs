//! # Basin
//!
//! A local-first synchronizing key-value store. Every device holds a full
//! replica, reads and writes locally with no network on the path, and
//! converges with its peers through pairwise log exchange.
//!
//! ## Quick start
//!
//! ```no_run
//! use basin::{Config, Database};
//! use basin_core::ReplicaId;
//! use basin_store::SqliteStore;
//!
//! # async fn example() -> basin::Result<()> {
//! let store = SqliteStore::open("basin.db")?;
//! let db = Database::new(ReplicaId::random(), store, Config::default());
//!
//! let todos = db.open_collection("todos").await?;
//! todos.put("groceries", "milk, eggs").await?;
//! let (value, _version) = todos.get("groceries").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Convergence model
//!
//! Writes are versioned with per-replica vector clocks. Syncing exchanges
//! replication-log entries; causally ordered updates apply directly, and
//! concurrent updates are resolved by the collection's merge policy
//! (last-writer-wins by default). Two replicas that exchange all entries
//! hold identical contents, regardless of exchange order.

pub mod batch;
pub mod config;
pub mod database;
pub mod error;
pub mod scan;
pub mod watch;

pub use batch::WriteBatch;
pub use config::Config;
pub use database::{Collection, Database, SessionId};
pub use error::{DbError, ErrorKind, Result};
pub use scan::Scan;
pub use watch::{ChangeKind, WatchChange};

// The commonly needed pieces of the lower layers.
pub use basin_core::{CollectionId, Key, ReplicaId, VersionVector};
pub use basin_merge::{LastWriterWins, MergePolicy};
pub use basin_store::{KeyRange, MemoryStore, SqliteStore, Store};
pub use basin_sync::{FramedTransport, SyncConfig, SyncReport, Transport};
