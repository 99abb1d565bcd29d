//! Sync protocol engine for basin.
//!
//! Drives pairwise anti-entropy between replicas: a session handshakes,
//! exchanges replication-log entries from each side's persisted cursor,
//! reconciles them against local state (resolving concurrent pairs via
//! the registered merge policy), and acknowledges what it applied so the
//! peer can prune its log once entries are causally stable everywhere.
//!
//! Transports are connection-scoped and injected: an in-memory pair for
//! tests, or length-prefixed CBOR over any duplex byte stream.

pub mod convergence;
pub mod error;
pub mod framed;
pub mod messages;
pub mod protocol;
pub mod reconcile;
pub mod transport;

pub use convergence::{collection_state_hash, verify_convergence, StateHash};
pub use error::{Result, SyncError};
pub use framed::FramedTransport;
pub use messages::{CollectionCursor, SyncErrorCode, SyncMessage, PROTOCOL_VERSION};
pub use protocol::{SessionState, SyncConfig, SyncReport, SyncSession};
pub use reconcile::{apply_entry, Applied};
pub use transport::Transport;
