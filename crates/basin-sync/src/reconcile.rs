//! Applying remote log entries to local state.
//!
//! Application is idempotent and order-tolerant within causality: the
//! version-vector comparison decides whether a remote entry is news,
//! already-known history, or a genuine concurrent conflict.

use basin_core::{Causality, LogEntry};
use basin_merge::{resolve_checked, PolicyRegistry};
use basin_store::{KeyLocks, Store};
use tracing::{debug, trace};

use crate::error::Result;

/// Outcome of applying one remote entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// The remote record replaced local state.
    Applied,
    /// A concurrent pair was resolved and the merged record committed.
    Merged,
    /// The entry was already known (or superseded); nothing changed.
    Stale,
}

/// Apply one remote log entry to the local store.
///
/// Takes the per-key write lock, compares the remote version against the
/// local record, and commits the outcome. Every commit re-enters the
/// local replication log, so applied remote mutations propagate to third
/// replicas on their next sync.
pub async fn apply_entry<S: Store + ?Sized>(
    store: &S,
    locks: &KeyLocks,
    policies: &PolicyRegistry,
    entry: &LogEntry,
) -> Result<Applied> {
    let _guard = locks.lock(&entry.collection, &entry.key).await;

    let local = store.get_record(&entry.collection, &entry.key).await?;

    let outcome = match local {
        None => {
            store.commit_write(&entry.collection, &entry.to_record()).await?;
            Applied::Applied
        }
        Some(local) => match entry.version.compare(&local.version) {
            Causality::Equal | Causality::Dominated => {
                trace!(
                    collection = %entry.collection,
                    key = ?entry.key,
                    "remote entry already covered by local state"
                );
                Applied::Stale
            }
            Causality::Dominates => {
                store.commit_write(&entry.collection, &entry.to_record()).await?;
                Applied::Applied
            }
            Causality::Concurrent => {
                let remote = entry.to_record();
                let policy = policies.get(&entry.collection);
                let merged = resolve_checked(policy.as_ref(), &local, &remote)?;

                store.commit_write(&entry.collection, &merged).await?;
                debug!(
                    collection = %entry.collection,
                    key = ?entry.key,
                    "concurrent update merged"
                );
                Applied::Merged
            }
        },
    };

    Ok(outcome)
}
