//! The MergePolicy trait and the default last-writer-wins policy.

use basin_core::Record;
use tracing::debug;

use crate::error::{MergeError, Result};

/// A conflict resolution policy.
///
/// Invoked only for concurrent record pairs: both sides of a sync call
/// the policy with the same pair, so a policy must be deterministic and
/// symmetric (`merge(a, b)` and `merge(b, a)` pick the same winner) for
/// the replicas to converge.
///
/// The returned record's version vector must dominate both inputs; use
/// [`resolve_checked`] to enforce that at the call site.
pub trait MergePolicy: Send + Sync {
    /// Resolve a concurrent pair into a single record.
    fn merge(&self, local: &Record, remote: &Record) -> Result<Record>;

    /// Short policy name, for logging.
    fn name(&self) -> &'static str {
        "custom"
    }
}

/// Last-writer-wins: the record with the higher wall-clock timestamp
/// wins; equal timestamps break on the origin replica id. The merged
/// record carries the join of both version vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriterWins;

impl MergePolicy for LastWriterWins {
    fn merge(&self, local: &Record, remote: &Record) -> Result<Record> {
        let mut winner = if local.wins_over(remote) {
            local.clone()
        } else {
            remote.clone()
        };
        winner.version = local.version.join(&remote.version);
        Ok(winner)
    }

    fn name(&self) -> &'static str {
        "last-writer-wins"
    }
}

/// Run a policy and enforce the dominance postcondition.
///
/// The merged record must keep the conflicting key and its version vector
/// must dominate (or equal the join of) both inputs. A policy that
/// violates either, or fails outright, yields `ConflictUnresolved`.
pub fn resolve_checked(
    policy: &dyn MergePolicy,
    local: &Record,
    remote: &Record,
) -> Result<Record> {
    let merged = policy.merge(local, remote)?;

    if merged.key != local.key {
        return Err(MergeError::ConflictUnresolved {
            key: format!("{:?}", local.key),
            reason: format!("policy {} changed the record key", policy.name()),
        });
    }

    if !merged.version.dominates_or_equals(&local.version)
        || !merged.version.dominates_or_equals(&remote.version)
    {
        return Err(MergeError::ConflictUnresolved {
            key: format!("{:?}", local.key),
            reason: format!(
                "policy {} produced a version that does not dominate both inputs",
                policy.name()
            ),
        });
    }

    debug!(
        policy = policy.name(),
        key = ?merged.key,
        tombstone = merged.tombstone,
        "conflict resolved"
    );
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use basin_core::{Key, ReplicaId, VersionVector};

    fn rid(b: u8) -> ReplicaId {
        ReplicaId::from_bytes([b; 16])
    }

    fn key() -> Key {
        Key::from_str_key("k").unwrap()
    }

    fn vv(entries: &[(u8, u64)]) -> VersionVector {
        entries
            .iter()
            .map(|&(r, n)| (rid(r), n))
            .collect()
    }

    #[test]
    fn test_lww_later_timestamp_wins() {
        let local = Record::new(key(), "old", vv(&[(1, 1)]), 100, rid(1));
        let remote = Record::new(key(), "new", vv(&[(2, 1)]), 200, rid(2));

        let merged = resolve_checked(&LastWriterWins, &local, &remote).unwrap();
        assert_eq!(merged.value, "new");
        assert_eq!(merged.version, vv(&[(1, 1), (2, 1)]));
    }

    #[test]
    fn test_lww_is_symmetric() {
        let a = Record::new(key(), "a", vv(&[(1, 1)]), 100, rid(1));
        let b = Record::new(key(), "b", vv(&[(2, 1)]), 100, rid(2));

        let ab = resolve_checked(&LastWriterWins, &a, &b).unwrap();
        let ba = resolve_checked(&LastWriterWins, &b, &a).unwrap();
        assert_eq!(ab, ba);
        // Tie on timestamp: the larger origin id wins.
        assert_eq!(ab.value, "b");
    }

    #[test]
    fn test_merged_version_dominates_both_inputs() {
        let local = Record::new(key(), "a", vv(&[(1, 3)]), 100, rid(1));
        let remote = Record::new(key(), "b", vv(&[(2, 5)]), 200, rid(2));

        let merged = resolve_checked(&LastWriterWins, &local, &remote).unwrap();
        assert!(merged.version.dominates(&local.version));
        assert!(merged.version.dominates(&remote.version));
    }

    #[test]
    fn test_tombstone_can_win() {
        let live = Record::new(key(), "v", vv(&[(1, 1)]), 100, rid(1));
        let dead = Record::tombstone(key(), vv(&[(2, 1)]), 200, rid(2));

        let merged = resolve_checked(&LastWriterWins, &live, &dead).unwrap();
        assert!(merged.tombstone);
    }

    /// A policy that forgets to join version vectors.
    struct BrokenPolicy;

    impl MergePolicy for BrokenPolicy {
        fn merge(&self, local: &Record, _remote: &Record) -> Result<Record> {
            Ok(local.clone())
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[test]
    fn test_checked_rejects_non_dominating_result() {
        let local = Record::new(key(), "a", vv(&[(1, 1)]), 100, rid(1));
        let remote = Record::new(key(), "b", vv(&[(2, 1)]), 200, rid(2));

        let err = resolve_checked(&BrokenPolicy, &local, &remote).unwrap_err();
        assert!(matches!(err, MergeError::ConflictUnresolved { .. }));
    }

    /// Example custom policy: concatenate both values, keeping the pair
    /// deterministic by sorting on origin id.
    struct ValueConcat;

    impl MergePolicy for ValueConcat {
        fn merge(&self, local: &Record, remote: &Record) -> Result<Record> {
            let (first, second) = if local.origin <= remote.origin {
                (local, remote)
            } else {
                (remote, local)
            };
            let mut value = Vec::with_capacity(first.value.len() + second.value.len());
            value.extend_from_slice(&first.value);
            value.extend_from_slice(&second.value);

            let mut merged = if local.wins_over(remote) {
                local.clone()
            } else {
                remote.clone()
            };
            merged.value = value.into();
            merged.version = local.version.join(&remote.version);
            merged.tombstone = false;
            Ok(merged)
        }

        fn name(&self) -> &'static str {
            "value-concat"
        }
    }

    #[test]
    fn test_custom_policy_through_checked_path() {
        let a = Record::new(key(), "left", vv(&[(1, 1)]), 100, rid(1));
        let b = Record::new(key(), "right", vv(&[(2, 1)]), 200, rid(2));

        let ab = resolve_checked(&ValueConcat, &a, &b).unwrap();
        let ba = resolve_checked(&ValueConcat, &b, &a).unwrap();
        assert_eq!(ab.value, "leftright");
        assert_eq!(ab, ba);
    }
}
