//! Version vectors and causal ordering.
//!
//! A version vector maps each replica id to a monotonically increasing
//! counter. Comparing two vectors under the standard partial order
//! determines whether one write causally follows another or whether the
//! two are concurrent.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ReplicaId;

/// Outcome of comparing two version vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Causality {
    /// The vectors are identical.
    Equal,
    /// Self dominates other: self happened after other.
    Dominates,
    /// Other dominates self: self happened before other.
    Dominated,
    /// Neither dominates: the writes are concurrent (a conflict).
    Concurrent,
}

/// A version vector: replica id -> write counter.
///
/// The vector strictly advances at the owning replica's coordinate on
/// every local write. `A` dominates `B` iff `A[r] >= B[r]` for all
/// replicas `r`, with at least one strict inequality.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionVector(BTreeMap<ReplicaId, u64>);

impl VersionVector {
    /// Create an empty vector (causally before everything).
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// The counter for a replica; absent coordinates read as zero.
    pub fn get(&self, replica: &ReplicaId) -> u64 {
        self.0.get(replica).copied().unwrap_or(0)
    }

    /// Increment this replica's coordinate and return the new counter.
    pub fn bump(&mut self, replica: ReplicaId) -> u64 {
        let counter = self.0.entry(replica).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Set a coordinate explicitly. Refuses to move a counter backwards.
    pub fn observe(&mut self, replica: ReplicaId, counter: u64) {
        let entry = self.0.entry(replica).or_insert(0);
        if counter > *entry {
            *entry = counter;
        }
    }

    /// Coordinate-wise maximum of two vectors.
    ///
    /// The result dominates-or-equals both inputs, which is exactly the
    /// postcondition required of merged records.
    pub fn join(&self, other: &Self) -> Self {
        let mut out = self.0.clone();
        for (replica, &counter) in &other.0 {
            let entry = out.entry(*replica).or_insert(0);
            if counter > *entry {
                *entry = counter;
            }
        }
        Self(out)
    }

    /// Compare two vectors under the standard partial order.
    pub fn compare(&self, other: &Self) -> Causality {
        let mut self_ahead = false;
        let mut other_ahead = false;

        for (replica, &counter) in &self.0 {
            match counter.cmp(&other.get(replica)) {
                std::cmp::Ordering::Greater => self_ahead = true,
                std::cmp::Ordering::Less => other_ahead = true,
                std::cmp::Ordering::Equal => {}
            }
        }
        for (replica, &counter) in &other.0 {
            if counter > self.get(replica) {
                other_ahead = true;
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => Causality::Equal,
            (true, false) => Causality::Dominates,
            (false, true) => Causality::Dominated,
            (true, true) => Causality::Concurrent,
        }
    }

    /// Whether self dominates other (strictly).
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == Causality::Dominates
    }

    /// Whether self dominates or equals other.
    pub fn dominates_or_equals(&self, other: &Self) -> bool {
        matches!(self.compare(other), Causality::Dominates | Causality::Equal)
    }

    /// Number of replicas with a non-zero coordinate.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the vector has no coordinates.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over (replica, counter) pairs in replica order.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &u64)> {
        self.0.iter()
    }
}

impl FromIterator<(ReplicaId, u64)> for VersionVector {
    fn from_iter<I: IntoIterator<Item = (ReplicaId, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().filter(|(_, c)| *c > 0).collect())
    }
}

// Compact debug form: {aabbccdd:3, 11223344:1}
impl fmt::Debug for VersionVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (replica, counter)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", replica, counter)?;
        }
        write!(f, "}}")
    }
}
