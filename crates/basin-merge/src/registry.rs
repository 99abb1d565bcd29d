//! Per-collection policy registration.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use basin_core::CollectionId;

use crate::policy::{LastWriterWins, MergePolicy};

/// Maps collections to their resolution policy.
///
/// Collections without an explicit policy use last-writer-wins. Policies
/// are shared `Arc<dyn MergePolicy>` values, so a registered policy stays
/// valid for sessions already holding it.
pub struct PolicyRegistry {
    policies: RwLock<HashMap<CollectionId, Arc<dyn MergePolicy>>>,
    default: Arc<dyn MergePolicy>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            policies: RwLock::new(HashMap::new()),
            default: Arc::new(LastWriterWins),
        }
    }

    /// Register a policy for a collection, replacing any previous one.
    pub fn set(&self, collection: CollectionId, policy: Arc<dyn MergePolicy>) {
        let mut policies = self
            .policies
            .write()
            .unwrap_or_else(|e| e.into_inner());
        policies.insert(collection, policy);
    }

    /// Remove a collection's policy, reverting it to the default.
    pub fn clear(&self, collection: &CollectionId) {
        let mut policies = self
            .policies
            .write()
            .unwrap_or_else(|e| e.into_inner());
        policies.remove(collection);
    }

    /// The policy in effect for a collection.
    pub fn get(&self, collection: &CollectionId) -> Arc<dyn MergePolicy> {
        let policies = self
            .policies
            .read()
            .unwrap_or_else(|e| e.into_inner());
        policies
            .get(collection)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
