//! Conflict resolution for basin.
//!
//! When two replicas mutate the same record concurrently (version vectors
//! compare as `Concurrent`), the winner is decided by a [`MergePolicy`].
//! The default policy is last-writer-wins; callers can register their own
//! policy per collection through the [`PolicyRegistry`].
//!
//! Whatever the policy, the merged record's version vector must dominate
//! both inputs. [`resolve_checked`] enforces that, so a resolved conflict
//! can never be detected as a conflict again.

pub mod error;
pub mod policy;
pub mod registry;

pub use error::{MergeError, Result};
pub use policy::{resolve_checked, LastWriterWins, MergePolicy};
pub use registry::PolicyRegistry;
