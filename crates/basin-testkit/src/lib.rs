//! # Basin Testkit
//!
//! Testing utilities for basin.
//!
//! - **Fixtures**: replicas with deterministic identities over memory
//!   stores, plus helpers to sync them pairwise.
//! - **Generators**: proptest strategies for keys, values, version
//!   vectors, and write workloads.
//! - **Scenarios**: multi-replica convergence setups shared by
//!   integration tests.

pub mod fixtures;
pub mod generators;
pub mod scenarios;

pub use fixtures::{multi_replica_fixtures, sync_round, ReplicaFixture};
pub use scenarios::{
    apply_workload, assert_converged, concurrent_write_pair, converge_all, visible_state,
};
