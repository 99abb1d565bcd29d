//! Database configuration.

use std::time::Duration;

use basin_sync::SyncConfig;

/// Configuration for a [`Database`](crate::Database).
#[derive(Debug, Clone)]
pub struct Config {
    /// Reject writes once live data exceeds this many bytes.
    /// `None` disables the gate (backends may still report their own
    /// storage-full conditions).
    pub capacity_bytes: Option<u64>,
    /// Sync session behavior.
    pub sync: SyncConfig,
    /// Buffered events per watch subscriber; slow subscribers that fall
    /// further behind observe a lag error and miss events.
    pub watch_buffer: usize,
    /// Delay before retrying a sync session that failed retryably.
    pub sync_retry_backoff: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity_bytes: None,
            sync: SyncConfig::default(),
            watch_buffer: 256,
            sync_retry_backoff: Duration::from_secs(1),
        }
    }
}
