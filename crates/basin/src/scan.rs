//! Snapshot scans.

use basin_core::{Key, Record};
use basin_store::KeyRange;

/// An in-order iterator over the live records of a collection.
///
/// The result set is fixed when the scan is created: concurrent writes
/// do not appear mid-iteration. Tombstones are filtered out.
///
/// A scan abandoned partway can be restarted without re-reading history:
/// [`Scan::resume_range`] yields the range strictly after the last key
/// consumed, for a fresh `scan` call.
pub struct Scan {
    inner: std::vec::IntoIter<Record>,
    last_key: Option<Key>,
}

impl Scan {
    pub(crate) fn new(records: Vec<Record>) -> Self {
        Self {
            inner: records
                .into_iter()
                .filter(|r| !r.tombstone)
                .collect::<Vec<_>>()
                .into_iter(),
            last_key: None,
        }
    }

    /// Number of records not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }

    /// The range to continue from, strictly after the last consumed key.
    /// `None` if nothing has been consumed yet.
    pub fn resume_range(&self) -> Option<KeyRange> {
        self.last_key.clone().map(KeyRange::after)
    }
}

impl Iterator for Scan {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        let record = self.inner.next()?;
        self.last_key = Some(record.key.clone());
        Some(record)
    }
}
