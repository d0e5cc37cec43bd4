//! Stream health counters.
//!
//! All increments use `Ordering::Relaxed`: the counters are monotonic
//! statistics and synchronize with nothing else.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter values captured by [`StreamCounters::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSnapshot {
    /// Records published to the sink.
    pub records: u64,
    /// Losses of frame synchronization.
    pub resyncs: u64,
    /// Bodies abandoned part way.
    pub truncated: u64,
    /// Records dropped because their wire id is not configured.
    pub unmapped: u64,
    pub commits: u64,
    /// Bytes read from the transport.
    pub bytes: u64,
}

/// Lock-free counters for one device stream.
#[derive(Debug, Default)]
pub struct StreamCounters {
    records: AtomicU64,
    resyncs: AtomicU64,
    truncated: AtomicU64,
    unmapped: AtomicU64,
    commits: AtomicU64,
    bytes: AtomicU64,
}

impl StreamCounters {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            records: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
            unmapped: AtomicU64::new(0),
            commits: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn add_records(&self, n: u64) {
        self.records.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_resyncs(&self, n: u64) {
        self.resyncs.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_truncated(&self) {
        self.truncated.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_unmapped(&self, n: u64) {
        self.unmapped.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_commits(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StreamSnapshot {
        StreamSnapshot {
            records: self.records.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            unmapped: self.unmapped.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }

    /// Read and zero every counter.
    ///
    /// Each counter is swapped individually; increments racing with the call
    /// land in either this snapshot or the next, never in neither.
    #[must_use]
    pub fn snapshot_and_reset(&self) -> StreamSnapshot {
        StreamSnapshot {
            records: self.records.swap(0, Ordering::Relaxed),
            resyncs: self.resyncs.swap(0, Ordering::Relaxed),
            truncated: self.truncated.swap(0, Ordering::Relaxed),
            unmapped: self.unmapped.swap(0, Ordering::Relaxed),
            commits: self.commits.swap(0, Ordering::Relaxed),
            bytes: self.bytes.swap(0, Ordering::Relaxed),
        }
    }
}
