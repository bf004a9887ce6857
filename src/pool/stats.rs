//! Buffer pool statistics tracking.
//!
//! Atomic counters for lock-free, thread-safe updates, plus a non-atomic
//! snapshot for display/logging/testing.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics tracked by the [`super::BufferPool`].
#[derive(Debug)]
pub struct PoolStats {
    /// Number of `rent()` calls satisfied from a size class's free list.
    pub rent_hits: AtomicU64,
    /// Number of `rent()` calls that had to allocate a fresh buffer.
    pub rent_misses: AtomicU64,
    /// Number of `return_buffer()` calls.
    pub returns: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self {
            rent_hits: AtomicU64::new(0),
            rent_misses: AtomicU64::new(0),
            returns: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            rent_hits: self.rent_hits.load(Ordering::Relaxed),
            rent_misses: self.rent_misses.load(Ordering::Relaxed),
            returns: self.returns.load(Ordering::Relaxed),
        }
    }
}

impl Default for PoolStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time, non-atomic copy of [`PoolStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    pub rent_hits: u64,
    pub rent_misses: u64,
    pub returns: u64,
}

impl fmt::Display for PoolStatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PoolStats {{ hits: {}, misses: {}, returns: {} }}",
            self.rent_hits, self.rent_misses, self.returns
        )
    }
}
