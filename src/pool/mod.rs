//! Buffer Pool: amortized O(1) rent/return of zeroed byte buffers.
//!
//! Buffers are grouped into power-of-two size classes
//! (`common::config::POOL_SIZE_CLASSES`) and each class keeps its own
//! free list; `rent`/`return_buffer` are a class-bucketed free-list
//! push/pop. There is no disk-backed eviction machinery — this store has
//! no backing disk to page in from or evict to.

mod stats;

pub use stats::{PoolStats, PoolStatsSnapshot};

use parking_lot::Mutex;
use std::collections::HashMap;

use crate::common::config::POOL_SIZE_CLASSES;

/// A size-class pool of raw byte buffers.
///
/// # Thread Safety
/// `free_lists` is a `Mutex<HashMap<..>>` — concurrent rent/return from
/// multiple threads is safe, but buffers themselves carry no synchronization;
/// callers own exclusive access to a rented buffer until they return it.
pub struct BufferPool {
    free_lists: Mutex<HashMap<usize, Vec<Vec<u8>>>>,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            free_lists: Mutex::new(HashMap::new()),
            stats: PoolStats::new(),
        }
    }

    /// Round `min_bytes` up to the smallest size class that fits it, or
    /// `min_bytes` itself if it exceeds every class (never pooled).
    fn class_for(min_bytes: usize) -> usize {
        POOL_SIZE_CLASSES
            .iter()
            .copied()
            .find(|&c| c >= min_bytes)
            .unwrap_or(min_bytes)
    }

    /// Rent a zeroed buffer of length >= `min_bytes`.
    pub fn rent(&self, min_bytes: usize) -> Vec<u8> {
        let class = Self::class_for(min_bytes);
        let mut lists = self.free_lists.lock();
        let list = lists.entry(class).or_default();
        if let Some(mut buf) = list.pop() {
            buf.iter_mut().for_each(|b| *b = 0);
            self.stats.rent_hits.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            buf
        } else {
            self.stats.rent_misses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            log::trace!("pool: growing size class {class} (free list empty)");
            vec![0u8; class]
        }
    }

    /// Return a buffer to its size class's free list for reuse.
    ///
    /// Buffers whose length doesn't match a known class (can only happen
    /// for an over-max-class one-off allocation) are simply dropped.
    pub fn return_buffer(&self, buf: Vec<u8>) {
        self.stats.returns.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let len = buf.len();
        if POOL_SIZE_CLASSES.contains(&len) {
            self.free_lists.lock().entry(len).or_default().push(buf);
        }
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of buffers currently sitting idle in a given size class.
    /// Used by tests asserting the steady-state bound (P5).
    pub fn idle_count(&self, class: usize) -> usize {
        self.free_lists
            .lock()
            .get(&class)
            .map(|v| v.len())
            .unwrap_or(0)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rent_rounds_up_to_class() {
        let pool = BufferPool::new();
        let buf = pool.rent(10);
        assert_eq!(buf.len(), 32);
    }

    #[test]
    fn test_rent_is_zeroed() {
        let pool = BufferPool::new();
        let mut buf = pool.rent(32);
        buf[0] = 0xFF;
        pool.return_buffer(buf);

        let buf2 = pool.rent(32);
        assert_eq!(buf2[0], 0);
    }

    #[test]
    fn test_steady_state_bounded_buffer_count() {
        let pool = BufferPool::new();
        // Simulate 1000 rent/return cycles of similar size.
        for _ in 0..1000 {
            let buf = pool.rent(100);
            pool.return_buffer(buf);
        }
        // Only one buffer should ever be live for this class.
        assert!(pool.idle_count(128) <= 1);
    }

    #[test]
    fn test_growth_shrink_churn_plateaus() {
        let pool = BufferPool::new();
        let sizes = [50, 200, 50, 200, 1000, 50];
        for _ in 0..200 {
            for &s in &sizes {
                let buf = pool.rent(s);
                pool.return_buffer(buf);
            }
        }
        // At most one idle buffer per distinct class touched.
        for class in [64, 256, 1024] {
            assert!(pool.idle_count(class) <= 1);
        }
    }

    #[test]
    fn test_oversize_request_not_pooled_but_served() {
        let pool = BufferPool::new();
        let huge = pool.rent(1_000_000);
        assert!(huge.len() >= 1_000_000);
        pool.return_buffer(huge);
        assert_eq!(pool.idle_count(1_000_000), 0);
    }
}
