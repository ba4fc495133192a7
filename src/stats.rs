//! Allocation statistics, aggregated across all pools plus large allocations.

use crate::group::SmallMempoolGroup;
use crate::slab_cache::SlabCache;

/// Per-pool statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MempoolStats {
    /// Object size this pool serves.
    pub objsize: u32,
    /// Bytes actually occupied by live objects.
    pub used: usize,
    /// Bytes reserved for this pool (live + free slots across its slabs).
    pub total: usize,
}

/// Allocator-wide statistics snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocStats {
    /// Bytes occupied by live objects across every pool and large allocation.
    pub used: usize,
    /// Bytes reserved (including free slots) across every pool and large
    /// allocation.
    pub total: usize,
}

/// Iterates a [`SmallMempoolGroup`]'s pools in class order, mirroring
/// `mempool_iterator_next`.
pub struct MempoolIterator<'a> {
    pools: &'a SmallMempoolGroup,
    next: usize,
}

impl<'a> MempoolIterator<'a> {
    pub fn new(pools: &'a SmallMempoolGroup) -> Self {
        Self { pools, next: 0 }
    }
}

impl<'a> Iterator for MempoolIterator<'a> {
    type Item = &'a crate::mempool::Mempool;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.pools.len() {
            return None;
        }
        let pool = self.pools.pool(self.next);
        self.next += 1;
        Some(pool)
    }
}

/// Compute per-pool stats for `pool` given the cache it draws slabs from.
pub fn mempool_stats(pool: &crate::mempool::Mempool, cache: &SlabCache) -> MempoolStats {
    let used = pool.used() * pool.objsize() as usize;
    let total = pool.total(cache) * pool.objsize() as usize;
    MempoolStats {
        objsize: pool.objsize(),
        used,
        total,
    }
}

/// Aggregate stats across every pool, invoking `cb` with each pool's
/// individual stats; stops early if `cb` returns `true`.
pub fn small_stats(
    pools: &SmallMempoolGroup,
    cache: &SlabCache,
    large_used: usize,
    large_total: usize,
    mut cb: impl FnMut(MempoolStats) -> bool,
) -> AllocStats {
    let mut totals = AllocStats {
        used: large_used,
        total: large_total,
    };
    for pool in MempoolIterator::new(pools) {
        let stats = mempool_stats(pool, cache);
        totals.used += stats.used;
        totals.total += stats.total;
        if cb(stats) {
            break;
        }
    }
    totals
}
