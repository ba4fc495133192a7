//! Top-level allocator: routes allocation requests to a pool or the large
//! path, and owns every other component.

use std::ptr::NonNull;

use crate::arena::SlabArena;
use crate::config::SmallAllocConfig;
use crate::gc::{FreeMode, GarbageCollector};
use crate::group::SmallMempoolGroup;
use crate::size_class::SizeClass;
use crate::slab_cache::SlabCache;
use crate::stats::{small_stats, AllocStats, MempoolStats};

/// A size-segregated small-object allocator over a quota-bounded slab
/// cache.
///
/// Not `Send`/`Sync`: every operation mutates shared free-list and
/// activation state with no internal locking (spec's non-goal: thread
/// safety is the caller's responsibility, same as Tarantool's `small`,
/// which assumes one allocator per thread/fiber).
pub struct SmallAllocator {
    size_class: SizeClass,
    pools: SmallMempoolGroup,
    cache: SlabCache,
    gc: GarbageCollector,
    large_bytes: usize,
}

impl SmallAllocator {
    /// Create an allocator from `config`. Panics if `config` is invalid
    /// (see [`SmallAllocConfig::validate`]).
    pub fn create(config: SmallAllocConfig) -> Self {
        config.validate();

        let objsize_min =
            crate::util::layout::align_up(config.objsize_min as usize, std::mem::size_of::<usize>())
                as u32;

        let arena = SlabArena::new(config.base_slab_size, config.quota);
        let cache = SlabCache::new(arena, config.order_max);
        let size_class = SizeClass::new(config.granularity, config.alloc_factor, objsize_min);
        let pools = SmallMempoolGroup::new(&size_class, &cache);

        #[cfg(feature = "log")]
        log::debug!(
            "small_alloc: created allocator, objsize_max={}, pools={}",
            pools.objsize_max(),
            pools.len()
        );

        Self {
            size_class,
            pools,
            cache,
            gc: GarbageCollector::new(),
            large_bytes: 0,
        }
    }

    /// The actual growth factor achieved by the size-class table, which
    /// may differ slightly from `config.alloc_factor`.
    pub fn actual_alloc_factor(&self) -> f32 {
        self.size_class.actual_factor()
    }

    /// Largest size served by a pool; above this, allocations use a
    /// dedicated large slab.
    pub fn objsize_max(&self) -> u32 {
        self.pools.objsize_max()
    }

    /// Allocate `size` bytes. Returns `None` only on quota/allocator
    /// exhaustion (the sole OOM signal in this crate).
    pub fn smalloc(&mut self, size: usize) -> Option<NonNull<u8>> {
        self.gc
            .collect_garbage(&mut self.pools, &mut self.cache, |freed| {
                self.large_bytes -= freed;
            });

        let size_u32 = size.min(u32::MAX as usize) as u32;
        match self.pools.search(&self.size_class, size_u32) {
            Some(cls) => self.pools.pool_mut(cls).alloc(&mut self.cache),
            None => {
                let base = self.cache.alloc_large(size)?;
                // SAFETY: base was just created by alloc_large.
                let header_size = unsafe { crate::slab_cache::SlabCache::header(base).size };
                self.large_bytes += header_size;
                Some(crate::slab_cache::SlabCache::data_ptr(base))
            }
        }
    }

    /// Free memory previously returned by [`SmallAllocator::smalloc`].
    /// `size` must be the same size originally requested.
    pub fn smfree(&mut self, ptr: NonNull<u8>, size: usize) {
        let size_u32 = size.min(u32::MAX as usize) as u32;
        match self.pools.nominal_class(&self.size_class, size_u32) {
            Some(cls) => self.free_regular(cls, ptr),
            None => self.free_large(ptr),
        }
    }

    /// Free memory, deferring to the delayed-free worklist instead if
    /// [`crate::gc::FreeMode::DelayedFree`] is active.
    pub fn smfree_delayed(&mut self, ptr: NonNull<u8>, size: usize) {
        if self.gc.mode() != FreeMode::DelayedFree {
            self.smfree(ptr, size);
            return;
        }
        let size_u32 = size.min(u32::MAX as usize) as u32;
        match self.pools.nominal_class(&self.size_class, size_u32) {
            Some(cls) => {
                let pool = self.pools.pool_mut(cls);
                // NOTE: delayed objects are logically still "used" until
                // actually drained, so `used` is decremented lazily when GC
                // resolves the real owner and frees it there, not here.
                let first = pool.push_delayed(ptr);
                if first {
                    self.gc.register_pool(pool.id());
                }
            }
            None => {
                // SAFETY: ptr is a live large allocation's data pointer.
                unsafe { self.gc.push_large(ptr) };
            }
        }
    }

    /// Enable or disable delayed-free mode (spec's `set_delayed_free`).
    pub fn set_delayed_free_mode(&mut self, enabled: bool) {
        self.gc.set_delayed_free_mode(enabled);
    }

    /// Current delayed-free / GC mode.
    pub fn free_mode(&self) -> FreeMode {
        self.gc.mode()
    }

    fn free_regular(&mut self, cls: usize, ptr: NonNull<u8>) {
        // The class an object was allocated through may differ from its
        // nominal class if the group had redirected at alloc time; the
        // slab's own header records which pool actually owns it.
        let order = self.pools.pool(cls).slab_order();
        let mask = self.cache.ptr_mask(order);
        let slab = crate::slab_cache::SlabCache::slab_from_ptr(ptr, mask);
        // SAFETY: slab is a live regular slab mapped by this cache.
        let owner = unsafe { crate::slab_cache::SlabCache::header(slab) }
            .mempool
            .expect("regular slab must carry an owning pool id");
        self.pools.reconcile_free(cls, owner as usize);
        // SAFETY: ptr was allocated from `owner`'s pool and not yet freed.
        unsafe {
            self.pools
                .pool_mut(owner as usize)
                .free(ptr, &mut self.cache)
        };
    }

    fn free_large(&mut self, ptr: NonNull<u8>) {
        let base = self.cache.slab_from_data(ptr);
        // SAFETY: base is a live large slab mapped by this cache.
        let size = unsafe { crate::slab_cache::SlabCache::header(base).size };
        self.large_bytes -= size;
        // SAFETY: base came from a live large allocation, not yet released.
        unsafe { self.cache.put_large(base) };
    }

    /// Snapshot allocation statistics across every pool and large
    /// allocation.
    pub fn stats(&self) -> AllocStats {
        self.stats_with(|_| false)
    }

    /// Snapshot statistics, visiting each pool's stats via `cb` (stopping
    /// early if `cb` returns `true`) — mirrors `small_stats`'s callback.
    pub fn stats_with(&self, mut cb: impl FnMut(MempoolStats) -> bool) -> AllocStats {
        small_stats(
            &self.pools,
            &self.cache,
            self.large_bytes,
            self.large_bytes,
            &mut cb,
        )
    }
}

impl Drop for SmallAllocator {
    fn drop(&mut self) {
        self.gc.clear(&mut self.cache);
        for pool in self.pools.iter_mut() {
            pool.destroy(&mut self.cache);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smalloc_and_smfree_round_trip() {
        let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
        let ptr = alloc.smalloc(40).unwrap();
        alloc.smfree(ptr, 40);
    }

    #[test]
    fn large_allocation_round_trips() {
        let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
        let big = alloc.objsize_max() as usize + 1024;
        let ptr = alloc.smalloc(big).unwrap();
        let stats = alloc.stats();
        assert!(stats.used >= big);
        alloc.smfree(ptr, big);
    }

    #[test]
    fn delayed_free_then_gc_drains() {
        let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
        alloc.set_delayed_free_mode(true);
        let mut ptrs = Vec::new();
        for _ in 0..50 {
            ptrs.push(alloc.smalloc(24).unwrap());
        }
        for p in ptrs {
            alloc.smfree_delayed(p, 24);
        }
        alloc.set_delayed_free_mode(false);
        assert_eq!(alloc.free_mode(), FreeMode::CollectGarbage);
        // Drive enough alloc/free churn for GC batches to fully drain.
        for _ in 0..10 {
            let p = alloc.smalloc(24).unwrap();
            alloc.smfree(p, 24);
        }
        assert_eq!(alloc.free_mode(), FreeMode::Free);
    }

    #[test]
    fn many_small_allocations_are_distinct() {
        let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
        let mut seen = std::collections::HashSet::new();
        for _ in 0..2000 {
            let p = alloc.smalloc(16).unwrap();
            assert!(seen.insert(p));
        }
    }
}
