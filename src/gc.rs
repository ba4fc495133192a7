//! Delayed-free / garbage-collection state machine.
//!
//! Three modes, entered in this order and never skipped:
//!
//! - [`FreeMode::Free`]: `smfree_delayed` behaves like an immediate free.
//! - [`FreeMode::DelayedFree`]: `smfree_delayed` pushes onto a worklist
//!   instead of freeing (used while a snapshot/iterator holds pointers
//!   into the allocator and frees would invalidate them).
//! - [`FreeMode::CollectGarbage`]: each subsequent `smalloc`/`smfree` call
//!   also drains a bounded batch of the worklist, until it is empty, at
//!   which point the allocator reverts to `Free`.
//!
//! The worklists are intrusive LIFOs: large allocations are threaded
//! through their own first machine word directly; regular allocations
//! are threaded per-pool (each [`crate::mempool::Mempool`] keeps its own
//! delayed list), with a LIFO of *pool ids* recording which pools have
//! pending work, mirroring `small.c`'s `alloc->delayed` list of
//! `struct mempool *`.

use std::ptr::NonNull;

use crate::diagnostics::trace;
use crate::group::SmallMempoolGroup;
use crate::slab_cache::{MempoolId, SlabCache};

/// How `smfree_delayed` and periodic GC driving behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeMode {
    /// Free immediately.
    Free,
    /// Defer frees onto the delayed worklists.
    DelayedFree,
    /// Draining the delayed worklists, one batch per call.
    CollectGarbage,
}

/// Number of items drained from the delayed worklists per `smalloc`/`smfree`
/// call while in [`FreeMode::CollectGarbage`].
pub const GC_BATCH: usize = 100;

/// Delayed-free state shared by [`crate::allocator::SmallAllocator`].
pub struct GarbageCollector {
    mode: FreeMode,
    /// Large (non-pooled) allocations pending free, threaded through their
    /// own first word.
    delayed_large: Option<NonNull<u8>>,
    /// Ids of pools with at least one delayed entry, most-recently-added
    /// last (a LIFO, matching `small.c`).
    delayed_pools: Vec<MempoolId>,
}

unsafe fn read_link(ptr: NonNull<u8>) -> Option<NonNull<u8>> {
    let raw = ptr.as_ptr().cast::<usize>().read();
    NonNull::new(raw as *mut u8)
}

unsafe fn write_link(ptr: NonNull<u8>, next: Option<NonNull<u8>>) {
    let raw = next.map_or(0usize, |p| p.as_ptr() as usize);
    ptr.as_ptr().cast::<usize>().write(raw);
}

impl GarbageCollector {
    pub fn new() -> Self {
        Self {
            mode: FreeMode::Free,
            delayed_large: None,
            delayed_pools: Vec::new(),
        }
    }

    pub fn mode(&self) -> FreeMode {
        self.mode
    }

    /// Enable or disable delayed-free mode. Matches `small_alloc_setopt`:
    /// enabling always moves to `DelayedFree`; disabling moves to
    /// `CollectGarbage` so any already-deferred frees still get flushed.
    pub fn set_delayed_free_mode(&mut self, enabled: bool) {
        self.mode = if enabled {
            FreeMode::DelayedFree
        } else {
            FreeMode::CollectGarbage
        };
        trace!("small_alloc: free mode -> {:?}", self.mode);
    }

    /// Defer a large allocation's free.
    ///
    /// # Safety
    /// `ptr` must be a live large-allocation data pointer with at least
    /// `size_of::<usize>()` bytes available to store a link.
    pub unsafe fn push_large(&mut self, ptr: NonNull<u8>) {
        write_link(ptr, self.delayed_large);
        self.delayed_large = Some(ptr);
    }

    /// Register a pool on the worklist (called once per pool, the first
    /// time it gets a delayed entry — see [`crate::mempool::Mempool::push_delayed`]).
    pub(crate) fn register_pool(&mut self, pool_id: MempoolId) {
        self.delayed_pools.push(pool_id);
    }

    /// Run one step of garbage collection if in [`FreeMode::CollectGarbage`].
    /// No-op otherwise. Call this at the top of every `smalloc`/`smfree`.
    /// `on_large_free` is invoked with each large allocation's header size
    /// right before it is released, so the caller can keep its stats
    /// counters in sync.
    pub fn collect_garbage(
        &mut self,
        pools: &mut SmallMempoolGroup,
        cache: &mut SlabCache,
        mut on_large_free: impl FnMut(usize),
    ) {
        if self.mode != FreeMode::CollectGarbage {
            return;
        }

        if self.delayed_large.is_some() {
            for _ in 0..GC_BATCH {
                let Some(item) = self.delayed_large else {
                    break;
                };
                // SAFETY: item was pushed by push_large from a live large allocation.
                self.delayed_large = unsafe { read_link(item) };
                let base = cache.slab_from_data(item);
                // SAFETY: base came from slab_from_data on a large allocation's data ptr.
                let size = unsafe { SlabCache::header(base).size };
                on_large_free(size);
                unsafe { cache.put_large(base) };
            }
            return;
        }

        if self.delayed_pools.is_empty() {
            self.mode = FreeMode::Free;
            trace!("small_alloc: free mode -> {:?}", self.mode);
            return;
        }

        for _ in 0..GC_BATCH {
            let Some(&pool_id) = self.delayed_pools.last() else {
                break;
            };
            let cls = pool_id as usize;
            match pools.pool_mut(cls).pop_delayed() {
                Some(ptr) => {
                    // The item may actually live in a different pool's slab
                    // if it was allocated via a waste-driven redirect; the
                    // slab header is the source of truth for its real owner.
                    let order = pools.pool(cls).slab_order();
                    let mask = cache.ptr_mask(order);
                    let slab = SlabCache::slab_from_ptr(ptr, mask);
                    // SAFETY: slab is a live regular slab mapped by this cache.
                    let owner = unsafe { SlabCache::header(slab) }
                        .mempool
                        .expect("regular slab must carry an owning pool id");
                    pools.reconcile_free(cls, owner as usize);
                    // SAFETY: ptr was allocated from `owner`'s pool and not yet freed.
                    unsafe { pools.pool_mut(owner as usize).free(ptr, cache) };
                }
                None => {
                    self.delayed_pools.pop();
                    pools.pool_mut(cls).on_delayed_worklist = false;
                    if self.delayed_pools.is_empty() {
                        break;
                    }
                }
            }
        }
    }

    /// Drop all pending large allocations back to the cache, and clear
    /// pool worklists (used by `Drop`/`destroy`, which frees pools'
    /// backing slabs directly afterwards regardless of delayed state).
    pub(crate) fn clear(&mut self, cache: &mut SlabCache) {
        while let Some(item) = self.delayed_large {
            // SAFETY: item was pushed by push_large from a live large allocation.
            self.delayed_large = unsafe { read_link(item) };
            let base = cache.slab_from_data(item);
            unsafe { cache.put_large(base) };
        }
        self.delayed_pools.clear();
    }
}

impl Default for GarbageCollector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_is_free() {
        assert_eq!(GarbageCollector::new().mode(), FreeMode::Free);
    }

    #[test]
    fn enabling_then_disabling_enters_collect_garbage() {
        let mut gc = GarbageCollector::new();
        gc.set_delayed_free_mode(true);
        assert_eq!(gc.mode(), FreeMode::DelayedFree);
        gc.set_delayed_free_mode(false);
        assert_eq!(gc.mode(), FreeMode::CollectGarbage);
    }
}
