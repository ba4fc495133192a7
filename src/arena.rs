//! Quota-bounded slab arena: the raw slab mapping source.
//!
//! Stands in for `slab_arena` in the original design (spec.md treats it as
//! an external collaborator; this crate has no sibling crate to supply it,
//! so it implements a minimal, correct version). Every slab handed out is
//! aligned to its own size, which is what lets [`crate::slab_cache::slab_from_ptr`]
//! resolve a pointer to its owning slab with a single bitmask.

use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};

/// An atomic byte budget. `0` means unbounded.
#[derive(Debug)]
pub struct Quota {
    limit: usize,
    used: AtomicUsize,
}

impl Quota {
    /// Create a quota with the given byte limit (`0` = unbounded).
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve `n` bytes against the quota. Returns `false` (and reserves
    /// nothing) if that would exceed the limit.
    pub fn try_use(&self, n: usize) -> bool {
        if self.limit == 0 {
            self.used.fetch_add(n, Ordering::Relaxed);
            return true;
        }
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(n);
            if next > self.limit {
                return false;
            }
            if self
                .used
                .compare_exchange_weak(cur, next, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Release `n` bytes previously reserved with [`Quota::try_use`].
    pub fn release(&self, n: usize) {
        self.used.fetch_sub(n, Ordering::Relaxed);
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Configured limit (`0` = unbounded).
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Maps power-of-two-sized, power-of-two-aligned slabs, quota-bounded.
#[derive(Debug)]
pub struct SlabArena {
    base_slab_size: usize,
    quota: Quota,
}

impl SlabArena {
    /// `base_slab_size` is the order-0 slab size; must be a power of two.
    pub fn new(base_slab_size: usize, quota_limit: usize) -> Self {
        assert!(base_slab_size.is_power_of_two());
        Self {
            base_slab_size,
            quota: Quota::new(quota_limit),
        }
    }

    /// Size of a slab of the given order.
    pub fn order_size(&self, order: u32) -> usize {
        self.base_slab_size << order
    }

    /// Map a fresh slab of the given order. Returns `None` on quota
    /// exhaustion or allocator failure (the sole OOM signal in this crate).
    pub fn map(&self, order: u32) -> Option<NonNull<u8>> {
        let size = self.order_size(order);
        if !self.quota.try_use(size) {
            return None;
        }
        let layout = Layout::from_size_align(size, size).expect("invalid slab layout");
        // SAFETY: layout is well-formed (size == align, both powers of two, nonzero).
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(p) => Some(p),
            None => {
                self.quota.release(size);
                None
            }
        }
    }

    /// Map a slab sized to hold a large (above-`objsize_max`) allocation.
    ///
    /// Unlike [`SlabArena::map`], the requested `size` need not be a power
    /// of two and the region is rounded up to a multiple of
    /// `base_slab_size` and aligned only to `base_slab_size` (not to its
    /// own total size) — the same constant mask used for every large slab
    /// lets [`crate::slab_cache::SlabCache::slab_from_data`] recover the
    /// header regardless of how many base units a given large slab spans.
    pub fn map_large(&self, size: usize) -> Option<NonNull<u8>> {
        let size = crate::util::layout::align_up(size, self.base_slab_size);
        if !self.quota.try_use(size) {
            return None;
        }
        let layout =
            Layout::from_size_align(size, self.base_slab_size).expect("invalid slab layout");
        // SAFETY: layout is well-formed.
        let ptr = unsafe { alloc(layout) };
        match NonNull::new(ptr) {
            Some(p) => Some(p),
            None => {
                self.quota.release(size);
                None
            }
        }
    }

    /// Release a slab mapped by [`SlabArena::map`].
    ///
    /// # Safety
    /// `ptr` must have been returned by [`SlabArena::map`] with the given
    /// `size` (self-aligned slabs only — large slabs use [`SlabArena::unmap_large`]).
    pub unsafe fn unmap(&self, ptr: NonNull<u8>, size: usize) {
        let layout = Layout::from_size_align(size, size).expect("invalid slab layout");
        dealloc(ptr.as_ptr(), layout);
        self.quota.release(size);
    }

    /// Release a slab mapped by [`SlabArena::map_large`].
    ///
    /// # Safety
    /// `ptr` must have been returned by [`SlabArena::map_large`] with the
    /// given `size` (the already-rounded-up size stored in the slab's
    /// header, not the caller's original request).
    pub unsafe fn unmap_large(&self, ptr: NonNull<u8>, size: usize) {
        let layout =
            Layout::from_size_align(size, self.base_slab_size).expect("invalid slab layout");
        dealloc(ptr.as_ptr(), layout);
        self.quota.release(size);
    }

    /// The order-0 slab size.
    pub fn base_slab_size(&self) -> usize {
        self.base_slab_size
    }

    /// Access the underlying quota (for stats / diagnostics).
    pub fn quota(&self) -> &Quota {
        &self.quota
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_rejects_over_limit() {
        let q = Quota::new(100);
        assert!(q.try_use(60));
        assert!(!q.try_use(60));
        assert!(q.try_use(40));
    }

    #[test]
    fn quota_release_frees_budget() {
        let q = Quota::new(100);
        assert!(q.try_use(100));
        assert!(!q.try_use(1));
        q.release(50);
        assert!(q.try_use(50));
    }

    #[test]
    fn unbounded_quota_always_succeeds() {
        let q = Quota::new(0);
        assert!(q.try_use(usize::MAX / 2));
        assert!(q.try_use(usize::MAX / 2));
    }

    #[test]
    fn map_returns_self_aligned_slab() {
        let arena = SlabArena::new(4096, 0);
        let ptr = arena.map(0).unwrap();
        assert_eq!(ptr.as_ptr() as usize % 4096, 0);
        unsafe { arena.unmap(ptr, 4096) };
    }

    #[test]
    fn map_respects_order() {
        let arena = SlabArena::new(4096, 0);
        let ptr = arena.map(2).unwrap();
        assert_eq!(arena.order_size(2), 16384);
        assert_eq!(ptr.as_ptr() as usize % 16384, 0);
        unsafe { arena.unmap(ptr, 16384) };
    }

    #[test]
    fn quota_exhaustion_returns_none() {
        let arena = SlabArena::new(4096, 4096);
        let p1 = arena.map(0).unwrap();
        assert!(arena.map(0).is_none());
        unsafe { arena.unmap(p1, 4096) };
        let p2 = arena.map(0);
        assert!(p2.is_some());
        unsafe { arena.unmap(p2.unwrap(), 4096) };
    }
}
