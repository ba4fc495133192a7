//! Fixed-size-object pool over a single slab order.
//!
//! Each [`Mempool`] hands out objects of exactly one size (`objsize`) by
//! bump-allocating through slabs of one [`crate::slab_cache::SlabCache`]
//! order, reusing freed slots via an intrusive singly-linked free list
//! threaded through the objects' own first machine word — there is no
//! side table (spec.md §9, "Delayed lists").

use std::ptr::NonNull;

use crate::slab_cache::{MempoolId, SlabCache};

/// Read the next-pointer stored in a freed object's first word.
unsafe fn read_link(ptr: NonNull<u8>) -> Option<NonNull<u8>> {
    let raw = ptr.as_ptr().cast::<usize>().read();
    NonNull::new(raw as *mut u8)
}

/// Store `next` into an object's first word, threading it onto a list.
unsafe fn write_link(ptr: NonNull<u8>, next: Option<NonNull<u8>>) {
    let raw = next.map_or(0usize, |p| p.as_ptr() as usize);
    ptr.as_ptr().cast::<usize>().write(raw);
}

/// One slab owned by a pool, plus how many of its objects are currently
/// live. A slab reaching `live == 0` is a candidate for eviction back to
/// the slab cache (see [`Mempool::free`]).
struct SlabEntry {
    base: NonNull<u8>,
    live: usize,
}

/// A bump/free-list allocator for objects of one fixed size.
pub struct Mempool {
    id: MempoolId,
    objsize: u32,
    slab_order: u32,
    /// Slabs currently owned by this pool, each with its live object count.
    slabs: Vec<SlabEntry>,
    /// Bump cursor position into `slabs.last()`'s data region, or `None`
    /// if that slab (if any) is fully carved up.
    bump: Option<usize>,
    /// Head of the free list of reclaimed object slots.
    free_list: Option<NonNull<u8>>,
    /// Live object count (for stats / destroy/empty checks).
    used: usize,
    /// Head of this pool's delayed-free intrusive list (see `gc.rs`).
    pub(crate) delayed: Option<NonNull<u8>>,
    /// Whether this pool currently has an entry on the allocator's
    /// per-pool delayed-free worklist (avoids duplicate pushes).
    pub(crate) on_delayed_worklist: bool,
}

impl Mempool {
    /// Create an empty pool serving objects of exactly `objsize` bytes
    /// out of slabs of the given `slab_order`.
    pub fn new(id: MempoolId, objsize: u32, slab_order: u32) -> Self {
        assert!(
            objsize as usize >= std::mem::size_of::<usize>(),
            "pool object size must fit an intrusive free-list link"
        );
        Self {
            id,
            objsize,
            slab_order,
            slabs: Vec::new(),
            bump: None,
            free_list: None,
            used: 0,
            delayed: None,
            on_delayed_worklist: false,
        }
    }

    /// Fixed object size served by this pool.
    pub fn objsize(&self) -> u32 {
        self.objsize
    }

    /// Slab order this pool draws slabs from.
    pub fn slab_order(&self) -> u32 {
        self.slab_order
    }

    /// This pool's id in the allocator's pool table.
    pub fn id(&self) -> MempoolId {
        self.id
    }

    /// Live (allocated, not freed) object count.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total object capacity across slabs currently owned by this pool.
    pub fn total(&self, cache: &SlabCache) -> usize {
        let per_slab = self.objects_per_slab(cache);
        self.slabs.len() * per_slab
    }

    fn objects_per_slab(&self, cache: &SlabCache) -> usize {
        let data_bytes = cache.order_size(self.slab_order) - crate::slab_cache::HEADER_RESERVE;
        data_bytes / self.objsize as usize
    }

    /// Index into `self.slabs` of the slab `ptr` was carved from.
    fn slab_index_of(&self, ptr: NonNull<u8>, mask: usize) -> usize {
        let base = ptr.as_ptr() as usize & mask;
        self.slabs
            .iter()
            .position(|s| s.base.as_ptr() as usize == base)
            .expect("pointer must belong to one of this pool's own slabs")
    }

    /// Allocate one object. Returns `None` only on slab-cache exhaustion.
    pub fn alloc(&mut self, cache: &mut SlabCache) -> Option<NonNull<u8>> {
        if let Some(free) = self.free_list.take() {
            // SAFETY: free came from this pool's own free list.
            self.free_list = unsafe { read_link(free) };
            self.used += 1;
            let mask = cache.ptr_mask(self.slab_order);
            let idx = self.slab_index_of(free, mask);
            self.slabs[idx].live += 1;
            return Some(free);
        }

        if self.bump.is_none() {
            let slab = cache.alloc_order(self.slab_order, self.id)?;
            self.slabs.push(SlabEntry { base: slab, live: 0 });
            self.bump = Some(0);
        }

        let per_slab = self.objects_per_slab(cache);
        let idx = self.slabs.len() - 1;
        let pos = self.bump.unwrap();
        let data = SlabCache::data_ptr(self.slabs[idx].base);
        // SAFETY: pos < per_slab keeps the pointer within the slab's data region.
        let obj = unsafe { NonNull::new_unchecked(data.as_ptr().add(pos * self.objsize as usize)) };
        self.slabs[idx].live += 1;
        let next_pos = pos + 1;
        self.bump = if next_pos < per_slab { Some(next_pos) } else { None };
        self.used += 1;
        Some(obj)
    }

    /// Return `ptr` (previously returned by [`Mempool::alloc`]) to the
    /// free list. If this empties `ptr`'s slab and the pool already holds
    /// a different, already-empty spare slab, the now-surplus slab is
    /// returned to `cache` (spec.md §4.2).
    ///
    /// # Safety
    /// `ptr` must have come from this pool and not already be freed.
    pub unsafe fn free(&mut self, ptr: NonNull<u8>, cache: &mut SlabCache) {
        #[cfg(feature = "debug")]
        crate::debug::poison::poison_freed(ptr.as_ptr(), self.objsize as usize);

        write_link(ptr, self.free_list);
        self.free_list = Some(ptr);
        self.used -= 1;

        let mask = cache.ptr_mask(self.slab_order);
        let idx = self.slab_index_of(ptr, mask);
        self.slabs[idx].live -= 1;
        if self.slabs[idx].live == 0 {
            self.maybe_evict_slab(idx, cache, mask);
        }
    }

    /// If slab `idx` (already fully free) isn't the active bump slab and
    /// the pool already has a different empty spare, splice its addresses
    /// out of the free list and hand the slab back to `cache`.
    fn maybe_evict_slab(&mut self, idx: usize, cache: &mut SlabCache, mask: usize) {
        let is_bump_slab = self.bump.is_some() && idx == self.slabs.len() - 1;
        if is_bump_slab {
            return;
        }
        let has_other_spare = self
            .slabs
            .iter()
            .enumerate()
            .any(|(i, s)| i != idx && s.live == 0);
        if !has_other_spare {
            return;
        }

        let entry = self.slabs.remove(idx);
        let base_addr = entry.base.as_ptr() as usize;

        // Splice every link into this slab out of the pool-wide free list
        // before handing the slab back — the cache may reuse it for a
        // different pool, and a stale link would corrupt that pool.
        let mut kept_head: Option<NonNull<u8>> = None;
        let mut kept_tail: Option<NonNull<u8>> = None;
        let mut cur = self.free_list.take();
        while let Some(node) = cur {
            // SAFETY: node is still a live link on this pool's free list.
            let next = unsafe { read_link(node) };
            if (node.as_ptr() as usize) & mask != base_addr {
                match kept_tail {
                    Some(t) => unsafe { write_link(t, Some(node)) },
                    None => kept_head = Some(node),
                }
                kept_tail = Some(node);
            }
            cur = next;
        }
        if let Some(t) = kept_tail {
            // SAFETY: t is the new tail of the kept free list.
            unsafe { write_link(t, None) };
        }
        self.free_list = kept_head;

        cache.put(self.slab_order, entry.base);
    }

    /// Push `ptr` onto this pool's delayed-free list rather than freeing
    /// it immediately. Returns `true` if this was the first delayed entry
    /// for the pool (the caller must then register the pool on the
    /// allocator-wide delayed worklist).
    pub(crate) fn push_delayed(&mut self, ptr: NonNull<u8>) -> bool {
        let was_empty = self.delayed.is_none();
        // SAFETY: ptr is a live object of this pool's size, large enough for a link.
        unsafe { write_link(ptr, self.delayed) };
        self.delayed = Some(ptr);
        if was_empty {
            self.on_delayed_worklist = true;
        }
        was_empty
    }

    /// Pop one entry off this pool's delayed-free list, without freeing it.
    /// The popped pointer may actually live in a different pool's slab (if
    /// it was allocated via a waste-driven redirect) — the caller is
    /// responsible for resolving its true owner and freeing it there.
    pub(crate) fn pop_delayed(&mut self) -> Option<NonNull<u8>> {
        let ptr = self.delayed?;
        // SAFETY: ptr was pushed by push_delayed from this same pool.
        self.delayed = unsafe { read_link(ptr) };
        Some(ptr)
    }

    /// Release all slabs this pool owns back to `cache`. Used by
    /// [`crate::allocator::SmallAllocator`]'s `Drop`.
    pub(crate) fn destroy(&mut self, cache: &mut SlabCache) {
        for slab in self.slabs.drain(..) {
            cache.put(self.slab_order, slab.base);
        }
        self.bump = None;
        self.free_list = None;
        self.used = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::SlabArena;

    fn cache() -> SlabCache {
        SlabCache::new(SlabArena::new(4096, 0), 4)
    }

    #[test]
    fn alloc_then_free_reuses_slot() {
        let mut cache = cache();
        let mut pool = Mempool::new(0, 32, 0);
        let a = pool.alloc(&mut cache).unwrap();
        unsafe { pool.free(a, &mut cache) };
        let b = pool.alloc(&mut cache).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.used(), 1);
    }

    #[test]
    fn fills_then_maps_new_slab() {
        let mut cache = cache();
        let mut pool = Mempool::new(0, 64, 0);
        let per_slab = pool.objects_per_slab(&cache);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..per_slab + 1 {
            let p = pool.alloc(&mut cache).unwrap();
            assert!(seen.insert(p));
        }
        assert_eq!(pool.used(), per_slab + 1);
    }

    #[test]
    fn delayed_free_list_pops_in_lifo_order() {
        let mut cache = cache();
        let mut pool = Mempool::new(0, 32, 0);
        let a = pool.alloc(&mut cache).unwrap();
        let b = pool.alloc(&mut cache).unwrap();
        assert!(pool.push_delayed(a));
        assert!(!pool.push_delayed(b));
        assert_eq!(pool.pop_delayed(), Some(b));
        assert_eq!(pool.pop_delayed(), Some(a));
        assert_eq!(pool.pop_delayed(), None);
        // pop_delayed doesn't free — used count is untouched until the
        // caller resolves the real owner and frees there.
        assert_eq!(pool.used(), 2);
        unsafe {
            pool.free(a, &mut cache);
            pool.free(b, &mut cache);
        }
        assert_eq!(pool.used(), 0);
    }

    #[test]
    fn fully_emptied_slab_is_returned_once_a_spare_exists() {
        let mut cache = cache();
        let mut pool = Mempool::new(0, 64, 0);
        let per_slab = pool.objects_per_slab(&cache);

        let mut slab_a = Vec::new();
        for _ in 0..per_slab {
            slab_a.push(pool.alloc(&mut cache).unwrap());
        }
        let mut slab_b = Vec::new();
        for _ in 0..per_slab {
            slab_b.push(pool.alloc(&mut cache).unwrap());
        }
        // Keep one object from a third slab live so that slab (the active
        // bump slab) is never itself a candidate for eviction.
        let _slab_c_anchor = pool.alloc(&mut cache).unwrap();
        assert_eq!(pool.slabs.len(), 3);

        for ptr in slab_a {
            unsafe { pool.free(ptr, &mut cache) };
        }
        // Slab A is now the pool's one cached spare; nothing evicted yet.
        assert_eq!(pool.slabs.len(), 3);

        for ptr in slab_b {
            unsafe { pool.free(ptr, &mut cache) };
        }
        // Slab B also went fully free, with A already spare: B is returned.
        assert_eq!(pool.slabs.len(), 2);
    }
}
