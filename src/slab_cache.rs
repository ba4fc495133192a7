//! Slab cache: caches power-of-two slabs per order and serves large
//! (above-`objsize_max`) allocations directly as dedicated slabs.
//!
//! Every slab — regular or large — carries a [`SlabHeader`] at its base.
//! There is no per-object header (spec.md §1); the per-*slab* header is
//! what makes [`SlabCache::slab_from_ptr`] / [`SlabCache::slab_from_data`]
//! possible.

use std::mem::size_of;
use std::ptr::NonNull;

use crate::arena::SlabArena;
use crate::util::layout::align_up;

/// Index of a [`crate::mempool::Mempool`] inside [`crate::allocator::SmallAllocator`].
pub type MempoolId = u32;

/// Per-slab metadata, stored at the slab's base address.
#[repr(C)]
pub struct SlabHeader {
    /// Owning pool, or `None` for a large (single-object) slab.
    pub mempool: Option<MempoolId>,
    /// Total size of this slab, including the header.
    pub size: usize,
}

/// Bytes reserved for the header at the start of every slab, rounded up so
/// the data region starts suitably aligned for any object this crate hands
/// out.
pub const HEADER_RESERVE: usize = crate::util::layout::align_up(size_of::<SlabHeader>(), 16);

/// Caches power-of-two slabs per order, plus the large-object path.
pub struct SlabCache {
    arena: SlabArena,
    order_max: u32,
    free_lists: Vec<Vec<NonNull<u8>>>,
}

impl SlabCache {
    /// Create a cache backed by `arena`, serving orders `0..=order_max`.
    pub fn new(arena: SlabArena, order_max: u32) -> Self {
        let free_lists = (0..=order_max).map(|_| Vec::new()).collect();
        Self {
            arena,
            order_max,
            free_lists,
        }
    }

    /// Highest order this cache serves before falling back to large slabs.
    pub fn order_max(&self) -> u32 {
        self.order_max
    }

    /// Size of a slab of the given order (including its header).
    pub fn order_size(&self, order: u32) -> usize {
        self.arena.order_size(order)
    }

    /// The order-0 slab size.
    pub fn base_slab_size(&self) -> usize {
        self.arena.base_slab_size()
    }

    /// Bitmask that resolves any pointer into a slab of `order` to that
    /// slab's base address.
    pub fn ptr_mask(&self, order: u32) -> usize {
        !(self.order_size(order) - 1)
    }

    /// Get or map a slab of the given order, tagging its header with
    /// `mempool`. Returns the slab *base* pointer (use [`SlabCache::data_ptr`]
    /// to get the object region).
    pub fn alloc_order(&mut self, order: u32, mempool: MempoolId) -> Option<NonNull<u8>> {
        let order = order as usize;
        let base = if let Some(cached) = self.free_lists[order].pop() {
            cached
        } else {
            self.arena.map(order as u32)?
        };
        // SAFETY: base is a valid, writable slab of at least HEADER_RESERVE bytes.
        unsafe {
            base.cast::<SlabHeader>().write(SlabHeader {
                mempool: Some(mempool),
                size: self.order_size(order as u32),
            });
        }
        Some(base)
    }

    /// Return a regular slab to the free list for its order. The slab is
    /// kept mapped (external fragmentation at the slab granularity is a
    /// non-goal; callers bound how many empty slabs a pool retains).
    pub fn put(&mut self, order: u32, slab: NonNull<u8>) {
        self.free_lists[order as usize].push(slab);
    }

    /// Allocate a dedicated slab for a single large object of `size` bytes.
    pub fn alloc_large(&mut self, size: usize) -> Option<NonNull<u8>> {
        let total = HEADER_RESERVE + size;
        let base = self.arena.map_large(total)?;
        // SAFETY: base is valid and at least `total` bytes, rounded up.
        let rounded = align_up(total, self.base_slab_size());
        unsafe {
            base.cast::<SlabHeader>().write(SlabHeader {
                mempool: None,
                size: rounded,
            });
        }
        Some(base)
    }

    /// Release a large slab obtained from [`SlabCache::alloc_large`].
    ///
    /// # Safety
    /// `slab` must be a base pointer previously returned by `alloc_large`
    /// and not already released.
    pub unsafe fn put_large(&mut self, slab: NonNull<u8>) {
        let size = slab.cast::<SlabHeader>().as_ref().size;
        self.arena.unmap_large(slab, size);
    }

    /// Offset from a slab base to its data (object) region.
    pub fn data_ptr(slab_base: NonNull<u8>) -> NonNull<u8> {
        // SAFETY: every slab reserves at least HEADER_RESERVE bytes at its base.
        unsafe { NonNull::new_unchecked(slab_base.as_ptr().add(HEADER_RESERVE)) }
    }

    /// Recover a slab's base pointer from a pointer into a *regular* pool
    /// slab, given that pool's own ptr mask.
    pub fn slab_from_ptr(ptr: NonNull<u8>, mask: usize) -> NonNull<u8> {
        let addr = ptr.as_ptr() as usize & mask;
        // SAFETY: addr is within the same allocation as ptr, nonzero.
        unsafe { NonNull::new_unchecked(addr as *mut u8) }
    }

    /// Recover a large slab's base pointer from its data pointer. Large
    /// slabs are always aligned to `base_slab_size`, so this mask is
    /// independent of how many base units a given large slab spans.
    pub fn slab_from_data(&self, data_ptr: NonNull<u8>) -> NonNull<u8> {
        let mask = !(self.base_slab_size() - 1);
        Self::slab_from_ptr(data_ptr, mask)
    }

    /// Read the header of a slab located at `slab_base`.
    ///
    /// # Safety
    /// `slab_base` must point at a live slab header.
    pub unsafe fn header(slab_base: NonNull<u8>) -> &'static SlabHeader {
        slab_base.cast::<SlabHeader>().as_ref()
    }
}

impl Drop for SlabCache {
    fn drop(&mut self) {
        for order in 0..=self.order_max {
            let size = self.order_size(order);
            for slab in self.free_lists[order as usize].drain(..) {
                // SAFETY: every pointer on a per-order free list was
                // mapped by this same arena at that order's size.
                unsafe { self.arena.unmap(slab, size) };
            }
        }
    }
}
