//! Allocator configuration.

use crate::util::size::kb;

/// Configuration for [`crate::SmallAllocator::create`].
///
/// Validated at creation time with `assert!` (see spec §7: configuration
/// errors are caught eagerly, not reported through a `Result`).
#[derive(Debug, Clone)]
pub struct SmallAllocConfig {
    /// Smallest object size the allocator will route through a size class.
    /// Aligned up to `size_of::<usize>()` at creation time.
    pub objsize_min: u32,

    /// Granularity of the size-class table's linear region; must be a
    /// power of two.
    pub granularity: u32,

    /// Requested geometric growth factor for the size-class table,
    /// in `(1.0, 2.0]`. The allocator may choose a slightly different
    /// `actual_factor` to keep class sizes granularity-aligned.
    pub alloc_factor: f32,

    /// Base (order-0) slab size handed out by the arena. Must be a power
    /// of two.
    pub base_slab_size: usize,

    /// Highest slab order the cache will serve before falling back to a
    /// dedicated large slab.
    pub order_max: u32,

    /// Memory budget enforced by the arena's `Quota`, in bytes. `0` means
    /// unbounded.
    pub quota: usize,
}

impl Default for SmallAllocConfig {
    fn default() -> Self {
        Self {
            objsize_min: 8,
            granularity: std::mem::size_of::<usize>() as u32,
            alloc_factor: 1.1,
            base_slab_size: kb(16),
            order_max: 10,
            quota: 0,
        }
    }
}

impl SmallAllocConfig {
    /// A config tuned for constrained environments / tests: small base
    /// slab, few orders, tight quota.
    pub fn minimal() -> Self {
        Self {
            objsize_min: 8,
            granularity: 4,
            alloc_factor: 1.2,
            base_slab_size: kb(4),
            order_max: 6,
            quota: 0,
        }
    }

    /// A config tuned for high allocation rates: coarser linear region,
    /// larger base slab, more orders.
    pub fn high_performance() -> Self {
        Self {
            objsize_min: 16,
            granularity: 8,
            alloc_factor: 1.05,
            base_slab_size: kb(64),
            order_max: 12,
            quota: 0,
        }
    }

    /// Builder: set `objsize_min`.
    pub fn with_objsize_min(mut self, v: u32) -> Self {
        self.objsize_min = v;
        self
    }

    /// Builder: set `granularity`.
    pub fn with_granularity(mut self, v: u32) -> Self {
        self.granularity = v;
        self
    }

    /// Builder: set `alloc_factor`.
    pub fn with_alloc_factor(mut self, v: f32) -> Self {
        self.alloc_factor = v;
        self
    }

    /// Builder: set `base_slab_size`.
    pub fn with_base_slab_size(mut self, v: usize) -> Self {
        self.base_slab_size = v;
        self
    }

    /// Builder: set `order_max`.
    pub fn with_order_max(mut self, v: u32) -> Self {
        self.order_max = v;
        self
    }

    /// Builder: set `quota`.
    pub fn with_quota(mut self, v: usize) -> Self {
        self.quota = v;
        self
    }

    /// Panics if the configuration violates the invariants `create()`
    /// requires (granularity/base_slab_size power-of-two, factor range).
    pub(crate) fn validate(&self) {
        assert!(
            self.granularity.is_power_of_two(),
            "granularity must be a power of two, got {}",
            self.granularity
        );
        assert!(
            self.base_slab_size.is_power_of_two(),
            "base_slab_size must be a power of two, got {}",
            self.base_slab_size
        );
        assert!(
            self.alloc_factor > 1.0 && self.alloc_factor <= 2.0,
            "alloc_factor must be in (1.0, 2.0], got {}",
            self.alloc_factor
        );
        assert!(self.order_max > 0, "order_max must be positive");
    }
}
