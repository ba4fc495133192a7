//! # small_alloc
//!
//! A size-segregated small-object allocator layered on a quota-bounded
//! slab cache, modeled on Tarantool's `small` library.
//!
//! ## Features
//!
//! - A size-class table mapping byte sizes to a compact set of pool
//!   sizes, combining a linear region and a geometric region so actual
//!   sizes stay within `sqrt(factor)` of the caller's requested growth
//!   factor.
//! - Waste-driven pool activation: adjacent, rarely-used size classes
//!   share one pool until enough memory would be wasted by doing so.
//! - Delayed-free / garbage-collection mode for safely freeing while a
//!   snapshot or iterator holds live pointers.
//! - A quota-bounded slab arena and slab cache as the allocator's backing
//!   store.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use small_alloc::{SmallAllocConfig, SmallAllocator};
//!
//! let mut alloc = SmallAllocator::create(SmallAllocConfig::default());
//! let ptr = alloc.smalloc(64).expect("out of memory");
//! alloc.smfree(ptr, 64);
//! ```

mod allocator;
mod arena;
mod config;
mod diagnostics;
mod gc;
mod group;
mod mempool;
mod size_class;
mod slab_cache;
mod stats;
mod util;

#[cfg(feature = "debug")]
pub mod debug;

pub use allocator::SmallAllocator;
pub use config::SmallAllocConfig;
pub use gc::FreeMode;
pub use size_class::SizeClass;
pub use slab_cache::MempoolId;
pub use stats::{AllocStats, MempoolStats};
