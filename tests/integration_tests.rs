//! End-to-end scenarios exercising the allocator as a whole: size-class
//! routing, pool reuse, delayed-free/GC, and large-object fallback.

use small_alloc::{FreeMode, SmallAllocConfig, SmallAllocator};

#[test]
fn same_size_throughput_repeated_rounds() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::default());
    let mut live = Vec::with_capacity(1_000);

    for _ in 0..1_000 {
        live.push(alloc.smalloc(48).unwrap());
    }
    for ptr in live.drain(..) {
        alloc.smfree(ptr, 48);
    }
    let total_after_first_round = alloc.stats().total;

    // Repeating the same round must reuse already-mapped pool capacity
    // rather than growing the arena further.
    for _ in 0..1_000 {
        for _ in 0..1_000 {
            live.push(alloc.smalloc(48).unwrap());
        }
        for ptr in live.drain(..) {
            alloc.smfree(ptr, 48);
        }
    }
    assert_eq!(alloc.stats().total, total_after_first_round);
}

#[test]
fn random_small_workload_20_to_100_bytes() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::default());
    let mut live = Vec::new();
    let mut state: u64 = 0x9E3779B97F4A7C15;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for _ in 0..20_000 {
        let size = 20 + (next() % 81) as usize;
        live.push((alloc.smalloc(size).unwrap(), size));
        if live.len() > 500 {
            let victim = (next() as usize) % live.len();
            let (ptr, size) = live.remove(victim);
            alloc.smfree(ptr, size);
        }
    }
    for (ptr, size) in live {
        alloc.smfree(ptr, size);
    }
}

#[test]
fn random_workload_with_factor_1_5_boundary() {
    let config = SmallAllocConfig::default().with_alloc_factor(1.5);
    let mut alloc = SmallAllocator::create(config);
    let mut live = Vec::new();
    let mut state: u64 = 12345;
    let mut next = || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };

    for _ in 0..5_000 {
        let size = 1000 + (next() % 9001) as usize;
        live.push((alloc.smalloc(size).unwrap(), size));
    }
    let stats = alloc.stats();
    assert!(stats.used > 0);
    assert!(stats.total >= stats.used);
    for (ptr, size) in live {
        alloc.smfree(ptr, size);
    }
}

#[test]
fn delayed_free_snapshot_scenario() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());

    let mut snapshot_ptrs = Vec::new();
    for _ in 0..200 {
        snapshot_ptrs.push(alloc.smalloc(32).unwrap());
    }

    // A snapshot/iterator is now "reading" these objects; frees issued
    // during the snapshot must not actually reclaim memory yet.
    alloc.set_delayed_free_mode(true);
    assert_eq!(alloc.free_mode(), FreeMode::DelayedFree);
    for &ptr in &snapshot_ptrs {
        alloc.smfree_delayed(ptr, 32);
    }

    // Snapshot finished: disabling delayed-free moves to garbage
    // collection, which drains the worklist across subsequent calls.
    alloc.set_delayed_free_mode(false);
    assert_eq!(alloc.free_mode(), FreeMode::CollectGarbage);

    let mut iterations = 0;
    while alloc.free_mode() != FreeMode::Free && iterations < 10_000 {
        let p = alloc.smalloc(32).unwrap();
        alloc.smfree(p, 32);
        iterations += 1;
    }
    assert_eq!(alloc.free_mode(), FreeMode::Free);
}

#[test]
fn exponential_size_sweep() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::default());
    let mut size = 8usize;
    let mut ptrs = Vec::new();
    while size < 1 << 20 {
        ptrs.push((alloc.smalloc(size).unwrap(), size));
        size *= 2;
    }
    for (ptr, size) in ptrs {
        alloc.smfree(ptr, size);
    }
}

#[test]
fn activation_boundary_scenario() {
    // Hammer a single small class with allocations to force its
    // pool-group's waste accounting to activate a dedicated pool. Through
    // the public API the activation itself is only observable indirectly:
    // once the class is self-sufficient, repeating the same churn stops
    // growing total mapped capacity. (The precise internal check — that
    // activation fires exactly once and the class's own pool now owns the
    // slab a fresh allocation lands in — is covered by
    // `group::tests::activation_boundary_fires_once_and_switches_slab_owner`,
    // which has access to the pool table internals this public surface
    // deliberately doesn't expose.)
    let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
    let mut live = Vec::new();
    for _ in 0..50_000 {
        live.push(alloc.smalloc(20).unwrap());
        if live.len() > 64 {
            let p = live.remove(0);
            alloc.smfree(p, 20);
        }
    }
    for ptr in live.drain(..) {
        alloc.smfree(ptr, 20);
    }
    let total_after_activation = alloc.stats().total;

    // Repeating the same churn once activation has settled must not keep
    // growing mapped capacity — the class is now served by its own pool
    // instead of perpetually redirecting into (and wasting space in) a
    // shared donor.
    for _ in 0..5_000 {
        live.push(alloc.smalloc(20).unwrap());
        if live.len() > 64 {
            let p = live.remove(0);
            alloc.smfree(p, 20);
        }
    }
    for ptr in live {
        alloc.smfree(ptr, 20);
    }
    assert_eq!(alloc.stats().total, total_after_activation);
}

#[test]
fn large_allocations_bypass_pools_and_free_correctly() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
    let big = alloc.objsize_max() as usize * 2;
    let a = alloc.smalloc(big).unwrap();
    let b = alloc.smalloc(big + 4096).unwrap();
    assert_ne!(a, b);
    alloc.smfree(a, big);
    alloc.smfree(b, big + 4096);
}

#[test]
fn stats_track_used_and_total_consistently() {
    let mut alloc = SmallAllocator::create(SmallAllocConfig::minimal());
    let before = alloc.stats();
    assert_eq!(before.used, 0);

    let mut ptrs = Vec::new();
    for _ in 0..100 {
        ptrs.push(alloc.smalloc(40).unwrap());
    }
    let during = alloc.stats();
    assert!(during.used >= 100 * 40);
    assert!(during.total >= during.used);

    for ptr in ptrs {
        alloc.smfree(ptr, 40);
    }
    let after = alloc.stats();
    assert_eq!(after.used, 0);
}

#[test]
fn quota_exhaustion_surfaces_as_none() {
    let config = SmallAllocConfig::minimal().with_quota(8192);
    let mut alloc = SmallAllocator::create(config);
    let mut ptrs = Vec::new();
    loop {
        match alloc.smalloc(32) {
            Some(p) => ptrs.push(p),
            None => break,
        }
        if ptrs.len() > 100_000 {
            panic!("quota was not enforced");
        }
    }
    for ptr in ptrs {
        alloc.smfree(ptr, 32);
    }
}
