use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use crossbeam_utils::thread::scope;
use rand::{thread_rng, Rng};
use strata_pool::{Heap, LevelAlloc, PoolConfig, PoolManager, MAX_LEVEL};

fn layout(level: u8) -> Layout {
    Layout::array::<u64>(2 + level as usize).unwrap()
}

#[test]
fn lifo_reuse() {
    let pool = PoolManager::new(layout);

    let a = pool.allocate(7);
    unsafe { pool.deallocate(a, 7) };
    let b = pool.allocate(7);
    assert_eq!(a, b);

    unsafe { pool.deallocate(b, 7) };
}

#[test]
fn logarithmic_replenishments() {
    let pool = PoolManager::new(layout);

    let slots = (0..1000).map(|_| pool.allocate(0)).collect::<Vec<_>>();
    // 1 + 2 + ... + 512 = 1023 slots.
    let stats = pool.stats(0);
    assert_eq!(stats.replenishments, 10);
    assert_eq!(stats.capacity, 1023);
    assert_eq!(stats.outstanding, 1000);

    for slot in slots {
        unsafe { pool.deallocate(slot, 0) };
    }
    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn slots_are_distinct_and_writable() {
    let pool = PoolManager::new(layout);
    let mut rng = thread_rng();

    let mut slots = Vec::new();
    for i in 0..500u64 {
        let level = rng.gen_range(0..=MAX_LEVEL);
        let slot = pool.allocate(level);
        unsafe { slot.as_ptr().cast::<u64>().write(i) };
        slots.push((slot, level, i));
    }

    for &(slot, _, i) in &slots {
        assert_eq!(unsafe { slot.as_ptr().cast::<u64>().read() }, i);
    }
    for (slot, level, _) in slots {
        unsafe { pool.deallocate(slot, level) };
    }
    assert!(pool.leaks().is_empty());
}

#[test]
fn shared_across_threads() {
    const THREADS: usize = 8;
    const STEPS: usize = 2000;

    let pool = PoolManager::new(layout);
    let barrier = Barrier::new(THREADS);

    scope(|s| {
        for t in 0..THREADS {
            let pool = &pool;
            let barrier = &barrier;
            s.spawn(move |_| {
                let mut rng = thread_rng();
                let mut held: Vec<(NonNull<u8>, u8)> = Vec::new();
                barrier.wait();

                for step in 0..STEPS {
                    if held.is_empty() || rng.gen_bool(0.6) {
                        let level = rng.gen_range(0..4);
                        let slot = pool.allocate(level);
                        unsafe { slot.as_ptr().cast::<usize>().write(t * STEPS + step) };
                        held.push((slot, level));
                    } else {
                        let i = rng.gen_range(0..held.len());
                        let (slot, level) = held.swap_remove(i);
                        let tag = unsafe { slot.as_ptr().cast::<usize>().read() };
                        assert_eq!(tag / STEPS, t);
                        unsafe { pool.deallocate(slot, level) };
                    }
                }
                for (slot, level) in held {
                    unsafe { pool.deallocate(slot, level) };
                }
            });
        }
    })
    .unwrap();

    assert_eq!(pool.outstanding(), 0);
}

#[test]
fn one_leak_one_report() {
    let reports = Arc::new(AtomicUsize::new(0));
    let config = PoolConfig::default().on_leak({
        let reports = reports.clone();
        move |r| {
            assert_eq!(r.outstanding, 1);
            reports.fetch_add(1, Ordering::SeqCst);
        }
    });

    let pool = PoolManager::with_config(config, layout);
    let _kept = pool.allocate(3);
    let returned = pool.allocate(5);
    unsafe { pool.deallocate(returned, 5) };
    drop(pool);

    assert_eq!(reports.load(Ordering::SeqCst), 1);
}

#[test]
fn strategies_share_a_seam() {
    fn churn<A: LevelAlloc>(alloc: &A) {
        for level in 0..=MAX_LEVEL {
            assert!(alloc.slot_layout(level).size() >= layout(level).size());
            let slot = alloc.allocate(level);
            unsafe { alloc.deallocate(slot, level) };
        }
    }

    churn(&PoolManager::new(layout));
    churn(&Heap::new(layout));
}

#[cfg(debug_assertions)]
#[test]
#[should_panic(expected = "does not belong to level")]
fn wrong_pool() {
    let pool = PoolManager::new(layout);
    let slot = pool.allocate(1);
    unsafe { pool.deallocate(slot, 2) };
}
