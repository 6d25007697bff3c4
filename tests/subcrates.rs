//! Makes sure subcrates are properly reexported.

use std::sync::Arc;

#[test]
fn pool() {
    let pool = strata::pool::PoolManager::new(|level| {
        std::alloc::Layout::array::<usize>(1 + level as usize).unwrap()
    });
    let slot = pool.allocate(0);
    unsafe { pool.deallocate(slot, 0) };
}

#[test]
fn skiplist() {
    let list = strata::SkipList::new();
    let h: strata::Handle<i32, ()> = list.insert(1, ());
    assert_eq!(*h.key(), 1);

    let pool = Arc::new(strata::pool::PoolManager::new(
        strata::skiplist::node_layout::<i32, ()>,
    ));
    let shared = strata::skiplist::SkipList::<i32, (), _, _>::with_allocator(
        strata::skiplist::BasicComparator,
        pool,
    )
    .unwrap();
    shared.insert(2, ());
    assert_eq!(shared.len(), 1);
}
