//! Level-segregated node pools.
//!
//! A skip list node at level `n` carries `n + 1` forward links, so nodes come in
//! [`NUM_LEVELS`] distinct sizes. [`PoolManager`] keeps one free list per size
//! class. Each free list has its own lock, so allocations at different levels
//! never contend with each other. When a free list runs dry it is replenished
//! from a [`BlockSource`] shared by all levels, and every replenishment asks
//! for twice as many slots as the previous one.
//!
//! The skip list is agnostic to the strategy: it allocates through the
//! [`LevelAlloc`] trait, implemented by [`PoolManager`] and by [`Heap`], which
//! sends every node straight to the global allocator.
//!
//! ```
//! use std::alloc::Layout;
//!
//! use strata_pool::PoolManager;
//!
//! // Nodes at level `n` hold a header followed by `n + 1` links.
//! let pool = PoolManager::new(|level| {
//!     Layout::array::<usize>(2 + level as usize).unwrap()
//! });
//!
//! let a = pool.allocate(3);
//! unsafe { pool.deallocate(a, 3) };
//!
//! // Slots are reused last-in, first-out.
//! let b = pool.allocate(3);
//! assert_eq!(a, b);
//! unsafe { pool.deallocate(b, 3) };
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unsafe_op_in_unsafe_fn
)]

mod alloc;
mod block;
mod level;
mod manager;

pub use crate::alloc::{Heap, LevelAlloc};
pub use crate::block::{AllocError, BlockSource, Bounded, SystemBlocks};
pub use crate::level::LevelStats;
pub use crate::manager::{LeakPolicy, LeakReport, PoolConfig, PoolManager};

/// The highest level a node can be allocated at.
pub const MAX_LEVEL: u8 = 31;

/// The number of size classes, one per level in `0..=MAX_LEVEL`.
pub const NUM_LEVELS: usize = MAX_LEVEL as usize + 1;
