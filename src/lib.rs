//! Tools for ordered concurrent collections.
//!
//! ## Skip lists
//!
//! * [`SkipList`], an ordered multimap whose entries are pinned by
//!   reference-counted [`Handle`]s.
//!
//! ## Memory
//!
//! * [`pool::PoolManager`], one free list per node level over a shared block source.
//! * [`pool::LevelAlloc`], the allocation strategy seam between lists and pools.

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub use strata_pool as pool;

pub use strata_skiplist as skiplist;

#[doc(inline)]
pub use strata_skiplist::{Handle, SkipList};
