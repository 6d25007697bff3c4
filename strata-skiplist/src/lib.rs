//! A concurrent skip list with pinned, reference-counted handles.
//!
//! [`SkipList`] is an ordered multimap. Structural changes are serialized by
//! a reader-writer lock, so lookups run in parallel with each other and
//! insertions and removals are linearizable. Every entry a lookup returns is
//! wrapped in a [`Handle`], which keeps the entry's key and value alive even
//! if another thread removes it from the list.
//!
//! Nodes are sized by their level, and memory for them comes from a
//! [`LevelAlloc`](pool::LevelAlloc) implementation. By default every list owns
//! a [`PoolManager`](pool::PoolManager), which keeps one free list per level.
//! Pools can also be shared between lists through an `Arc`.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use strata_skiplist::SkipList;
//!
//! let list = Arc::new(SkipList::new());
//!
//! let threads = (0..4)
//!     .map(|t| {
//!         let list = list.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 list.insert(i * 4 + t, ());
//!             }
//!         })
//!     })
//!     .collect::<Vec<_>>();
//! for t in threads {
//!     t.join().unwrap();
//! }
//!
//! let keys = list.iter().map(|h| *h.key()).collect::<Vec<_>>();
//! assert_eq!(keys, (0..400).collect::<Vec<_>>());
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub,
    unsafe_op_in_unsafe_fn
)]

pub use strata_pool as pool;

mod base;
mod builder;
pub mod comparator;
mod error;
mod handle;
mod level;
mod node;

pub use crate::base::{Iter, SkipList};
pub use crate::builder::Builder;
pub use crate::comparator::{BasicComparator, Comparator, FnComparator};
pub use crate::error::Error;
pub use crate::handle::Handle;
pub use crate::level::{LevelGenerator, DEFAULT_SEED};
pub use crate::node::node_layout;
pub use strata_pool::MAX_LEVEL;
