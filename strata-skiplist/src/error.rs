use core::alloc::Layout;

use thiserror::Error;

/// Errors returned by [`SkipList`](crate::SkipList) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The handle's entry has already been removed from the list.
    #[error("entry is no longer in the list")]
    NotFound,

    /// The handle was obtained from a different list.
    #[error("handle belongs to a different list")]
    ForeignHandle,

    /// An entry with an equal key is already in the list.
    #[error("an entry with an equal key is already in the list")]
    DuplicateKey,

    /// A shared allocator's slots cannot hold this list's nodes.
    #[error(
        "allocator slots at level {level} ({} bytes, align {}) cannot hold nodes of {} bytes, align {}",
        .provided.size(),
        .provided.align(),
        .required.size(),
        .required.align()
    )]
    IncompatibleAllocator {
        /// The first level found incompatible.
        level: u8,
        /// The layout of a node at that level.
        required: Layout,
        /// The layout of the allocator's slots at that level.
        provided: Layout,
    },
}
