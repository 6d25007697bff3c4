use core::alloc::Layout;
use core::ptr::NonNull;
use std::alloc;

use thiserror::Error;

/// A block source could not satisfy a replenishment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error(
    "block source could not supply {} bytes aligned to {}",
    .layout.size(),
    .layout.align()
)]
pub struct AllocError {
    layout: Layout,
}

impl AllocError {
    /// Creates an error for a failed request of `layout`.
    pub fn new(layout: Layout) -> AllocError {
        AllocError { layout }
    }

    /// Returns the layout of the request that failed.
    pub fn layout(&self) -> Layout {
        self.layout
    }
}

/// The raw memory behind a [`PoolManager`].
///
/// Pools only talk to their block source when a free list runs dry, and they
/// do so while holding the manager's block lock, so implementations don't need
/// to synchronize on their own.
///
/// [`PoolManager`]: crate::PoolManager
pub trait BlockSource: Send {
    /// Acquires a block of memory fitting `layout`.
    ///
    /// `layout` never has a zero size.
    fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError>;

    /// Returns a block to this source.
    ///
    /// # Safety
    ///
    /// `block` must have been returned by [`acquire`] on this source with the
    /// same `layout`, and must not be used afterwards.
    ///
    /// [`acquire`]: BlockSource::acquire
    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout);
}

/// A block source backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBlocks;

impl BlockSource for SystemBlocks {
    fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        assert!(layout.size() != 0, "zero-sized block requested");
        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
        // SAFETY: the caller guarantees `block` came from `acquire(layout)`.
        unsafe { alloc::dealloc(block.as_ptr(), layout) }
    }
}

/// A block source that hands out at most `limit` bytes at a time.
///
/// Requests that would push the total above the limit fail with
/// [`AllocError`]. Released blocks count against the limit no longer.
#[derive(Debug)]
pub struct Bounded<B = SystemBlocks> {
    inner: B,
    limit: usize,
    used: usize,
}

impl Bounded<SystemBlocks> {
    /// Creates a source that draws at most `limit` bytes from the global allocator.
    pub fn new(limit: usize) -> Bounded<SystemBlocks> {
        Bounded::with_source(SystemBlocks, limit)
    }
}

impl<B> Bounded<B> {
    /// Creates a source that draws at most `limit` bytes from `inner`.
    pub fn with_source(inner: B, limit: usize) -> Bounded<B> {
        Bounded {
            inner,
            limit,
            used: 0,
        }
    }

    /// Returns the number of bytes currently handed out.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Returns the byte limit.
    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl<B: BlockSource> BlockSource for Bounded<B> {
    fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, AllocError> {
        match self.used.checked_add(layout.size()) {
            Some(total) if total <= self.limit => {
                let block = self.inner.acquire(layout)?;
                self.used = total;
                Ok(block)
            }
            _ => Err(AllocError::new(layout)),
        }
    }

    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
        self.used -= layout.size();
        // SAFETY: forwarded from the caller.
        unsafe { self.inner.release(block, layout) }
    }
}
