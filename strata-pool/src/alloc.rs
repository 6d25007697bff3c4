use core::alloc::Layout;
use core::fmt;
use core::ptr::NonNull;
use std::alloc;

use crate::block::{AllocError, BlockSource};
use crate::manager::PoolManager;
use crate::MAX_LEVEL;

/// Allocates memory for skip list nodes, one size class per level.
///
/// # Safety
///
/// `slot_layout` must return the same layout for a level every time it is
/// called. A pointer returned by `try_allocate(level)` must be valid for reads
/// and writes of `slot_layout(level)` until it is passed to `deallocate` with
/// the same level, and must not be handed out again before then.
pub unsafe trait LevelAlloc: Send + Sync {
    /// Returns the layout of a slot at `level`.
    fn slot_layout(&self, level: u8) -> Layout;

    /// Allocates a slot at `level`.
    fn try_allocate(&self, level: u8) -> Result<NonNull<u8>, AllocError>;

    /// Allocates a slot at `level`, aborting through [`handle_alloc_error`] on
    /// failure.
    ///
    /// [`handle_alloc_error`]: std::alloc::handle_alloc_error
    fn allocate(&self, level: u8) -> NonNull<u8> {
        match self.try_allocate(level) {
            Ok(ptr) => ptr,
            Err(err) => alloc::handle_alloc_error(err.layout()),
        }
    }

    /// Returns a slot allocated at `level`.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated by this allocator at the same `level`
    /// and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, level: u8);
}

unsafe impl<B: BlockSource> LevelAlloc for PoolManager<B> {
    fn slot_layout(&self, level: u8) -> Layout {
        PoolManager::slot_layout(self, level)
    }

    fn try_allocate(&self, level: u8) -> Result<NonNull<u8>, AllocError> {
        PoolManager::try_allocate(self, level)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, level: u8) {
        // SAFETY: forwarded from the caller.
        unsafe { PoolManager::deallocate(self, ptr, level) }
    }
}

/// Sends every slot straight to the global allocator.
///
/// Useful as a baseline against [`PoolManager`], and for lists whose nodes
/// should not outlive their removal in a pool.
pub struct Heap {
    layouts: Box<[Layout]>,
}

impl Heap {
    /// Creates a heap allocator whose slots at each level fit `layout(level)`.
    pub fn new<F>(mut layout: F) -> Heap
    where
        F: FnMut(u8) -> Layout,
    {
        let layouts = (0..=MAX_LEVEL)
            .map(|level| {
                let l = layout(level);
                assert!(l.size() != 0, "zero-sized slots at level {}", level);
                l.pad_to_align()
            })
            .collect();
        Heap { layouts }
    }
}

unsafe impl LevelAlloc for Heap {
    fn slot_layout(&self, level: u8) -> Layout {
        assert!(level <= MAX_LEVEL, "level {} out of range", level);
        self.layouts[level as usize]
    }

    fn try_allocate(&self, level: u8) -> Result<NonNull<u8>, AllocError> {
        let layout = self.slot_layout(level);
        // SAFETY: slot layouts have a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(AllocError::new(layout))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, level: u8) {
        let layout = self.slot_layout(level);
        // SAFETY: the caller guarantees `ptr` was allocated at `level`.
        unsafe { alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

impl fmt::Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("Heap { .. }")
    }
}
