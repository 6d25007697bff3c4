use core::alloc::Layout;
use core::fmt;
use core::mem;
use core::ops::Range;
use core::ptr::NonNull;

use parking_lot::Mutex;

use crate::block::AllocError;

/// A slot on a free list. Free slots are reused to store the list itself.
struct FreeSlot {
    next: Option<NonNull<FreeSlot>>,
}

struct FreeList {
    head: Option<NonNull<FreeSlot>>,
    /// Slots currently on the list.
    free: usize,
    /// Slots ever carved for this level.
    capacity: usize,
    /// Slots requested by the next replenishment.
    next_batch: usize,
    replenishments: usize,
    /// Address ranges carved for this level, for ownership checks.
    spans: Vec<Range<usize>>,
}

// Free slots are only reachable through the list, which is guarded by a mutex.
unsafe impl Send for FreeList {}

/// A free list of equally sized slots for one level.
pub(crate) struct LevelPool {
    level: u8,
    slot: Layout,
    state: Mutex<FreeList>,
}

impl LevelPool {
    /// Creates an empty pool whose slots fit `object`.
    ///
    /// The slot layout is widened so that a free slot can hold a list link.
    pub(crate) fn new(level: u8, object: Layout, initial_batch: usize) -> LevelPool {
        let slot = Layout::from_size_align(
            object.size().max(mem::size_of::<FreeSlot>()),
            object.align().max(mem::align_of::<FreeSlot>()),
        )
        .map(|l| l.pad_to_align())
        .unwrap_or_else(|_| panic!("slot layout for level {} overflows", level));

        LevelPool {
            level,
            slot,
            state: Mutex::new(FreeList {
                head: None,
                free: 0,
                capacity: 0,
                next_batch: initial_batch.max(1),
                replenishments: 0,
                spans: Vec::new(),
            }),
        }
    }

    pub(crate) fn slot_layout(&self) -> Layout {
        self.slot
    }

    /// Pops a slot, replenishing the list through `refill` when it is empty.
    ///
    /// `refill` receives the layout of a whole batch and is called with this
    /// pool's lock held.
    pub(crate) fn pop<F>(&self, mut refill: F) -> Result<NonNull<u8>, AllocError>
    where
        F: FnMut(Layout) -> Result<NonNull<u8>, AllocError>,
    {
        let mut list = self.state.lock();
        loop {
            if let Some(slot) = list.head {
                // SAFETY: slots on the list are initialized `FreeSlot`s.
                list.head = unsafe { slot.as_ref().next };
                list.free -= 1;
                return Ok(slot.cast());
            }
            self.replenish(&mut list, &mut refill)?;
        }
    }

    /// Pushes a slot back onto the list.
    ///
    /// # Safety
    ///
    /// `ptr` must have been popped from this pool and not pushed since.
    pub(crate) unsafe fn push(&self, ptr: NonNull<u8>) {
        let mut list = self.state.lock();
        debug_assert!(
            list.owns(ptr),
            "slot {:p} does not belong to level {}",
            ptr,
            self.level
        );

        let slot = ptr.cast::<FreeSlot>();
        // SAFETY: the slot is large and aligned enough for a `FreeSlot`.
        unsafe { slot.as_ptr().write(FreeSlot { next: list.head }) };
        list.head = Some(slot);
        list.free += 1;
    }

    fn replenish<F>(&self, list: &mut FreeList, refill: &mut F) -> Result<(), AllocError>
    where
        F: FnMut(Layout) -> Result<NonNull<u8>, AllocError>,
    {
        let count = list.next_batch;
        let size = self
            .slot
            .size()
            .checked_mul(count)
            .ok_or(AllocError::new(self.slot))?;
        let batch = Layout::from_size_align(size, self.slot.align())
            .map_err(|_| AllocError::new(self.slot))?;
        let block = refill(batch)?;

        // Carve back to front so the lowest address ends up on top.
        for i in (0..count).rev() {
            // SAFETY: `i * slot.size()` stays inside the block.
            let slot = unsafe { block.as_ptr().add(i * self.slot.size()) }.cast::<FreeSlot>();
            // SAFETY: the slot is in bounds and suitably aligned.
            unsafe { slot.write(FreeSlot { next: list.head }) };
            list.head = NonNull::new(slot);
        }

        let start = block.as_ptr() as usize;
        list.spans.push(start..start + size);
        list.free += count;
        list.capacity += count;
        list.replenishments += 1;
        list.next_batch = count.saturating_mul(2);

        tracing::debug!(
            level = self.level,
            slots = count,
            bytes = size,
            capacity = list.capacity,
            "replenished level pool"
        );
        Ok(())
    }

    pub(crate) fn stats(&self) -> LevelStats {
        let list = self.state.lock();
        LevelStats {
            level: self.level,
            slot_size: self.slot.size(),
            capacity: list.capacity,
            free: list.free,
            outstanding: list.capacity - list.free,
            replenishments: list.replenishments,
            next_batch: list.next_batch,
        }
    }
}

impl FreeList {
    fn owns(&self, ptr: NonNull<u8>) -> bool {
        let addr = ptr.as_ptr() as usize;
        self.spans.iter().any(|span| span.contains(&addr))
    }
}

impl fmt::Debug for LevelPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LevelPool")
            .field("level", &self.level)
            .field("slot", &self.slot)
            .finish_non_exhaustive()
    }
}

/// A snapshot of one level's pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelStats {
    /// The level this pool serves.
    pub level: u8,
    /// The size of one slot in bytes.
    pub slot_size: usize,
    /// Slots carved for this level so far.
    pub capacity: usize,
    /// Slots currently on the free list.
    pub free: usize,
    /// Slots handed out and not yet returned.
    pub outstanding: usize,
    /// How many times the free list was replenished.
    pub replenishments: usize,
    /// Slots the next replenishment will request.
    pub next_batch: usize,
}
