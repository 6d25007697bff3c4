use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::ptr::{self, addr_of_mut, NonNull};
use core::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use std::process;

use strata_pool::{LevelAlloc, MAX_LEVEL};

/// The neighbors of a node at one level. `None` stands for the head (as
/// `prev`) or the tail (as `next`).
pub(crate) struct Link<K, V> {
    pub(crate) prev: Option<NonNull<Node<K, V>>>,
    pub(crate) next: Option<NonNull<Node<K, V>>>,
}

/// A skip list node.
///
/// This struct is marked with `repr(C)` so that the specific order of fields is enforced.
/// It is important that the tower is the last field since it is dynamically sized: a node at
/// level `n` is allocated with room for `n + 1` links.
#[repr(C)]
pub(crate) struct Node<K, V> {
    /// The key.
    pub(crate) key: K,

    /// The value.
    pub(crate) value: V,

    /// The insertion order of this node. Orders nodes with equal keys.
    pub(crate) seq: u64,

    /// The number of `Handle`s pointing to this node, plus one while it is linked.
    refs: AtomicUsize,

    /// Whether the node is part of the list. Only written with the structural lock held.
    linked: AtomicBool,

    /// The highest level this node is linked at.
    pub(crate) level: u8,

    /// The tower of links. Only accessed with the structural lock held.
    tower: [UnsafeCell<Link<K, V>>; 0],
}

/// Returns the layout of a node at `level`.
///
/// A custom [`LevelAlloc`] shared between lists must hand out slots at least
/// this large and this aligned.
///
/// # Panics
///
/// Panics if `level` is greater than [`MAX_LEVEL`].
pub fn node_layout<K, V>(level: u8) -> Layout {
    assert!(level <= MAX_LEVEL, "level {} out of range", level);
    Layout::array::<UnsafeCell<Link<K, V>>>(level as usize + 1)
        .and_then(|tower| Layout::new::<Node<K, V>>().extend(tower))
        .map(|(layout, _)| layout.pad_to_align())
        .unwrap_or_else(|_| panic!("node layout at level {} overflows", level))
}

impl<K, V> Node<K, V> {
    /// Writes a fresh, unlinked node into `slot`.
    ///
    /// The reference count starts at 1, the reference the list takes over
    /// when the node is linked.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writes of `node_layout::<K, V>(level)`.
    pub(crate) unsafe fn init(
        slot: NonNull<u8>,
        key: K,
        value: V,
        seq: u64,
        level: u8,
    ) -> NonNull<Self> {
        let node = slot.cast::<Self>();
        let p = node.as_ptr();
        unsafe {
            addr_of_mut!((*p).key).write(key);
            addr_of_mut!((*p).value).write(value);
            addr_of_mut!((*p).seq).write(seq);
            addr_of_mut!((*p).refs).write(AtomicUsize::new(1));
            addr_of_mut!((*p).linked).write(AtomicBool::new(false));
            addr_of_mut!((*p).level).write(level);
            for i in 0..=level {
                Self::link(node, i).write(Link {
                    prev: None,
                    next: None,
                });
            }
        }
        node
    }

    /// Returns a pointer to the link at `level`.
    ///
    /// # Safety
    ///
    /// `node` must be a live node and `level` must not exceed its level.
    #[inline]
    pub(crate) unsafe fn link(node: NonNull<Self>, level: u8) -> *mut Link<K, V> {
        unsafe {
            debug_assert!(level <= (*node.as_ptr()).level);
            let tower = addr_of_mut!((*node.as_ptr()).tower).cast::<UnsafeCell<Link<K, V>>>();
            UnsafeCell::raw_get(tower.add(level as usize))
        }
    }

    /// Returns `true` if the node is part of the list.
    #[inline]
    pub(crate) fn is_linked(&self) -> bool {
        self.linked.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_linked(&self, linked: bool) {
        self.linked.store(linked, Ordering::Release);
    }

    /// Increments the reference count.
    ///
    /// The caller must already own a reference, directly or through the list.
    #[inline]
    pub(crate) fn acquire(&self) {
        let old = self.refs.fetch_add(1, Ordering::Relaxed);
        if old > isize::MAX as usize {
            process::abort();
        }
    }

    /// Decrements the reference count of a node, destroying it if the count becomes zero.
    ///
    /// # Safety
    ///
    /// The caller must own one reference to `node`, and `alloc` must be the
    /// allocator the node was allocated with.
    #[inline]
    pub(crate) unsafe fn release<A: LevelAlloc + ?Sized>(node: NonNull<Self>, alloc: &A) {
        unsafe {
            if node.as_ref().refs.fetch_sub(1, Ordering::Release) == 1 {
                fence(Ordering::Acquire);
                Self::finalize(node, alloc);
            }
        }
    }

    /// Drops the key and value of a node, then returns its slot.
    #[cold]
    unsafe fn finalize<A: LevelAlloc + ?Sized>(node: NonNull<Self>, alloc: &A) {
        let p = node.as_ptr();
        unsafe {
            let level = (*p).level;

            // Return the slot even if a destructor panics.
            let _slot = scopeguard::guard(node.cast::<u8>(), |slot| alloc.deallocate(slot, level));

            ptr::drop_in_place(addr_of_mut!((*p).key));
            ptr::drop_in_place(addr_of_mut!((*p).value));
        }
    }
}
