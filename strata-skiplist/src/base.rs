//! The skip list core.

use core::cmp;
use core::fmt;
use core::ops::Bound;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use strata_pool::{LevelAlloc, PoolManager, MAX_LEVEL, NUM_LEVELS};

use crate::builder::Builder;
use crate::comparator::{BasicComparator, Comparator};
use crate::error::Error;
use crate::handle::Handle;
use crate::level::{LevelGenerator, DEFAULT_SEED};
use crate::node::{node_layout, Link, Node};

type NodePtr<K, V> = NonNull<Node<K, V>>;

/// Predecessors of a position at every level. `None` stands for the head.
type Preds<K, V> = [Option<NodePtr<K, V>>; NUM_LEVELS];

/// The ends of every level, and the highest level in use.
///
/// Node towers are only read with this state locked for reading, and only
/// written with it locked for writing.
struct State<K, V> {
    /// The highest level any node is linked at. Never decreases.
    level: u8,
    head: Preds<K, V>,
    tail: Preds<K, V>,
    /// The sequence number of the next linked node.
    seq: u64,
}

impl<K, V> State<K, V> {
    fn new() -> State<K, V> {
        State {
            level: 0,
            head: [None; NUM_LEVELS],
            tail: [None; NUM_LEVELS],
            seq: 0,
        }
    }

    fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    /// Returns the successor of `node` at `level`. `None` as `node` means the head.
    #[inline]
    unsafe fn next(&self, node: Option<NodePtr<K, V>>, level: u8) -> Option<NodePtr<K, V>> {
        match node {
            None => self.head[level as usize],
            Some(n) => unsafe { (*Node::link(n, level)).next },
        }
    }

    /// Returns the predecessor of `node` at `level`. `None` as `node` means the tail.
    #[inline]
    unsafe fn prev(&self, node: Option<NodePtr<K, V>>, level: u8) -> Option<NodePtr<K, V>> {
        match node {
            None => self.tail[level as usize],
            Some(n) => unsafe { (*Node::link(n, level)).prev },
        }
    }

    unsafe fn set_next(
        &mut self,
        node: Option<NodePtr<K, V>>,
        level: u8,
        to: Option<NodePtr<K, V>>,
    ) {
        match node {
            None => self.head[level as usize] = to,
            Some(n) => unsafe { (*Node::link(n, level)).next = to },
        }
    }

    unsafe fn set_prev(
        &mut self,
        node: Option<NodePtr<K, V>>,
        level: u8,
        to: Option<NodePtr<K, V>>,
    ) {
        match node {
            None => self.tail[level as usize] = to,
            Some(n) => unsafe { (*Node::link(n, level)).prev = to },
        }
    }

    /// Splices `node` in right after `preds` at every level of its tower.
    unsafe fn link(&mut self, node: NodePtr<K, V>, preds: &Preds<K, V>) {
        unsafe {
            let level = node.as_ref().level;
            debug_assert!(level <= self.level);

            for l in 0..=level {
                let prev = preds[l as usize];
                let next = self.next(prev, l);
                Node::link(node, l).write(Link { prev, next });
                self.set_next(prev, l, Some(node));
                self.set_prev(next, l, Some(node));
            }
            node.as_ref().set_linked(true);
        }
    }

    /// Takes `node` out of every level of its tower.
    unsafe fn unlink(&mut self, node: NodePtr<K, V>) {
        unsafe {
            for l in 0..=node.as_ref().level {
                let (prev, next) = {
                    let link = &*Node::link(node, l);
                    (link.prev, link.next)
                };
                self.set_next(prev, l, next);
                self.set_prev(next, l, prev);
            }
            node.as_ref().set_linked(false);
        }
    }
}

/// Frequently modified data associated with a skip list.
struct HotData {
    /// The number of entries in the skip list.
    len: AtomicUsize,

    /// Draws the levels of new nodes.
    levels: LevelGenerator,
}

/// The shared core of a [`SkipList`], co-owned by every [`Handle`].
pub(crate) struct Inner<K, V, C, A: LevelAlloc> {
    state: RwLock<State<K, V>>,
    hot_data: CachePadded<HotData>,
    comparator: C,
    alloc: Arc<A>,
}

unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync, A: LevelAlloc> Send
    for Inner<K, V, C, A>
{
}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync, A: LevelAlloc> Sync
    for Inner<K, V, C, A>
{
}

impl<K, V, C, A: LevelAlloc> Inner<K, V, C, A> {
    fn new(comparator: C, alloc: Arc<A>, seed: u64) -> Inner<K, V, C, A> {
        Inner {
            state: RwLock::new(State::new()),
            hot_data: CachePadded::new(HotData {
                len: AtomicUsize::new(0),
                levels: LevelGenerator::new(seed),
            }),
            comparator,
            alloc,
        }
    }

    pub(crate) fn alloc(&self) -> &A {
        &self.alloc
    }

    /// Takes a reference to `node` for a new handle.
    #[inline]
    fn pin(node: NodePtr<K, V>) -> NodePtr<K, V> {
        // SAFETY: callers hold the structural lock, so the linked node is alive.
        unsafe { node.as_ref().acquire() };
        node
    }

    /// Returns the predecessors of a search position at every level up to the list's level.
    ///
    /// The position lies before all keys equal to `key`, or after them if `after_equal` is set.
    /// The search walks in from the head, or from the tail if `from_back` is set. Both walks
    /// find the same position.
    fn search<Q>(&self, state: &State<K, V>, key: &Q, after_equal: bool, from_back: bool) -> Preds<K, V>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        Self::search_by(state, from_back, |n| {
            // SAFETY: nodes reachable from the state are alive while it is locked.
            let k = unsafe { &n.as_ref().key };
            match self.comparator.compare(k, key) {
                cmp::Ordering::Less => true,
                cmp::Ordering::Equal => after_equal,
                cmp::Ordering::Greater => false,
            }
        })
    }

    /// Returns the predecessors of the position right after the nodes for which `before`
    /// holds. Those nodes must form a prefix of the list.
    fn search_by<F>(state: &State<K, V>, from_back: bool, before: F) -> Preds<K, V>
    where
        F: Fn(NodePtr<K, V>) -> bool,
    {
        let mut preds = [None; NUM_LEVELS];

        unsafe {
            if from_back {
                let mut succ = None;
                for level in (0..=state.level).rev() {
                    while let Some(n) = state.prev(succ, level) {
                        if before(n) {
                            break;
                        }
                        succ = Some(n);
                    }
                    preds[level as usize] = state.prev(succ, level);
                }
            } else {
                let mut pred = None;
                for level in (0..=state.level).rev() {
                    while let Some(n) = state.next(pred, level) {
                        if !before(n) {
                            break;
                        }
                        pred = Some(n);
                    }
                    preds[level as usize] = pred;
                }
            }
        }
        preds
    }

    /// Returns the first node above `bound`.
    fn lower_bound_node<Q>(&self, state: &State<K, V>, bound: Bound<&Q>) -> Option<NodePtr<K, V>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        let preds = match bound {
            Bound::Unbounded => return state.head[0],
            Bound::Included(key) => self.search(state, key, false, false),
            Bound::Excluded(key) => self.search(state, key, true, false),
        };
        unsafe { state.next(preds[0], 0) }
    }

    /// Returns the last node below `bound`.
    fn upper_bound_node<Q>(&self, state: &State<K, V>, bound: Bound<&Q>) -> Option<NodePtr<K, V>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        match bound {
            Bound::Unbounded => state.tail[0],
            Bound::Included(key) => self.search(state, key, true, true)[0],
            Bound::Excluded(key) => self.search(state, key, false, true)[0],
        }
    }

    fn matches<Q>(&self, node: NodePtr<K, V>, key: &Q) -> bool
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        let k = unsafe { &node.as_ref().key };
        self.comparator.compare(k, key) == cmp::Ordering::Equal
    }

    fn find<Q>(&self, key: &Q, from_back: bool) -> Option<NodePtr<K, V>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        let state = self.state.read();
        let node = if from_back {
            self.upper_bound_node(&state, Bound::Included(key))?
        } else {
            self.lower_bound_node(&state, Bound::Included(key))?
        };
        if self.matches(node, key) {
            Some(Self::pin(node))
        } else {
            None
        }
    }

    fn bound<Q>(&self, bound: Bound<&Q>, upper: bool) -> Option<NodePtr<K, V>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        let state = self.state.read();
        let node = if upper {
            self.upper_bound_node(&state, bound)
        } else {
            self.lower_bound_node(&state, bound)
        };
        node.map(Self::pin)
    }

    /// Returns the node following `last`, or the front if `last` is `None`.
    ///
    /// If `last` has been removed, this continues with the first node that
    /// would have followed it: a greater key, or an equal key inserted later.
    pub(crate) fn seek_next(&self, last: Option<NodePtr<K, V>>) -> Option<NodePtr<K, V>>
    where
        C: Comparator<K>,
    {
        let state = self.state.read();
        let last = match last {
            None => return state.head[0].map(Self::pin),
            // SAFETY: the caller's handle keeps `n` alive.
            Some(n) => unsafe { n.as_ref() },
        };
        if last.is_linked() {
            // SAFETY: `last` is linked, so its tower is part of the locked state.
            return unsafe { state.next(Some(NonNull::from(last)), 0) }.map(Self::pin);
        }

        let preds = Self::search_by(&state, false, |n| {
            // SAFETY: nodes reachable from the state are alive while it is locked.
            let n = unsafe { n.as_ref() };
            match self.comparator.compare(&n.key, &last.key) {
                cmp::Ordering::Less => true,
                cmp::Ordering::Equal => n.seq < last.seq,
                cmp::Ordering::Greater => false,
            }
        });
        unsafe { state.next(preds[0], 0) }.map(Self::pin)
    }

    /// Returns the neighbor of a linked node.
    pub(crate) fn step(
        &self,
        node: NodePtr<K, V>,
        forward: bool,
    ) -> Result<Option<NodePtr<K, V>>, Error> {
        let state = self.state.read();
        unsafe {
            if !node.as_ref().is_linked() {
                return Err(Error::NotFound);
            }
            let next = if forward {
                state.next(Some(node), 0)
            } else {
                state.prev(Some(node), 0)
            };
            Ok(next.map(Self::pin))
        }
    }

    fn end(&self, back: bool) -> Option<NodePtr<K, V>> {
        let state = self.state.read();
        let node = if back { state.tail[0] } else { state.head[0] };
        node.map(Self::pin)
    }

    /// Inserts a node and returns it pinned for a handle, along with whether it
    /// became the front of the list.
    fn insert(
        &self,
        key: K,
        value: V,
        level: Option<u8>,
        from_back: bool,
        unique: bool,
    ) -> Result<(NodePtr<K, V>, bool), Error>
    where
        C: Comparator<K>,
    {
        let drawn = match level {
            Some(level) => {
                assert!(level <= MAX_LEVEL, "level {} out of range", level);
                level
            }
            None => self.hot_data.levels.random_level(),
        };

        let mut state = self.state.write();
        let preds = self.search(&state, &key, true, from_back);

        if unique {
            if let Some(p) = preds[0] {
                if self.matches(p, &key) {
                    return Err(Error::DuplicateKey);
                }
            }
        }

        // Drawn levels may only raise the list by one.
        let level = match level {
            Some(_) => drawn,
            None => cmp::min(drawn, state.level + 1),
        };
        if level > state.level {
            tracing::debug!(from = state.level, to = level, "raised skip list level");
            state.level = level;
        }

        let seq = state.next_seq();
        let slot = self.alloc.allocate(level);
        let node = unsafe {
            let node = Node::init(slot, key, value, seq, level);
            state.link(node, &preds);
            node
        };
        self.hot_data.len.fetch_add(1, Ordering::Relaxed);

        Ok((Self::pin(node), preds[0].is_none()))
    }

    /// Replaces the linked `node` with a node holding `key` and a clone of its
    /// value, at the same level. Returns the new node pinned for a handle,
    /// along with whether it became the front of the list.
    fn update(
        &self,
        node: NodePtr<K, V>,
        key: K,
        from_back: bool,
        unique: bool,
    ) -> Result<(NodePtr<K, V>, bool), Error>
    where
        C: Comparator<K>,
        V: Clone,
    {
        let mut state = self.state.write();
        if unsafe { !node.as_ref().is_linked() } {
            return Err(Error::NotFound);
        }

        if unique {
            let mut curr = self.lower_bound_node(&state, Bound::Included(&key));
            while let Some(n) = curr {
                if !self.matches(n, &key) {
                    break;
                }
                if n != node {
                    return Err(Error::DuplicateKey);
                }
                curr = unsafe { state.next(Some(n), 0) };
            }
        }

        let (value, level) = unsafe { (node.as_ref().value.clone(), node.as_ref().level) };
        unsafe { state.unlink(node) };
        let preds = self.search(&state, &key, true, from_back);

        let seq = state.next_seq();
        let slot = self.alloc.allocate(level);
        let moved = unsafe {
            let moved = Node::init(slot, key, value, seq, level);
            state.link(moved, &preds);
            moved
        };
        let moved = Self::pin(moved);
        drop(state);

        unsafe { Node::release(node, self.alloc()) };
        Ok((moved, preds[0].is_none()))
    }

    /// Appends a node at `level` without comparing keys.
    ///
    /// The caller must make sure `key` is not less than the current back.
    fn push_back(&self, key: K, value: V, level: u8) {
        let mut state = self.state.write();
        if level > state.level {
            state.level = level;
        }
        let preds = state.tail;
        let seq = state.next_seq();

        let slot = self.alloc.allocate(level);
        unsafe {
            let node = Node::init(slot, key, value, seq, level);
            state.link(node, &preds);
        }
        self.hot_data.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Unlinks `node` and drops the list's reference to it.
    pub(crate) fn remove(&self, node: NodePtr<K, V>) -> Result<(), Error> {
        let mut state = self.state.write();
        unsafe {
            if !node.as_ref().is_linked() {
                return Err(Error::NotFound);
            }
            state.unlink(node);
        }
        self.hot_data.len.fetch_sub(1, Ordering::Relaxed);
        drop(state);

        unsafe { Node::release(node, self.alloc()) };
        Ok(())
    }

    /// Unlinks the front or back node. The list's reference passes to the caller.
    fn pop(&self, back: bool) -> Option<NodePtr<K, V>> {
        let mut state = self.state.write();
        let node = if back { state.tail[0] } else { state.head[0] }?;
        unsafe { state.unlink(node) };
        self.hot_data.len.fetch_sub(1, Ordering::Relaxed);
        Some(node)
    }

    /// Unlinks every node. The list's references pass to the caller.
    fn drain(&self) -> Vec<NodePtr<K, V>> {
        let mut state = self.state.write();
        let mut nodes = Vec::with_capacity(self.hot_data.len.load(Ordering::Relaxed));

        let mut curr = state.head[0];
        while let Some(n) = curr {
            unsafe {
                curr = state.next(Some(n), 0);
                n.as_ref().set_linked(false);
            }
            nodes.push(n);
        }

        state.head = [None; NUM_LEVELS];
        state.tail = [None; NUM_LEVELS];
        self.hot_data.len.store(0, Ordering::Relaxed);
        nodes
    }
}

impl<K, V, C, A: LevelAlloc> Drop for Inner<K, V, C, A> {
    fn drop(&mut self) {
        tracing::trace!(
            len = self.hot_data.len.load(Ordering::Relaxed),
            "dropping skip list"
        );

        let state = self.state.get_mut();
        let mut curr = state.head[0];
        while let Some(n) = curr {
            unsafe {
                // No handles are left, so the list holds the only reference.
                curr = state.next(Some(n), 0);
                Node::release(n, &*self.alloc);
            }
        }
    }
}

/// Returns an error if `alloc` hands out slots too small or too loosely
/// aligned for nodes with keys `K` and values `V`.
fn check_allocator<K, V, A: LevelAlloc + ?Sized>(alloc: &A) -> Result<(), Error> {
    for level in 0..=MAX_LEVEL {
        let required = node_layout::<K, V>(level);
        let provided = alloc.slot_layout(level);
        if provided.size() < required.size() || provided.align() < required.align() {
            return Err(Error::IncompatibleAllocator {
                level,
                required,
                provided,
            });
        }
    }
    Ok(())
}

/// An ordered, thread-safe multimap built as a skip list.
///
/// Entries are kept sorted by key according to the comparator `C`. Equal
/// keys are allowed: a new entry is placed after every entry with an equal
/// key, so ties keep their insertion order.
///
/// Lookups take a shared structural lock, insertions and removals take it
/// exclusively. Node memory comes from the allocator `A`, by default a
/// [`PoolManager`] owned by this list.
///
/// Every operation returning an entry returns a [`Handle`], which pins the
/// entry's memory: its key and value stay readable for as long as the handle
/// lives, even if the entry is removed from the list in the meantime.
///
/// ```
/// use strata_skiplist::SkipList;
///
/// let list = SkipList::new();
/// list.insert(5, "five");
/// list.insert(3, "three");
/// list.insert(8, "eight");
/// let again = list.insert(3, "three again");
///
/// let order = list.iter().map(|h| *h.value()).collect::<Vec<_>>();
/// assert_eq!(order, ["three", "three again", "five", "eight"]);
///
/// list.remove(&again).unwrap();
/// assert_eq!(*again.value(), "three again");
/// assert_eq!(list.len(), 3);
/// ```
pub struct SkipList<K, V, C = BasicComparator, A: LevelAlloc = PoolManager> {
    inner: Arc<Inner<K, V, C, A>>,
}

impl<K, V> SkipList<K, V> {
    /// Returns a new, empty skip list.
    pub fn new() -> SkipList<K, V> {
        SkipList::with_comparator(BasicComparator)
    }

    /// Returns a builder for configuring a list.
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<K, V, C> SkipList<K, V, C> {
    /// Returns a new, empty skip list ordered by `comparator`.
    pub fn with_comparator(comparator: C) -> SkipList<K, V, C> {
        let pool = PoolManager::new(node_layout::<K, V>);
        SkipList::from_parts(comparator, Arc::new(pool), DEFAULT_SEED)
    }
}

impl<K, V, C, A: LevelAlloc> SkipList<K, V, C, A> {
    pub(crate) fn from_parts(comparator: C, alloc: Arc<A>, seed: u64) -> SkipList<K, V, C, A> {
        SkipList {
            inner: Arc::new(Inner::new(comparator, alloc, seed)),
        }
    }

    /// Returns a new, empty skip list allocating its nodes from `alloc`.
    ///
    /// The allocator may be shared with other lists. It is kept alive until
    /// this list and all of its handles are dropped.
    ///
    /// Fails if the allocator's slots cannot hold this list's nodes.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use strata_skiplist::{node_layout, BasicComparator, SkipList};
    /// use strata_skiplist::pool::PoolManager;
    ///
    /// let pool = Arc::new(PoolManager::new(node_layout::<u32, String>));
    /// let a = SkipList::<u32, String, _, _>::with_allocator(BasicComparator, pool.clone()).unwrap();
    /// let b = SkipList::<u32, String, _, _>::with_allocator(BasicComparator, pool.clone()).unwrap();
    ///
    /// a.insert(1, "one".to_string());
    /// b.insert(2, "two".to_string());
    /// assert_eq!(pool.outstanding(), 2);
    /// ```
    pub fn with_allocator(comparator: C, alloc: Arc<A>) -> Result<SkipList<K, V, C, A>, Error> {
        SkipList::with_allocator_and_seed(comparator, alloc, DEFAULT_SEED)
    }

    pub(crate) fn with_allocator_and_seed(
        comparator: C,
        alloc: Arc<A>,
        seed: u64,
    ) -> Result<SkipList<K, V, C, A>, Error> {
        check_allocator::<K, V, A>(&alloc)?;
        Ok(SkipList::from_parts(comparator, alloc, seed))
    }

    /// Returns the number of entries in the skip list.
    ///
    /// If the skip list is being concurrently modified, consider the returned number just an
    /// approximation without any guarantees.
    pub fn len(&self) -> usize {
        self.inner.hot_data.len.load(Ordering::Relaxed)
    }

    /// Returns `true` if the skip list is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the highest level any entry has been linked at.
    pub fn level(&self) -> u8 {
        self.inner.state.read().level
    }

    /// Returns the allocator nodes are drawn from.
    pub fn allocator(&self) -> &Arc<A> {
        &self.inner.alloc
    }

    /// Returns the comparator.
    pub fn comparator(&self) -> &C {
        &self.inner.comparator
    }

    fn handle(&self, node: NodePtr<K, V>) -> Handle<K, V, C, A> {
        // SAFETY: every node passed here carries a reference for the handle.
        unsafe { Handle::adopt(self.inner.clone(), node) }
    }

    fn check_owner(&self, handle: &Handle<K, V, C, A>) -> Result<(), Error> {
        if Arc::ptr_eq(&self.inner, handle.list()) {
            Ok(())
        } else {
            Err(Error::ForeignHandle)
        }
    }

    /// Returns the entry with the smallest key.
    pub fn front(&self) -> Option<Handle<K, V, C, A>> {
        self.inner.end(false).map(|n| self.handle(n))
    }

    /// Returns the entry with the largest key.
    pub fn back(&self) -> Option<Handle<K, V, C, A>> {
        self.inner.end(true).map(|n| self.handle(n))
    }

    /// Returns the first entry with a key equal to `key`.
    pub fn find<Q>(&self, key: &Q) -> Option<Handle<K, V, C, A>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        self.inner.find(key, false).map(|n| self.handle(n))
    }

    /// Returns the last entry with a key equal to `key`, searching from the back.
    pub fn find_from_back<Q>(&self, key: &Q) -> Option<Handle<K, V, C, A>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        self.inner.find(key, true).map(|n| self.handle(n))
    }

    /// Returns `true` if the list contains an entry with a key equal to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        let state = self.inner.state.read();
        self.inner
            .lower_bound_node(&state, Bound::Included(key))
            .map_or(false, |n| self.inner.matches(n, key))
    }

    /// Returns the lowest entry whose key is above the given bound.
    pub fn lower_bound<Q>(&self, bound: Bound<&Q>) -> Option<Handle<K, V, C, A>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        self.inner.bound(bound, false).map(|n| self.handle(n))
    }

    /// Returns the highest entry whose key is below the given bound.
    pub fn upper_bound<Q>(&self, bound: Bound<&Q>) -> Option<Handle<K, V, C, A>>
    where
        C: Comparator<K, Q>,
        Q: ?Sized,
    {
        self.inner.bound(bound, true).map(|n| self.handle(n))
    }

    /// Returns the entry following `handle`'s.
    ///
    /// Fails with [`Error::NotFound`] if the entry was removed.
    pub fn next(&self, handle: &Handle<K, V, C, A>) -> Result<Option<Handle<K, V, C, A>>, Error> {
        self.check_owner(handle)?;
        Ok(self.inner.step(handle.node(), true)?.map(|n| self.handle(n)))
    }

    /// Returns the entry preceding `handle`'s.
    ///
    /// Fails with [`Error::NotFound`] if the entry was removed.
    pub fn prev(&self, handle: &Handle<K, V, C, A>) -> Result<Option<Handle<K, V, C, A>>, Error> {
        self.check_owner(handle)?;
        Ok(self.inner.step(handle.node(), false)?.map(|n| self.handle(n)))
    }

    /// Removes `handle`'s entry from the list.
    ///
    /// The handle itself stays valid. Its key and value are dropped once the
    /// last handle to the entry goes away.
    ///
    /// Fails with [`Error::NotFound`] if the entry was already removed, and
    /// with [`Error::ForeignHandle`] if the handle belongs to another list.
    pub fn remove(&self, handle: &Handle<K, V, C, A>) -> Result<(), Error> {
        self.check_owner(handle)?;
        self.inner.remove(handle.node())
    }

    /// Removes the entry with the smallest key and returns it.
    pub fn pop_front(&self) -> Option<Handle<K, V, C, A>> {
        self.inner.pop(false).map(|n| self.handle(n))
    }

    /// Removes the entry with the largest key and returns it.
    pub fn pop_back(&self) -> Option<Handle<K, V, C, A>> {
        self.inner.pop(true).map(|n| self.handle(n))
    }

    /// Removes every entry and returns them in order.
    pub fn remove_all(&self) -> Vec<Handle<K, V, C, A>> {
        self.inner
            .drain()
            .into_iter()
            .map(|n| self.handle(n))
            .collect()
    }

    /// Removes every entry and returns how many were removed.
    pub fn clear(&self) -> usize {
        self.remove_all().len()
    }
}

impl<K, V, C, A> SkipList<K, V, C, A>
where
    C: Comparator<K>,
    A: LevelAlloc,
{
    /// Inserts a `key`-`value` pair and returns a handle to the new entry.
    ///
    /// The entry is placed after every entry with an equal key.
    pub fn insert(&self, key: K, value: V) -> Handle<K, V, C, A> {
        self.insert_full(key, value).0
    }

    /// Inserts a `key`-`value` pair, searching for its position from the back.
    ///
    /// The entry ends up in the same position as with [`insert`], but the
    /// search is faster when most insertions happen near the back, such as
    /// with increasing timestamps.
    ///
    /// [`insert`]: SkipList::insert
    pub fn insert_from_back(&self, key: K, value: V) -> Handle<K, V, C, A> {
        let (node, _) = self.insert_internal(key, value, None, true, false);
        self.handle(node)
    }

    /// Inserts a `key`-`value` pair and also returns whether the new entry is
    /// now the front of the list.
    pub fn insert_full(&self, key: K, value: V) -> (Handle<K, V, C, A>, bool) {
        let (node, front) = self.insert_internal(key, value, None, false, false);
        (self.handle(node), front)
    }

    /// Inserts a `key`-`value` pair with a tower of exactly `level`.
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than [`MAX_LEVEL`].
    pub fn insert_at_level(&self, key: K, value: V, level: u8) -> Handle<K, V, C, A> {
        let (node, _) = self.insert_internal(key, value, Some(level), false, false);
        self.handle(node)
    }

    /// Like [`insert_at_level`](SkipList::insert_at_level), unless an entry
    /// with an equal key exists.
    ///
    /// # Panics
    ///
    /// Panics if `level` is greater than [`MAX_LEVEL`].
    pub fn try_insert_at_level(
        &self,
        key: K,
        value: V,
        level: u8,
    ) -> Result<Handle<K, V, C, A>, Error> {
        let (node, _) = self.inner.insert(key, value, Some(level), false, true)?;
        Ok(self.handle(node))
    }

    /// Inserts a `key`-`value` pair unless an entry with an equal key exists.
    ///
    /// On [`Error::DuplicateKey`] the list is left unchanged and `key` and
    /// `value` are dropped.
    pub fn try_insert(&self, key: K, value: V) -> Result<Handle<K, V, C, A>, Error> {
        let (node, _) = self.inner.insert(key, value, None, false, true)?;
        Ok(self.handle(node))
    }

    /// Like [`try_insert`](SkipList::try_insert), searching from the back.
    pub fn try_insert_from_back(&self, key: K, value: V) -> Result<Handle<K, V, C, A>, Error> {
        let (node, _) = self.inner.insert(key, value, None, true, true)?;
        Ok(self.handle(node))
    }

    /// Moves `handle`'s entry to `key`. Returns a handle to the moved entry,
    /// along with whether it is now the front of the list.
    ///
    /// Keys never change in place: the entry is replaced by a new one holding
    /// a clone of its value, placed after every entry with an equal key. The
    /// given handle then refers to the removed entry and keeps the old key.
    ///
    /// Fails with [`Error::NotFound`] if the entry was already removed, and
    /// with [`Error::ForeignHandle`] if the handle belongs to another list.
    ///
    /// ```
    /// use strata_skiplist::SkipList;
    ///
    /// let timers = SkipList::new();
    /// let first = timers.insert(10, "first");
    /// timers.insert(20, "second");
    ///
    /// let (moved, front) = timers.update(&first, 30).unwrap();
    /// assert!(!front);
    /// assert_eq!((*moved.key(), *moved.value()), (30, "first"));
    /// assert!(first.is_removed());
    /// assert_eq!(*timers.front().unwrap().key(), 20);
    /// ```
    pub fn update(
        &self,
        handle: &Handle<K, V, C, A>,
        key: K,
    ) -> Result<(Handle<K, V, C, A>, bool), Error>
    where
        V: Clone,
    {
        self.update_internal(handle, key, false, false)
    }

    /// Like [`update`](SkipList::update), searching for the new position from the back.
    pub fn update_from_back(
        &self,
        handle: &Handle<K, V, C, A>,
        key: K,
    ) -> Result<(Handle<K, V, C, A>, bool), Error>
    where
        V: Clone,
    {
        self.update_internal(handle, key, true, false)
    }

    /// Like [`update`](SkipList::update), unless another entry has a key equal
    /// to `key`.
    ///
    /// On [`Error::DuplicateKey`] the list is left unchanged.
    pub fn try_update(
        &self,
        handle: &Handle<K, V, C, A>,
        key: K,
    ) -> Result<(Handle<K, V, C, A>, bool), Error>
    where
        V: Clone,
    {
        self.update_internal(handle, key, false, true)
    }

    /// Like [`try_update`](SkipList::try_update), searching from the back.
    pub fn try_update_from_back(
        &self,
        handle: &Handle<K, V, C, A>,
        key: K,
    ) -> Result<(Handle<K, V, C, A>, bool), Error>
    where
        V: Clone,
    {
        self.update_internal(handle, key, true, true)
    }

    fn update_internal(
        &self,
        handle: &Handle<K, V, C, A>,
        key: K,
        from_back: bool,
        unique: bool,
    ) -> Result<(Handle<K, V, C, A>, bool), Error>
    where
        V: Clone,
    {
        self.check_owner(handle)?;
        let (node, front) = self.inner.update(handle.node(), key, from_back, unique)?;
        Ok((self.handle(node), front))
    }

    fn insert_internal(
        &self,
        key: K,
        value: V,
        level: Option<u8>,
        from_back: bool,
        unique: bool,
    ) -> (NodePtr<K, V>, bool) {
        match self.inner.insert(key, value, level, from_back, unique) {
            Ok(inserted) => inserted,
            Err(_) => unreachable!("non-unique insertion cannot fail"),
        }
    }

    /// Returns an iterator over all entries in the skip list.
    ///
    /// The iterator takes the structural lock for each step only, so the list
    /// may change while it is iterated. If the last yielded entry gets removed,
    /// iteration continues with the entry that would have followed it: the
    /// next entry with an equal key, or else the first with a greater key.
    pub fn iter(&self) -> Iter<'_, K, V, C, A> {
        Iter {
            parent: self,
            last: None,
            done: false,
        }
    }
}

impl<K, V, C, A> Clone for SkipList<K, V, C, A>
where
    K: Clone,
    V: Clone,
    C: Clone,
    A: LevelAlloc,
{
    /// Copies every entry into a new list sharing this list's allocator.
    ///
    /// Entries keep their levels, so the copy has the same shape.
    fn clone(&self) -> SkipList<K, V, C, A> {
        let seed = self.inner.hot_data.levels.seed();
        let copy = SkipList::from_parts(self.inner.comparator.clone(), self.inner.alloc.clone(), seed);

        let state = self.inner.state.read();
        let mut curr = state.head[0];
        while let Some(n) = curr {
            unsafe {
                let node = n.as_ref();
                copy.inner
                    .push_back(node.key.clone(), node.value.clone(), node.level);
                curr = state.next(Some(n), 0);
            }
        }
        drop(state);
        copy
    }
}

impl<K, V, C, A> PartialEq for SkipList<K, V, C, A>
where
    K: PartialEq,
    V: PartialEq,
    C: Comparator<K>,
    A: LevelAlloc,
{
    fn eq(&self, other: &SkipList<K, V, C, A>) -> bool {
        let mut a = self.iter();
        let mut b = other.iter();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x.key() == y.key() && x.value() == y.value() => {}
                _ => return false,
            }
        }
    }
}

impl<K, V, C, A> Eq for SkipList<K, V, C, A>
where
    K: Eq,
    V: Eq,
    C: Comparator<K>,
    A: LevelAlloc,
{
}

impl<K, V, C, A> fmt::Debug for SkipList<K, V, C, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    C: Comparator<K>,
    A: LevelAlloc,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for h in self.iter() {
            m.entry(h.key(), h.value());
        }
        m.finish()
    }
}

impl<K, V, C: Default> Default for SkipList<K, V, C> {
    fn default() -> SkipList<K, V, C> {
        SkipList::with_comparator(C::default())
    }
}

impl<K, V, C, A> Extend<(K, V)> for SkipList<K, V, C, A>
where
    C: Comparator<K>,
    A: LevelAlloc,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K, V, C> FromIterator<(K, V)> for SkipList<K, V, C>
where
    C: Comparator<K> + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> SkipList<K, V, C> {
        let mut list = SkipList::default();
        list.extend(iter);
        list
    }
}

impl<'a, K, V, C, A> IntoIterator for &'a SkipList<K, V, C, A>
where
    C: Comparator<K>,
    A: LevelAlloc,
{
    type Item = Handle<K, V, C, A>;
    type IntoIter = Iter<'a, K, V, C, A>;

    fn into_iter(self) -> Iter<'a, K, V, C, A> {
        self.iter()
    }
}

/// An iterator over the entries of a `SkipList`.
pub struct Iter<'a, K, V, C = BasicComparator, A: LevelAlloc = PoolManager> {
    parent: &'a SkipList<K, V, C, A>,
    last: Option<Handle<K, V, C, A>>,
    done: bool,
}

impl<'a, K, V, C, A> Iterator for Iter<'a, K, V, C, A>
where
    C: Comparator<K>,
    A: LevelAlloc,
{
    type Item = Handle<K, V, C, A>;

    fn next(&mut self) -> Option<Handle<K, V, C, A>> {
        if self.done {
            return None;
        }
        let last = self.last.as_ref().map(Handle::node);
        match self.parent.inner.seek_next(last) {
            Some(n) => {
                let h = self.parent.handle(n);
                self.last = Some(h.clone());
                Some(h)
            }
            None => {
                self.done = true;
                self.last = None;
                None
            }
        }
    }
}

impl<'a, K, V, C, A: LevelAlloc> fmt::Debug for Iter<'a, K, V, C, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("last", &self.last)
            .field("done", &self.done)
            .finish()
    }
}
