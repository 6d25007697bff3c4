use core::fmt;
use core::ptr::NonNull;
use std::sync::Arc;

use strata_pool::{LevelAlloc, PoolManager};

use crate::base::Inner;
use crate::comparator::BasicComparator;
use crate::error::Error;
use crate::node::Node;

/// A reference-counted pin on a skip list entry.
///
/// While a handle lives, its entry's key and value stay valid and readable,
/// whether or not the entry is still in the list. The entry is destroyed,
/// and its memory returned to the list's allocator, once it has been removed
/// and the last handle to it is dropped.
///
/// A handle also keeps the list's core alive, so handles may outlive the
/// [`SkipList`](crate::SkipList) they came from.
///
/// Cloning a handle only bumps a reference count. Handles are identity
/// tokens: use [`Handle::ptr_eq`] to check whether two refer to the same
/// entry.
pub struct Handle<K, V, C = BasicComparator, A: LevelAlloc = PoolManager> {
    list: Arc<Inner<K, V, C, A>>,
    node: NonNull<Node<K, V>>,
}

unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync, A: LevelAlloc> Send
    for Handle<K, V, C, A>
{
}
unsafe impl<K: Send + Sync, V: Send + Sync, C: Send + Sync, A: LevelAlloc> Sync
    for Handle<K, V, C, A>
{
}

impl<K, V, C, A: LevelAlloc> Handle<K, V, C, A> {
    /// Wraps a node reference the caller already owns.
    ///
    /// # Safety
    ///
    /// `node` must belong to `list`, and the caller must pass on one
    /// reference to it.
    pub(crate) unsafe fn adopt(list: Arc<Inner<K, V, C, A>>, node: NonNull<Node<K, V>>) -> Self {
        Handle { list, node }
    }

    pub(crate) fn list(&self) -> &Arc<Inner<K, V, C, A>> {
        &self.list
    }

    pub(crate) fn node(&self) -> NonNull<Node<K, V>> {
        self.node
    }

    fn get(&self) -> &Node<K, V> {
        // SAFETY: the handle's reference keeps the node alive.
        unsafe { self.node.as_ref() }
    }

    /// Returns a reference to the key.
    pub fn key(&self) -> &K {
        &self.get().key
    }

    /// Returns a reference to the value.
    pub fn value(&self) -> &V {
        &self.get().value
    }

    /// Returns the level of the entry's tower.
    pub fn level(&self) -> u8 {
        self.get().level
    }

    /// Returns `true` if the entry has been removed from the list.
    ///
    /// Another thread may remove the entry right after this returns `false`.
    pub fn is_removed(&self) -> bool {
        !self.get().is_linked()
    }

    /// Removes the entry from its list.
    ///
    /// Fails with [`Error::NotFound`] if it was already removed.
    pub fn remove(&self) -> Result<(), Error> {
        self.list.remove(self.node)
    }

    /// Returns the entry following this one.
    ///
    /// Fails with [`Error::NotFound`] if this entry was removed.
    pub fn next(&self) -> Result<Option<Handle<K, V, C, A>>, Error> {
        Ok(self.list.step(self.node, true)?.map(|n| self.sibling(n)))
    }

    /// Returns the entry preceding this one.
    ///
    /// Fails with [`Error::NotFound`] if this entry was removed.
    pub fn prev(&self) -> Result<Option<Handle<K, V, C, A>>, Error> {
        Ok(self.list.step(self.node, false)?.map(|n| self.sibling(n)))
    }

    fn sibling(&self, node: NonNull<Node<K, V>>) -> Handle<K, V, C, A> {
        // SAFETY: `step` pins the nodes it returns.
        unsafe { Handle::adopt(self.list.clone(), node) }
    }

    /// Returns `true` if both handles refer to the same entry.
    pub fn ptr_eq(this: &Handle<K, V, C, A>, other: &Handle<K, V, C, A>) -> bool {
        this.node == other.node
    }
}

impl<K, V, C, A: LevelAlloc> Clone for Handle<K, V, C, A> {
    fn clone(&self) -> Handle<K, V, C, A> {
        self.get().acquire();
        Handle {
            list: self.list.clone(),
            node: self.node,
        }
    }
}

impl<K, V, C, A: LevelAlloc> Drop for Handle<K, V, C, A> {
    fn drop(&mut self) {
        // SAFETY: the handle owns one reference, and the list's allocator is
        // kept alive by `self.list`.
        unsafe { Node::release(self.node, self.list.alloc()) }
    }
}

impl<K, V, C, A: LevelAlloc> fmt::Debug for Handle<K, V, C, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("key", self.key())
            .field("value", self.value())
            .field("removed", &self.is_removed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::SkipList;

    use super::Handle;

    #[test]
    fn pins_after_removal() {
        let s = SkipList::new();
        let a = s.insert("a".to_string(), vec![1, 2, 3]);
        let b = a.clone();
        assert!(Handle::ptr_eq(&a, &b));

        a.remove().unwrap();
        assert!(b.is_removed());
        drop(a);
        assert_eq!(b.key(), "a");
        assert_eq!(b.value(), &[1, 2, 3]);
    }

    #[test]
    fn outlives_list() {
        let s = SkipList::new();
        let h = s.insert(1, "one");
        let other = s.insert(2, "two");
        drop(s);

        assert!(!h.is_removed());
        assert_eq!(*h.next().unwrap().unwrap().value(), "two");
        drop(other);
        assert_eq!(*h.value(), "one");
    }

    #[test]
    fn distinct_entries() {
        let s = SkipList::new();
        let a = s.insert(1, ());
        let b = s.insert(1, ());
        assert!(!Handle::ptr_eq(&a, &b));
        assert!(Handle::ptr_eq(&a, &s.front().unwrap()));
    }

    #[test]
    fn debug() {
        let s = SkipList::new();
        let h = s.insert(1, 'x');
        assert_eq!(format!("{:?}", h), "Handle { key: 1, value: 'x', removed: false }");
        h.remove().unwrap();
        assert_eq!(format!("{:?}", h), "Handle { key: 1, value: 'x', removed: true }");
    }
}
