//! Traits for key comparison in skip lists.

use core::borrow::Borrow;
use core::cmp::Ordering;
use core::fmt;

/// Key ordering trait.
///
/// This trait allows for very flexible comparison of objects. You may
/// borrow/dereference `L` and `R` using `Borrow` or another trait. The trait
/// takes a `self` parameter, which you can use to change how the operands are
/// compared. For example, you can order timestamps newest-first, or you can
/// use `Box<dyn Comparator<L, R>>` to let the user of your code supply a
/// custom comparison function.
///
/// The ordering must be a strict weak order and must agree for every `R` a
/// list is queried with. A comparator that breaks this leaves the list in an
/// unspecified (but memory-safe) order.
///
/// ## Example
/// ```
/// use std::cmp::Ordering;
///
/// use strata_skiplist::comparator::Comparator;
///
/// struct CaseInsensitive;
///
/// impl Comparator<str> for CaseInsensitive {
///     fn compare(&self, lhs: &str, rhs: &str) -> Ordering {
///         let lhs = lhs.bytes().map(|b| b.to_ascii_lowercase());
///         let rhs = rhs.bytes().map(|b| b.to_ascii_lowercase());
///         lhs.cmp(rhs)
///     }
/// }
///
/// assert_eq!(CaseInsensitive.compare("Apple", "apple"), Ordering::Equal);
/// ```
pub trait Comparator<L: ?Sized, R: ?Sized = L> {
    /// Compare `lhs` to `rhs` and return their ordering.
    fn compare(&self, lhs: &L, rhs: &R) -> Ordering;
}

impl<L: ?Sized, R: ?Sized, C: Comparator<L, R> + ?Sized> Comparator<L, R> for &C {
    #[inline]
    fn compare(&self, lhs: &L, rhs: &R) -> Ordering {
        (**self).compare(lhs, rhs)
    }
}

/// This comparator falls back on the standard library `Borrow` and `Ord`
/// traits. When used in a skip list, this results in the same lookup behavior
/// as the standard `BTreeMap` interface.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicComparator;

impl<K: ?Sized, Q: ?Sized> Comparator<K, Q> for BasicComparator
where
    K: Borrow<Q>,
    Q: Ord,
{
    #[inline]
    fn compare(&self, lhs: &K, rhs: &Q) -> Ordering {
        lhs.borrow().cmp(rhs)
    }
}

/// Adapts a closure into a [`Comparator`].
///
/// ```
/// use std::cmp::Ordering;
///
/// use strata_skiplist::comparator::{Comparator, FnComparator};
///
/// let newest_first = FnComparator(|a: &u64, b: &u64| b.cmp(a));
/// assert_eq!(newest_first.compare(&1, &2), Ordering::Greater);
/// ```
#[derive(Clone, Copy, Default)]
pub struct FnComparator<F>(pub F);

impl<L: ?Sized, R: ?Sized, F> Comparator<L, R> for FnComparator<F>
where
    F: Fn(&L, &R) -> Ordering,
{
    #[inline]
    fn compare(&self, lhs: &L, rhs: &R) -> Ordering {
        (self.0)(lhs, rhs)
    }
}

impl<F> fmt::Debug for FnComparator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("FnComparator { .. }")
    }
}
