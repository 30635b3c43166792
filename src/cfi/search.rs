//! Sorted-sequence search helpers
//!
//! Both helpers take the comparison as `compare(element, item)` so the same
//! comparator serves CFI lists, page lists and plain values.

use std::cmp::Ordering;

/// Exact-match binary search over an ascending slice
///
/// Returns the index of a matching element, or None when absent.
/// With duplicate keys any matching index may be returned.
pub fn index_of_sorted<T, Q, F>(item: &Q, sorted: &[T], mut compare: F) -> Option<usize>
where
    Q: ?Sized,
    F: FnMut(&T, &Q) -> Ordering,
{
    sorted.binary_search_by(|element| compare(element, item)).ok()
}

/// Insertion point of `item` in an ascending slice
///
/// Returns the first index whose element is not less than `item`, so equal
/// keys are inserted before their duplicates (a stable insertion point).
pub fn location_of<T, Q, F>(item: &Q, sorted: &[T], mut compare: F) -> usize
where
    Q: ?Sized,
    F: FnMut(&T, &Q) -> Ordering,
{
    sorted.partition_point(|element| compare(element, item) == Ordering::Less)
}
