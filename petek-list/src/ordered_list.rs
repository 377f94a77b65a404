//! Michael's lock-free ordered list (SPAA '02).
//!
//! Nodes are sorted; the low bit of a node's `next` link is its logical
//! deletion mark. Every traversal physically unlinks the marked nodes it
//! walks over, so deleted nodes never accumulate beyond the number of
//! concurrent operations.
//!
//! The `find` walk keeps three hazard slots live — slot 0 for the successor,
//! slot 1 for the current node, slot 2 for the predecessor — re-validating
//! the source link after every advance. Protection transfers between slots
//! are done while the old slot still covers the pointer, so there is never a
//! window where a dereferenced node is unprotected.

use petek::{Marked, MarkedAtomic, NodeHead, Ordering, Reclaim};

const NEXT_SLOT: usize = 0;
const CUR_SLOT: usize = 1;
const PREV_SLOT: usize = 2;

#[repr(C)]
pub(crate) struct Node<T> {
    head: NodeHead,
    pub(crate) data: T,
    pub(crate) next: MarkedAtomic<Node<T>>,
}

impl<T> Node<T> {
    fn new(data: T) -> Self {
        Self {
            head: NodeHead::new(),
            data,
            next: MarkedAtomic::null(),
        }
    }
}

// SAFETY: NodeHead is the first field and Node is #[repr(C)].
unsafe impl<T: 'static> Reclaim for Node<T> {}

/// Snapshot produced by `find`: the link that pointed at `cur`, the node
/// itself (first node with data ≥ the key, or null), and its successor.
/// The prev/cur nodes are still hazard-protected when this is returned.
pub(crate) struct FindState<T> {
    pub(crate) prev: *const MarkedAtomic<Node<T>>,
    pub(crate) cur: *mut Node<T>,
    pub(crate) next: *mut Node<T>,
    pub(crate) found: bool,
}

/// A sorted lock-free list with set semantics (duplicates rejected).
pub struct OrderedList<T> {
    head: MarkedAtomic<Node<T>>,
}

unsafe impl<T: Send + Sync> Send for OrderedList<T> {}
unsafe impl<T: Send + Sync> Sync for OrderedList<T> {}

impl<T> Default for OrderedList<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OrderedList<T>
where
    T: Ord + Clone + Send + Sync + 'static,
{
    /// Creates an empty list.
    pub fn new() -> Self {
        Self {
            head: MarkedAtomic::null(),
        }
    }

    pub(crate) fn head_link(&self) -> &MarkedAtomic<Node<T>> {
        &self.head
    }

    /// Inserts a value; `false` if an equal value is already present.
    pub fn insert(&self, value: T) -> bool {
        self.insert_at(&self.head, value)
    }

    /// Removes a value; `false` if not present.
    pub fn remove(&self, value: &T) -> bool {
        self.remove_at(&self.head, value)
    }

    /// Membership test.
    pub fn contains(&self, value: &T) -> bool {
        self.contains_at(&self.head, value)
    }

    /// Reads the first live value.
    pub fn front(&self) -> Option<T> {
        'retry: loop {
            let first = self.head.load(Ordering::Acquire);
            let mut cur = first.ptr();
            petek::employ(CUR_SLOT, cur);
            if self.head.load(Ordering::Acquire) != first {
                continue 'retry;
            }
            loop {
                if cur.is_null() {
                    release_walk_slots();
                    return None;
                }
                let next = unsafe { (*cur).next.load(Ordering::Acquire) };
                petek::employ(NEXT_SLOT, next.ptr());
                if unsafe { (*cur).next.load(Ordering::Acquire) } != next {
                    continue 'retry;
                }
                if !next.is_marked() {
                    let value = unsafe { (*cur).data.clone() };
                    release_walk_slots();
                    return Some(value);
                }
                // Logically deleted; skip it read-only. The successor is
                // already covered by the next-slot, so the transfer into the
                // cur-slot is race-free.
                cur = next.ptr();
                petek::employ(CUR_SLOT, cur);
            }
        }
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.head.load(Ordering::Relaxed).is_null()
    }

    /// Counts live (unmarked) nodes. Not thread-safe.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head.load(Ordering::Relaxed).ptr();
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            if !next.is_marked() {
                n += 1;
            }
            cur = next.ptr();
        }
        n
    }

    pub(crate) fn insert_at(&self, start: &MarkedAtomic<Node<T>>, value: T) -> bool {
        let node = petek::alloc(Node::new(value));
        loop {
            let st = self.find(unsafe { &(*node).data }, start);
            if st.found {
                release_walk_slots();
                // Never published; this thread still owns the allocation.
                drop(unsafe { Box::from_raw(node) });
                return false;
            }
            unsafe { (*node).next.store(Marked::new(st.cur), Ordering::Relaxed) };
            if unsafe {
                (*st.prev).compare_exchange(
                    Marked::new(st.cur),
                    Marked::new(node),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
            }
            .is_ok()
            {
                release_walk_slots();
                return true;
            }
        }
    }

    /// Inserts and returns the node address, or the address of the existing
    /// equal node. The split-ordered set stores these addresses as bucket
    /// shortcuts, which is only sound because its dummy nodes are never
    /// removed.
    pub(crate) fn insert_get(&self, start: &MarkedAtomic<Node<T>>, value: T) -> *mut Node<T> {
        let node = petek::alloc(Node::new(value));
        loop {
            let st = self.find(unsafe { &(*node).data }, start);
            if st.found {
                release_walk_slots();
                drop(unsafe { Box::from_raw(node) });
                return st.cur;
            }
            unsafe { (*node).next.store(Marked::new(st.cur), Ordering::Relaxed) };
            if unsafe {
                (*st.prev).compare_exchange(
                    Marked::new(st.cur),
                    Marked::new(node),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
            }
            .is_ok()
            {
                release_walk_slots();
                return node;
            }
        }
    }

    pub(crate) fn remove_at(&self, start: &MarkedAtomic<Node<T>>, value: &T) -> bool {
        loop {
            let st = self.find(value, start);
            if !st.found {
                release_walk_slots();
                return false;
            }
            let cur = st.cur;
            let next = st.next;
            // Logical deletion: mark cur's link. Losing this CAS means the
            // snapshot went stale (insert after cur, or a competing remove);
            // re-find and retry.
            if unsafe {
                (*cur).next.compare_exchange(
                    Marked::new(next),
                    Marked::new(next).marked(),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            }
            .is_err()
            {
                continue;
            }
            // Physical unlink. On failure another traversal already unlinked
            // (or will); run find once more so the deleted-node count stays
            // bounded by the number of concurrent threads.
            if unsafe {
                (*st.prev).compare_exchange(
                    Marked::new(cur),
                    Marked::new(next),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
            }
            .is_ok()
            {
                unsafe { petek::retire_node(cur) };
            } else {
                let _ = self.find(value, start);
            }
            release_walk_slots();
            return true;
        }
    }

    pub(crate) fn contains_at(&self, start: &MarkedAtomic<Node<T>>, value: &T) -> bool {
        let found = self.find(value, start).found;
        release_walk_slots();
        found
    }

    /// The core walk: returns the first node with `data >= key` along with
    /// its predecessor link, unlinking every marked node encountered.
    ///
    /// On return, `cur` (slot 1) and the predecessor node (slot 2) are still
    /// protected, so the caller may CAS through `prev` before releasing.
    pub(crate) fn find(&self, key: &T, start: &MarkedAtomic<Node<T>>) -> FindState<T> {
        'retry: loop {
            let mut prev: *const MarkedAtomic<Node<T>> = start;
            let loaded = unsafe { (*prev).load(Ordering::Acquire) };
            debug_assert!(!loaded.is_marked());
            let mut cur = loaded.ptr();
            petek::employ(CUR_SLOT, cur);
            if unsafe { (*prev).load(Ordering::Acquire) } != loaded {
                continue 'retry;
            }
            loop {
                if cur.is_null() {
                    return FindState {
                        prev,
                        cur,
                        next: core::ptr::null_mut(),
                        found: false,
                    };
                }
                let marked_next = unsafe { (*cur).next.load(Ordering::Acquire) };
                let next = marked_next.ptr();
                petek::employ(NEXT_SLOT, next);
                if unsafe { (*cur).next.load(Ordering::Acquire) } != marked_next {
                    continue 'retry;
                }
                // The predecessor link must still point at `cur`, unmarked;
                // anything else means the neighborhood changed under us.
                if unsafe { (*prev).load(Ordering::Acquire) } != Marked::new(cur) {
                    continue 'retry;
                }
                if !marked_next.is_marked() {
                    let data = unsafe { &(*cur).data };
                    if data >= key {
                        return FindState {
                            prev,
                            cur,
                            next,
                            found: data == key,
                        };
                    }
                    // Advance. Both transfers happen while the source slot
                    // still protects the pointer.
                    petek::employ(PREV_SLOT, cur);
                    prev = unsafe { &(*cur).next };
                    cur = next;
                    petek::employ(CUR_SLOT, cur);
                } else {
                    // Marked: unlink it here, as every traversal must.
                    if unsafe {
                        (*prev).compare_exchange(
                            Marked::new(cur),
                            Marked::new(next),
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                    }
                    .is_err()
                    {
                        continue 'retry;
                    }
                    unsafe { petek::retire_node(cur) };
                    cur = next;
                    petek::employ(CUR_SLOT, cur);
                }
            }
        }
    }
}

#[inline]
pub(crate) fn release_walk_slots() {
    petek::release(NEXT_SLOT);
    petek::release(CUR_SLOT);
    petek::release(PREV_SLOT);
}

impl<T> Drop for OrderedList<T> {
    fn drop(&mut self) {
        let mut cur = self.head.load(Ordering::Relaxed).ptr();
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) }.ptr();
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_semantics() {
        let l = OrderedList::new();
        assert!(l.insert(3));
        assert!(!l.insert(3));
        assert!(l.contains(&3));
        assert!(l.remove(&3));
        assert!(!l.contains(&3));
        assert!(!l.remove(&3));
    }

    #[test]
    fn sorted_front() {
        let l = OrderedList::new();
        l.insert(5);
        l.insert(1);
        l.insert(3);
        assert_eq!(l.front(), Some(1));
        assert_eq!(l.len(), 3);
        l.remove(&1);
        assert_eq!(l.front(), Some(3));
    }

    #[test]
    fn empty_list() {
        let l = OrderedList::<u32>::new();
        assert!(l.is_empty());
        assert_eq!(l.front(), None);
        assert!(!l.remove(&1));
        assert!(!l.contains(&1));
    }
}
