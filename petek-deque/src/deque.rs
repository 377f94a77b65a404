//! CAS-based lock-free deque (Michael, 2003).
//!
//! The deque's entire shared state is the anchor: `{left, right, status}`
//! packed into 16 bytes and committed with a single double-word CAS. The
//! status tag says whether the doubly-linked list is coherent:
//!
//! - `Stable` — for every interior node `x`, `x.right.left == x` and
//!   `x.left.right == x`. Empty and single-item deques are always stable.
//! - `RPush` — the rightmost node's back-link may not be written yet; the
//!   left side is coherent.
//! - `LPush` — symmetric.
//!
//! Only pushes create unstable states. Any operation that finds the anchor
//! unstable first helps run `stabilize`, which repairs the one dangling
//! back-link and CASes the status back to `Stable`. Pops hazard-protect the
//! end nodes (and the new end's neighbor) and re-verify against the live
//! anchor at every step, exactly like the list containers re-verify their
//! source links.

use petek::{AnchorWord, Atomic, NodeHead, Ordering, Reclaim};

const LEFT_SLOT: usize = 0;
const RIGHT_SLOT: usize = 1;
const PREV_SLOT: usize = 2;

/// Coherence tag carried in the low bits of the anchor's right word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Status {
    Stable = 0,
    RPush = 1,
    LPush = 2,
}

impl Status {
    #[inline]
    fn from_bits(bits: u64) -> Status {
        match bits {
            0 => Status::Stable,
            1 => Status::RPush,
            _ => Status::LPush,
        }
    }
}

#[repr(C)]
struct Node<T> {
    head: NodeHead,
    data: T,
    left: Atomic<Node<T>>,
    right: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn new(data: T) -> Self {
        Self {
            head: NodeHead::new(),
            data,
            left: Atomic::null(),
            right: Atomic::null(),
        }
    }
}

// SAFETY: NodeHead is the first field and Node is #[repr(C)].
unsafe impl<T: 'static> Reclaim for Node<T> {}

/// Decoded anchor snapshot. `Copy + Eq` so stale snapshots compare cleanly
/// against the live anchor during the verification steps. Manual impls:
/// deriving would demand `T: Copy` for a struct of raw pointers.
struct Anchor<T> {
    left: *mut Node<T>,
    right: *mut Node<T>,
    status: Status,
}

impl<T> Clone for Anchor<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Anchor<T> {}

impl<T> PartialEq for Anchor<T> {
    fn eq(&self, other: &Self) -> bool {
        self.left == other.left && self.right == other.right && self.status == other.status
    }
}
impl<T> Eq for Anchor<T> {}

impl<T> Anchor<T> {
    const STATUS_MASK: u64 = 0b11;

    #[inline]
    fn decode(words: (u64, u64)) -> Self {
        let (lo, hi) = words;
        Self {
            left: hi as *mut Node<T>,
            right: (lo & !Self::STATUS_MASK) as *mut Node<T>,
            status: Status::from_bits(lo & Self::STATUS_MASK),
        }
    }

    #[inline]
    fn encode(&self) -> (u64, u64) {
        // Nodes embed a NodeHead, so they are at least 8-byte aligned and
        // the two status bits are free.
        debug_assert_eq!(self.right as u64 & Self::STATUS_MASK, 0);
        (self.right as u64 | self.status as u64, self.left as u64)
    }
}

/// A lock-free double-ended queue.
///
/// Requires native 128-bit CAS for lock-free progress; on targets without
/// it, portable-atomic's fallback serializes anchor updates.
pub struct Deque<T> {
    anchor: AnchorWord,
    _marker: core::marker::PhantomData<*mut Node<T>>,
}

unsafe impl<T: Send + Sync> Send for Deque<T> {}
unsafe impl<T: Send + Sync> Sync for Deque<T> {}

impl<T> Default for Deque<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Deque<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty deque.
    pub fn new() -> Self {
        Self {
            anchor: AnchorWord::new(0, 0),
            _marker: core::marker::PhantomData,
        }
    }

    #[inline]
    fn snapshot(&self) -> Anchor<T> {
        Anchor::decode(self.anchor.load(Ordering::Acquire))
    }

    #[inline]
    fn cas_anchor(&self, old: Anchor<T>, new: Anchor<T>) -> bool {
        self.anchor.compare_exchange(old.encode(), new.encode()).is_ok()
    }

    /// Pushes a value on the right end.
    pub fn push_right(&self, value: T) {
        let node = petek::alloc(Node::new(value));
        loop {
            let a = self.snapshot();
            if a.right.is_null() {
                // Empty deque: no back-link to repair, publish stable.
                let new = Anchor {
                    left: node,
                    right: node,
                    status: Status::Stable,
                };
                if self.cas_anchor(a, new) {
                    return;
                }
            } else if a.status == Status::Stable {
                // Unpublished node: plain store of its back-link.
                unsafe { (*node).left.store(a.right, Ordering::Relaxed) };
                let new = Anchor {
                    left: a.left,
                    right: node,
                    status: Status::RPush,
                };
                if self.cas_anchor(a, new) {
                    self.stabilize_right(new);
                    return;
                }
            } else {
                self.stabilize(a);
            }
        }
    }

    /// Pushes a value on the left end.
    pub fn push_left(&self, value: T) {
        let node = petek::alloc(Node::new(value));
        loop {
            let a = self.snapshot();
            if a.left.is_null() {
                let new = Anchor {
                    left: node,
                    right: node,
                    status: Status::Stable,
                };
                if self.cas_anchor(a, new) {
                    return;
                }
            } else if a.status == Status::Stable {
                unsafe { (*node).right.store(a.left, Ordering::Relaxed) };
                let new = Anchor {
                    left: node,
                    right: a.right,
                    status: Status::LPush,
                };
                if self.cas_anchor(a, new) {
                    self.stabilize_left(new);
                    return;
                }
            } else {
                self.stabilize(a);
            }
        }
    }

    /// Pops the rightmost value, or `None` when the deque is observed empty.
    pub fn pop_right(&self) -> Option<T> {
        loop {
            let a = self.snapshot();
            if a.right.is_null() {
                return None;
            }
            if a.left == a.right {
                // Single item: swing to the empty anchor.
                petek::employ(RIGHT_SLOT, a.right);
                if self.snapshot().right != a.right {
                    continue;
                }
                let new = Anchor {
                    left: core::ptr::null_mut(),
                    right: core::ptr::null_mut(),
                    status: a.status,
                };
                if self.cas_anchor(a, new) {
                    let value = unsafe { (*a.right).data.clone() };
                    petek::release(RIGHT_SLOT);
                    unsafe { petek::retire_node(a.right) };
                    return Some(value);
                }
            } else if a.status == Status::Stable {
                // Both ends pinned before touching the interior; each employ
                // is re-verified against the live anchor.
                petek::employ(LEFT_SLOT, a.left);
                if self.snapshot().left != a.left {
                    continue;
                }
                petek::employ(RIGHT_SLOT, a.right);
                if self.snapshot().right != a.right {
                    continue;
                }
                if self.snapshot() != a {
                    continue;
                }
                let prev = unsafe { (*a.right).left.load(Ordering::Acquire) };
                petek::employ(PREV_SLOT, prev);
                if self.snapshot().right != a.right {
                    continue;
                }
                let new = Anchor {
                    left: a.left,
                    right: prev,
                    status: Status::Stable,
                };
                if self.cas_anchor(a, new) {
                    let value = unsafe { (*a.right).data.clone() };
                    petek::release(LEFT_SLOT);
                    petek::release(RIGHT_SLOT);
                    petek::release(PREV_SLOT);
                    unsafe { petek::retire_node(a.right) };
                    return Some(value);
                }
            } else {
                self.stabilize(a);
            }
        }
    }

    /// Pops the leftmost value, or `None` when the deque is observed empty.
    pub fn pop_left(&self) -> Option<T> {
        loop {
            let a = self.snapshot();
            if a.left.is_null() {
                return None;
            }
            if a.left == a.right {
                petek::employ(LEFT_SLOT, a.left);
                if self.snapshot().left != a.left {
                    continue;
                }
                let new = Anchor {
                    left: core::ptr::null_mut(),
                    right: core::ptr::null_mut(),
                    status: a.status,
                };
                if self.cas_anchor(a, new) {
                    let value = unsafe { (*a.left).data.clone() };
                    petek::release(LEFT_SLOT);
                    unsafe { petek::retire_node(a.left) };
                    return Some(value);
                }
            } else if a.status == Status::Stable {
                petek::employ(LEFT_SLOT, a.left);
                if self.snapshot().left != a.left {
                    continue;
                }
                petek::employ(RIGHT_SLOT, a.right);
                if self.snapshot().right != a.right {
                    continue;
                }
                if self.snapshot() != a {
                    continue;
                }
                let prev = unsafe { (*a.left).right.load(Ordering::Acquire) };
                petek::employ(PREV_SLOT, prev);
                if self.snapshot().left != a.left {
                    continue;
                }
                let new = Anchor {
                    left: prev,
                    right: a.right,
                    status: Status::Stable,
                };
                if self.cas_anchor(a, new) {
                    let value = unsafe { (*a.left).data.clone() };
                    petek::release(LEFT_SLOT);
                    petek::release(RIGHT_SLOT);
                    petek::release(PREV_SLOT);
                    unsafe { petek::retire_node(a.left) };
                    return Some(value);
                }
            } else {
                self.stabilize(a);
            }
        }
    }

    /// FIFO alias: push on the right end.
    #[inline]
    pub fn enqueue(&self, value: T) {
        self.push_right(value);
    }

    /// FIFO alias: pop from the left end.
    #[inline]
    pub fn dequeue(&self) -> Option<T> {
        self.pop_left()
    }

    /// Reads the rightmost value without removing it.
    pub fn peek_right(&self) -> Option<T> {
        loop {
            let right = self.snapshot().right;
            if right.is_null() {
                return None;
            }
            petek::employ(RIGHT_SLOT, right);
            if self.snapshot().right != right {
                continue;
            }
            let value = unsafe { (*right).data.clone() };
            petek::release(RIGHT_SLOT);
            return Some(value);
        }
    }

    /// Reads the leftmost value without removing it.
    pub fn peek_left(&self) -> Option<T> {
        loop {
            let left = self.snapshot().left;
            if left.is_null() {
                return None;
            }
            petek::employ(LEFT_SLOT, left);
            if self.snapshot().left != left {
                continue;
            }
            let value = unsafe { (*left).data.clone() };
            petek::release(LEFT_SLOT);
            return Some(value);
        }
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        let a = self.snapshot();
        a.left.is_null() && a.right.is_null()
    }

    /// Walks left to right counting nodes. Not thread-safe.
    pub fn len(&self) -> usize {
        let a = self.snapshot();
        if a.left.is_null() {
            return 0;
        }
        if a.left == a.right {
            return 1;
        }
        let mut n = 2;
        let mut cur = a.left;
        loop {
            let next = unsafe { (*cur).right.load(Ordering::Relaxed) };
            if next == a.right {
                return n;
            }
            n += 1;
            cur = next;
        }
    }

    fn stabilize(&self, a: Anchor<T>) {
        if a.status == Status::RPush {
            self.stabilize_right(a);
        } else {
            debug_assert_eq!(a.status, Status::LPush);
            self.stabilize_left(a);
        }
    }

    /// Repair the rightmost node's back-link, then flip `RPush → Stable`.
    /// Every early return means the anchor moved on and someone else
    /// finished the job.
    fn stabilize_right(&self, a: Anchor<T>) {
        petek::employ(LEFT_SLOT, a.left);
        if self.snapshot().left != a.left {
            return;
        }
        petek::employ(RIGHT_SLOT, a.right);
        if self.snapshot().right != a.right {
            return;
        }
        if self.snapshot() != a {
            return;
        }
        let prev = unsafe { (*a.right).left.load(Ordering::Acquire) };
        petek::employ(PREV_SLOT, prev);
        if self.snapshot().right != a.right {
            return;
        }
        if self.snapshot() != a {
            return;
        }
        let prev_next = unsafe { (*prev).right.load(Ordering::Acquire) };
        if prev_next != a.right {
            if self.snapshot() != a {
                return;
            }
            if unsafe {
                (*prev)
                    .right
                    .compare_exchange(prev_next, a.right, Ordering::Release, Ordering::Relaxed)
            }
            .is_err()
            {
                return;
            }
        }
        let new = Anchor {
            left: a.left,
            right: a.right,
            status: Status::Stable,
        };
        let _ = self.cas_anchor(a, new);
        petek::release(LEFT_SLOT);
        petek::release(RIGHT_SLOT);
        petek::release(PREV_SLOT);
    }

    /// Mirror image of [`Self::stabilize_right`] for `LPush`.
    fn stabilize_left(&self, a: Anchor<T>) {
        petek::employ(LEFT_SLOT, a.left);
        if self.snapshot().left != a.left {
            return;
        }
        petek::employ(RIGHT_SLOT, a.right);
        if self.snapshot().right != a.right {
            return;
        }
        if self.snapshot() != a {
            return;
        }
        let prev = unsafe { (*a.left).right.load(Ordering::Acquire) };
        petek::employ(PREV_SLOT, prev);
        if self.snapshot().left != a.left {
            return;
        }
        if self.snapshot() != a {
            return;
        }
        let prev_next = unsafe { (*prev).left.load(Ordering::Acquire) };
        if prev_next != a.left {
            if self.snapshot() != a {
                return;
            }
            if unsafe {
                (*prev)
                    .left
                    .compare_exchange(prev_next, a.left, Ordering::Release, Ordering::Relaxed)
            }
            .is_err()
            {
                return;
            }
        }
        let new = Anchor {
            left: a.left,
            right: a.right,
            status: Status::Stable,
        };
        let _ = self.cas_anchor(a, new);
        petek::release(LEFT_SLOT);
        petek::release(RIGHT_SLOT);
        petek::release(PREV_SLOT);
    }
}

impl<T> Drop for Deque<T> {
    fn drop(&mut self) {
        let a: Anchor<T> = Anchor::decode(self.anchor.load(Ordering::Acquire));
        let mut cur = a.left;
        if cur.is_null() {
            return;
        }
        while cur != a.right {
            let next = unsafe { (*cur).right.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
        drop(unsafe { Box::from_raw(a.right) });
    }
}
