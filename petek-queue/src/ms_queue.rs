//! Michael–Scott queue (PODC '96), hazard-pointer edition.
//!
//! The queue always holds a sentinel node: `head` points at it and the first
//! real value lives in its successor. `tail` may lag the true last node by
//! one step; both enqueue and dequeue help it forward before retrying.
//!
//! Hazard slot assignment: slot 0 protects the observed tail in `enqueue`,
//! slot 1 the observed head and slot 2 its successor in `dequeue`. The
//! successor needs its own slot because its payload is read after the head
//! CAS could already have lost a race.

use crossbeam_utils::Backoff;
use petek::{Atomic, CacheAligned, NodeHead, Ordering, Reclaim};

const TAIL_SLOT: usize = 0;
const HEAD_SLOT: usize = 1;
const NEXT_SLOT: usize = 2;

#[repr(C)]
struct Node<T> {
    head: NodeHead,
    data: Option<T>,
    next: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            head: NodeHead::new(),
            data: None,
            next: Atomic::null(),
        }
    }

    fn new(data: T) -> Self {
        Self {
            head: NodeHead::new(),
            data: Some(data),
            next: Atomic::null(),
        }
    }
}

// SAFETY: NodeHead is the first field and Node is #[repr(C)].
unsafe impl<T: 'static> Reclaim for Node<T> {}

/// A lock-free multi-producer/multi-consumer FIFO queue.
///
/// An enqueue takes effect at the CAS appending to `tail.next`; a dequeue at
/// the CAS advancing `head`. Values are cloned out of the successor node
/// because concurrent peeks may still be reading it.
pub struct MsQueue<T> {
    head: CacheAligned<Atomic<Node<T>>>,
    tail: CacheAligned<Atomic<Node<T>>>,
}

unsafe impl<T: Send + Sync> Send for MsQueue<T> {}
unsafe impl<T: Send + Sync> Sync for MsQueue<T> {}

impl<T> Default for MsQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MsQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        let sentinel = Box::into_raw(Box::new(Node::sentinel()));
        Self {
            head: CacheAligned::new(Atomic::new(sentinel)),
            tail: CacheAligned::new(Atomic::new(sentinel)),
        }
    }

    /// Appends a value at the tail.
    pub fn enqueue(&self, value: T) {
        let node = petek::alloc(Node::new(value));
        let backoff = Backoff::new();
        let tail;
        loop {
            let t = self.tail.load(Ordering::Relaxed);
            petek::employ(TAIL_SLOT, t);
            if self.tail.load(Ordering::Acquire) != t {
                continue;
            }
            let next = unsafe { (*t).next.load(Ordering::Acquire) };
            if self.tail.load(Ordering::Relaxed) != t {
                continue;
            }
            // Tail is lagging; help it forward and retry.
            if !next.is_null() {
                let _ = self
                    .tail
                    .compare_exchange(t, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            if unsafe { (*t).next.compare_exchange(
                core::ptr::null_mut(),
                node,
                Ordering::Release,
                Ordering::Relaxed,
            ) }
            .is_ok()
            {
                tail = t;
                break;
            }
            backoff.spin();
        }
        // Best-effort swing; a failure means someone else already helped.
        let _ = self
            .tail
            .compare_exchange(tail, node, Ordering::Release, Ordering::Relaxed);
        petek::release(TAIL_SLOT);
    }

    /// Removes the value at the head, or `None` when the queue is observed
    /// empty.
    pub fn dequeue(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let h = self.head.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, h);
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }
            let next = unsafe { (*h).next.load(Ordering::Acquire) };
            if next.is_null() {
                // Sentinel with no successor: empty.
                petek::release(HEAD_SLOT);
                return None;
            }
            petek::employ(NEXT_SLOT, next);
            // Re-validating the head also validates `next`: a node's link is
            // written exactly once, so while `h` is still the head its
            // successor cannot have changed.
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }
            let t = self.tail.load(Ordering::Relaxed);
            if h == t {
                // Tail is lagging behind the head; help it forward.
                let _ = self
                    .tail
                    .compare_exchange(t, next, Ordering::Release, Ordering::Relaxed);
                continue;
            }
            let value = unsafe { (*next).data.clone() };
            if self
                .head
                .compare_exchange(h, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                petek::release(HEAD_SLOT);
                petek::release(NEXT_SLOT);
                unsafe { petek::retire_node(h) };
                return value;
            }
            backoff.spin();
        }
    }

    /// Reads the front value without removing it.
    pub fn peek_front(&self) -> Option<T> {
        loop {
            let h = self.head.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, h);
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }
            let front = unsafe { (*h).next.load(Ordering::Acquire) };
            if front.is_null() {
                petek::release(HEAD_SLOT);
                return None;
            }
            petek::employ(NEXT_SLOT, front);
            // While `h` is still the head its link cannot change, so `front`
            // remains the live successor.
            if self.head.load(Ordering::Acquire) != h {
                continue;
            }
            let value = unsafe { (*front).data.clone() };
            petek::release(HEAD_SLOT);
            petek::release(NEXT_SLOT);
            return value;
        }
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        let h = self.head.load(Ordering::Relaxed);
        unsafe { (*h).next.load(Ordering::Relaxed) }.is_null()
    }

    /// Walks the queue counting values. Not thread-safe; inherently
    /// approximate under concurrency.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = unsafe { (*self.head.load(Ordering::Relaxed)).next.load(Ordering::Relaxed) };
        let tail = self.tail.load(Ordering::Relaxed);
        while !cur.is_null() {
            n += 1;
            if cur == tail {
                break;
            }
            cur = unsafe { (*cur).next.load(Ordering::Relaxed) };
        }
        n
    }
}

impl<T> Drop for MsQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: free the sentinel and every remaining node.
        let mut cur = self.head.load(Ordering::Relaxed);
        while !cur.is_null() {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
    }
}
