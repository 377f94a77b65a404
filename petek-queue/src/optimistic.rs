//! Optimistic FIFO queue (Ladan-Mozes & Shavit, 2004).
//!
//! The Michael–Scott queue pays a CAS to append every node. This algorithm
//! replaces the enqueue-side link CAS with a plain store: nodes form a
//! doubly-linked list whose `next` pointers (tail towards head) are written
//! before the node is published, and whose `prev` pointers (head towards
//! tail) are written optimistically *after* the tail swing. A dequeue walks
//! `prev`; when it finds the chain unfinished it runs [`fix_list`], which
//! rebuilds the `prev` path from the always-consistent `next` path.
//!
//! A sentinel node (`data == None`) marks the boundary between dequeued and
//! live nodes. Dequeuing the last element parks a sentinel at the tail, and
//! a sentinel that reaches the head is skipped and retired like any other
//! node. The sentinel is freshly allocated each time rather than recycled:
//! the paper guards recycled nodes with version tags on every link, and
//! without those tags a reused sentinel would have its published links
//! rewritten while stale helpers can still store into them. Fresh
//! allocation keeps every `next` link write-once, which is what makes the
//! `fix_list` repair writes unconditionally correct, and lets hazard
//! pointers gate all address reuse.
//!
//! Hazard slot assignment: slot 0 holds the observed tail (enqueue) or head
//! (dequeue/peek), slot 1 the head's predecessor, and slots 1–2 the rolling
//! pair of the `fix_list` walk. Every node that walk touches sits between
//! the pinned head and the tail, and a node is only retired after the head
//! has moved past it, so employ-then-recheck-head establishes protection
//! the same way employ-then-reread-source does elsewhere.
//!
//! [`fix_list`]: OptimisticQueue::fix_list

use petek::{Atomic, CacheAligned, NodeHead, Ordering, Reclaim};

const HEAD_SLOT: usize = 0;
const PREV_SLOT: usize = 1;
const FIX_SLOT: usize = 2;

#[repr(C)]
struct Node<T> {
    head: NodeHead,
    /// `None` on sentinel nodes.
    data: Option<T>,
    /// Toward the head-side neighbor that was the tail when this node was
    /// enqueued. Written once, before publication.
    next: Atomic<Node<T>>,
    /// Toward the tail-side neighbor; written after the tail swing and
    /// repaired by `fix_list` when a dequeue finds it missing.
    prev: Atomic<Node<T>>,
}

impl<T> Node<T> {
    fn sentinel() -> Self {
        Self {
            head: NodeHead::new(),
            data: None,
            next: Atomic::null(),
            prev: Atomic::null(),
        }
    }

    fn new(data: T) -> Self {
        Self {
            head: NodeHead::new(),
            data: Some(data),
            next: Atomic::null(),
            prev: Atomic::null(),
        }
    }
}

// SAFETY: NodeHead is the first field and Node is #[repr(C)].
unsafe impl<T: 'static> Reclaim for Node<T> {}

/// A lock-free MPMC FIFO queue with store-based (CAS-free) enqueue links.
///
/// Same observable behavior as [`crate::MsQueue`]; only the internal link
/// discipline differs. An enqueue linearizes at the tail CAS, a dequeue at
/// the head CAS.
pub struct OptimisticQueue<T> {
    head: CacheAligned<Atomic<Node<T>>>,
    tail: CacheAligned<Atomic<Node<T>>>,
}

unsafe impl<T: Send + Sync> Send for OptimisticQueue<T> {}
unsafe impl<T: Send + Sync> Sync for OptimisticQueue<T> {}

impl<T> Default for OptimisticQueue<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> OptimisticQueue<T>
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
        loop {
            let t = self.tail.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, t);
            if self.tail.load(Ordering::Acquire) != t {
                continue;
            }
            // The optimistic trick: the backward link is a plain store on
            // the unpublished node, not a CAS on shared state.
            unsafe { (*node).next.store(t, Ordering::Relaxed) };
            if self
                .tail
                .compare_exchange(t, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                // The old tail stays pinned by our slot until this forward
                // link lands, so the store can never hit recycled memory.
                unsafe { (*t).prev.store(node, Ordering::Release) };
                petek::release(HEAD_SLOT);
                return;
            }
        }
    }

    /// Removes the value at the head, or `None` when the queue is observed
    /// empty.
    pub fn dequeue(&self) -> Option<T> {
        loop {
            let hd = self.head.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, hd);
            if self.head.load(Ordering::Acquire) != hd {
                continue;
            }
            let tl = self.tail.load(Ordering::Acquire);
            let fst_prev = unsafe { (*hd).prev.load(Ordering::Acquire) };
            petek::employ(PREV_SLOT, fst_prev);
            // The predecessor stays live for as long as `hd` is the head:
            // FIFO order retires it strictly after `hd` itself.
            if self.head.load(Ordering::Acquire) != hd {
                continue;
            }

            if tl == hd {
                if unsafe { (*hd).data.is_none() } {
                    // Head and tail share the sentinel: empty.
                    petek::release(HEAD_SLOT);
                    petek::release(PREV_SLOT);
                    return None;
                }
                // Last element: park a fresh sentinel at the tail so the
                // list never empties completely, then retry the dequeue.
                let sentinel = petek::alloc(Node::sentinel());
                unsafe { (*sentinel).next.store(tl, Ordering::Relaxed) };
                if self
                    .tail
                    .compare_exchange(tl, sentinel, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { (*hd).prev.store(sentinel, Ordering::Release) };
                } else {
                    // Never published; still exclusively ours.
                    drop(unsafe { Box::from_raw(sentinel) });
                }
                continue;
            }

            if fst_prev.is_null() {
                // The enqueuer has not finished the forward link yet;
                // rebuild it from the `next` chain.
                self.fix_list(tl, hd);
                continue;
            }

            if let Some(value) = unsafe { (*hd).data.clone() } {
                if self
                    .head
                    .compare_exchange(hd, fst_prev, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    petek::release(HEAD_SLOT);
                    petek::release(PREV_SLOT);
                    unsafe { petek::retire_node(hd) };
                    return Some(value);
                }
            } else {
                // A sentinel reached the head; skip it. The winner of the
                // CAS owns its retirement, like any dequeued node.
                if self
                    .head
                    .compare_exchange(hd, fst_prev, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    unsafe { petek::retire_node(hd) };
                }
            }
        }
    }

    /// Reads the front value without removing it.
    pub fn peek_front(&self) -> Option<T> {
        loop {
            let hd = self.head.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, hd);
            if self.head.load(Ordering::Acquire) != hd {
                continue;
            }
            if let Some(value) = unsafe { (*hd).data.clone() } {
                petek::release(HEAD_SLOT);
                return Some(value);
            }
            let tl = self.tail.load(Ordering::Acquire);
            if tl == hd {
                petek::release(HEAD_SLOT);
                return None;
            }
            // Help the sentinel off the head, then look again.
            let fst_prev = unsafe { (*hd).prev.load(Ordering::Acquire) };
            petek::employ(PREV_SLOT, fst_prev);
            if self.head.load(Ordering::Acquire) != hd {
                continue;
            }
            if fst_prev.is_null() {
                self.fix_list(tl, hd);
                continue;
            }
            if self
                .head
                .compare_exchange(hd, fst_prev, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                unsafe { petek::retire_node(hd) };
            }
        }
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        loop {
            let hd = self.head.load(Ordering::Relaxed);
            petek::employ(HEAD_SLOT, hd);
            if self.head.load(Ordering::Acquire) != hd {
                continue;
            }
            let empty =
                unsafe { (*hd).data.is_none() } && self.tail.load(Ordering::Relaxed) == hd;
            petek::release(HEAD_SLOT);
            return empty;
        }
    }

    /// Walks the `next` chain counting values. Not thread-safe.
    pub fn len(&self) -> usize {
        let hd = self.head.load(Ordering::Relaxed);
        let mut cur = self.tail.load(Ordering::Relaxed);
        let mut n = 0;
        loop {
            if unsafe { (*cur).data.is_some() } {
                n += 1;
            }
            if cur == hd {
                break;
            }
            cur = unsafe { (*cur).next.load(Ordering::Relaxed) };
            if cur.is_null() {
                break;
            }
        }
        n
    }

    /// Rebuild the `prev` path between `tl` and the pinned head `hd` by
    /// walking the write-once `next` path.
    ///
    /// The caller holds `hd` in slot 0. Each node of the walk is employed
    /// and then validated by re-reading `head`: nodes between head and tail
    /// are retired only after the head has moved past `hd`, so observing
    /// `head == hd` after the employ fence proves the node was not yet
    /// retired and the slot now pins it. Any head movement aborts the walk;
    /// the caller re-runs its outer loop anyway. The repair store is always
    /// the node's unique chain predecessor, so racing repairs are
    /// idempotent.
    fn fix_list(&self, tl: *mut Node<T>, hd: *mut Node<T>) {
        let mut cur = tl;
        petek::employ(FIX_SLOT, cur);
        if self.head.load(Ordering::Acquire) != hd {
            return;
        }
        while cur != hd {
            let next = unsafe { (*cur).next.load(Ordering::Acquire) };
            if next.is_null() {
                // Stale snapshot; nothing to repair from here.
                return;
            }
            petek::employ(PREV_SLOT, next);
            if self.head.load(Ordering::Acquire) != hd {
                return;
            }
            if unsafe { (*next).prev.load(Ordering::Relaxed) } != cur {
                unsafe { (*next).prev.store(cur, Ordering::Release) };
            }
            // The forward neighbor is already covered by the prev-slot, so
            // the transfer into the fix-slot is race-free.
            cur = next;
            petek::employ(FIX_SLOT, cur);
        }
    }
}

impl<T> Drop for OptimisticQueue<T> {
    fn drop(&mut self) {
        // Exclusive access: the `next` chain from the tail reaches every
        // node still in the queue, ending at the head node. Already
        // dequeued nodes belong to the reclamation engine.
        let hd = self.head.load(Ordering::Relaxed);
        let mut cur = self.tail.load(Ordering::Relaxed);
        loop {
            let next = unsafe { (*cur).next.load(Ordering::Relaxed) };
            let done = cur == hd;
            drop(unsafe { Box::from_raw(cur) });
            if done {
                break;
            }
            cur = next;
        }
    }
}
