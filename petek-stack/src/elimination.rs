//! Elimination back-off stack (Hendler, Shavit, Yerushalmi).
//!
//! When the primary CAS on `top` fails, the loser tries to meet an opposing
//! operation in a collision array instead of hammering `top` again. A push
//! that finds a waiting pop hands its node over directly; a pop that finds a
//! posted push steals it. Either way the pair linearizes as an immediate
//! push-then-pop that never touched the stack.
//!
//! Slot states in the collision arrays are encoded in the pointer value:
//! null (empty), `TOMB_STONE` (a pop is waiting in `coll_pop`), `REMOVED`
//! (a posted push was stolen from `coll_push`), or a real node. The tag
//! addresses can never collide with node addresses, which are at least
//! 8-byte aligned.

use crate::treiber::Node;
use crossbeam_utils::Backoff;
use petek::{Atomic, CacheAligned, Ordering};
use std::sync::atomic::{AtomicPtr, AtomicUsize};
use std::time::Duration;

/// Tries per phase before giving up on the collision array.
const TRY_TIMES: usize = 4;

/// How long an operation parks in a collision slot waiting for a partner.
/// A throughput knob, not a correctness one: progress never depends on it.
const EXCHANGE_WINDOW: Duration = Duration::from_micros(300);

/// Default collision array size.
const DEFAULT_COLLISION_SLOTS: usize = 8;

const TOMB_STONE: usize = 0x1;
const REMOVED: usize = 0x2;

#[inline]
fn tomb_stone<T>() -> *mut Node<T> {
    TOMB_STONE as *mut Node<T>
}

#[inline]
fn removed<T>() -> *mut Node<T> {
    REMOVED as *mut Node<T>
}

/// A Treiber stack with an elimination back-off layer.
///
/// Identical observable behavior to [`crate::Stack`]; the collision arrays
/// only change how contended operations find each other.
pub struct EliminationStack<T> {
    top: CacheAligned<Atomic<Node<T>>>,
    coll_push: Box<[AtomicPtr<Node<T>>]>,
    coll_pop: Box<[AtomicPtr<Node<T>>]>,
    /// Round-robin start position for collision probing.
    position: AtomicUsize,
}

unsafe impl<T: Send + Sync> Send for EliminationStack<T> {}
unsafe impl<T: Send + Sync> Sync for EliminationStack<T> {}

impl<T> Default for EliminationStack<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EliminationStack<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Creates an empty stack with the default collision array size (8).
    pub fn new() -> Self {
        Self::with_collision_slots(DEFAULT_COLLISION_SLOTS)
    }

    /// Creates an empty stack with `slots` collision slots per direction.
    pub fn with_collision_slots(slots: usize) -> Self {
        assert!(slots > 0, "collision array cannot be empty");
        let make = |_| AtomicPtr::new(core::ptr::null_mut());
        Self {
            top: CacheAligned::new(Atomic::null()),
            coll_push: (0..slots).map(make).collect(),
            coll_pop: (0..slots).map(make).collect(),
            position: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn rand_position(&self) -> usize {
        self.position.fetch_add(1, Ordering::Relaxed) % self.coll_push.len()
    }

    /// Pushes a value.
    pub fn push(&self, value: T) {
        let node = petek::alloc(Node::new(value));
        let backoff = Backoff::new();
        loop {
            let old = self.top.load(Ordering::Relaxed);
            unsafe { (*node).next = old };
            if self
                .top
                .compare_exchange(old, node, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
            // Contention: try to meet a pop in the collision array.
            if self.try_add(node) {
                return;
            }
            backoff.spin();
        }
    }

    /// Pops the top value, or `None` when the stack is observed empty.
    pub fn pop(&self) -> Option<T> {
        let backoff = Backoff::new();
        loop {
            let old = self.top.load(Ordering::Acquire);
            if old.is_null() {
                return None;
            }
            petek::employ(0, old);
            if self.top.load(Ordering::Acquire) != old {
                continue;
            }
            let next = unsafe { (*old).next };
            if self
                .top
                .compare_exchange(old, next, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                let value = unsafe { (*old).data.clone() };
                petek::release(0);
                unsafe { petek::retire_node(old) };
                return Some(value);
            }
            // Contention: try to steal from a colliding push.
            if let Some(node) = self.try_remove() {
                let value = unsafe { (*node).data.clone() };
                // The node was handed over before ever being published on
                // `top`; this thread is its sole owner.
                drop(unsafe { Box::from_raw(node) });
                return Some(value);
            }
            backoff.spin();
        }
    }

    /// Reads the top value without removing it.
    pub fn peek_top(&self) -> Option<T> {
        loop {
            let old = self.top.load(Ordering::Acquire);
            if old.is_null() {
                return None;
            }
            petek::employ(0, old);
            if self.top.load(Ordering::Acquire) != old {
                continue;
            }
            let value = unsafe { (*old).data.clone() };
            petek::release(0);
            return Some(value);
        }
    }

    /// Point-in-time emptiness check. An eliminated pair in flight is
    /// indistinguishable from push-then-pop having already happened.
    pub fn is_empty(&self) -> bool {
        self.top.load(Ordering::Relaxed).is_null()
    }

    /// Walks the stack counting nodes. Not thread-safe.
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.top.load(Ordering::Relaxed);
        while !cur.is_null() {
            n += 1;
            cur = unsafe { (*cur).next };
        }
        n
    }

    /// Push side of the elimination protocol. Returns true when the node was
    /// handed to a pop.
    fn try_add(&self, node: *mut Node<T>) -> bool {
        let pos = self.rand_position();
        let slots = self.coll_pop.len();

        // Phase 1: feed a pop already waiting with a tombstone.
        for i in 0..TRY_TIMES {
            let index = (pos + i) % slots;
            let pop_op = self.coll_pop[index].load(Ordering::Relaxed);
            if pop_op == tomb_stone::<T>()
                && self.coll_pop[index]
                    .compare_exchange(pop_op, node, Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                return true;
            }
        }

        // Phase 2: post the node and wait for a pop to steal it.
        for i in 0..TRY_TIMES {
            let index = (pos + i) % slots;
            let push_op = self.coll_push[index].load(Ordering::Relaxed);
            if !push_op.is_null() {
                continue;
            }
            if self.coll_push[index]
                .compare_exchange(push_op, node, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            std::thread::sleep(EXCHANGE_WINDOW);
            loop {
                let seen = self.coll_push[index].load(Ordering::Acquire);
                if seen == node {
                    // Nobody took it; withdraw the offer. Losing this CAS
                    // means a pop grabbed the node at the last moment.
                    if self.coll_push[index]
                        .compare_exchange(
                            node,
                            core::ptr::null_mut(),
                            Ordering::AcqRel,
                            Ordering::Relaxed,
                        )
                        .is_ok()
                    {
                        return false;
                    }
                } else {
                    // Slot holds REMOVED: the node was stolen. Reopen the
                    // slot and report success.
                    self.coll_push[index].store(core::ptr::null_mut(), Ordering::Release);
                    return true;
                }
            }
        }
        std::thread::sleep(EXCHANGE_WINDOW);
        false
    }

    /// Pop side of the elimination protocol. Returns a node this thread now
    /// owns exclusively.
    fn try_remove(&self) -> Option<*mut Node<T>> {
        let pos = self.rand_position();
        let slots = self.coll_push.len();

        // Phase 1: steal a posted push.
        for i in 0..TRY_TIMES {
            let index = (pos + i) % slots;
            let push_op = self.coll_push[index].load(Ordering::Relaxed);
            if !push_op.is_null()
                && push_op != removed::<T>()
                && self.coll_push[index]
                    .compare_exchange(push_op, removed::<T>(), Ordering::AcqRel, Ordering::Relaxed)
                    .is_ok()
            {
                return Some(push_op);
            }
        }

        // Phase 2: post a tombstone and wait for a push to fill it.
        for i in 0..TRY_TIMES {
            let index = (pos + i) % slots;
            let pop_op = self.coll_pop[index].load(Ordering::Relaxed);
            if !pop_op.is_null() {
                continue;
            }
            if self.coll_pop[index]
                .compare_exchange(pop_op, tomb_stone::<T>(), Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            std::thread::sleep(EXCHANGE_WINDOW);
            loop {
                let seen = self.coll_pop[index].load(Ordering::Acquire);
                if seen != tomb_stone::<T>() {
                    // A push replaced the tombstone with its node.
                    self.coll_pop[index].store(core::ptr::null_mut(), Ordering::Release);
                    return Some(seen);
                }
                // Still ours; withdraw. Losing the CAS means a push landed
                // at the last moment, so loop and take it.
                if self.coll_pop[index]
                    .compare_exchange(
                        tomb_stone::<T>(),
                        core::ptr::null_mut(),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return None;
                }
            }
        }
        std::thread::sleep(EXCHANGE_WINDOW);
        None
    }
}

impl<T> Drop for EliminationStack<T> {
    fn drop(&mut self) {
        let mut cur = self.top.load(Ordering::Relaxed);
        while !cur.is_null() {
            let next = unsafe { (*cur).next };
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
        // A node parked in `coll_push` at drop time would have no owner, but
        // exclusive access here means no operation is in flight; slots can
        // only hold tags.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_single() {
        let s = EliminationStack::new();
        s.push(5);
        assert_eq!(s.pop(), Some(5));
        assert!(s.is_empty());
        assert_eq!(s.pop(), None);
    }

    #[test]
    fn lifo_order_uncontended() {
        let s = EliminationStack::with_collision_slots(4);
        for i in 0..50 {
            s.push(i);
        }
        for i in (0..50).rev() {
            assert_eq!(s.pop(), Some(i));
        }
        assert_eq!(s.pop(), None);
    }
}
