//! Lock-free skiplist core.
//!
//! Towers of up to [`MAX_LEVEL`] links, each link a marked atomic like the
//! ordered list's. The traversal protects prev/cur/next in three hazard
//! slots with the usual load–employ–revalidate pattern, per level, and
//! physically unlinks marked nodes as it goes.
//!
//! Deletion protocol: the deleter marks every level of the tower top-down;
//! the bottom-level mark is the unique claim and the linearization point.
//! Once a level is marked, an insert can no longer link the node there (its
//! forward-pointer CAS expects an unmarked value), so "absent at level i"
//! becomes a stable property and the claimant can verify total unlinking
//! before retiring the node. The one racy window — an insert's predecessor
//! CAS landing after the mark — is closed by the insert itself: it keeps
//! its node hazard-protected while linking and unlinks the level again if
//! it observes the mark after a successful link.

use core::ptr;
use petek::{Marked, MarkedAtomic, NodeHead, Ordering, Reclaim};
use std::cell::Cell;

/// Maximum tower height.
pub(crate) const MAX_LEVEL: usize = 10;

const NEXT_SLOT: usize = 0;
const CUR_SLOT: usize = 1;
const PREV_SLOT: usize = 2;
const CLAIM_SLOT: usize = 3;

#[repr(C)]
pub(crate) struct Node<K, V> {
    head: NodeHead,
    pub(crate) key: K,
    pub(crate) value: V,
    /// Tower height, fixed at allocation; 1..=MAX_LEVEL.
    level: usize,
    next: [MarkedAtomic<Node<K, V>>; MAX_LEVEL],
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V, level: usize) -> Self {
        Self {
            head: NodeHead::new(),
            key,
            value,
            level,
            next: core::array::from_fn(|_| MarkedAtomic::null()),
        }
    }
}

// SAFETY: NodeHead is the first field and Node is #[repr(C)].
unsafe impl<K: 'static, V: 'static> Reclaim for Node<K, V> {}

/// Marsaglia xorshift, one state per thread, seeded from the wall clock.
/// Tower heights follow trailing-ones of the output: level n with
/// probability 2^-n, clamped to `MAX_LEVEL`.
fn random_level() -> usize {
    std::thread_local! {
        static SEED: Cell<u32> = Cell::new(0);
    }
    SEED.with(|seed| {
        let mut x = seed.get();
        if x == 0 {
            let nanos = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.subsec_nanos())
                .unwrap_or(0);
            x = nanos | 0x0100; // ensure nonzero
        }
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        seed.set(x);

        let mut level = 1;
        let mut bits = x;
        while bits & 1 == 1 && level < MAX_LEVEL {
            level += 1;
            bits >>= 1;
        }
        level
    })
}

/// Position returned by `find_pos` at the requested level. The cur node
/// (slot 1) and the predecessor node (slot 2) are still hazard-protected,
/// so the caller may CAS through `pred_loc` before releasing.
struct FindPos<K, V> {
    pred_loc: *const MarkedAtomic<Node<K, V>>,
    cur: *mut Node<K, V>,
    found: bool,
    /// Whether the traversal encountered the skip-target still linked.
    seen: bool,
}

pub(crate) struct SkipList<K, V> {
    head: [MarkedAtomic<Node<K, V>>; MAX_LEVEL],
}

unsafe impl<K: Send + Sync, V: Send + Sync> Send for SkipList<K, V> {}
unsafe impl<K: Send + Sync, V: Send + Sync> Sync for SkipList<K, V> {}

impl<K, V> SkipList<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            head: core::array::from_fn(|_| MarkedAtomic::null()),
        }
    }

    /// Inserts a key/value pair. With `allow_dup` false an equal key is
    /// rejected; with it true the new node lands before existing equals at
    /// the bottom level.
    pub(crate) fn insert(&self, key: K, value: V, allow_dup: bool) -> bool {
        let level = random_level();
        let node = petek::alloc(Node::new(key, value, level));

        // Bottom-level link; the node becomes reachable here.
        loop {
            let pos = self.find_pos(unsafe { &(*node).key }, 0, None);
            if !allow_dup && pos.found {
                release_walk_slots();
                petek::release(CLAIM_SLOT);
                // Never published; still exclusively ours.
                drop(unsafe { Box::from_raw(node) });
                return false;
            }
            unsafe { (*node).next[0].store(Marked::new(pos.cur), Ordering::Relaxed) };
            // Keep our own node protected through the whole linking phase:
            // a concurrent delete may claim and retire it before the upper
            // levels are done, and this slot is what keeps the allocation
            // alive until we finish cleaning up after that race.
            petek::employ(CLAIM_SLOT, node);
            if unsafe {
                (*pos.pred_loc).compare_exchange(
                    Marked::new(pos.cur),
                    Marked::new(node),
                    Ordering::Release,
                    Ordering::Relaxed,
                )
            }
            .is_ok()
            {
                break;
            }
        }

        // Upper levels, bottom-up.
        'linking: for lvl in 1..level {
            loop {
                let pos = self.find_pos(unsafe { &(*node).key }, lvl, Some(node));
                let forward = unsafe { (*node).next[lvl].load(Ordering::Acquire) };
                if forward.is_marked() {
                    // A deleter claimed the tower; stop growing it.
                    break 'linking;
                }
                let succ = pos.cur;
                if forward != Marked::new(succ)
                    && unsafe {
                        (*node).next[lvl].compare_exchange(
                            forward,
                            Marked::new(succ),
                            Ordering::Release,
                            Ordering::Relaxed,
                        )
                    }
                    .is_err()
                {
                    // Only a deleter contends on our forward pointer; loop
                    // to observe the mark.
                    continue;
                }
                if unsafe {
                    (*pos.pred_loc).compare_exchange(
                        Marked::new(succ),
                        Marked::new(node),
                        Ordering::Release,
                        Ordering::Relaxed,
                    )
                }
                .is_ok()
                {
                    // The mark may have landed between our forward-pointer
                    // CAS and the link above; if so the claimant can have
                    // verified this level empty already, so unlink it
                    // ourselves before letting go of the hazard.
                    if unsafe { (*node).next[lvl].load(Ordering::Acquire) }.is_marked() {
                        while self.find_pos(unsafe { &(*node).key }, 0, Some(node)).seen {}
                        break 'linking;
                    }
                    break;
                }
            }
        }

        petek::release(CLAIM_SLOT);
        release_walk_slots();
        true
    }

    /// Removes the first node with `key`; returns its value.
    pub(crate) fn remove(&self, key: &K) -> Option<V> {
        loop {
            let pos = self.find_pos(key, 0, None);
            if !pos.found {
                release_walk_slots();
                return None;
            }
            let node = pos.cur;
            // Bottom-level mark decides the race between concurrent
            // removers of the same node.
            if !self.mark_tower(node) {
                continue;
            }
            petek::employ(CLAIM_SLOT, node);
            let value = unsafe { (*node).value.clone() };
            while self.find_pos(key, 0, Some(node)).seen {}
            release_walk_slots();
            petek::release(CLAIM_SLOT);
            unsafe { petek::retire_node(node) };
            return Some(value);
        }
    }

    /// Clones the value of the first node with `key`.
    pub(crate) fn get(&self, key: &K) -> Option<V> {
        let pos = self.find_pos(key, 0, None);
        let value = if pos.found {
            Some(unsafe { (*pos.cur).value.clone() })
        } else {
            None
        };
        release_walk_slots();
        value
    }

    pub(crate) fn contains(&self, key: &K) -> bool {
        let found = self.find_pos(key, 0, None).found;
        release_walk_slots();
        found
    }

    /// Clones the minimum live entry.
    pub(crate) fn find_min(&self) -> Option<(K, V)> {
        loop {
            let first_m = self.head[0].load(Ordering::Acquire);
            let first = first_m.ptr();
            if first.is_null() {
                return None;
            }
            petek::employ(CUR_SLOT, first);
            if self.head[0].load(Ordering::Acquire) != first_m {
                continue;
            }
            let next = unsafe { (*first).next[0].load(Ordering::Acquire) };
            if next.is_marked() {
                // Claimed by a deleter; help it off the bottom level.
                let _ = self.head[0].compare_exchange(
                    Marked::new(first),
                    Marked::new(next.ptr()),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }
            let entry = unsafe { ((*first).key.clone(), (*first).value.clone()) };
            petek::release(CUR_SLOT);
            return Some(entry);
        }
    }

    /// Removes and returns the minimum entry.
    pub(crate) fn delete_min(&self) -> Option<(K, V)> {
        loop {
            let first_m = self.head[0].load(Ordering::Acquire);
            let first = first_m.ptr();
            if first.is_null() {
                return None;
            }
            petek::employ(CUR_SLOT, first);
            if self.head[0].load(Ordering::Acquire) != first_m {
                continue;
            }
            let next = unsafe { (*first).next[0].load(Ordering::Acquire) };
            if next.is_marked() {
                let _ = self.head[0].compare_exchange(
                    Marked::new(first),
                    Marked::new(next.ptr()),
                    Ordering::Release,
                    Ordering::Relaxed,
                );
                continue;
            }
            if !self.mark_tower(first) {
                continue;
            }
            petek::employ(CLAIM_SLOT, first);
            let entry = unsafe { ((*first).key.clone(), (*first).value.clone()) };
            while self.find_pos(&entry.0, 0, Some(first)).seen {}
            release_walk_slots();
            petek::release(CLAIM_SLOT);
            unsafe { petek::retire_node(first) };
            return Some(entry);
        }
    }

    /// Point-in-time emptiness check.
    pub(crate) fn is_empty(&self) -> bool {
        self.head[0].load(Ordering::Relaxed).is_null()
    }

    /// Counts live bottom-level nodes. Not thread-safe.
    pub(crate) fn len(&self) -> usize {
        let mut n = 0;
        let mut cur = self.head[0].load(Ordering::Relaxed).ptr();
        while !cur.is_null() {
            let next = unsafe { (*cur).next[0].load(Ordering::Relaxed) };
            if !next.is_marked() {
                n += 1;
            }
            cur = next.ptr();
        }
        n
    }

    /// Mark every level of the tower, top-down. Returns whether this call
    /// won the bottom-level mark (the claim to retire the node).
    fn mark_tower(&self, node: *mut Node<K, V>) -> bool {
        let level = unsafe { (*node).level };
        for lvl in (1..level).rev() {
            loop {
                let next = unsafe { (*node).next[lvl].load(Ordering::Acquire) };
                if next.is_marked() {
                    break;
                }
                if unsafe {
                    (*node).next[lvl].compare_exchange(
                        next,
                        next.marked(),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                }
                .is_ok()
                {
                    break;
                }
            }
        }
        loop {
            let next = unsafe { (*node).next[0].load(Ordering::Acquire) };
            if next.is_marked() {
                return false;
            }
            if unsafe {
                (*node).next[0].compare_exchange(
                    next,
                    next.marked(),
                    Ordering::AcqRel,
                    Ordering::Relaxed,
                )
            }
            .is_ok()
            {
                return true;
            }
        }
    }

    /// Core traversal. Descends from the top level to `stop_level`,
    /// unlinking marked nodes along the way (never retiring them — that is
    /// the claimant's job), and returns the boundary position at
    /// `stop_level`: the first node with key ≥ `key`.
    ///
    /// With `skip = Some(target)` the walk treats equal-key nodes other
    /// than `target` as smaller, which lets a claimant reach (and account
    /// for) its exact node among duplicates; `seen` reports whether
    /// `target` was still linked anywhere on the walk.
    fn find_pos(
        &self,
        key: &K,
        stop_level: usize,
        skip: Option<*mut Node<K, V>>,
    ) -> FindPos<K, V> {
        'retry: loop {
            let mut seen = false;
            let mut level = MAX_LEVEL - 1;
            let mut pred_node: *mut Node<K, V> = ptr::null_mut();
            let mut pred_loc: *const MarkedAtomic<Node<K, V>> = &self.head[level];
            let mut cur_m = unsafe { (*pred_loc).load(Ordering::Acquire) };
            if cur_m.is_marked() {
                continue 'retry;
            }
            let mut cur = cur_m.ptr();
            petek::employ(CUR_SLOT, cur);
            if unsafe { (*pred_loc).load(Ordering::Acquire) } != cur_m {
                continue 'retry;
            }
            loop {
                if cur.is_null() {
                    if level == stop_level {
                        return FindPos {
                            pred_loc,
                            cur,
                            found: false,
                            seen,
                        };
                    }
                    level -= 1;
                    pred_loc = if pred_node.is_null() {
                        &self.head[level]
                    } else {
                        unsafe { &(*pred_node).next[level] }
                    };
                    cur_m = unsafe { (*pred_loc).load(Ordering::Acquire) };
                    if cur_m.is_marked() {
                        continue 'retry;
                    }
                    cur = cur_m.ptr();
                    petek::employ(CUR_SLOT, cur);
                    if unsafe { (*pred_loc).load(Ordering::Acquire) } != cur_m {
                        continue 'retry;
                    }
                    continue;
                }

                let next_m = unsafe { (*cur).next[level].load(Ordering::Acquire) };
                let next = next_m.ptr();
                petek::employ(NEXT_SLOT, next);
                if unsafe { (*cur).next[level].load(Ordering::Acquire) } != next_m {
                    continue 'retry;
                }
                if unsafe { (*pred_loc).load(Ordering::Acquire) } != Marked::new(cur) {
                    continue 'retry;
                }

                if next_m.is_marked() {
                    // cur is deleted at this level; unlink and move on.
                    if unsafe {
                        (*pred_loc).compare_exchange(
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
                    if skip == Some(cur) {
                        seen = true;
                    }
                    cur = next;
                    petek::employ(CUR_SLOT, cur);
                    continue;
                }

                let ckey = unsafe { &(*cur).key };
                let advance = match skip {
                    Some(target) => ckey < key || (ckey == key && cur != target),
                    None => ckey < key,
                };
                if advance {
                    petek::employ(PREV_SLOT, cur);
                    pred_node = cur;
                    pred_loc = unsafe { &(*cur).next[level] };
                    cur = next;
                    petek::employ(CUR_SLOT, cur);
                    continue;
                }

                if level == stop_level {
                    return FindPos {
                        pred_loc,
                        cur,
                        found: ckey == key,
                        seen,
                    };
                }
                level -= 1;
                pred_loc = if pred_node.is_null() {
                    &self.head[level]
                } else {
                    unsafe { &(*pred_node).next[level] }
                };
                cur_m = unsafe { (*pred_loc).load(Ordering::Acquire) };
                if cur_m.is_marked() {
                    continue 'retry;
                }
                cur = cur_m.ptr();
                petek::employ(CUR_SLOT, cur);
                if unsafe { (*pred_loc).load(Ordering::Acquire) } != cur_m {
                    continue 'retry;
                }
            }
        }
    }
}

#[inline]
fn release_walk_slots() {
    petek::release(NEXT_SLOT);
    petek::release(CUR_SLOT);
    petek::release(PREV_SLOT);
}

impl<K, V> Drop for SkipList<K, V> {
    fn drop(&mut self) {
        // Exclusive access: the bottom level reaches every tower.
        let mut cur = self.head[0].load(Ordering::Relaxed).ptr();
        while !cur.is_null() {
            let next = unsafe { (*cur).next[0].load(Ordering::Relaxed) }.ptr();
            drop(unsafe { Box::from_raw(cur) });
            cur = next;
        }
    }
}
