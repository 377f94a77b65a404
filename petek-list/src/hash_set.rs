//! Split-ordered hash set (Shalev–Shavit) over the ordered list.
//!
//! All elements live in a single sorted list, ordered by the bit-reversal
//! of their hash. A bucket is a shortcut into the middle of that list: a
//! dummy node whose key is the bit-reversed bucket index. Doubling the
//! bucket count therefore never moves an element — new dummies just split
//! existing chains. Dummy keys are even and element keys odd (the top hash
//! bit is set before reversal), so dummies can never collide with elements.
//!
//! Buckets are reached through a fixed directory of lazily allocated
//! segments, so the directory itself never reallocates either.

use crate::ordered_list::{Node, OrderedList};
use core::hash::{BuildHasher, Hash};
use foldhash::fast::FixedState;
use petek::Ordering;
use std::sync::atomic::{AtomicPtr, AtomicUsize};

/// Fixed directory size; the bucket count is capped at
/// `DIRECTORY_SIZE * segment_size`.
const DIRECTORY_SIZE: usize = 512;

/// Default segment size, giving the default expected capacity 512 × 64.
const DEFAULT_SEGMENT: usize = 64;

/// Smallest permitted segment.
const MIN_SEGMENT: usize = 8;

/// Bucket-doubling trigger.
const DEFAULT_LOAD_FACTOR: f32 = 0.75;

/// List entry: bit-reversed key plus the element (`None` for dummies).
/// Sorting by `(key, element)` puts every bucket's dummy directly before
/// that bucket's elements.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct SetEntry<T> {
    key: u32,
    element: Option<T>,
}

/// Key of the dummy node heading bucket `bucket` (even after reversal).
#[inline]
fn dummy_key(bucket: u32) -> u32 {
    bucket.reverse_bits()
}

/// Key of a regular element (odd after reversal: the top bit is set first).
#[inline]
fn regular_key(hash: u32) -> u32 {
    (hash | 0x8000_0000).reverse_bits()
}

/// Highest power of two ≤ `n`, or 0 for 0.
#[inline]
fn largest_one_bit(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        1 << (usize::BITS - 1 - n.leading_zeros())
    }
}

struct Segment<T> {
    slots: Box<[AtomicPtr<Node<SetEntry<T>>>]>,
}

impl<T> Segment<T> {
    fn new(size: usize) -> Self {
        Self {
            slots: (0..size)
                .map(|_| AtomicPtr::new(core::ptr::null_mut()))
                .collect(),
        }
    }
}

/// A lock-free hash set.
pub struct HashSet<T> {
    list: OrderedList<SetEntry<T>>,
    directory: Box<[AtomicPtr<Segment<T>>]>,
    /// Current number of buckets; doubles under load, never shrinks.
    size: AtomicUsize,
    /// Number of elements (dummies excluded).
    count: AtomicUsize,
    segment_size: usize,
    load_factor: f32,
    hasher: FixedState,
}

unsafe impl<T: Send + Sync> Send for HashSet<T> {}
unsafe impl<T: Send + Sync> Sync for HashSet<T> {}

impl<T> Default for HashSet<T>
where
    T: Hash + Ord + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HashSet<T>
where
    T: Hash + Ord + Clone + Send + Sync + 'static,
{
    /// Creates a set with the default expected capacity (512 × 64) and load
    /// factor (0.75).
    pub fn new() -> Self {
        Self::with_capacity_and_load_factor(DIRECTORY_SIZE * DEFAULT_SEGMENT, DEFAULT_LOAD_FACTOR)
    }

    /// Creates a set sized for `expected` elements. The bucket directory is
    /// fixed; `expected` only picks the segment granularity, so exceeding it
    /// degrades search length rather than failing.
    pub fn with_capacity_and_load_factor(expected: usize, load_factor: f32) -> Self {
        let mut segment_size = largest_one_bit(expected / DIRECTORY_SIZE) << 1;
        if segment_size < MIN_SEGMENT {
            segment_size = MIN_SEGMENT;
        }

        let set = Self {
            list: OrderedList::new(),
            directory: (0..DIRECTORY_SIZE)
                .map(|_| AtomicPtr::new(core::ptr::null_mut()))
                .collect(),
            size: AtomicUsize::new(2),
            count: AtomicUsize::new(0),
            segment_size,
            load_factor,
            hasher: FixedState::default(),
        };

        // Bucket 0 heads the whole list and is the root of the parent
        // recursion; install it eagerly.
        let dummy = SetEntry {
            key: dummy_key(0),
            element: None,
        };
        let node = set.list.insert_get(set.list.head_link(), dummy);
        set.set_bucket(0, node);
        set
    }

    /// Inserts an element; `false` if already present.
    pub fn insert(&self, element: T) -> bool {
        let hash = self.hash(&element);
        let old_size = self.size.load(Ordering::Relaxed);
        let bucket = hash as usize % old_size;
        let start = self.bucket_start(bucket);
        let entry = SetEntry {
            key: regular_key(hash),
            element: Some(element),
        };
        if !self.list.insert_at(unsafe { &(*start).next }, entry) {
            return false;
        }
        let count = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        if count as f32 / old_size as f32 > self.load_factor
            && old_size < DIRECTORY_SIZE * self.segment_size
        {
            let _ = self.size.compare_exchange(
                old_size,
                2 * old_size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
        }
        true
    }

    /// Removes an element; `false` if not present.
    pub fn remove(&self, element: &T) -> bool {
        let hash = self.hash(element);
        let bucket = hash as usize % self.size.load(Ordering::Relaxed);
        let start = self.bucket_start(bucket);
        let entry = SetEntry {
            key: regular_key(hash),
            element: Some(element.clone()),
        };
        if !self.list.remove_at(unsafe { &(*start).next }, &entry) {
            return false;
        }
        self.count.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// Membership test.
    pub fn contains(&self, element: &T) -> bool {
        let hash = self.hash(element);
        let bucket = hash as usize % self.size.load(Ordering::Relaxed);
        let start = self.bucket_start(bucket);
        let entry = SetEntry {
            key: regular_key(hash),
            element: Some(element.clone()),
        };
        self.list.contains_at(unsafe { &(*start).next }, &entry)
    }

    /// Number of elements. Racy by nature.
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    fn hash(&self, element: &T) -> u32 {
        self.hasher.hash_one(element) as u32
    }

    /// The dummy node heading `bucket`, initializing the bucket (and,
    /// recursively, its parents) on first touch.
    fn bucket_start(&self, bucket: usize) -> *mut Node<SetEntry<T>> {
        let node = self.get_bucket(bucket);
        if !node.is_null() {
            return node;
        }
        self.initialize_bucket(bucket)
    }

    fn initialize_bucket(&self, bucket: usize) -> *mut Node<SetEntry<T>> {
        // The parent chain strictly decreases, ending at bucket 0 which is
        // installed in the constructor.
        let parent = bucket - largest_one_bit(bucket);
        let parent_node = self.bucket_start(parent);

        let dummy = SetEntry {
            key: dummy_key(bucket as u32),
            element: None,
        };
        // Dummy keys are unique, so racing initializers all converge on the
        // same list node and the directory CAS below cannot disagree.
        let node = self
            .list
            .insert_get(unsafe { &(*parent_node).next }, dummy);
        self.set_bucket(bucket, node);
        node
    }

    fn segment_for(&self, bucket: usize) -> &Segment<T> {
        let index = bucket / self.segment_size;
        let existing = self.directory[index].load(Ordering::Acquire);
        if !existing.is_null() {
            return unsafe { &*existing };
        }
        let fresh = Box::into_raw(Box::new(Segment::new(self.segment_size)));
        match self.directory[index].compare_exchange(
            core::ptr::null_mut(),
            fresh,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => unsafe { &*fresh },
            Err(winner) => {
                drop(unsafe { Box::from_raw(fresh) });
                unsafe { &*winner }
            }
        }
    }

    fn get_bucket(&self, bucket: usize) -> *mut Node<SetEntry<T>> {
        self.segment_for(bucket).slots[bucket % self.segment_size].load(Ordering::Acquire)
    }

    fn set_bucket(&self, bucket: usize, node: *mut Node<SetEntry<T>>) {
        let _ = self.segment_for(bucket).slots[bucket % self.segment_size].compare_exchange(
            core::ptr::null_mut(),
            node,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }
}

impl<T> Drop for HashSet<T> {
    fn drop(&mut self) {
        // Nodes (dummies included) belong to the list and die with it; only
        // the directory's segment allocations are freed here.
        for slot in self.directory.iter() {
            let seg = slot.load(Ordering::Relaxed);
            if !seg.is_null() {
                drop(unsafe { Box::from_raw(seg) });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_remove_contains() {
        let s = HashSet::new();
        assert!(s.insert(3));
        assert!(!s.insert(3));
        assert!(s.contains(&3));
        assert!(s.remove(&3));
        assert!(!s.contains(&3));
        assert!(s.is_empty());
    }

    #[test]
    fn small_capacity_expands() {
        let s = HashSet::with_capacity_and_load_factor(16, 0.75);
        for i in 0..1000 {
            assert!(s.insert(i));
        }
        assert_eq!(s.len(), 1000);
        for i in 0..1000 {
            assert!(s.contains(&i), "lost {}", i);
        }
        for i in 0..1000 {
            assert!(s.remove(&i));
        }
        assert!(s.is_empty());
    }

    #[test]
    fn string_elements() {
        let s = HashSet::new();
        assert!(s.insert("petek".to_string()));
        assert!(s.contains(&"petek".to_string()));
        assert!(!s.contains(&"honeycomb".to_string()));
    }
}
