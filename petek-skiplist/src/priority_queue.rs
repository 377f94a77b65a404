//! Skiplist priority queue (smallest key first).

use crate::skiplist::SkipList;

/// A lock-free min-priority queue. Duplicate priorities are permitted; among
/// equal priorities the most recently inserted entry is delivered first.
pub struct PriorityQueue<K, V> {
    list: SkipList<K, V>,
}

impl<K, V> Default for PriorityQueue<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> PriorityQueue<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            list: SkipList::new(),
        }
    }

    /// Inserts an entry with the given priority.
    pub fn insert(&self, priority: K, value: V) {
        self.list.insert(priority, value, true);
    }

    /// Removes and returns the minimum-priority entry.
    pub fn delete_min(&self) -> Option<(K, V)> {
        self.list.delete_min()
    }

    /// Reads the minimum-priority entry without removing it.
    pub fn peek_min(&self) -> Option<(K, V)> {
        self.list.find_min()
    }

    /// Queue alias for [`Self::insert`].
    #[inline]
    pub fn enqueue(&self, priority: K, value: V) {
        self.insert(priority, value);
    }

    /// Queue alias for [`Self::delete_min`].
    #[inline]
    pub fn dequeue(&self) -> Option<(K, V)> {
        self.delete_min()
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Counts live entries. Not thread-safe.
    pub fn len(&self) -> usize {
        self.list.len()
    }
}
