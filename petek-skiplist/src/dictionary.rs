//! Skiplist dictionary: a sorted map with unique keys.

use crate::skiplist::SkipList;

/// A lock-free sorted map. Expected O(log n) search through the skiplist's
/// probabilistic levels; keys are unique with first-write-wins semantics.
pub struct Dictionary<K, V> {
    list: SkipList<K, V>,
}

impl<K, V> Default for Dictionary<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Dictionary<K, V>
where
    K: Ord + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty dictionary.
    pub fn new() -> Self {
        Self {
            list: SkipList::new(),
        }
    }

    /// Inserts a binding; `false` if the key is already present (the
    /// existing value is kept).
    pub fn insert(&self, key: K, value: V) -> bool {
        self.list.insert(key, value, false)
    }

    /// Removes a binding, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.list.remove(key)
    }

    /// Looks up a key, cloning its value.
    pub fn get(&self, key: &K) -> Option<V> {
        self.list.get(key)
    }

    /// Membership test.
    pub fn contains(&self, key: &K) -> bool {
        self.list.contains(key)
    }

    /// The smallest live binding.
    pub fn find_min(&self) -> Option<(K, V)> {
        self.list.find_min()
    }

    /// Point-in-time emptiness check.
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// Counts live bindings. Not thread-safe.
    pub fn len(&self) -> usize {
        self.list.len()
    }
}
