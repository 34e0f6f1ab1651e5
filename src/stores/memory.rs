use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;

use crate::entry::Entry;
use crate::store::Store;

/// Thread-safe in-memory store using a `HashMap` behind a `RwLock`.
///
/// This is the default store. It holds every entry until the cache
/// replaces or deletes it.
pub struct HashMapStore<K, V, E> {
    state: RwLock<HashMap<K, Entry<K, V, E>>>,
}

impl<K, V, E> HashMapStore<K, V, E> {
    /// Create an empty store.
    pub fn new() -> Self {
        HashMapStore {
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Number of entries, including ones whose first fetch is still pending.
    pub fn len(&self) -> usize {
        self.state.read().len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.state.read().is_empty()
    }

    /// Remove every entry.
    ///
    /// Fetches already in flight finish but do not write back.
    pub fn clear(&self) {
        self.state.write().clear();
    }
}

impl<K, V, E> Default for HashMapStore<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> Store<K, V, E> for HashMapStore<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn name(&self) -> &'static str {
        "hashmap"
    }

    fn get(&self, key: &K) -> Option<Entry<K, V, E>> {
        self.state.read().get(key).cloned()
    }

    fn set(&self, key: K, entry: Entry<K, V, E>) {
        self.state.write().insert(key, entry);
    }

    fn delete(&self, key: &K) {
        self.state.write().remove(key);
    }

    fn has(&self, key: &K) -> bool {
        self.state.read().contains_key(key)
    }
}
