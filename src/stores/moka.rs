use moka::sync::Cache;
use std::hash::Hash;

use crate::entry::Entry;
use crate::store::Store;

/// Configuration for MokaStore.
#[derive(Debug, Clone, Default)]
pub struct MokaStoreConfig {
    /// Number of entries to allocate room for up front.
    pub initial_capacity: Option<usize>,
}

/// Concurrent store backed by a Moka cache.
///
/// MokaStore provides lock-free reads and fine-grained locking on writes,
/// which suits many threads hitting many distinct keys.
///
/// The Moka cache is built without a capacity limit, time to live or time
/// to idle: entries stay until the SWR cache replaces or deletes them.
pub struct MokaStore<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    cache: Cache<K, Entry<K, V, E>>,
}

impl<K, V, E> MokaStore<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Create a new MokaStore with the given configuration.
    ///
    /// # Example
    /// ```ignore
    /// let store = MokaStore::new(MokaStoreConfig {
    ///     initial_capacity: Some(1_024),
    /// });
    /// ```
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder();

        if let Some(capacity) = config.initial_capacity {
            builder = builder.initial_capacity(capacity);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Approximate number of entries.
    ///
    /// Moka updates this lazily, so it may lag behind recent writes.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl<K, V, E> Store<K, V, E> for MokaStore<K, V, E>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        "moka"
    }

    fn get(&self, key: &K) -> Option<Entry<K, V, E>> {
        self.cache.get(key)
    }

    fn set(&self, key: K, entry: Entry<K, V, E>) {
        self.cache.insert(key, entry);
    }

    fn delete(&self, key: &K) {
        self.cache.invalidate(key);
    }

    fn has(&self, key: &K) -> bool {
        self.cache.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::resolved;

    #[test]
    fn test_get_set_delete() {
        let store: MokaStore<String, String, String> = MokaStore::new(MokaStoreConfig::default());

        // Initially empty
        assert!(store.get(&"key1".to_string()).is_none());

        // Set a value
        let entry = Entry::pending("key1".to_string(), resolved("value1".to_string()), 1);
        store.set("key1".to_string(), entry);

        // Visible to the next read
        let result = store.get(&"key1".to_string()).unwrap();
        assert_eq!(result.key, "key1");
        assert!(store.has(&"key1".to_string()));

        // Delete the value
        store.delete(&"key1".to_string());

        // Should be gone
        assert!(store.get(&"key1".to_string()).is_none());
        assert!(!store.has(&"key1".to_string()));
    }

    #[test]
    fn test_with_initial_capacity() {
        let store: MokaStore<u32, u32, String> = MokaStore::new(MokaStoreConfig {
            initial_capacity: Some(16),
        });

        for i in 0..32 {
            store.set(i, Entry::pending(i, resolved(i), u64::from(i)));
        }

        // Nothing is evicted without a capacity limit.
        for i in 0..32 {
            assert_eq!(store.get(&i).unwrap().generation, u64::from(i));
        }
    }
}
