use std::sync::Arc;

use crate::entry::Entry;

/// A store is a common interface for storing, reading and deleting cache entries.
///
/// All operations are synchronous. A `set` must be visible to a `get` for the
/// same key that follows it; the cache relies on this to coalesce fetches.
///
/// The store never expires entries on its own. Entries are only replaced by
/// `set` or removed by `delete`.
pub trait Store<K, V, E>: Send + Sync {
    /// A name for logs and metrics.
    ///
    /// # Example
    /// - "hashmap"
    /// - "moka"
    fn name(&self) -> &'static str;

    /// Return the entry for `key`, or `None` if there is none.
    fn get(&self, key: &K) -> Option<Entry<K, V, E>>;

    /// Insert or replace the entry for `key`.
    fn set(&self, key: K, entry: Entry<K, V, E>);

    /// Remove the entry for `key`, if any.
    fn delete(&self, key: &K);

    /// Whether an entry exists for `key`.
    fn has(&self, key: &K) -> bool {
        self.get(key).is_some()
    }
}

impl<K, V, E, S> Store<K, V, E> for Arc<S>
where
    S: Store<K, V, E> + ?Sized,
{
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn get(&self, key: &K) -> Option<Entry<K, V, E>> {
        (**self).get(key)
    }

    fn set(&self, key: K, entry: Entry<K, V, E>) {
        (**self).set(key, entry)
    }

    fn delete(&self, key: &K) {
        (**self).delete(key)
    }

    fn has(&self, key: &K) -> bool {
        (**self).has(key)
    }
}
