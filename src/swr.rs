use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::time::Instant;

use crate::entry::{Entry, Panicked, SharedResult, Timestamp, resolved};
use crate::metrics::{MetricsSink, SwrEvent};
use crate::store::Store;

/// The wrapped operation, boxed.
pub(crate) type Operation<A, V, E> =
    Arc<dyn Fn(A) -> BoxFuture<'static, Result<V, E>> + Send + Sync>;

/// Maps call arguments to a cache key.
pub(crate) type Resolver<A, K> = Arc<dyn Fn(&A) -> K + Send + Sync>;

/// Timing and plumbing options handed over by the builder.
pub(crate) struct Settings<K, E> {
    pub(crate) max_age: Option<Duration>,
    pub(crate) revalidate_after: Duration,
    pub(crate) sink: Option<Arc<dyn MetricsSink<K, E>>>,
    pub(crate) runtime: Handle,
}

/// How a call is served from an existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freshness {
    /// Return the cached value as is.
    Fresh,
    /// Return the cached value and refresh it in the background.
    Stale,
    /// Too old to serve: fetch again and wait for the result.
    Expired,
}

/// Classify an existing entry.
///
/// Both thresholds are exclusive: an age equal to `revalidate_after` is fresh
/// and an age equal to `max_age` is stale.
pub(crate) fn classify<K, V, E>(
    entry: &Entry<K, V, E>,
    now: Instant,
    max_age: Option<Duration>,
    revalidate_after: Duration,
) -> Freshness {
    let age = entry.age(now);

    if max_age.is_some_and(|max_age| age > max_age) {
        Freshness::Expired
    } else if age > revalidate_after {
        Freshness::Stale
    } else {
        Freshness::Fresh
    }
}

struct Inner<A, K, V, E, S> {
    operation: Operation<A, V, E>,
    resolver: Resolver<A, K>,
    store: S,
    max_age: Option<Duration>,
    revalidate_after: Duration,
    sink: Option<Arc<dyn MetricsSink<K, E>>>,
    runtime: Handle,
    /// Held across every read-decide-write on the store, and across every
    /// settlement. Never held across an await or while user code runs.
    decision: Mutex<()>,
    generation: AtomicU64,
}

/// An async operation wrapped in a stale-while-revalidate cache.
///
/// Per call, the cache either:
/// - returns the cached value (fresh, or a fetch for the key is in flight),
/// - returns the cached value and refreshes it in the background (stale),
/// - or starts a fetch and returns its result (empty, or older than `max_age`).
///
/// Concurrent calls for the same key never start more than one fetch.
/// A failed background refresh keeps the previous value; a failed first
/// fetch removes the entry so the next call tries again.
///
/// Cloning is cheap and clones share the same store.
pub struct Swr<A, K, V, E, S> {
    inner: Arc<Inner<A, K, V, E, S>>,
}

impl<A, K, V, E, S> Clone for Swr<A, K, V, E, S> {
    fn clone(&self) -> Self {
        Swr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A, K, V, E, S> Swr<A, K, V, E, S>
where
    A: Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + fmt::Debug + 'static,
    S: Store<K, V, E> + 'static,
{
    pub(crate) fn new(
        operation: Operation<A, V, E>,
        resolver: Resolver<A, K>,
        store: S,
        settings: Settings<K, E>,
    ) -> Self {
        Swr {
            inner: Arc::new(Inner {
                operation,
                resolver,
                store,
                max_age: settings.max_age,
                revalidate_after: settings.revalidate_after,
                sink: settings.sink,
                runtime: settings.runtime,
                decision: Mutex::new(()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Call the wrapped operation through the cache.
    ///
    /// The returned handle resolves immediately when a value is cached. On a
    /// miss it resolves with the result of the new fetch, including its error.
    /// Handles can be cloned and awaited from several tasks.
    ///
    /// Must be called from within the runtime the cache was built with, or
    /// with that runtime still alive.
    pub fn call(&self, args: A) -> SharedResult<V, E> {
        tracing::trace!("Function called");

        let key = (self.inner.resolver)(&args);
        let now = Instant::now();

        let guard = self.inner.decision.lock();

        let Some(entry) = self.inner.store.get(&key) else {
            let value = self.inner.start_fetch(key.clone(), args);
            drop(guard);

            tracing::debug!("Cache is empty: store={}", self.inner.store.name());
            self.inner.emit(SwrEvent::Miss {
                key: &key,
                expired: false,
            });
            self.inner.drive(&value);
            return value;
        };

        match classify(&entry, now, self.inner.max_age, self.inner.revalidate_after) {
            Freshness::Fresh => {
                drop(guard);

                self.inner.emit(SwrEvent::Fresh { key: &key });
                entry.value
            }
            Freshness::Stale => {
                let generation = entry.generation;
                let value = entry.value.clone();
                self.inner.store.set(
                    key.clone(),
                    Entry {
                        revalidating: true,
                        ..entry
                    },
                );
                drop(guard);

                tracing::debug!("Cache is stale, revalidating");
                self.inner.emit(SwrEvent::Stale { key: &key });
                self.inner.spawn_revalidation(key, generation, args);
                value
            }
            Freshness::Expired => {
                let value = self.inner.start_fetch(key.clone(), args);
                drop(guard);

                tracing::debug!("Cache expired: store={}", self.inner.store.name());
                self.inner.emit(SwrEvent::Miss {
                    key: &key,
                    expired: true,
                });
                self.inner.drive(&value);
                value
            }
        }
    }

    /// Return the entry for `key` without starting any fetch.
    pub fn peek(&self, key: &K) -> Option<Entry<K, V, E>> {
        self.inner.store.get(key)
    }

    /// The store backing this cache.
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Age beyond which a cached value is fetched again before returning.
    /// `None` means cached values are always served.
    pub fn max_age(&self) -> Option<Duration> {
        self.inner.max_age
    }

    /// Age beyond which a cached value is refreshed in the background.
    pub fn revalidate_after(&self) -> Duration {
        self.inner.revalidate_after
    }
}

impl<A, K, V, E, S> Inner<A, K, V, E, S>
where
    A: Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + fmt::Debug + 'static,
    S: Store<K, V, E> + 'static,
{
    fn emit(&self, event: SwrEvent<'_, K, E>) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    /// Store a pending entry for a new fetch and return its handle.
    ///
    /// The caller must hold the decision lock. The operation itself is only
    /// invoked once the handle is polled, so no user code runs under the lock.
    fn start_fetch(self: &Arc<Self>, key: K, args: A) -> SharedResult<V, E> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let operation = Arc::clone(&self.operation);
        let cache: Weak<Self> = Arc::downgrade(self);
        let settle_key = key.clone();

        let fetch = async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { operation(args).await })
                .catch_unwind()
                .await;
            // Settle before any waiter sees the result, so a caller that
            // observes it and calls again finds the updated entry.
            match outcome {
                Ok(result) => {
                    if let Some(cache) = cache.upgrade() {
                        cache.settle_fetch(&settle_key, generation, &result, started.elapsed());
                    }
                    Ok(result)
                }
                Err(payload) => {
                    let panicked = Panicked::from_payload(payload);
                    if let Some(cache) = cache.upgrade() {
                        cache.abandon_fetch(&settle_key, generation, &panicked);
                    }
                    Err(panicked)
                }
            }
        };
        let value = SharedResult::new(fetch.boxed());

        self.store
            .set(key.clone(), Entry::pending(key, value.clone(), generation));
        value
    }

    /// Poll a fetch to completion even if every caller drops its handle.
    fn drive(&self, value: &SharedResult<V, E>) {
        self.runtime.spawn(value.settled());
    }

    fn settle_fetch(&self, key: &K, generation: u64, result: &Result<V, E>, latency: Duration) {
        let applied = {
            let _guard = self.decision.lock();
            match self.store.get(key) {
                Some(current) if current.generation == generation => {
                    match result {
                        Ok(_) => self.store.set(
                            key.clone(),
                            Entry {
                                timestamp: Timestamp::Resolved(Instant::now()),
                                revalidating: false,
                                ..current
                            },
                        ),
                        Err(_) => self.store.delete(key),
                    }
                    true
                }
                _ => false,
            }
        };

        if !applied {
            tracing::trace!("Entry was replaced before its fetch settled");
        }

        match result {
            Ok(_) => {
                tracing::debug!("Cache set");
                self.emit(SwrEvent::Settled { key, latency });
            }
            Err(error) => {
                tracing::warn!(
                    "Cache set failed: store={}, error={:?}",
                    self.store.name(),
                    error
                );
                self.emit(SwrEvent::MissFailed { key, error });
            }
        }
    }

    /// Remove the entry of a miss fetch whose operation panicked.
    ///
    /// Waiting callers re-raise the panic themselves.
    fn abandon_fetch(&self, key: &K, generation: u64, panicked: &Panicked) {
        {
            let _guard = self.decision.lock();
            match self.store.get(key) {
                Some(current) if current.generation == generation => self.store.delete(key),
                _ => tracing::trace!("Entry was replaced before its fetch panicked"),
            }
        }

        tracing::warn!(
            "Cache fetch panicked: store={}, message={}",
            self.store.name(),
            panicked.message()
        );
    }

    /// Refresh a stale entry in a detached task.
    ///
    /// The caller has already flagged the entry as revalidating.
    fn spawn_revalidation(self: &Arc<Self>, key: K, generation: u64, args: A) {
        let operation = Arc::clone(&self.operation);
        let cache: Weak<Self> = Arc::downgrade(self);

        self.runtime.spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { operation(args).await })
                .catch_unwind()
                .await;
            let Some(cache) = cache.upgrade() else {
                return;
            };
            match outcome {
                Ok(result) => {
                    cache.settle_revalidation(key, generation, result, started.elapsed())
                }
                Err(payload) => {
                    cache.abandon_revalidation(&key, generation, &Panicked::from_payload(payload))
                }
            }
        });
    }

    /// Clear the revalidating flag after the refresh operation panicked.
    /// The stale value and its timestamp stay.
    fn abandon_revalidation(&self, key: &K, generation: u64, panicked: &Panicked) {
        {
            let _guard = self.decision.lock();
            match self.store.get(key) {
                Some(current) if current.generation == generation => self.store.set(
                    key.clone(),
                    Entry {
                        revalidating: false,
                        ..current
                    },
                ),
                _ => tracing::trace!("Entry was replaced before its revalidation panicked"),
            }
        }

        tracing::warn!(
            "Cache revalidation panicked: store={}, message={}",
            self.store.name(),
            panicked.message()
        );
    }

    fn settle_revalidation(
        &self,
        key: K,
        generation: u64,
        result: Result<V, E>,
        latency: Duration,
    ) {
        let applied = {
            let _guard = self.decision.lock();
            match self.store.get(&key) {
                Some(current) if current.generation == generation => {
                    let updated = match &result {
                        Ok(value) => Entry {
                            value: resolved(value.clone()),
                            timestamp: Timestamp::Resolved(Instant::now()),
                            revalidating: false,
                            ..current
                        },
                        // Keep the stale value and its timestamp.
                        Err(_) => Entry {
                            revalidating: false,
                            ..current
                        },
                    };
                    self.store.set(key.clone(), updated);
                    true
                }
                _ => false,
            }
        };

        if !applied {
            tracing::trace!("Entry was replaced before its revalidation settled");
        }

        match &result {
            Ok(_) => {
                tracing::debug!("Cache revalidated");
                self.emit(SwrEvent::Revalidated { key: &key, latency });
            }
            Err(error) => {
                tracing::warn!(
                    "Cache revalidation failed: store={}, error={:?}",
                    self.store.name(),
                    error
                );
                self.emit(SwrEvent::RevalidationFailed { key: &key, error });
            }
        }
    }
}
