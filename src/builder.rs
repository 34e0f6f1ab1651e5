//! Builder API for wrapping an operation in a cache.
//!
//! [`wrap`] uses the first argument as the cache key and the in-memory
//! [`HashMapStore`]. [`wrap_with_resolver`] takes a custom key resolver.
//! Every other option has a default and can be changed on the builder.

use futures::future::FutureExt;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;

use crate::error::CacheError;
use crate::key::{Arguments, first_argument};
use crate::metrics::MetricsSink;
use crate::store::Store;
use crate::stores::memory::HashMapStore;
use crate::swr::{Operation, Resolver, Settings, Swr};

/// Wrap `operation` in a cache keyed by its first argument.
///
/// Arguments are passed as a tuple. Two calls share a cache entry when
/// their first arguments are equal.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use swr_wrap::wrap;
///
/// let users = wrap(|(id,): (u64,)| async move { db.get_user(id).await })
///     .revalidate_after(Duration::from_secs(30))
///     .max_age(Duration::from_secs(300))
///     .build()?;
///
/// let user = users.call((123,)).await?;
/// ```
pub fn wrap<A, V, E, F, Fut>(
    operation: F,
) -> SwrBuilder<A, A::First, V, E, HashMapStore<A::First, V, E>>
where
    A: Arguments + 'static,
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    let resolver: Resolver<A, A::First> = Arc::new(first_argument::<A>);
    SwrBuilder::new(box_operation(operation), resolver)
}

/// Wrap `operation` in a cache keyed by `resolver`.
///
/// The resolver must return equal keys for calls that may share a result.
///
/// # Example
///
/// ```ignore
/// let search = wrap_with_resolver(
///     |(index, query): (String, String)| async move { run_search(&index, &query).await },
///     |(index, query): &(String, String)| format!("{index}/{query}"),
/// )
/// .build()?;
/// ```
pub fn wrap_with_resolver<A, K, V, E, F, Fut, R>(
    operation: F,
    resolver: R,
) -> SwrBuilder<A, K, V, E, HashMapStore<K, V, E>>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
    R: Fn(&A) -> K + Send + Sync + 'static,
{
    let resolver: Resolver<A, K> = Arc::new(resolver);
    SwrBuilder::new(box_operation(operation), resolver)
}

fn box_operation<A, V, E, F, Fut>(operation: F) -> Operation<A, V, E>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<V, E>> + Send + 'static,
{
    Arc::new(move |args| operation(args).boxed())
}

/// Builder for a [`Swr`] cache.
pub struct SwrBuilder<A, K, V, E, S> {
    operation: Operation<A, V, E>,
    resolver: Resolver<A, K>,
    store: S,
    max_age: Option<Duration>,
    revalidate_after: Duration,
    sink: Option<Arc<dyn MetricsSink<K, E>>>,
    runtime: Option<Handle>,
}

impl<A, K, V, E> SwrBuilder<A, K, V, E, HashMapStore<K, V, E>> {
    fn new(operation: Operation<A, V, E>, resolver: Resolver<A, K>) -> Self {
        SwrBuilder {
            operation,
            resolver,
            store: HashMapStore::new(),
            max_age: None,
            revalidate_after: Duration::ZERO,
            sink: None,
            runtime: None,
        }
    }
}

impl<A, K, V, E, S> SwrBuilder<A, K, V, E, S> {
    /// Use `store` instead of a fresh in-memory store.
    ///
    /// Pass an `Arc` to keep a handle on the store for inspection.
    pub fn store<S2>(self, store: S2) -> SwrBuilder<A, K, V, E, S2>
    where
        S2: Store<K, V, E>,
    {
        SwrBuilder {
            operation: self.operation,
            resolver: self.resolver,
            store,
            max_age: self.max_age,
            revalidate_after: self.revalidate_after,
            sink: self.sink,
            runtime: self.runtime,
        }
    }

    /// Once a value is older than `max_age`, the next call fetches again and
    /// waits, as if nothing were cached.
    ///
    /// Unbounded by default: a cached value is always served.
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Once a value is older than `revalidate_after`, calls still get it but
    /// also start a background refresh.
    ///
    /// Defaults to zero: any value older than the current instant is stale.
    pub fn revalidate_after(mut self, revalidate_after: Duration) -> Self {
        self.revalidate_after = revalidate_after;
        self
    }

    /// Report cache events, including failed background refreshes, to `sink`.
    pub fn metrics_sink(mut self, sink: Arc<dyn MetricsSink<K, E>>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run fetches on `runtime`.
    ///
    /// Defaults to the runtime `build` is called from.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }
}

impl<A, K, V, E, S> SwrBuilder<A, K, V, E, S>
where
    A: Send + 'static,
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + fmt::Debug + 'static,
    S: Store<K, V, E> + 'static,
{
    /// Build the cache.
    ///
    /// Fails if no runtime was given and this is called outside a tokio runtime.
    pub fn build(self) -> Result<Swr<A, K, V, E, S>, CacheError> {
        let runtime = match self.runtime {
            Some(runtime) => runtime,
            None => Handle::try_current()?,
        };

        Ok(Swr::new(
            self.operation,
            self.resolver,
            self.store,
            Settings {
                max_age: self.max_age,
                revalidate_after: self.revalidate_after,
                sink: self.sink,
                runtime,
            },
        ))
    }
}
