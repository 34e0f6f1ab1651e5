use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::time::Instant;

/// Marks a fetch whose operation panicked. Holds the panic message.
#[derive(Debug, Clone)]
pub(crate) struct Panicked(Arc<str>);

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = match payload.downcast::<String>() {
            Ok(message) => message.as_str().into(),
            Err(payload) => match payload.downcast::<&'static str>() {
                Ok(message) => (*message).into(),
                Err(_) => "operation panicked".into(),
            },
        };
        Panicked(message)
    }

    pub(crate) fn message(&self) -> &str {
        &self.0
    }
}

/// What a fetch settles to: the operation's result, or the panic that cut it short.
pub(crate) type Outcome<V, E> = Result<Result<V, E>, Panicked>;

/// A cloneable handle to the in-flight or resolved result of the wrapped operation.
///
/// Every caller waiting on the same fetch holds a clone of the same handle.
/// If the operation panics, each clone re-raises the panic when polled.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct SharedResult<V, E> {
    inner: Shared<BoxFuture<'static, Outcome<V, E>>>,
}

impl<V, E> Clone for SharedResult<V, E> {
    fn clone(&self) -> Self {
        SharedResult {
            inner: self.inner.clone(),
        }
    }
}

impl<V, E> SharedResult<V, E>
where
    V: Clone,
    E: Clone,
{
    pub(crate) fn new(fetch: BoxFuture<'static, Outcome<V, E>>) -> Self {
        SharedResult {
            inner: fetch.shared(),
        }
    }

    /// The result, if the fetch has settled and did not panic.
    ///
    /// Like [`Shared::peek`], this only sees a result once the handle has
    /// been polled to completion by someone.
    pub fn peek(&self) -> Option<Result<V, E>> {
        self.inner.peek().and_then(|outcome| outcome.as_ref().ok().cloned())
    }

    /// Completes when the fetch settles, without re-raising a panic.
    pub(crate) fn settled(&self) -> impl Future<Output = ()> + use<V, E> {
        self.inner.clone().map(|_| ())
    }
}

impl<V, E> Future for SharedResult<V, E>
where
    V: Clone,
    E: Clone,
{
    type Output = Result<V, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match ready!(self.inner.poll_unpin(cx)) {
            Ok(result) => Poll::Ready(result),
            Err(panicked) => panic::resume_unwind(Box::new(panicked.message().to_string())),
        }
    }
}

/// Build a handle that is already resolved to `value`.
pub(crate) fn resolved<V, E>(value: V) -> SharedResult<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    SharedResult::new(futures::future::ready(Ok(Ok(value))).boxed())
}

/// Time of the last successful resolution of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// The first fetch for this entry has not settled yet.
    Pending,
    /// The entry was last resolved successfully at this instant.
    Resolved(Instant),
}

/// A cache entry for one key.
///
/// Invariants:
/// - `revalidating` is true while a fetch for this key is in flight, either the
///   initial fetch or a background refresh. At most one such fetch exists per key.
/// - `timestamp` only moves forward when a fetch succeeds.
/// - While `revalidating` is set the entry's age is zero.
#[derive(Clone)]
pub struct Entry<K, V, E> {
    /// The key this entry is stored under.
    pub key: K,

    /// The cached result.
    pub value: SharedResult<V, E>,

    /// Time of the last successful resolution.
    pub timestamp: Timestamp,

    /// Set while a fetch for this key is in flight.
    pub revalidating: bool,

    /// Identifies the fetch that created this entry. Settlements for a
    /// different generation leave the entry alone.
    pub(crate) generation: u64,
}

impl<K, V, E> Entry<K, V, E> {
    /// Create an entry for a fetch that has just started.
    pub(crate) fn pending(key: K, value: SharedResult<V, E>, generation: u64) -> Self {
        Entry {
            key,
            value,
            timestamp: Timestamp::Pending,
            revalidating: true,
            generation,
        }
    }

    /// Age of the entry as seen by the cache at `now`.
    ///
    /// Zero while a fetch is in flight, so no second fetch is triggered.
    pub fn age(&self, now: Instant) -> Duration {
        if self.revalidating {
            return Duration::ZERO;
        }
        match self.timestamp {
            Timestamp::Pending => Duration::ZERO,
            Timestamp::Resolved(at) => now.saturating_duration_since(at),
        }
    }

    /// Whether the entry has resolved successfully at least once.
    pub fn is_resolved(&self) -> bool {
        matches!(self.timestamp, Timestamp::Resolved(_))
    }

    /// Return the resolved value, if the entry holds one.
    pub fn ready_value(&self) -> Option<Result<V, E>>
    where
        V: Clone,
        E: Clone,
    {
        self.value.peek()
    }
}

impl<K, V, E> fmt::Debug for Entry<K, V, E>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.key)
            .field("timestamp", &self.timestamp)
            .field("revalidating", &self.revalidating)
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(timestamp: Timestamp, revalidating: bool) -> Entry<&'static str, u32, String> {
        Entry {
            key: "k",
            value: resolved(1),
            timestamp,
            revalidating,
            generation: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_since_resolution() {
        let at = Instant::now();
        tokio::time::advance(Duration::from_millis(250)).await;

        let e = entry(Timestamp::Resolved(at), false);
        assert_eq!(e.age(Instant::now()), Duration::from_millis(250));
        assert!(e.is_resolved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_age_is_zero_while_revalidating() {
        let at = Instant::now();
        tokio::time::advance(Duration::from_secs(10)).await;

        let e = entry(Timestamp::Resolved(at), true);
        assert_eq!(e.age(Instant::now()), Duration::ZERO);
    }

    #[test]
    fn test_pending_entry() {
        let e: Entry<&str, u32, String> = Entry::pending("k", resolved(7), 3);
        assert!(e.revalidating);
        assert!(!e.is_resolved());
        assert_eq!(e.timestamp, Timestamp::Pending);
        assert_eq!(e.generation, 3);
    }

    #[test]
    fn test_panicked_fetch_panics_every_clone() {
        let handle: SharedResult<u32, String> =
            SharedResult::new(futures::future::ready(Err(Panicked("boom".into()))).boxed());

        for clone in [handle.clone(), handle.clone()] {
            let polled = panic::catch_unwind(panic::AssertUnwindSafe(|| clone.now_or_never()));
            let payload = polled.unwrap_err();
            assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("boom"));
        }
        assert!(handle.peek().is_none());
    }

    #[test]
    fn test_panic_message_from_payload() {
        assert_eq!(Panicked::from_payload(Box::new("static")).message(), "static");
        assert_eq!(
            Panicked::from_payload(Box::new(format!("call {}", 2))).message(),
            "call 2"
        );
        assert_eq!(Panicked::from_payload(Box::new(7u8)).message(), "operation panicked");
    }

    #[test]
    fn test_ready_value_of_unpolled_handle() {
        let e = entry(Timestamp::Pending, true);
        // `Shared` only exposes its output once polled.
        assert!(e.ready_value().is_none());
        assert_eq!(e.value.clone().now_or_never(), Some(Ok(1)));
        assert_eq!(e.ready_value(), Some(Ok(1)));
    }
}
