//! Metrics hook for the SWR cache.
//!
//! The cache emits a [`SwrEvent`] for every call and for every background
//! fetch that settles. This is the only place a failed revalidation is
//! reported: callers never see it.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use swr_wrap::{Counters, wrap};
//!
//! let counters = Arc::new(Counters::default());
//! let cached = wrap(|(id,): (u64,)| async move { load_user(id).await })
//!     .metrics_sink(counters.clone())
//!     .build()?;
//!
//! cached.call((7,)).await?;
//! assert_eq!(counters.misses(), 1);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Events emitted by the cache.
#[derive(Debug)]
pub enum SwrEvent<'a, K, E> {
    /// A call was served from a fresh entry, or from an entry whose fetch is in flight.
    Fresh {
        /// The resolved key.
        key: &'a K,
    },
    /// A call was served a stale value and a background refresh was started.
    Stale {
        /// The resolved key.
        key: &'a K,
    },
    /// A call found no usable entry and started a fetch.
    Miss {
        /// The resolved key.
        key: &'a K,
        /// True if an entry existed but was older than `max_age`.
        expired: bool,
    },
    /// The fetch started by a miss succeeded.
    Settled {
        /// The resolved key.
        key: &'a K,
        /// How long the operation took.
        latency: Duration,
    },
    /// The fetch started by a miss failed. The entry was removed.
    MissFailed {
        /// The resolved key.
        key: &'a K,
        /// The error returned to the waiting callers.
        error: &'a E,
    },
    /// A background refresh succeeded and replaced the cached value.
    Revalidated {
        /// The resolved key.
        key: &'a K,
        /// How long the operation took.
        latency: Duration,
    },
    /// A background refresh failed. The previous value is still cached.
    RevalidationFailed {
        /// The resolved key.
        key: &'a K,
        /// The error, not seen by any caller.
        error: &'a E,
    },
}

impl<K, E> SwrEvent<'_, K, E> {
    /// Short name of the event, suitable as a metric label.
    pub fn name(&self) -> &'static str {
        match self {
            SwrEvent::Fresh { .. } => "fresh",
            SwrEvent::Stale { .. } => "stale",
            SwrEvent::Miss { .. } => "miss",
            SwrEvent::Settled { .. } => "settled",
            SwrEvent::MissFailed { .. } => "miss_failed",
            SwrEvent::Revalidated { .. } => "revalidated",
            SwrEvent::RevalidationFailed { .. } => "revalidation_failed",
        }
    }

    /// The key the event refers to.
    pub fn key(&self) -> &K {
        match self {
            SwrEvent::Fresh { key }
            | SwrEvent::Stale { key }
            | SwrEvent::Miss { key, .. }
            | SwrEvent::Settled { key, .. }
            | SwrEvent::MissFailed { key, .. }
            | SwrEvent::Revalidated { key, .. }
            | SwrEvent::RevalidationFailed { key, .. } => *key,
        }
    }
}

/// Trait for receiving cache events.
///
/// Implement this trait to collect metrics from the cache.
///
/// # Example
///
/// ```ignore
/// use std::sync::Mutex;
/// use swr_wrap::{MetricsSink, SwrEvent};
///
/// struct ErrorLog {
///     errors: Mutex<Vec<String>>,
/// }
///
/// impl MetricsSink<String, MyError> for ErrorLog {
///     fn emit(&self, event: SwrEvent<'_, String, MyError>) {
///         if let SwrEvent::RevalidationFailed { key, error } = event {
///             self.errors.lock().unwrap().push(format!("{key}: {error}"));
///         }
///     }
/// }
/// ```
pub trait MetricsSink<K, E>: Send + Sync {
    /// Emit a single event.
    ///
    /// This is called synchronously in the hot path of every call.
    /// Implementations should be fast (e.g., bump counters or buffer in memory).
    fn emit(&self, event: SwrEvent<'_, K, E>);
}

/// A sink that counts events by kind.
#[derive(Debug, Default)]
pub struct Counters {
    fresh: AtomicU64,
    stale: AtomicU64,
    misses: AtomicU64,
    settled: AtomicU64,
    miss_failures: AtomicU64,
    revalidations: AtomicU64,
    revalidation_failures: AtomicU64,
}

impl Counters {
    /// Calls served a fresh value.
    pub fn fresh(&self) -> u64 {
        self.fresh.load(Ordering::Relaxed)
    }

    /// Calls served a stale value.
    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    /// Calls that started a fetch.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Miss fetches that succeeded.
    pub fn settled(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }

    /// Miss fetches that failed.
    pub fn miss_failures(&self) -> u64 {
        self.miss_failures.load(Ordering::Relaxed)
    }

    /// Background refreshes that succeeded.
    pub fn revalidations(&self) -> u64 {
        self.revalidations.load(Ordering::Relaxed)
    }

    /// Background refreshes that failed.
    pub fn revalidation_failures(&self) -> u64 {
        self.revalidation_failures.load(Ordering::Relaxed)
    }
}

impl<K, E> MetricsSink<K, E> for Counters {
    fn emit(&self, event: SwrEvent<'_, K, E>) {
        let counter = match event {
            SwrEvent::Fresh { .. } => &self.fresh,
            SwrEvent::Stale { .. } => &self.stale,
            SwrEvent::Miss { .. } => &self.misses,
            SwrEvent::Settled { .. } => &self.settled,
            SwrEvent::MissFailed { .. } => &self.miss_failures,
            SwrEvent::Revalidated { .. } => &self.revalidations,
            SwrEvent::RevalidationFailed { .. } => &self.revalidation_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_by_kind() {
        let counters = Counters::default();
        let key = "user:1".to_string();
        let error = "boom".to_string();

        MetricsSink::<String, String>::emit(&counters, SwrEvent::Miss { key: &key, expired: false });
        MetricsSink::<String, String>::emit(
            &counters,
            SwrEvent::Settled {
                key: &key,
                latency: Duration::from_millis(5),
            },
        );
        MetricsSink::<String, String>::emit(&counters, SwrEvent::Fresh { key: &key });
        MetricsSink::<String, String>::emit(&counters, SwrEvent::Stale { key: &key });
        MetricsSink::<String, String>::emit(
            &counters,
            SwrEvent::RevalidationFailed {
                key: &key,
                error: &error,
            },
        );

        assert_eq!(counters.misses(), 1);
        assert_eq!(counters.settled(), 1);
        assert_eq!(counters.fresh(), 1);
        assert_eq!(counters.stale(), 1);
        assert_eq!(counters.revalidation_failures(), 1);
        assert_eq!(counters.revalidations(), 0);
        assert_eq!(counters.miss_failures(), 0);
    }

    #[test]
    fn test_event_name_and_key() {
        let key = 42u32;
        let error = ();

        let event: SwrEvent<'_, u32, ()> = SwrEvent::MissFailed {
            key: &key,
            error: &error,
        };
        assert_eq!(event.name(), "miss_failed");
        assert_eq!(*event.key(), 42);

        let event: SwrEvent<'_, u32, ()> = SwrEvent::Revalidated {
            key: &key,
            latency: Duration::ZERO,
        };
        assert_eq!(event.name(), "revalidated");
    }
}
