//! swr-wrap - Wrap an async function in a stale-while-revalidate (SWR) cache
//!
//! Callers almost always get an answer right away, even if it is slightly
//! out of date, while a background refresh keeps the cache from drifting:
//! - Fresh values are returned as is
//! - Stale values are returned immediately and refreshed in the background
//! - Missing or expired values are fetched, and concurrent callers share that fetch
//! - A failed refresh keeps the last good value; a failed first fetch is not cached
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use swr_wrap::wrap;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let prices = wrap(|(symbol,): (String,)| async move { fetch_price(&symbol).await })
//!         .revalidate_after(Duration::from_secs(5))
//!         .max_age(Duration::from_secs(60))
//!         .build()?;
//!
//!     // First call waits for the fetch, later ones are served from the cache
//!     let price = prices.call(("ACME".to_string(),)).await?;
//!     Ok(())
//! }
//! ```

mod builder;
mod entry;
mod error;
mod key;
mod metrics;
mod store;
pub mod stores;
mod swr;

// Re-export public API
pub use builder::{SwrBuilder, wrap, wrap_with_resolver};
pub use entry::{Entry, SharedResult, Timestamp};
pub use error::CacheError;
pub use key::{Arguments, first_argument};
pub use metrics::{Counters, MetricsSink, SwrEvent};
pub use store::Store;
pub use stores::memory::HashMapStore;
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use swr::Swr;
