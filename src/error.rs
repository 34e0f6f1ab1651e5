/// Error type for building a cache.
///
/// Errors of the wrapped operation are never converted into this type; they
/// reach the caller unchanged through the shared future.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// No runtime was supplied and `build` was called outside of a tokio runtime.
    #[error("no tokio runtime available to drive background fetches: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),
}
