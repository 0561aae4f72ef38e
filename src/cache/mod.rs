//! Render cache — bounded, TTL-based storage for rendered markup.
//!
//! The SSR dispatcher talks to the cache only through the [`RenderCache`]
//! trait, so the storage can be swapped (or replaced by a failing double in
//! tests) without touching the dispatch logic. The crate ships a single
//! implementation, [`MemoryRenderCache`]: an in-process LRU map whose
//! entries carry their own expiry instant.
//!
//! ## Contract
//!
//! - `get` resolves immediately. Expired entries are indistinguishable from
//!   missing ones. A miss is `Ok(None)`, never an error.
//! - `set` overwrites an existing key and evicts one entry when a new key
//!   arrives at capacity.
//! - Errors from `get` mean the cache itself is broken; callers propagate
//!   them. Errors from `set` are best-effort failures; callers may log and
//!   continue.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use thiserror::Error;

pub mod memory;

pub use memory::{MemoryCacheConfig, MemoryRenderCache};

/// Boxed future returned by [`RenderCache`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + Send + 'a>>;

/// Errors raised by render cache implementations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("render cache state is poisoned by a panicked writer")]
    Poisoned,

    #[error("ttl for key `{key}` must be non-zero and representable as an expiry instant")]
    InvalidTtl { key: String },

    #[error("value for key `{key}` is {size} bytes, exceeding the {max_bytes} byte limit")]
    ValueTooLarge {
        key: String,
        size: usize,
        max_bytes: usize,
    },

    #[error("render cache backend failure: {message}")]
    Backend { message: String },
}

/// Key/value storage for rendered pages.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one cache is shared by every
///   request handler.
/// - No internal lock may be held across an `.await` point, so a reader never
///   observes a half-applied `set`.
pub trait RenderCache: Send + Sync {
    /// Look up `key`, returning `None` when it is absent or expired.
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>>;

    /// Store `value` under `key` until `ttl` has elapsed.
    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()>;
}
