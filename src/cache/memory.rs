//! In-memory render cache backed by an LRU map.

use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;

use super::{CacheError, CacheFuture, RenderCache};

/// Entry count used when no capacity is configured.
pub const DEFAULT_MAX_ENTRIES: NonZeroUsize = match NonZeroUsize::new(100) {
    Some(n) => n,
    None => unreachable!(),
};

/// Sizing options for [`MemoryRenderCache`].
///
/// Deserializes from the `cache` section of the JSON config:
///
/// ```json
/// { "maxEntries": 100, "maxValueBytes": 1048576 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Maximum number of live entries.
    pub max_entries: NonZeroUsize,

    /// Largest page, in bytes, that will be stored. `None` means unlimited.
    pub max_value_bytes: Option<usize>,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            max_value_bytes: None,
        }
    }
}

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Bounded in-memory [`RenderCache`].
///
/// Expiry is checked against [`tokio::time::Instant`], so a paused test clock
/// drives TTLs deterministically. When a new key arrives at capacity, expired
/// entries are purged first; if none were expired the least recently used
/// entry is evicted.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use rttp_ssr::cache::{MemoryRenderCache, RenderCache};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = MemoryRenderCache::default();
/// cache.set("/home", "<h1>home</h1>".into(), Duration::from_secs(60)).await.unwrap();
/// assert_eq!(cache.get("/home").await.unwrap().as_deref(), Some("<h1>home</h1>"));
/// assert_eq!(cache.get("/about").await.unwrap(), None);
/// # }
/// ```
pub struct MemoryRenderCache {
    entries: Mutex<LruCache<String, Entry>>,
    max_value_bytes: Option<usize>,
}

impl Default for MemoryRenderCache {
    fn default() -> Self {
        Self::new(MemoryCacheConfig::default())
    }
}

impl MemoryRenderCache {
    /// Creates an empty cache sized by `config`.
    pub fn new(config: MemoryCacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.max_entries)),
            max_value_bytes: config.max_value_bytes,
        }
    }

    /// Creates an empty cache holding at most `max_entries` pages.
    pub fn with_capacity(max_entries: NonZeroUsize) -> Self {
        Self::new(MemoryCacheConfig {
            max_entries,
            ..MemoryCacheConfig::default()
        })
    }

    /// Returns the configured entry limit.
    pub fn capacity(&self) -> usize {
        self.lock().map(|entries| entries.cap().get()).unwrap_or(0)
    }

    /// Returns the number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.lock().map(|entries| entries.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, Entry>>, CacheError> {
        self.entries.lock().map_err(|_| CacheError::Poisoned)
    }

    fn lookup(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut entries = self.lock()?;
        let now = Instant::now();

        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }

        entries.pop(key);
        debug!(key = %key, "dropped expired render cache entry");
        Ok(None)
    }

    fn store(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = match now.checked_add(ttl) {
            Some(expires_at) if !ttl.is_zero() => expires_at,
            _ => {
                return Err(CacheError::InvalidTtl {
                    key: key.to_owned(),
                });
            }
        };
        if let Some(max_bytes) = self.max_value_bytes {
            if value.len() > max_bytes {
                return Err(CacheError::ValueTooLarge {
                    key: key.to_owned(),
                    size: value.len(),
                    max_bytes,
                });
            }
        }

        let mut entries = self.lock()?;

        if entries.len() >= entries.cap().get() && !entries.contains(key) {
            purge_expired(&mut entries, now);
        }

        let entry = Entry {
            value,
            expires_at,
        };
        if let Some((evicted, _)) = entries.push(key.to_owned(), entry) {
            if evicted != key {
                debug!(key = %key, evicted = %evicted, "render cache full, evicted least recently used entry");
            }
        }
        Ok(())
    }
}

fn purge_expired(entries: &mut LruCache<String, Entry>, now: Instant) {
    let expired: Vec<String> = entries
        .iter()
        .filter(|(_, entry)| !entry.is_live(now))
        .map(|(key, _)| key.clone())
        .collect();

    for key in expired {
        entries.pop(&key);
    }
}

impl RenderCache for MemoryRenderCache {
    fn get<'a>(&'a self, key: &'a str) -> CacheFuture<'a, Option<String>> {
        Box::pin(async move { self.lookup(key) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String, ttl: Duration) -> CacheFuture<'a, ()> {
        Box::pin(async move { self.store(key, value, ttl) })
    }
}
