//! Thumbnail cache
//!
//! Process-scoped, in-memory cache of successful thumbnail responses, backed
//! by moka. It starts empty, is only filled by the relay's fetch-and-cache
//! path, and is bounded by entry count, per-entry body size and TTL.

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ThumbnailCacheConfig;

/// A thumbnail response as it came back from the backend
#[derive(Debug, Clone)]
pub struct CachedThumbnail {
    pub status: StatusCode,
    /// Backend response headers, already filtered for relaying
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Default cap on a single cached body
pub const DEFAULT_MAX_ENTRY_BYTES: u64 = 256 * 1024;

/// Bounded TTL cache keyed by `path?query`
pub struct ThumbnailCache {
    cache: Cache<String, Arc<CachedThumbnail>>,
    ttl: Duration,
    max_entry_bytes: u64,
}

impl std::fmt::Debug for ThumbnailCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailCache")
            .field("entry_count", &self.cache.entry_count())
            .field("ttl", &self.ttl)
            .field("max_entry_bytes", &self.max_entry_bytes)
            .finish()
    }
}

impl ThumbnailCache {
    /// Create a cache holding at most `max_entries` thumbnails for `ttl` each
    pub fn with_capacity_and_ttl(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self {
            cache,
            ttl,
            max_entry_bytes: DEFAULT_MAX_ENTRY_BYTES,
        }
    }

    /// Set the largest body the cache will hold
    pub fn with_max_entry_bytes(mut self, max_entry_bytes: u64) -> Self {
        self.max_entry_bytes = max_entry_bytes;
        self
    }

    /// Whether a body of `len` bytes may be buffered and stored
    pub fn admits(&self, len: u64) -> bool {
        len <= self.max_entry_bytes
    }

    /// Get a cached thumbnail
    pub async fn get(&self, key: &str) -> Option<Arc<CachedThumbnail>> {
        self.cache.get(key).await
    }

    /// Store a thumbnail, replacing any previous entry for the key
    pub async fn insert(&self, key: impl Into<String>, thumbnail: CachedThumbnail) {
        self.cache.insert(key.into(), Arc::new(thumbnail)).await;
    }

    /// Approximate number of cached thumbnails
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Apply pending evictions; entry counts are eventually consistent otherwise
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }
}

/// Create the thumbnail cache described by the configuration.
///
/// Returns `None` when caching is disabled.
pub fn create_thumbnail_cache(config: &ThumbnailCacheConfig) -> Option<Arc<ThumbnailCache>> {
    if !config.enabled {
        return None;
    }
    let ttl = Duration::from_secs(config.ttl_seconds);
    Some(Arc::new(
        ThumbnailCache::with_capacity_and_ttl(config.max_entries, ttl)
            .with_max_entry_bytes(config.max_entry_bytes),
    ))
}
