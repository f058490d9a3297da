use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Memoizes read-only responses by request signature.
///
/// Entries expire lazily on lookup. Writes to the underlying data never
/// invalidate an entry, and concurrent misses for the same signature all
/// reach the origin; the last `store` wins.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Arc<ResponseCacheInner>,
}

struct ResponseCacheInner {
    cache: DashMap<String, CacheEntry>,
    config: CacheConfig,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl: Duration,
    pub history_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            history_ttl: Duration::from_secs(60),
        }
    }
}

#[derive(Clone, Debug)]
struct CacheEntry {
    payload: Value,
    expires_at: Instant,
    hit_count: usize,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(ResponseCacheInner {
                cache: DashMap::new(),
                config,
            }),
        }
    }

    /// Signature of a read request: the full path plus its raw query string.
    pub fn signature(path: &str, query: Option<&str>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());

        if let Some(query) = query.filter(|q| !q.is_empty()) {
            hasher.update(b"?");
            hasher.update(query.as_bytes());
        }

        format!("{:x}", hasher.finalize())
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.config.default_ttl
    }

    pub fn history_ttl(&self) -> Duration {
        self.inner.config.history_ttl
    }

    pub fn lookup(&self, signature: &str) -> Option<Value> {
        if !self.inner.config.enabled {
            return None;
        }

        let mut entry = self.inner.cache.get_mut(signature)?;

        let now = Instant::now();
        if now >= entry.expires_at {
            drop(entry);
            self.evict_if_expired(signature, now);
            return None;
        }

        entry.hit_count += 1;
        let hit_count = entry.hit_count;
        let payload = entry.payload.clone();

        info!("Cache hit for key: {} (hits: {})", signature, hit_count);
        Some(payload)
    }

    /// Expiry is re-checked under the shard lock, so an entry stored after
    /// the caller saw the stale one survives.
    fn evict_if_expired(&self, signature: &str, now: Instant) -> bool {
        let evicted = self
            .inner
            .cache
            .remove_if(signature, |_, entry| now >= entry.expires_at)
            .is_some();
        if evicted {
            debug!("Cache entry expired: {}", signature);
        }
        evicted
    }

    pub fn store(&self, signature: String, payload: Value, ttl: Duration) {
        if !self.inner.config.enabled {
            return;
        }

        let entry = CacheEntry {
            payload,
            expires_at: Instant::now() + ttl,
            hit_count: 0,
        };

        self.inner.cache.insert(signature.clone(), entry);
        debug!("Cached response for key: {} (ttl: {:?})", signature, ttl);
    }

    pub fn stats(&self) -> CacheStats {
        let mut total_hits = 0;
        let mut total_entries = 0;

        for entry in self.inner.cache.iter() {
            total_entries += 1;
            total_hits += entry.value().hit_count;
        }

        CacheStats {
            total_entries,
            total_hits,
            enabled: self.inner.config.enabled,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub total_hits: usize,
    pub enabled: bool,
}
