//! Response cache over the shared store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::key::{fingerprint, CacheKey};
use crate::store::KvStore;
use crate::types::{ChatRequest, ChatResponse};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
}

impl AtomicStats {
    fn to_stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Exact-match response cache.
///
/// The cache never fails a request: store errors and undecodable entries are
/// logged and treated as misses, write failures are logged and dropped.
/// Streaming requests bypass it entirely.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<dyn KvStore>,
    stats: Arc<AtomicStats>,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            stats: Arc::new(AtomicStats::default()),
        }
    }

    pub fn key(&self, request: &ChatRequest) -> CacheKey {
        fingerprint(request)
    }

    /// Stored response for an identical request, returned as written.
    pub async fn get(&self, request: &ChatRequest) -> Option<ChatResponse> {
        if request.stream {
            return None;
        }
        let key = fingerprint(request);
        match self.store.get(key.as_str()).await {
            Ok(Some(raw)) => match serde_json::from_str::<ChatResponse>(&raw) {
                Ok(resp) => {
                    self.stats.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(key = %key, model = %request.model, "cache hit");
                    Some(resp)
                }
                Err(e) => {
                    self.stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(key = %key, error = %e, "undecodable cache entry, treating as miss");
                    None
                }
            },
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, store = self.store.name(), error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Write-through with TTL; last writer wins.
    pub async fn put(&self, request: &ChatRequest, response: &ChatResponse, ttl: Duration) {
        if request.stream {
            return;
        }
        let key = fingerprint(request);
        let raw = match serde_json::to_string(response) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, error = %e, "failed to encode response for cache");
                return;
            }
        };
        match self.store.set_ex(key.as_str(), &raw, ttl).await {
            Ok(()) => {
                self.stats.writes.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(key = %key, store = self.store.name(), error = %e, "cache write failed");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WindowCount};
    use crate::types::{Message, Usage};
    use crate::{Error, Result};
    use async_trait::async_trait;

    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<String>> {
            Err(Error::cache_store("connection refused"))
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<()> {
            Err(Error::cache_store("connection refused"))
        }
        async fn incr_window(&self, _: &str, _: Duration) -> Result<WindowCount> {
            Err(Error::cache_store("connection refused"))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4o-mini", vec![Message::user("2+2?")]).with_temperature(0.0)
    }

    fn response() -> ChatResponse {
        let mut r = ChatResponse::assistant("chatcmpl-1", "gpt-4o-mini", "4", "stop", Usage::new(10, 1));
        r.cost_usd = 0.0042;
        r
    }

    #[tokio::test]
    async fn test_put_then_get_returns_stored_value() {
        let cache = ResponseCache::new(Arc::new(MemoryStore::new()));
        assert!(cache.get(&request()).await.is_none());

        let stored = response();
        cache.put(&request(), &stored, Duration::from_secs(60)).await;
        let hit = cache.get(&request()).await.unwrap();
        assert_eq!(hit, stored);
        assert_eq!(hit.cost_usd, 0.0042);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.writes), (1, 1, 1));
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[tokio::test]
    async fn test_streaming_requests_bypass_cache() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone());
        let streamed = request().streaming(true);

        cache.put(&streamed, &response(), Duration::from_secs(60)).await;
        assert!(store.is_empty().await);

        cache.put(&request(), &response(), Duration::from_secs(60)).await;
        assert!(cache.get(&streamed).await.is_none());
        assert_eq!(cache.stats().hits, 0);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_to_miss() {
        let cache = ResponseCache::new(Arc::new(BrokenStore));
        cache.put(&request(), &response(), Duration::from_secs(60)).await;
        assert!(cache.get(&request()).await.is_none());
        assert_eq!(cache.stats().errors, 2);
    }

    #[tokio::test]
    async fn test_undecodable_entry_is_miss() {
        let store = Arc::new(MemoryStore::new());
        let cache = ResponseCache::new(store.clone());
        store
            .set_ex(cache.key(&request()).as_str(), "{not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(cache.get(&request()).await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }
}
