//! Response cache with Redis, in-process, and disabled backends.
//!
//! Errors are returned to the caller, which treats any failure as a miss.
//! Nothing in here ever prevents a request from being served.

use std::time::{Duration, Instant};

use moka::future::Cache;
use moka::Expiry;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use crate::error::CacheError;
use crate::types::{CacheEntry, QueryParams};

/// Upper bound on any single Redis command.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(1);

/// Upper bound on the start-up connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// URL scheme selecting the in-process backend.
pub const MEMORY_URL: &str = "memory://";

/// Most responses the in-process backend holds before evicting.
pub const MEMORY_MAX_ENTRIES: u64 = 10_000;

const KEY_PREFIX: &str = "weather";

/// Build the cache key for an endpoint and its caller parameters.
///
/// `params` must not contain the API key. Keys are sorted, so equal maps
/// always produce the same key.
pub fn cache_key(endpoint: &str, params: &QueryParams) -> String {
    let canonical = serde_json::to_string(params).unwrap_or_default();
    format!("{}:{}:{}", KEY_PREFIX, endpoint, canonical)
}

#[derive(Clone)]
pub enum CacheProvider {
    Redis(ConnectionManager),
    Memory(MemoryCache),
    Disabled,
}

impl std::fmt::Debug for CacheProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.backend_name())
    }
}

impl CacheProvider {
    /// Select a backend from the configured URL.
    ///
    /// An unreachable Redis degrades to [`CacheProvider::Disabled`].
    pub async fn connect(url: Option<&str>) -> Self {
        let url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(url) => url,
            None => {
                tracing::info!("No cache URL configured, response caching disabled");
                return Self::Disabled;
            }
        };

        if url == MEMORY_URL {
            tracing::info!("Using in-process response cache");
            return Self::Memory(MemoryCache::default());
        }

        match Self::connect_redis(url).await {
            Ok(manager) => {
                tracing::info!("Connected to Redis response cache");
                Self::Redis(manager)
            }
            Err(e) => {
                tracing::warn!("Redis unavailable, response caching disabled: {}", e);
                Self::Disabled
            }
        }
    }

    async fn connect_redis(url: &str) -> Result<ConnectionManager, CacheError> {
        let client = redis::Client::open(url)?;
        tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| CacheError::Timeout)?
            .map_err(CacheError::from)
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Redis(_) => "redis",
            Self::Memory(_) => "memory",
            Self::Disabled => "disabled",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let raw = match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                tokio::time::timeout(OPERATION_TIMEOUT, conn.get::<_, Option<String>>(key))
                    .await
                    .map_err(|_| CacheError::Timeout)??
            }
            Self::Memory(memory) => memory.get(key).await,
            Self::Disabled => None,
        };

        raw.map(|s| serde_json::from_str(&s).map_err(|e| CacheError::Corrupt(e.to_string())))
            .transpose()
    }

    /// Store `entry` for `ttl`. A zero TTL stores nothing.
    pub async fn set(&self, key: &str, entry: &CacheEntry, ttl: Duration) -> Result<(), CacheError> {
        if ttl.is_zero() || !self.is_enabled() {
            return Ok(());
        }
        let raw = serde_json::to_string(entry).map_err(|e| CacheError::Corrupt(e.to_string()))?;

        match self {
            Self::Redis(manager) => {
                let mut conn = manager.clone();
                let seconds = ttl.as_secs().max(1);
                tokio::time::timeout(OPERATION_TIMEOUT, conn.set_ex::<_, _, ()>(key, raw, seconds))
                    .await
                    .map_err(|_| CacheError::Timeout)??;
            }
            Self::Memory(memory) => memory.set(key, raw, ttl).await,
            Self::Disabled => {}
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    raw: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(&self, _key: &String, value: &MemoryEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process TTL store, bounded to [`MEMORY_MAX_ENTRIES`].
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, MemoryEntry>,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(MEMORY_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn with_capacity(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(max_entries)
                .expire_after(EntryTtl)
                .build(),
        }
    }

    async fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).await.map(|entry| entry.raw)
    }

    pub(crate) async fn set(&self, key: &str, raw: String, ttl: Duration) {
        self.entries.insert(key.to_string(), MemoryEntry { raw, ttl }).await;
    }

    /// Live entries, after expired ones have been evicted.
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallMeta;
    use serde_json::json;

    fn entry() -> CacheEntry {
        CacheEntry {
            data: json!({"location": {"name": "Delhi"}}),
            meta: CallMeta {
                status_code: 200,
                duration_ms: 12,
                request_url: "http://upstream/current.json?q=Delhi".into(),
            },
        }
    }

    #[test]
    fn test_cache_key_is_canonical() {
        let mut a = QueryParams::new();
        a.insert("q".into(), json!("Delhi"));
        a.insert("days".into(), json!(3));

        let mut b = QueryParams::new();
        b.insert("days".into(), json!(3));
        b.insert("q".into(), json!("Delhi"));

        assert_eq!(cache_key("forecast.json", &a), cache_key("forecast.json", &b));
        assert_eq!(
            cache_key("forecast.json", &a),
            r#"weather:forecast.json:{"days":3,"q":"Delhi"}"#
        );
    }

    #[test]
    fn test_cache_key_distinguishes_endpoints() {
        let params = QueryParams::new();
        assert_ne!(cache_key("current.json", &params), cache_key("forecast.json", &params));
    }

    #[tokio::test]
    async fn test_connect_without_url_is_disabled() {
        assert!(!CacheProvider::connect(None).await.is_enabled());
        assert!(!CacheProvider::connect(Some("  ")).await.is_enabled());
    }

    #[tokio::test]
    async fn test_connect_unreachable_redis_degrades() {
        let cache = CacheProvider::connect(Some("redis://127.0.0.1:1")).await;
        assert_eq!(cache.backend_name(), "disabled");
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let cache = CacheProvider::connect(Some(MEMORY_URL)).await;
        cache.set("k", &entry(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(entry()));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_entry_expires() {
        let cache = CacheProvider::Memory(MemoryCache::default());
        cache.set("k", &entry(), Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zero_ttl_stores_nothing() {
        let memory = MemoryCache::default();
        let cache = CacheProvider::Memory(memory.clone());
        cache.set("k", &entry(), Duration::ZERO).await.unwrap();
        assert_eq!(memory.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_disabled_is_always_a_miss() {
        let cache = CacheProvider::Disabled;
        cache.set("k", &entry(), Duration::from_secs(30)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_an_error() {
        let memory = MemoryCache::default();
        memory.set("k", "not json".into(), Duration::from_secs(30)).await;
        let cache = CacheProvider::Memory(memory);
        assert!(matches!(cache.get("k").await, Err(CacheError::Corrupt(_))));
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted() {
        let memory = MemoryCache::default();
        for i in 0..1000 {
            memory.set(&format!("k{}", i), "{}".into(), Duration::from_millis(1)).await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        memory.set("fresh", "{}".into(), Duration::from_secs(30)).await;

        assert!(memory.entry_count().await <= 1);
        assert_eq!(memory.get("fresh").await.as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn test_memory_cache_is_bounded() {
        let memory = MemoryCache::with_capacity(10);
        for i in 0..100 {
            memory.set(&format!("k{}", i), "{}".into(), Duration::from_secs(30)).await;
        }
        assert!(memory.entry_count().await <= 10);
    }

    #[tokio::test]
    async fn test_rewrite_takes_new_ttl() {
        let memory = MemoryCache::default();
        memory.set("k", "old".into(), Duration::from_millis(10)).await;
        memory.set("k", "new".into(), Duration::from_secs(30)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(memory.get("k").await.as_deref(), Some("new"));
    }
}
