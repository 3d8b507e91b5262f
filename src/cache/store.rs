//! Response cache storage.
//!
//! `ResponseStore` is the seam between the cache stage and whatever holds
//! the entries; the in-process implementation is an LRU with per-entry TTL.
//! Both operations are fallible so a shared backend (or an injected failing
//! store in tests) fits behind the same trait; callers swallow errors.

use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use thiserror::Error;

use crate::util::lock::{rw_read, rw_write};

use super::config::CacheConfig;

const SOURCE: &str = "cache::store";

/// A stored response variant.
///
/// Created on a cache miss after a successful response, destroyed on TTL
/// expiry or eviction. Never created for non-GET methods or non-200
/// statuses; the middleware enforces that invariant before `set`.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: Bytes, ttl: Duration) -> Self {
        Self {
            status,
            headers,
            body,
            stored_at: Instant::now(),
            ttl,
        }
    }

    /// An entry is expired once its TTL window has fully elapsed.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.stored_at) >= self.ttl
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Key -> entry store with TTL expiry.
///
/// Implementations must support concurrent `get`/`set` from multiple
/// workers; last write wins on key collision.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;
    async fn set(&self, key: String, entry: CacheEntry) -> Result<(), StoreError>;
}

/// In-process LRU response store.
///
/// Expiry is lazy: an expired entry is dropped on the read that finds it.
pub struct LruResponseStore {
    entries: RwLock<LruCache<String, CacheEntry>>,
}

impl LruResponseStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.response_limit_non_zero())),
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn invalidate_all(&self) {
        rw_write(&self.entries, SOURCE, "invalidate_all").clear();
    }
}

#[async_trait]
impl ResponseStore for LruResponseStore {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                entries.pop(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: String, entry: CacheEntry) -> Result<(), StoreError> {
        rw_write(&self.entries, SOURCE, "set").push(key, entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn sample_entry(body: &str, ttl: Duration) -> CacheEntry {
        CacheEntry::new(
            200,
            vec![("content-type".to_string(), "text/html".to_string())],
            Bytes::from(body.to_string()),
            ttl,
        )
    }

    #[tokio::test]
    async fn roundtrip_returns_identical_entry() {
        let store = LruResponseStore::new(&CacheConfig::default());
        let key = "page:/orders/order-list/";

        assert!(store.get(key).await.unwrap().is_none());

        let entry = sample_entry("<html>orders</html>", Duration::from_secs(300));
        store.set(key.to_string(), entry.clone()).await.unwrap();

        let cached = store.get(key).await.unwrap().expect("cached entry");
        assert_eq!(cached.status, 200);
        assert_eq!(cached.headers, entry.headers);
        assert_eq!(cached.body, entry.body);
    }

    #[tokio::test]
    async fn expired_entries_read_as_miss() {
        let store = LruResponseStore::new(&CacheConfig::default());
        let key = "page:/reports/sales";

        store
            .set(key.to_string(), sample_entry("stale", Duration::from_millis(10)))
            .await
            .unwrap();

        std::thread::sleep(Duration::from_millis(25));

        assert!(store.get(key).await.unwrap().is_none());
        // The expired entry was dropped, not merely hidden.
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let config = CacheConfig {
            response_limit: 2,
            ..Default::default()
        };
        let store = LruResponseStore::new(&config);
        let ttl = Duration::from_secs(60);

        store.set("page:/a".to_string(), sample_entry("a", ttl)).await.unwrap();
        store.set("page:/b".to_string(), sample_entry("b", ttl)).await.unwrap();
        store.set("page:/c".to_string(), sample_entry("c", ttl)).await.unwrap();

        assert!(store.get("page:/a").await.unwrap().is_none());
        assert!(store.get("page:/b").await.unwrap().is_some());
        assert!(store.get("page:/c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn last_write_wins_on_key_collision() {
        let store = LruResponseStore::new(&CacheConfig::default());
        let ttl = Duration::from_secs(60);

        store.set("page:/x".to_string(), sample_entry("first", ttl)).await.unwrap();
        store.set("page:/x".to_string(), sample_entry("second", ttl)).await.unwrap();

        let cached = store.get("page:/x").await.unwrap().expect("entry");
        assert_eq!(cached.body, Bytes::from("second"));
    }

    #[tokio::test]
    async fn store_recovers_from_poisoned_lock() {
        let store = LruResponseStore::new(&CacheConfig::default());

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = store.entries.write().expect("entries lock");
            panic!("poison entries lock");
        }));

        store
            .set(
                "page:/after".to_string(),
                sample_entry("ok", Duration::from_secs(60)),
            )
            .await
            .unwrap();
        assert!(store.get("page:/after").await.unwrap().is_some());
    }
}
