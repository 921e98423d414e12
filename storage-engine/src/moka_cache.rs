use async_trait::async_trait;
use cacheback::domain::response::{DeleteResponse, PutResponse};
use cacheback::ports::CacheStore;
use moka::Expiry;
use moka::future::Cache;
use shared::{Result, TtlMs};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Value plus the TTL it was written with.
#[derive(Clone, Debug)]
struct Stored<V> {
    value: V,
    ttl: Option<Duration>,
}

/// Expires each entry after the TTL given to its last `put`, or the default.
struct PerEntryTtl {
    default_ttl: Option<Duration>,
}

impl<K, V> Expiry<K, Stored<V>> for PerEntryTtl {
    fn expire_after_create(&self, _key: &K, value: &Stored<V>, _created_at: Instant) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }

    fn expire_after_update(
        &self,
        _key: &K,
        value: &Stored<V>,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl.or(self.default_ttl)
    }
}

/// Moka-based cache implementation with per-entry TTL support
/// Provides lock-free, concurrent cache with optional size bounds
pub struct MokaCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    cache: Cache<K, Stored<V>>,
}

impl<K, V> MokaCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    /// Create a new unbounded Moka cache with optional default TTL
    pub fn new_unbounded(default_ttl: Option<Duration>) -> Self {
        Self::new("cacheback".to_string(), None, default_ttl)
    }

    /// Create a new bounded Moka cache with max entries and optional default TTL
    pub fn new_bounded(max_entries: u64, default_ttl: Option<Duration>) -> Self {
        Self::new("cacheback".to_string(), Some(max_entries), default_ttl)
    }

    /// Create a Moka cache from name and optional capacity
    /// `default_ttl` applies to writes that carry no TTL of their own
    pub fn new(name: String, max_entries: Option<u64>, default_ttl: Option<Duration>) -> Self {
        let mut builder = Cache::builder()
            .name(&name)
            .expire_after(PerEntryTtl { default_ttl });

        if let Some(capacity) = max_entries {
            builder = builder.max_capacity(capacity);
        }

        Self {
            cache: builder.build(),
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl<K, V> CacheStore<K, V> for MokaCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        // Expired entries read as absent even before moka evicts them
        Ok(self.cache.get(key).await.map(|stored| stored.value))
    }

    async fn put(&self, key: K, val: V, ttl: Option<TtlMs>) -> Result<PutResponse> {
        let stored = Stored {
            value: val,
            ttl: ttl.map(|t| t.as_duration()),
        };
        let replaced = self.cache.contains_key(&key);
        self.cache.insert(key, stored).await;
        let message = if replaced {
            "Successfully updated"
        } else {
            "Successfully inserted"
        };
        Ok(PutResponse::new(!replaced, message))
    }

    async fn delete(&self, key: &K) -> Result<DeleteResponse> {
        let existed = self.cache.remove(key).await.is_some();
        Ok(DeleteResponse::new(existed))
    }
}

impl<K, V> Debug for MokaCache<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaCache")
            .field("entry_count", &self.cache.entry_count())
            .field("weighted_size", &self.cache.weighted_size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cacheback::{CacheEntry, EntryStatus};
    use tokio::time::sleep;

    #[tokio::test]
    async fn test_moka_cache_put_and_get() {
        let cache = MokaCache::new("test".to_string(), None, None);

        let put_response = cache.put("hello", "world", None).await.unwrap();
        assert!(put_response.created);
        assert_eq!(put_response.message, "Successfully inserted");

        assert_eq!(cache.get(&"hello").await.unwrap(), Some("world"));
    }

    #[tokio::test]
    async fn test_moka_cache_delete() {
        let cache = MokaCache::new("test".to_string(), None, None);

        cache.put("test_key", "test_value", None).await.unwrap();

        let delete_response = cache.delete(&"test_key").await.unwrap();
        assert!(delete_response.deleted);

        assert_eq!(cache.get(&"test_key").await.unwrap(), None);
        assert!(!cache.delete(&"test_key").await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_moka_cache_get_nonexistent() {
        let cache: MokaCache<&str, &str> = MokaCache::new("test".to_string(), None, None);
        assert_eq!(cache.get(&"nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_cache_overwrite() {
        let cache = MokaCache::new("test".to_string(), None, None);

        assert!(cache.put("key", "value1", None).await.unwrap().created);

        let put_response = cache.put("key", "value2", None).await.unwrap();
        assert!(!put_response.created);
        assert_eq!(put_response.message, "Successfully updated");

        assert_eq!(cache.get(&"key").await.unwrap(), Some("value2"));
    }

    #[tokio::test]
    async fn test_moka_cache_with_per_entry_ttl() {
        let cache = MokaCache::new("test".to_string(), None, None);

        cache
            .put("short", "gone soon", Some(TtlMs(100)))
            .await
            .unwrap();
        cache.put("long", "still here", None).await.unwrap();

        assert_eq!(cache.get(&"short").await.unwrap(), Some("gone soon"));

        sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"short").await.unwrap(), None);
        assert_eq!(cache.get(&"long").await.unwrap(), Some("still here"));
    }

    #[tokio::test]
    async fn test_moka_cache_rewrite_resets_ttl() {
        let cache = MokaCache::new("test".to_string(), None, None);

        cache.put("key", "v1", Some(TtlMs(100))).await.unwrap();
        cache.put("key", "v2", None).await.unwrap();

        sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"key").await.unwrap(), Some("v2"));
    }

    #[tokio::test]
    async fn test_moka_cache_with_default_ttl() {
        let cache = MokaCache::new_unbounded(Some(Duration::from_millis(100)));

        cache.put("key", "value", None).await.unwrap();
        assert_eq!(cache.get(&"key").await.unwrap(), Some("value"));

        sleep(Duration::from_millis(150)).await;

        assert_eq!(cache.get(&"key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_moka_cache_bounded() {
        let cache = MokaCache::new_bounded(2, None);

        cache.put("key1", "value1", None).await.unwrap();
        cache.put("key2", "value2", None).await.unwrap();
        cache.put("key3", "value3", None).await.unwrap();

        cache.cache.run_pending_tasks().await;

        assert!(cache.entry_count() <= 2, "Cache should have at most 2 entries");
    }

    #[tokio::test]
    async fn test_moka_cache_holds_cache_entries() {
        let cache: MokaCache<String, CacheEntry> = MokaCache::new_unbounded(None);
        let entry = CacheEntry::new(60.0, EntryStatus::Queued, None);

        cache
            .put("job:key".to_string(), entry.clone(), Some(TtlMs::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(cache.get(&"job:key".to_string()).await.unwrap(), Some(entry));
    }
}
