use crate::clock::{Clock, SystemClock};
use crate::domain::response::{DeleteResponse, PutResponse};
use crate::ports::CacheStore;
use async_trait::async_trait;
use dashmap::DashMap;
use shared::{Result, TtlMs};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// In-process store backed by a `DashMap`.
///
/// TTLs are measured against the injected clock, so tests can expire entries
/// without sleeping. Expired entries are dropped lazily on read.
pub struct MemoryStore<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    entries: DashMap<K, (V, Option<f64>)>,
    clock: Arc<dyn Clock>,
}

impl<K, V> MemoryStore<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> CacheStore<K, V> for MemoryStore<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    async fn get(&self, key: &K) -> Result<Option<V>> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(slot) => match slot.1 {
                Some(deadline) if now >= deadline => true,
                _ => return Ok(Some(slot.0.clone())),
            },
            None => return Ok(None),
        };

        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: K, val: V, ttl: Option<TtlMs>) -> Result<PutResponse> {
        let deadline = ttl.map(|t| self.clock.now() + t.as_duration().as_secs_f64());
        let replaced = self.entries.insert(key, (val, deadline)).is_some();
        let message = if replaced {
            "Successfully updated"
        } else {
            "Successfully inserted"
        };
        Ok(PutResponse::new(!replaced, message))
    }

    async fn delete(&self, key: &K) -> Result<DeleteResponse> {
        let existed = self.entries.remove(key).is_some();
        Ok(DeleteResponse::new(existed))
    }
}

impl<K, V> Debug for MemoryStore<K, V>
where
    K: Debug + Hash + Eq + Send + Sync + 'static,
    V: Debug + Send + Sync + Clone + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("entry_count", &self.entries.len())
            .finish()
    }
}
