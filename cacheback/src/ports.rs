#![deny(clippy::all)]

use crate::domain::response::{DeleteResponse, PutResponse};
use crate::domain::{CacheEntry, RefreshTask};
use async_trait::async_trait;
use shared::{Result, TtlMs};

// Ports are the pluggable extension points for the backing store and the
// background execution mechanism

/// Port for the key-value store holding cache entries.
///
/// Implementations only need single-key atomicity; no ordering across keys is assumed.
#[async_trait]
pub trait CacheStore<K, V>: Send + Sync + 'static {
    /// `Ok(None)` when the key is absent or its TTL has elapsed.
    async fn get(&self, key: &K) -> Result<Option<V>>;
    /// `ttl` of `None` keeps the value until it is deleted or evicted.
    async fn put(&self, key: K, val: V, ttl: Option<TtlMs>) -> Result<PutResponse>;
    async fn delete(&self, key: &K) -> Result<DeleteResponse>;
}

/// The store shape every job runs against.
pub type EntryStore = dyn CacheStore<String, CacheEntry>;

/// Port for submitting a refresh to run somewhere else.
///
/// Returning `Ok` only means the task was accepted; there is no channel back.
#[async_trait]
pub trait Dispatcher: Send + Sync + 'static {
    async fn dispatch(&self, task: RefreshTask) -> Result<()>;
}
