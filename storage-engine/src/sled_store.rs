use async_trait::async_trait;
use cacheback::domain::response::{DeleteResponse, PutResponse};
use cacheback::ports::CacheStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared::{Error, Result, TtlMs};
use std::fmt::Debug;
use std::marker::PhantomData;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize, Deserialize)]
struct Record<V> {
    /// Milliseconds since the epoch; `None` never expires.
    deadline_ms: Option<u64>,
    value: V,
}

/// Sled-backed store, survives restarts
/// Expired records read as absent and are removed on the way
pub struct SledStore<V> {
    db: sled::Db,
    _value: PhantomData<fn() -> V>,
}

impl<V> SledStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open (or create) the database at `path`
    /// Creates the parent directory if it doesn't exist
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Store(format!("Failed to create directory: {}", e)))?;
        }

        let db = sled::open(path)
            .map_err(|e| Error::Store(format!("Failed to open Sled database: {}", e)))?;

        Ok(Self {
            db,
            _value: PhantomData,
        })
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn decode(&self, key: &str, bytes: &[u8]) -> Result<Option<V>> {
        let record: Record<V> = serde_json::from_slice(bytes)
            .map_err(|e| Error::Serialization(format!("Failed to deserialize entry: {}", e)))?;

        match record.deadline_ms {
            Some(deadline) if now_ms() >= deadline => {
                self.db
                    .remove(key.as_bytes())
                    .map_err(|e| Error::Store(format!("Failed to remove expired entry: {}", e)))?;
                Ok(None)
            }
            _ => Ok(Some(record.value)),
        }
    }
}

#[async_trait]
impl<V> CacheStore<String, V> for SledStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &String) -> Result<Option<V>> {
        let value = self
            .db
            .get(key.as_bytes())
            .map_err(|e| Error::Store(format!("Failed to get entry: {}", e)))?;

        match value {
            Some(bytes) => self.decode(key, &bytes),
            None => Ok(None),
        }
    }

    async fn put(&self, key: String, val: V, ttl: Option<TtlMs>) -> Result<PutResponse> {
        let record = Record {
            deadline_ms: ttl.map(|t| now_ms().saturating_add(t.0)),
            value: val,
        };
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| Error::Serialization(format!("Failed to serialize entry: {}", e)))?;

        let previous = self
            .db
            .insert(key.as_bytes(), bytes)
            .map_err(|e| Error::Store(format!("Failed to save entry: {}", e)))?;

        self.db
            .flush_async()
            .await
            .map_err(|e| Error::Store(format!("Failed to flush database: {}", e)))?;

        Ok(PutResponse::new(previous.is_none(), "Successfully inserted"))
    }

    async fn delete(&self, key: &String) -> Result<DeleteResponse> {
        let removed = self
            .db
            .remove(key.as_bytes())
            .map_err(|e| Error::Store(format!("Failed to delete entry: {}", e)))?
            .is_some();

        self.db
            .flush_async()
            .await
            .map_err(|e| Error::Store(format!("Failed to flush database: {}", e)))?;

        Ok(DeleteResponse::new(removed))
    }
}

impl<V> Debug for SledStore<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("entry_count", &self.db.len())
            .finish()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
