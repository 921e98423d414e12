use crate::protocol::{self, Request, Response};
use async_trait::async_trait;
use bytes::Bytes;
use cacheback::domain::response::{DeleteResponse, PutResponse};
use cacheback::{CacheEntry, CacheStore};
use futures::{SinkExt, StreamExt};
use shared::{Error, Result, TtlMs};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, warn};

type Connection = Framed<TcpStream, LengthDelimitedCodec>;

/// `CacheStore` backed by a remote `cacheback-store` server.
///
/// Requests on one `RemoteStore` are serialized over a single connection,
/// which is (re)opened lazily.
pub struct RemoteStore {
    addr: String,
    connection: Mutex<Option<Connection>>,
}

impl RemoteStore {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connection: Mutex::new(None),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self.call(Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn call(&self, request: Request) -> Result<Response> {
        let mut guard = self.connection.lock().await;

        if guard.is_none() {
            debug!("Connecting to store at {}", self.addr);
            let stream = TcpStream::connect(&self.addr)
                .await
                .map_err(|e| Error::Store(format!("Unable to connect to {}: {}", self.addr, e)))?;
            stream.set_nodelay(true).ok();
            *guard = Some(Framed::new(stream, protocol::codec()));
        }

        let Some(framed) = guard.as_mut() else {
            return Err(Error::Internal("store connection missing".to_string()));
        };

        let result = exchange(framed, request).await;
        if result.is_err() {
            // Drop the connection; the next call reconnects.
            warn!("Store connection to {} failed, resetting", self.addr);
            *guard = None;
        }
        result
    }
}

async fn exchange(framed: &mut Connection, request: Request) -> Result<Response> {
    framed.send(request.encode()).await?;

    let frame = framed
        .next()
        .await
        .ok_or_else(|| Error::Store("connection closed by server".to_string()))??;

    Response::decode(frame.freeze()).map_err(Error::Protocol)
}

fn unexpected(response: Response) -> Error {
    match response {
        Response::Error { msg } => Error::Store(msg),
        other => Error::Protocol(format!("unexpected response: {:?}", other)),
    }
}

#[async_trait]
impl CacheStore<String, CacheEntry> for RemoteStore {
    async fn get(&self, key: &String) -> Result<Option<CacheEntry>> {
        match self.call(Request::Get { key: key.clone() }).await? {
            Response::Value { value } => Ok(Some(serde_json::from_slice(&value)?)),
            Response::NotFound => Ok(None),
            other => Err(unexpected(other)),
        }
    }

    async fn put(&self, key: String, val: CacheEntry, ttl: Option<TtlMs>) -> Result<PutResponse> {
        let entry = Bytes::from(serde_json::to_vec(&val)?);
        let request = Request::Set {
            key,
            ttl_ms: ttl.map(|t| t.0.max(1)).unwrap_or(0),
            entry,
        };
        match self.call(request).await? {
            Response::Ok => Ok(PutResponse::new(true, "Successfully inserted")),
            other => Err(unexpected(other)),
        }
    }

    async fn delete(&self, key: &String) -> Result<DeleteResponse> {
        match self.call(Request::Delete { key: key.clone() }).await? {
            Response::Deleted { existed } => Ok(DeleteResponse::new(existed)),
            other => Err(unexpected(other)),
        }
    }
}

impl std::fmt::Debug for RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStore")
            .field("addr", &self.addr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::serve;
    use async_trait::async_trait;
    use cacheback::tasks::queue;
    use cacheback::{
        CacheContext, CachedJob, CallArgs, EntryStatus, Job, JobConfig, MemoryStore,
    };
    use std::sync::Arc;
    use tokio::net::TcpListener;

    async fn start_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let store: Arc<MemoryStore<String, CacheEntry>> = Arc::new(MemoryStore::new());
        tokio::spawn(serve(listener, store));
        addr
    }

    #[tokio::test]
    async fn test_remote_store_round_trip() {
        let addr = start_server().await;
        let store = RemoteStore::new(addr);
        store.ping().await.unwrap();

        let key = "jobs.Example:1".to_string();
        assert_eq!(store.get(&key).await.unwrap(), None);

        let entry = CacheEntry::new(10.0, EntryStatus::Queued, None);
        store
            .put(key.clone(), entry.clone(), Some(TtlMs::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(store.get(&key).await.unwrap(), Some(entry));

        assert!(store.delete(&key).await.unwrap().deleted);
        assert!(!store.delete(&key).await.unwrap().deleted);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_a_store_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let store = RemoteStore::new(addr);
        let result = store.get(&"k".to_string()).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }

    struct UpperJob {
        config: JobConfig,
    }

    #[async_trait]
    impl Job for UpperJob {
        const JOB_TYPE: &'static str = "tests.UpperJob";
        type Output = String;

        fn config(&self) -> &JobConfig {
            &self.config
        }

        async fn fetch(&self, call: &CallArgs) -> Result<String> {
            Ok(call.args[0].as_str().unwrap_or_default().to_uppercase())
        }
    }

    #[tokio::test]
    async fn test_jobs_share_entries_through_the_remote_store() {
        let addr = start_server().await;
        let (dispatcher, _receiver) = queue(8);
        let dispatcher = Arc::new(dispatcher);

        let writer = CachedJob::new(
            UpperJob {
                config: JobConfig::default(),
            },
            CacheContext::new(Arc::new(RemoteStore::new(addr.clone())), dispatcher.clone()),
        );
        let reader = CachedJob::new(
            UpperJob {
                config: JobConfig::default().with_fetch_on_miss(false),
            },
            CacheContext::new(Arc::new(RemoteStore::new(addr)), dispatcher),
        );

        let call = CallArgs::new().arg("oslo").unwrap();
        assert_eq!(writer.get(call.clone()).await.unwrap(), Some("OSLO".to_string()));
        assert_eq!(reader.get(call).await.unwrap(), Some("OSLO".to_string()));
    }
}
