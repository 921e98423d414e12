use crate::protocol::{self, Request, Response};
use bytes::Bytes;
use cacheback::{CacheEntry, EntryStore};
use futures::{SinkExt, StreamExt};
use shared::TtlMs;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

/// Accept connections forever, one task per connection.
pub async fn serve(listener: TcpListener, store: Arc<EntryStore>) -> std::io::Result<()> {
    loop {
        let (socket, addr) = listener.accept().await?;
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            info!("Connection {addr} successful.");

            if let Err(err) = process_connection(socket, store).await {
                warn!("Connection {addr} error: {err:?}");
            }
        });
    }
}

pub async fn process_connection(
    socket: TcpStream,
    store: Arc<EntryStore>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    socket.set_nodelay(true).ok();

    let mut framed = Framed::new(socket, protocol::codec());

    while let Some(frame_result) = framed.next().await {
        let frame = frame_result?;

        let request = match Request::decode(frame.freeze()) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!("Failed to decode request: {}", e);
                framed.send(Response::Error { msg: e }.encode()).await?;
                continue;
            }
        };

        debug!("Received request: {:?}", request);

        let response = handle(&store, request).await;
        framed.send(response.encode()).await?;
    }

    Ok(())
}

async fn handle(store: &Arc<EntryStore>, request: Request) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::Set { key, ttl_ms, entry } => {
            let entry: CacheEntry = match serde_json::from_slice(&entry) {
                Ok(entry) => entry,
                Err(e) => {
                    return Response::Error {
                        msg: format!("Invalid entry: {}", e),
                    };
                }
            };
            let ttl = (ttl_ms > 0).then_some(TtlMs(ttl_ms));
            match store.put(key, entry, ttl).await {
                Ok(_) => Response::Ok,
                Err(e) => Response::Error {
                    msg: format!("Set failed: {}", e),
                },
            }
        }

        Request::Get { key } => match store.get(&key).await {
            Ok(Some(entry)) => match serde_json::to_vec(&entry) {
                Ok(bytes) => Response::Value {
                    value: Bytes::from(bytes),
                },
                Err(e) => Response::Error {
                    msg: format!("Get failed: {}", e),
                },
            },
            Ok(None) => Response::NotFound,
            Err(e) => Response::Error {
                msg: format!("Get failed: {}", e),
            },
        },

        Request::Delete { key } => match store.delete(&key).await {
            Ok(resp) => Response::Deleted {
                existed: resp.deleted,
            },
            Err(e) => Response::Error {
                msg: format!("Delete failed: {}", e),
            },
        },
    }
}
