use bytes::Bytes;
use chorus_types::{ChorusError, ChorusResult, RequestFrame, ResponseFrame, RpcRequest, RpcResponse, WireError};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::codec::Framed;
use tracing::{debug, warn};

type Pending = SyncMutex<HashMap<u64, oneshot::Sender<Result<RpcResponse, WireError>>>>;

struct Conn {
    writer_tx: mpsc::UnboundedSender<RequestFrame>,
    pending: Arc<Pending>,
    closed: Arc<AtomicBool>,
}

/// Client half of the server-to-server RPC shim. Connects lazily and
/// multiplexes concurrent calls over one TCP connection by request id, so a
/// batch of Add or Get spans can be in flight together.
pub struct RpcClient {
    addr: String,
    next_id: AtomicU64,
    conn: Mutex<Option<Arc<Conn>>>,
}

impl RpcClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            next_id: AtomicU64::new(1),
            conn: Mutex::new(None),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub async fn call(&self, request: RpcRequest) -> ChorusResult<RpcResponse> {
        let conn = self.ensure_connected().await?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        conn.pending.lock().insert(id, tx);

        if conn.writer_tx.send(RequestFrame { id, request }).is_err() {
            conn.pending.lock().remove(&id);
            self.drop_conn(&conn).await;
            return Err(ChorusError::Transport(format!(
                "{}: connection closed",
                self.addr
            )));
        }

        // The reader fails all pending calls when it exits; an entry
        // inserted after that sweep would wait forever, so re-check.
        if conn.closed.load(Ordering::Acquire) && conn.pending.lock().remove(&id).is_some() {
            self.drop_conn(&conn).await;
            return Err(ChorusError::Transport(format!(
                "{}: connection lost",
                self.addr
            )));
        }

        match rx.await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(wire)) => Err(wire.into()),
            Err(_) => {
                // Reader task died and dropped the pending entry.
                self.drop_conn(&conn).await;
                Err(ChorusError::Transport(format!(
                    "{}: connection lost",
                    self.addr
                )))
            }
        }
    }

    async fn ensure_connected(&self) -> ChorusResult<Arc<Conn>> {
        let mut guard = self.conn.lock().await;
        if let Some(conn) = guard.as_ref() {
            if !conn.closed.load(Ordering::Acquire) {
                return Ok(conn.clone());
            }
        }

        let stream = TcpStream::connect(&self.addr).await.map_err(|e| {
            ChorusError::Transport(format!("connect {}: {}", self.addr, e))
        })?;
        debug!(addr = %self.addr, "connected");

        let framed = Framed::new(stream, super::codec());
        let (mut sink, mut frames) = framed.split();

        let pending: Arc<Pending> = Arc::new(SyncMutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<RequestFrame>();

        let writer_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(frame) = writer_rx.recv().await {
                let bytes = match bincode::serialize(&frame) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        warn!(error = %e, "request encode failed");
                        break;
                    }
                };
                if sink.send(Bytes::from(bytes)).await.is_err() {
                    break;
                }
            }
            writer_closed.store(true, Ordering::Release);
        });

        let reader_pending = pending.clone();
        let reader_closed = closed.clone();
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                let bytes = match frame {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        debug!(error = %e, "read failed");
                        break;
                    }
                };
                let response: ResponseFrame = match bincode::deserialize(&bytes) {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(error = %e, "response decode failed");
                        break;
                    }
                };
                if let Some(tx) = reader_pending.lock().remove(&response.id) {
                    let _ = tx.send(response.result);
                }
            }
            reader_closed.store(true, Ordering::Release);
            // Fail whatever is still in flight.
            reader_pending.lock().clear();
        });

        let conn = Arc::new(Conn {
            writer_tx,
            pending,
            closed,
        });
        *guard = Some(conn.clone());
        Ok(conn)
    }

    async fn drop_conn(&self, stale: &Arc<Conn>) {
        let mut guard = self.conn.lock().await;
        if let Some(current) = guard.as_ref() {
            if Arc::ptr_eq(current, stale) {
                *guard = None;
            }
        }
    }
}
