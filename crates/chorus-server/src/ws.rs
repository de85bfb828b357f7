use chorus_types::{BoxPublicKey, ChorusResult, Envelope};
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

struct ClientHandle {
    #[allow(dead_code)]
    public_key: Option<BoxPublicKey>,
    sender: mpsc::UnboundedSender<Envelope>,
}

/// Connected WebSocket clients at the entry server, keyed by connection id.
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: RwLock<HashMap<u64, ClientHandle>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            clients: RwLock::new(HashMap::new()),
        }
    }

    fn register(
        &self,
        public_key: Option<BoxPublicKey>,
        sender: mpsc::UnboundedSender<Envelope>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.clients.write().insert(id, ClientHandle { public_key, sender });
        id
    }

    fn unregister(&self, id: u64) {
        self.clients.write().remove(&id);
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.read().is_empty()
    }

    pub fn broadcast(&self, envelope: &Envelope) {
        for handle in self.clients.read().values() {
            let _ = handle.sender.send(envelope.clone());
        }
    }

    pub fn send(&self, id: u64, envelope: Envelope) -> bool {
        match self.clients.read().get(&id) {
            Some(handle) => handle.sender.send(envelope).is_ok(),
            None => false,
        }
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept loop for the client-facing WebSocket endpoint. Incoming
/// `ConvoRequest`s are forwarded to the coordinator tagged with the
/// connection id; everything outbound goes through the registry.
pub async fn serve_ws(
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    requests: mpsc::UnboundedSender<(u64, Envelope)>,
) -> ChorusResult<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "WebSocket connection");
        let registry = registry.clone();
        let requests = requests.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, registry, requests).await {
                debug!(%peer, error = %e, "WebSocket closed");
            }
        });
    }
}

async fn handle_client(
    stream: TcpStream,
    registry: Arc<ClientRegistry>,
    requests: mpsc::UnboundedSender<(u64, Envelope)>,
) -> ChorusResult<()> {
    // Clients identify themselves with a publickey query parameter.
    let mut query: Option<String> = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        query = req.uri().query().map(str::to_string);
        Ok(resp)
    })
    .await
    .map_err(|e| chorus_types::ChorusError::Transport(e.to_string()))?;

    let public_key = query
        .as_deref()
        .and_then(|q| q.split('&').find_map(|kv| kv.strip_prefix("publickey=")))
        .and_then(|hex| BoxPublicKey::from_hex(hex).ok());

    let (mut sink, mut messages) = ws.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
    let id = registry.register(public_key, out_tx);
    info!(conn = id, clients = registry.len(), "client connected");

    let writer = tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let text = match serde_json::to_string(&envelope) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "envelope encode failed");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = messages.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => {
                    if requests.send((id, envelope)).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(conn = id, error = %e, "bad envelope"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.unregister(id);
    writer.abort();
    info!(conn = id, clients = registry.len(), "client disconnected");
    Ok(())
}
