use chorus_types::{BoxPublicKey, ChorusError, ChorusResult, Envelope};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Sending half of an entry-server connection. Incoming envelopes arrive on
/// the receiver returned by [`connect`]; the read loop runs until the server
/// closes the socket.
pub struct EntryConnection {
    sender: mpsc::UnboundedSender<Envelope>,
}

impl EntryConnection {
    pub fn send(&self, envelope: Envelope) -> ChorusResult<()> {
        self.sender
            .send(envelope)
            .map_err(|_| ChorusError::Transport("entry connection closed".into()))
    }
}

pub async fn connect(
    entry_addr: &str,
    public_key: &BoxPublicKey,
) -> ChorusResult<(EntryConnection, mpsc::UnboundedReceiver<Envelope>)> {
    let url = format!("ws://{}/ws?publickey={}", entry_addr, public_key.to_hex());
    let (ws, _) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| ChorusError::Transport(format!("connect {url}: {e}")))?;
    debug!(%url, "connected to entry server");

    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
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

    let (in_tx, in_rx) = mpsc::unbounded_channel::<Envelope>();
    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "entry connection lost");
                    break;
                }
            };
            if let Message::Text(text) = message {
                match serde_json::from_str::<Envelope>(&text) {
                    Ok(envelope) => {
                        if in_tx.send(envelope).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "bad envelope from entry server"),
                }
            }
        }
    });

    Ok((EntryConnection { sender: out_tx }, in_rx))
}
