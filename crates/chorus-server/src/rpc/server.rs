use crate::convo::ConvoService;
use bytes::Bytes;
use chorus_types::{ChorusResult, RequestFrame, ResponseFrame};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

/// Accept loop for the server-to-server RPC surface. Each request on a
/// connection is dispatched as its own task, so concurrent Add and Get spans
/// from the upstream driver really do run in parallel.
pub async fn serve(listener: TcpListener, service: Arc<ConvoService>) -> ChorusResult<()> {
    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(%peer, "accepted connection");
        let service = service.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, service).await {
                debug!(%peer, error = %e, "connection closed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, service: Arc<ConvoService>) -> ChorusResult<()> {
    let framed = Framed::new(stream, super::codec());
    let (mut sink, mut frames) = framed.split();

    // Responses complete out of order; a writer task serializes them back
    // onto the connection.
    let (resp_tx, mut resp_rx) = mpsc::unbounded_channel::<ResponseFrame>();
    let writer = tokio::spawn(async move {
        while let Some(frame) = resp_rx.recv().await {
            let bytes = match bincode::serialize(&frame) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "response encode failed");
                    continue;
                }
            };
            if sink.send(Bytes::from(bytes)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = frames.next().await {
        let bytes = frame?;
        let request: RequestFrame = match bincode::deserialize(&bytes) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, "request decode failed");
                break;
            }
        };

        let service = service.clone();
        let resp_tx = resp_tx.clone();
        tokio::spawn(async move {
            debug!(
                method = request.request.method(),
                round = request.request.round(),
                "rpc"
            );
            let result = service.handle(request.request).await;
            let _ = resp_tx.send(ResponseFrame {
                id: request.id,
                result,
            });
        });
    }

    drop(resp_tx);
    let _ = writer.await;
    Ok(())
}
