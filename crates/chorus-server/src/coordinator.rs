use crate::convo::ConvoService;
use crate::ws::ClientRegistry;
use chorus_types::{ChorusError, ChorusResult, Envelope};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{error, info, warn};

/// Entry-server round driver: announces each round over the WebSocket
/// endpoint, collects one onion per client, runs the head server's own
/// pipeline, and distributes replies. A recoverable chain break is relayed
/// to the clients as `ConvoError` and the failed server is pruned from the
/// coordinator's route for subsequent rounds, mirroring the pruning every
/// client applies on its side.
pub struct Coordinator {
    service: Arc<ConvoService>,
    registry: Arc<ClientRegistry>,
    interval: Duration,
    window: Duration,
}

impl Coordinator {
    pub fn new(
        service: Arc<ConvoService>,
        registry: Arc<ClientRegistry>,
        interval: Duration,
        window: Duration,
    ) -> Self {
        Self {
            service,
            registry,
            interval,
            window,
        }
    }

    pub async fn run(self, mut requests: mpsc::UnboundedReceiver<(u64, Envelope)>) {
        let mut route = self.service.pki().server_order.clone();
        let mut round: u32 = 0;
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            round += 1;

            // Rounds run even with no clients connected: cover traffic must
            // flow regardless of real demand.
            self.registry.broadcast(&Envelope::AnnounceConvoRound { round });
            let collected = self.collect(round, &mut requests).await;
            info!(round, onions = collected.len(), "round collected");

            match self.run_round(round, &route, &collected).await {
                Ok(replies) => {
                    for (conn, onion) in replies {
                        self.registry.send(conn, Envelope::ConvoResponse { round, onion });
                    }
                }
                Err(ChorusError::ChainBroken { failed, .. }) => {
                    warn!(round, failed = %failed, "chain broken, pruning route");
                    self.registry.broadcast(&Envelope::ConvoError {
                        round,
                        err: failed.clone(),
                    });
                    route.retain(|name| *name != failed);
                }
                Err(e) => {
                    error!(round, error = %e, "round failed");
                }
            }
        }
    }

    /// Gather at most one onion per connection until the window closes.
    /// Requests for other rounds are stale and dropped.
    async fn collect(
        &self,
        round: u32,
        requests: &mut mpsc::UnboundedReceiver<(u64, Envelope)>,
    ) -> Vec<(u64, Vec<u8>)> {
        let deadline = Instant::now() + self.window;
        let mut collected = Vec::new();
        let mut seen: HashSet<u64> = HashSet::new();

        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match timeout(deadline - now, requests.recv()).await {
                Ok(Some((conn, Envelope::ConvoRequest { round: r, onion }))) if r == round => {
                    if seen.insert(conn) {
                        collected.push((conn, onion));
                    }
                }
                Ok(Some(_)) => {}
                Ok(None) => break,
                Err(_) => break,
            }
        }
        collected
    }

    async fn run_round(
        &self,
        round: u32,
        route: &[String],
        collected: &[(u64, Vec<u8>)],
    ) -> ChorusResult<Vec<(u64, Vec<u8>)>> {
        let service = &self.service;
        let result = async {
            service.new_round(round, route.to_vec()).await?;
            service.open(round, collected.len()).await?;
            service
                .add(round, 0, collected.iter().map(|(_, onion)| onion.clone()).collect())
                .await?;
            service.close(round).await?;
            let replies = service.get(round, 0, collected.len()).await?;
            Ok(collected
                .iter()
                .map(|(conn, _)| *conn)
                .zip(replies)
                .collect())
        }
        .await;

        // The head's round state is not needed once replies are out, and a
        // failed round must not linger either.
        let _ = service.delete(round).await;
        result
    }
}
