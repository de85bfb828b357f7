use crate::chain;
use crate::deaddrop;
use crate::histogram::{access_count_channel, AccessCount};
use crate::noise;
use crate::rounds::{ConvoRound, RoundStatus, RoundStore};
use crate::rpc::RpcClient;
use chorus_crypto::{backward_nonce, box_ops, forward_nonce, random_vec, Laplace, Shuffler};
use chorus_types::{
    BoxPrivateKey, BoxPublicKey, ChorusError, ChorusResult, Pki, RpcRequest, RpcResponse,
    SharedKey, WireError, BOX_KEY_SIZE, SIZE_CONVO_EXCHANGE, SIZE_ENCRYPTED_MESSAGE,
};
use rand::rngs::OsRng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// One mix server's conversation service: the per-round pipeline
/// NewRound -> Open -> Add -> Close -> Get -> Delete, the cover-traffic
/// generator, and (at the tail of the route) the dead-drop matcher.
///
/// The next-hop and skip clients are looked up in an immutable map per
/// round; failover never mutates shared connection state.
pub struct ConvoService {
    server_name: String,
    private_key: BoxPrivateKey,
    pki: Arc<Pki>,
    laplace: Laplace,

    rounds: RoundStore,
    idle: Arc<Mutex<()>>,
    clients: HashMap<String, Arc<RpcClient>>,

    access_counts: mpsc::Sender<AccessCount>,
}

impl ConvoService {
    pub fn new(
        server_name: impl Into<String>,
        private_key: BoxPrivateKey,
        pki: Arc<Pki>,
        laplace: Laplace,
    ) -> ChorusResult<(Arc<Self>, mpsc::Receiver<AccessCount>)> {
        let server_name = server_name.into();

        let mut clients = HashMap::new();
        for name in &pki.server_order {
            if *name == server_name {
                continue;
            }
            let addr = pki.server_addr(name)?;
            clients.insert(name.clone(), Arc::new(RpcClient::new(addr)));
        }

        let (access_tx, access_rx) = access_count_channel();
        let service = Arc::new(Self {
            server_name,
            private_key,
            pki,
            laplace,
            rounds: RoundStore::new(),
            idle: Arc::new(Mutex::new(())),
            clients,
            access_counts: access_tx,
        });
        Ok((service, access_rx))
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn pki(&self) -> &Arc<Pki> {
        &self.pki
    }

    fn client_for(&self, name: &str) -> Option<Arc<RpcClient>> {
        self.clients.get(name).cloned()
    }

    /// Best-effort cleanup of rounds leaked by a dead upstream driver.
    pub fn sweep_stale(&self, max_age: Duration) -> Vec<u32> {
        self.rounds.sweep_stale(max_age)
    }

    /// RPC dispatch for the transport layer.
    pub async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, WireError> {
        let result = match request {
            RpcRequest::NewRound { round, route } => {
                self.new_round(round, route).await.map(|_| RpcResponse::Ack)
            }
            RpcRequest::Open { round, num_incoming } => self
                .open(round, num_incoming as usize)
                .await
                .map(|_| RpcResponse::Ack),
            RpcRequest::Add { round, offset, onions } => self
                .add(round, offset as usize, onions)
                .await
                .map(|_| RpcResponse::Ack),
            RpcRequest::Close { round } => self.close(round).await.map(|_| RpcResponse::Ack),
            RpcRequest::Get { round, offset, count } => self
                .get(round, offset as usize, count as usize)
                .await
                .map(RpcResponse::Onions),
            RpcRequest::Delete { round } => self.delete(round).await.map(|_| RpcResponse::Ack),
        };
        result.map_err(|e| WireError::from(&e))
    }

    /// Acquire the Idle gate and create the round. On every server except
    /// the tail of the route, cover-traffic counts are sampled here, before
    /// Open reveals the real batch size, and generation starts concurrently
    /// with Open/Add.
    pub async fn new_round(&self, round: u32, route: Vec<String>) -> ChorusResult<()> {
        info!(service = "convo", rpc = "NewRound", round, ?route);

        let idle = self.idle.clone().lock_owned().await;
        let entry = self.rounds.create(round, ConvoRound::new(route.clone(), idle))?;

        if !self.pki.is_last(&self.server_name, &route) {
            let mut state = entry.lock().await;

            let mut rng = OsRng;
            state.num_fake_singles = self.laplace.sample_u32(&mut rng);
            let mut doubles = self.laplace.sample_u32(&mut rng);
            if doubles % 2 == 1 {
                doubles += 1;
            }
            state.num_fake_doubles = doubles;

            let singles = state.num_fake_singles as usize;
            let doubles = state.num_fake_doubles as usize;
            let nonce = forward_nonce(round);
            let next_keys = self.pki.next_server_keys(&self.server_name, &route)?;
            state.noise = Some(tokio::task::spawn_blocking(move || {
                let mut onions = noise::fake_singles(singles, &nonce, &next_keys)?;
                onions.extend(noise::fake_doubles(doubles, &nonce, &next_keys)?);
                Ok(onions)
            }));
        }

        Ok(())
    }

    pub async fn open(&self, round: u32, num_incoming: usize) -> ChorusResult<()> {
        info!(service = "convo", rpc = "Open", round, incoming = num_incoming);

        let entry = self.rounds.get(round)?;
        let mut state = entry.lock().await;
        state.expect_status(round, RoundStatus::New)?;

        state.num_incoming = num_incoming;
        state.shared_keys = vec![None; num_incoming];
        state.incoming = vec![None; num_incoming];
        state.status = RoundStatus::Open;
        Ok(())
    }

    /// Peel a batch of onions into the slots `offset..offset+len`. Callers
    /// may fan Add out over disjoint spans; the per-onion crypto runs
    /// outside the round lock. Wrong-sized and undecryptable onions leave
    /// their slot empty without surfacing an error.
    pub async fn add(&self, round: u32, offset: usize, onions: Vec<Vec<u8>>) -> ChorusResult<()> {
        debug!(service = "convo", rpc = "Add", round, onions = onions.len());

        let entry = self.rounds.get(round)?;
        let (route, num_incoming) = {
            let state = entry.lock().await;
            state.expect_status(round, RoundStatus::Open)?;
            (state.route.clone(), state.num_incoming)
        };

        if offset + onions.len() > num_incoming {
            return Err(ChorusError::OnionOverflow {
                offset,
                onions: onions.len(),
                incoming: num_incoming,
            });
        }

        let nonce = forward_nonce(round);
        let expected_size =
            self.pki.incoming_onion_overhead(&self.server_name, &route)? + SIZE_CONVO_EXCHANGE;

        let mut peeled: Vec<(Option<SharedKey>, Option<Vec<u8>>)> =
            Vec::with_capacity(onions.len());
        for (k, onion) in onions.iter().enumerate() {
            if onion.len() != expected_size {
                debug!(
                    round,
                    slot = offset + k,
                    len = onion.len(),
                    expected = expected_size,
                    "bad onion size"
                );
                peeled.push((None, None));
                continue;
            }
            let their_public = BoxPublicKey::from_slice(&onion[..BOX_KEY_SIZE])?;
            let shared = box_ops::precompute(&their_public, &self.private_key);
            let inner = box_ops::open_after_precompute(&shared, &nonce, &onion[BOX_KEY_SIZE..]).ok();
            peeled.push((Some(shared), inner));
        }

        let mut state = entry.lock().await;
        // A racing Close or Delete surfaces as a status error, same as any
        // other late call.
        state.expect_status(round, RoundStatus::Open)?;
        for (k, (shared, inner)) in peeled.into_iter().enumerate() {
            state.shared_keys[offset + k] = shared;
            state.incoming[offset + k] = inner;
        }
        Ok(())
    }

    /// Compact the incoming batch, then either match dead drops (tail) or
    /// drive the downstream peer with the shuffled batch plus cover traffic.
    /// The Idle gate is released exactly once on every path out of here.
    pub async fn close(&self, round: u32) -> ChorusResult<()> {
        info!(service = "convo", rpc = "Close", round);

        let entry = self.rounds.get(round)?;
        let mut state = entry.lock().await;
        state.expect_status(round, RoundStatus::Open)?;

        // Owning the guard on the stack guarantees release on early returns.
        let mut idle = state.idle.take();

        let compacted = filter_incoming(&mut state);

        if self.pki.is_last(&self.server_name, &state.route) {
            let (replies, counts) = deaddrop::match_exchanges(&compacted);
            state.replies = replies;
            state.status = RoundStatus::Closed;
            drop(idle.take());

            if self.access_counts.try_send(counts).is_err() {
                debug!(round, "access counts dropped");
            }
            return Ok(());
        }

        let noise_task = state
            .noise
            .take()
            .ok_or_else(|| ChorusError::Internal("cover traffic task missing".into()))?;
        let noise = noise_task
            .await
            .map_err(|e| ChorusError::Internal(format!("cover traffic task: {e}")))??;

        let num_real = compacted.len();
        let mut outgoing = compacted;
        outgoing.extend(noise);

        let shuffler = Shuffler::new(&mut OsRng, outgoing.len());
        shuffler.shuffle(&mut outgoing);

        let next_name = self
            .pki
            .next_server_name(&self.server_name, &state.route)
            .ok_or_else(|| ChorusError::Internal("no next server on route".into()))?
            .to_string();
        let skip_exists = self
            .pki
            .skip_server_name(&self.server_name, &state.route)
            .map(|name| self.client_for(name).is_some())
            .unwrap_or(false);
        let next_client = match self.client_for(&next_name) {
            Some(client) => client,
            None => {
                return Err(self.chain_failure(
                    round,
                    next_name.clone(),
                    skip_exists,
                    ChorusError::Internal(format!("no client for {next_name}")),
                ));
            }
        };

        if let Err(e) = chain::new_convo_round(&next_client, round, &state.route).await {
            warn!(round, next = %next_name, error = %e, "NewRound on downstream failed");
            return Err(self.chain_failure(round, next_name, skip_exists, e));
        }

        // The downstream drive no longer touches state the next round's
        // setup could race with; let it in.
        drop(idle.take());

        let mut replies = match chain::run_convo_round(&next_client, round, outgoing).await {
            Ok(replies) => replies,
            Err(e) => {
                warn!(round, next = %next_name, error = %e, "downstream round failed");
                return Err(self.chain_failure(round, next_name, skip_exists, e));
            }
        };

        shuffler.unshuffle(&mut replies);
        replies.truncate(num_real);
        state.replies = replies;
        state.status = RoundStatus::Closed;
        Ok(())
    }

    // Decide between the recoverable skip-next abort and a fatal chain
    // error. A structured break from deeper in the chain already names the
    // right server and passes through unchanged.
    fn chain_failure(
        &self,
        round: u32,
        next_name: String,
        skip_exists: bool,
        err: ChorusError,
    ) -> ChorusError {
        match err {
            ChorusError::ChainBroken { .. } => err,
            _ if skip_exists => ChorusError::ChainBroken {
                round,
                failed: next_name,
            },
            other => ChorusError::ChainFatal(other.to_string()),
        }
    }

    /// Reseal replies for the slots `offset..offset+count`. Slots dropped at
    /// Add or compaction return fresh random bytes of the exact outgoing
    /// size, so slot counts and sizes stay constant.
    pub async fn get(&self, round: u32, offset: usize, count: usize) -> ChorusResult<Vec<Vec<u8>>> {
        debug!(service = "convo", rpc = "Get", round, count);

        let entry = self.rounds.get(round)?;
        let state = entry.lock().await;
        state.expect_status(round, RoundStatus::Closed)?;

        if offset + count > state.num_incoming {
            return Err(ChorusError::OnionOverflow {
                offset,
                onions: count,
                incoming: state.num_incoming,
            });
        }

        let nonce = backward_nonce(round);
        let outgoing_size = self
            .pki
            .outgoing_onion_overhead(&self.server_name, &state.route)?
            + SIZE_ENCRYPTED_MESSAGE;

        let mut onions = Vec::with_capacity(count);
        for k in 0..count {
            let i = offset + k;
            let mut out = None;
            if let Some(v) = state.incoming_index[i] {
                if let Some(shared) = &state.shared_keys[i] {
                    if let Ok(sealed) =
                        box_ops::seal_after_precompute(shared, &nonce, &state.replies[v])
                    {
                        if sealed.len() == outgoing_size {
                            out = Some(sealed);
                        }
                    }
                }
            }
            onions.push(out.unwrap_or_else(|| random_vec(outgoing_size)));
        }
        Ok(onions)
    }

    pub async fn delete(&self, round: u32) -> ChorusResult<()> {
        info!(service = "convo", rpc = "Delete", round);
        self.rounds.remove(round);
        Ok(())
    }
}

/// Compact the incoming slots down to unique decryptable messages. The seen
/// set keys on the trailing 8 bytes of the plaintext, which deduplicates
/// replayed cover traffic from a misbehaving upstream. `incoming_index`
/// records each original slot's compacted position.
fn filter_incoming(state: &mut ConvoRound) -> Vec<Vec<u8>> {
    let incoming = std::mem::take(&mut state.incoming);
    let mut valid = Vec::with_capacity(incoming.len());
    let mut index = Vec::with_capacity(incoming.len());
    let mut seen: HashSet<u64> = HashSet::new();

    for slot in incoming {
        match slot {
            Some(message) => {
                let mut tag = [0u8; 8];
                tag.copy_from_slice(&message[message.len() - 8..]);
                if seen.insert(u64::from_be_bytes(tag)) {
                    index.push(Some(valid.len()));
                    valid.push(message);
                } else {
                    index.push(None);
                }
            }
            None => index.push(None),
        }
    }

    state.incoming_index = index;
    valid
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_crypto::{generate_keypair, onion, open_reply};
    use chorus_types::{ConvoExchange, DeadDrop, ServerInfo, SIZE_DEAD_DROP};

    fn test_pki(names: &[&str]) -> (Arc<Pki>, HashMap<String, BoxPrivateKey>) {
        let mut rng = rand::thread_rng();
        let mut servers = HashMap::new();
        let mut privates = HashMap::new();
        for name in names {
            let (public, private) = generate_keypair(&mut rng);
            servers.insert(
                name.to_string(),
                ServerInfo {
                    // Reserved port: connections are refused immediately.
                    address: "127.0.0.1:1".into(),
                    public_key: public,
                },
            );
            privates.insert(name.to_string(), private);
        }
        let pki = Pki {
            people: HashMap::new(),
            servers,
            server_order: names.iter().map(|s| s.to_string()).collect(),
            entry_server: String::new(),
        };
        (Arc::new(pki), privates)
    }

    fn terminal_service() -> (Arc<ConvoService>, Arc<Pki>, Vec<String>) {
        let (pki, mut privates) = test_pki(&["S1"]);
        let (service, _counts) = ConvoService::new(
            "S1",
            privates.remove("S1").unwrap(),
            pki.clone(),
            Laplace::new(0.0, 1.0),
        )
        .unwrap();
        (service, pki, vec!["S1".into()])
    }

    fn client_onion(
        pki: &Pki,
        route: &[String],
        round: u32,
        dead_drop: DeadDrop,
        message: [u8; SIZE_ENCRYPTED_MESSAGE],
    ) -> (Vec<u8>, Vec<SharedKey>) {
        let exchange = ConvoExchange::new(dead_drop, message);
        onion::seal(
            &exchange.to_bytes(),
            &forward_nonce(round),
            &pki.server_keys(route).unwrap(),
        )
        .unwrap()
    }

    async fn run_terminal_round(
        service: &ConvoService,
        route: &[String],
        round: u32,
        onions: Vec<Vec<u8>>,
    ) -> Vec<Vec<u8>> {
        let n = onions.len();
        service.new_round(round, route.to_vec()).await.unwrap();
        service.open(round, n).await.unwrap();
        service.add(round, 0, onions).await.unwrap();
        service.close(round).await.unwrap();
        let replies = service.get(round, 0, n).await.unwrap();
        service.delete(round).await.unwrap();
        replies
    }

    #[tokio::test]
    async fn test_terminal_pair_exchange() {
        let (service, pki, route) = terminal_service();
        let drop = DeadDrop([0x42; SIZE_DEAD_DROP]);

        let (onion_a, keys_a) = client_onion(&pki, &route, 100, drop, [0xaa; SIZE_ENCRYPTED_MESSAGE]);
        let (onion_b, keys_b) = client_onion(&pki, &route, 100, drop, [0xbb; SIZE_ENCRYPTED_MESSAGE]);

        let replies = run_terminal_round(&service, &route, 100, vec![onion_a, onion_b]).await;

        let nonce = backward_nonce(100);
        let a_got = open_reply(&replies[0], &nonce, &keys_a).unwrap();
        let b_got = open_reply(&replies[1], &nonce, &keys_b).unwrap();
        assert_eq!(a_got, vec![0xbb; SIZE_ENCRYPTED_MESSAGE]);
        assert_eq!(b_got, vec![0xaa; SIZE_ENCRYPTED_MESSAGE]);
    }

    #[tokio::test]
    async fn test_singleton_echoes_sent_message() {
        let (service, pki, route) = terminal_service();
        let drop = DeadDrop([0x01; SIZE_DEAD_DROP]);
        let (onion, keys) = client_onion(&pki, &route, 101, drop, [0x77; SIZE_ENCRYPTED_MESSAGE]);

        let replies = run_terminal_round(&service, &route, 101, vec![onion]).await;
        let got = open_reply(&replies[0], &backward_nonce(101), &keys).unwrap();
        assert_eq!(got, vec![0x77; SIZE_ENCRYPTED_MESSAGE]);
    }

    #[tokio::test]
    async fn test_bad_size_onion_dropped_silently() {
        let (service, pki, route) = terminal_service();
        let drop = DeadDrop([0x02; SIZE_DEAD_DROP]);
        let (mut onion, keys) =
            client_onion(&pki, &route, 102, drop, [0x33; SIZE_ENCRYPTED_MESSAGE]);
        onion.pop();

        let replies = run_terminal_round(&service, &route, 102, vec![onion]).await;

        // The slot still exists and has the right size, but holds junk.
        let expected = pki.outgoing_onion_overhead("S1", &route).unwrap() + SIZE_ENCRYPTED_MESSAGE;
        assert_eq!(replies[0].len(), expected);
        assert!(open_reply(&replies[0], &backward_nonce(102), &keys).is_err());
    }

    #[tokio::test]
    async fn test_duplicate_message_key_dropped() {
        let (service, pki, route) = terminal_service();

        let msg_a = [0xaa; SIZE_ENCRYPTED_MESSAGE];
        let mut msg_b = [0xbb; SIZE_ENCRYPTED_MESSAGE];
        // Identical trailing 8 bytes mark the second as a replay.
        msg_b[SIZE_ENCRYPTED_MESSAGE - 8..].copy_from_slice(&msg_a[SIZE_ENCRYPTED_MESSAGE - 8..]);

        let (onion_a, keys_a) =
            client_onion(&pki, &route, 105, DeadDrop([0x05; SIZE_DEAD_DROP]), msg_a);
        let (onion_b, keys_b) =
            client_onion(&pki, &route, 105, DeadDrop([0x06; SIZE_DEAD_DROP]), msg_b);

        let replies = run_terminal_round(&service, &route, 105, vec![onion_a, onion_b]).await;

        let nonce = backward_nonce(105);
        assert!(open_reply(&replies[0], &nonce, &keys_a).is_ok());
        assert!(open_reply(&replies[1], &nonce, &keys_b).is_err());
    }

    #[tokio::test]
    async fn test_get_sizes_always_constant() {
        let (service, pki, route) = terminal_service();
        let (good, _) = client_onion(
            &pki,
            &route,
            106,
            DeadDrop([0x07; SIZE_DEAD_DROP]),
            [0x01; SIZE_ENCRYPTED_MESSAGE],
        );
        let garbage = vec![0u8; 10];

        let replies = run_terminal_round(&service, &route, 106, vec![good, garbage]).await;
        let expected = pki.outgoing_onion_overhead("S1", &route).unwrap() + SIZE_ENCRYPTED_MESSAGE;
        for reply in &replies {
            assert_eq!(reply.len(), expected);
        }
    }

    #[tokio::test]
    async fn test_state_machine_strictness() {
        let (service, _pki, route) = terminal_service();

        // No round yet.
        assert!(matches!(
            service.open(1, 4).await,
            Err(ChorusError::RoundNotFound(1))
        ));

        service.new_round(1, route.clone()).await.unwrap();

        // Add and Close require Open, Get requires Closed.
        assert!(matches!(
            service.add(1, 0, vec![]).await,
            Err(ChorusError::RoundStatus { .. })
        ));
        assert!(matches!(
            service.close(1).await,
            Err(ChorusError::RoundStatus { .. })
        ));
        assert!(matches!(
            service.get(1, 0, 0).await,
            Err(ChorusError::RoundStatus { .. })
        ));

        service.open(1, 0).await.unwrap();
        assert!(matches!(
            service.open(1, 0).await,
            Err(ChorusError::RoundStatus { .. })
        ));

        service.close(1).await.unwrap();

        // Round ids stay taken until Delete.
        assert!(matches!(
            service.new_round(1, route.clone()).await,
            Err(ChorusError::RoundExists(1))
        ));
        service.delete(1).await.unwrap();
        service.new_round(1, route).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_overflow_rejected() {
        let (service, _pki, route) = terminal_service();
        service.new_round(2, route).await.unwrap();
        service.open(2, 2).await.unwrap();
        let err = service
            .add(2, 1, vec![vec![0u8; 4], vec![0u8; 4]])
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ChorusError::OnionOverflow { .. }));
    }

    #[tokio::test]
    async fn test_idle_serializes_rounds() {
        let (service, _pki, route) = terminal_service();
        service.new_round(10, route.clone()).await.unwrap();

        let service2 = service.clone();
        let route2 = route.clone();
        let blocked = tokio::spawn(async move { service2.new_round(11, route2).await });

        // Round 11 must wait for round 10's Close.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!blocked.is_finished());

        service.open(10, 0).await.unwrap();
        service.close(10).await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), blocked)
            .await
            .expect("round 11 still blocked")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_middle_crash_aborts_with_skip() {
        // S2 and S3 are unreachable; S1 has a skip client for S3, so the
        // round aborts recoverably, naming S2.
        let (pki, mut privates) = test_pki(&["S1", "S2", "S3"]);
        let (service, _counts) = ConvoService::new(
            "S1",
            privates.remove("S1").unwrap(),
            pki.clone(),
            Laplace::new(2.0, 1.0),
        )
        .unwrap();
        let route: Vec<String> = vec!["S1".into(), "S2".into(), "S3".into()];

        service.new_round(103, route.clone()).await.unwrap();
        service.open(103, 0).await.unwrap();
        let err = service.close(103).await.err().unwrap();
        match err {
            ChorusError::ChainBroken { round, failed } => {
                assert_eq!(round, 103);
                assert_eq!(failed, "S2");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // Idle was released on the error path; the next round proceeds.
        tokio::time::timeout(Duration::from_secs(1), service.new_round(104, route))
            .await
            .expect("idle still held")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dead_tail_is_fatal() {
        // No server exists past S2, so there is nothing to skip to.
        let (pki, mut privates) = test_pki(&["S1", "S2"]);
        let (service, _counts) = ConvoService::new(
            "S1",
            privates.remove("S1").unwrap(),
            pki.clone(),
            Laplace::new(0.0, 1.0),
        )
        .unwrap();
        let route: Vec<String> = vec!["S1".into(), "S2".into()];

        service.new_round(1, route).await.unwrap();
        service.open(1, 0).await.unwrap();
        let err = service.close(1).await.err().unwrap();
        assert!(matches!(err, ChorusError::ChainFatal(_)));
    }

    #[tokio::test]
    async fn test_terminal_publishes_access_counts() {
        let (pki, mut privates) = test_pki(&["S1"]);
        let (service, mut counts) = ConvoService::new(
            "S1",
            privates.remove("S1").unwrap(),
            pki.clone(),
            Laplace::new(0.0, 1.0),
        )
        .unwrap();
        let route: Vec<String> = vec!["S1".into()];

        let drop = DeadDrop([0x09; SIZE_DEAD_DROP]);
        let (a, _) = client_onion(&pki, &route, 9, drop, [0x01; SIZE_ENCRYPTED_MESSAGE]);
        let (b, _) = client_onion(&pki, &route, 9, drop, [0x02; SIZE_ENCRYPTED_MESSAGE]);
        run_terminal_round(&service, &route, 9, vec![a, b]).await;

        let count = counts.recv().await.unwrap();
        assert_eq!(count, AccessCount { singles: 0, doubles: 1 });
    }
}
