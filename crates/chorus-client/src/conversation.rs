use chorus_crypto::{
    backward_nonce, box_ops, constant_time_eq, derive_dead_drop, forward_nonce, onion,
    open_reply, random_dead_drop, Nonce,
};
use chorus_types::{
    BoxPrivateKey, BoxPublicKey, ChorusError, ChorusResult, ConvoExchange, DeadDrop, Envelope,
    Pki, SharedKey, SIZE_ENCRYPTED_MESSAGE, SIZE_MESSAGE,
};
use std::collections::HashMap;
use std::sync::Arc;

struct PendingRound {
    shared_keys: Vec<SharedKey>,
    sent_message: [u8; SIZE_ENCRYPTED_MESSAGE],
}

/// One end-to-end conversation with a fixed peer. Builds the onion for each
/// announced round, remembers the per-round shared keys, and unwraps the
/// reply. A conversation whose peer key equals its own key is "solo" and
/// meets at a fresh random dead drop every round.
pub struct Conversation {
    pki: Arc<Pki>,
    route: Vec<String>,

    peer_name: String,
    peer_public_key: BoxPublicKey,
    my_public_key: BoxPublicKey,
    my_private_key: BoxPrivateKey,

    pending_rounds: HashMap<u32, PendingRound>,
    last_round: u32,
    last_peer_responding: bool,
}

impl Conversation {
    pub fn new(
        pki: Arc<Pki>,
        peer_name: impl Into<String>,
        peer_public_key: BoxPublicKey,
        my_private_key: BoxPrivateKey,
    ) -> Self {
        let my_public_key = box_ops::public_key(&my_private_key);
        let route = pki.server_order.clone();
        Self {
            pki,
            route,
            peer_name: peer_name.into(),
            peer_public_key,
            my_public_key,
            my_private_key,
            pending_rounds: HashMap::new(),
            last_round: 0,
            last_peer_responding: false,
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn route(&self) -> &[String] {
        &self.route
    }

    pub fn last_round(&self) -> u32 {
        self.last_round
    }

    pub fn peer_responding(&self) -> bool {
        self.last_peer_responding
    }

    pub fn solo(&self) -> bool {
        self.my_public_key == self.peer_public_key
    }

    // Roles keep the two directions of the conversation on distinct nonces.
    fn my_role(&self) -> u8 {
        if self.my_public_key.as_bytes() < self.peer_public_key.as_bytes() {
            0
        } else {
            1
        }
    }

    fn their_role(&self) -> u8 {
        if self.peer_public_key.as_bytes() < self.my_public_key.as_bytes() {
            0
        } else {
            1
        }
    }

    pub fn seal_message(
        &self,
        round: u32,
        message: &[u8],
    ) -> ChorusResult<[u8; SIZE_ENCRYPTED_MESSAGE]> {
        if message.len() > SIZE_MESSAGE {
            return Err(ChorusError::Serialization(format!(
                "message too long: {} > {}",
                message.len(),
                SIZE_MESSAGE
            )));
        }
        let mut padded = [0u8; SIZE_MESSAGE];
        padded[..message.len()].copy_from_slice(message);

        let nonce = Nonce::tagged(round, self.my_role());
        let ciphertext =
            box_ops::seal(&padded, &nonce, &self.peer_public_key, &self.my_private_key)?;

        let mut sealed = [0u8; SIZE_ENCRYPTED_MESSAGE];
        sealed.copy_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open_message(&self, round: u32, ciphertext: &[u8]) -> ChorusResult<Vec<u8>> {
        let nonce = Nonce::tagged(round, self.their_role());
        box_ops::open(ciphertext, &nonce, &self.peer_public_key, &self.my_private_key)
    }

    fn dead_drop(&self, round: u32) -> DeadDrop {
        if self.solo() {
            random_dead_drop(&mut rand::thread_rng())
        } else {
            derive_dead_drop(&self.my_private_key, &self.peer_public_key, round)
        }
    }

    /// Build this round's request: seal the message to the peer, wrap it
    /// with the dead drop into an exchange, and onion-seal the exchange
    /// through every server on the current route.
    pub fn next_request(&mut self, round: u32, message: &[u8]) -> ChorusResult<Envelope> {
        let sent_message = self.seal_message(round, message)?;
        let exchange = ConvoExchange::new(self.dead_drop(round), sent_message);

        let (onion, shared_keys) = onion::seal(
            &exchange.to_bytes(),
            &forward_nonce(round),
            &self.pki.server_keys(&self.route)?,
        )?;

        self.pending_rounds.insert(
            round,
            PendingRound {
                shared_keys,
                sent_message,
            },
        );
        self.last_round = round;

        Ok(Envelope::ConvoRequest { round, onion })
    }

    /// Unwrap a reply onion. `Ok(None)` means the peer did not show up this
    /// round: the dead drop echoed back exactly what we sent.
    pub fn handle_response(&mut self, round: u32, onion: &[u8]) -> ChorusResult<Option<Vec<u8>>> {
        let pending = self
            .pending_rounds
            .remove(&round)
            .ok_or(ChorusError::RoundNotFound(round))?;

        let encrypted = open_reply(onion, &backward_nonce(round), &pending.shared_keys)?;

        if constant_time_eq(&encrypted, &pending.sent_message) && !self.solo() {
            self.last_peer_responding = false;
            return Ok(None);
        }

        let message = self.open_message(round, &encrypted)?;
        self.last_peer_responding = true;
        Ok(Some(message))
    }

    /// A `ConvoError` names an unreachable server; drop it from the route so
    /// the next round's onion carries one fewer layer.
    pub fn handle_error(&mut self, round: u32, failed: &str) {
        self.pending_rounds.remove(&round);
        self.route.retain(|name| name != failed);
        self.last_peer_responding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chorus_crypto::generate_keypair;
    use chorus_types::ServerInfo;
    use std::collections::HashMap as Map;

    fn test_pki(names: &[&str]) -> (Arc<Pki>, Vec<BoxPrivateKey>) {
        let mut rng = rand::thread_rng();
        let mut servers = Map::new();
        let mut privates = Vec::new();
        for name in names {
            let (public, private) = generate_keypair(&mut rng);
            servers.insert(
                name.to_string(),
                ServerInfo {
                    address: "127.0.0.1".into(),
                    public_key: public,
                },
            );
            privates.push(private);
        }
        let pki = Pki {
            people: Map::new(),
            servers,
            server_order: names.iter().map(|s| s.to_string()).collect(),
            entry_server: String::new(),
        };
        (Arc::new(pki), privates)
    }

    fn pair() -> (Conversation, Conversation) {
        let (pki, _) = test_pki(&["S1", "S2", "S3"]);
        let mut rng = rand::thread_rng();
        let (alice_pub, alice_priv) = generate_keypair(&mut rng);
        let (bob_pub, bob_priv) = generate_keypair(&mut rng);
        let alice = Conversation::new(pki.clone(), "bob", bob_pub, alice_priv);
        let bob = Conversation::new(pki, "alice", alice_pub, bob_priv);
        (alice, bob)
    }

    #[test]
    fn test_peers_agree_on_dead_drop() {
        let (alice, bob) = pair();
        assert_eq!(alice.dead_drop(100), bob.dead_drop(100));
        assert_ne!(alice.dead_drop(100), alice.dead_drop(101));
    }

    #[test]
    fn test_solo_dead_drop_is_random() {
        let (pki, _) = test_pki(&["S1"]);
        let (my_pub, my_priv) = generate_keypair(&mut rand::thread_rng());
        let solo = Conversation::new(pki, "me", my_pub, my_priv);
        assert!(solo.solo());
        assert_ne!(solo.dead_drop(5), solo.dead_drop(5));
    }

    #[test]
    fn test_roles_are_opposite() {
        let (alice, bob) = pair();
        assert_ne!(alice.my_role(), bob.my_role());
        assert_eq!(alice.my_role(), bob.their_role());
        assert_eq!(alice.their_role(), bob.my_role());
    }

    #[test]
    fn test_message_round_trip_between_peers() {
        let (alice, bob) = pair();
        let sealed = alice.seal_message(7, b"hello").unwrap();
        let opened = bob.open_message(7, &sealed).unwrap();
        assert_eq!(&opened[..5], b"hello");
        assert!(opened[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_own_message_does_not_open_as_peers() {
        // Distinct role nonces: a message I sealed must not decrypt under
        // the nonce I use for the peer's messages.
        let (alice, _) = pair();
        let sealed = alice.seal_message(7, b"hi").unwrap();
        assert!(alice.open_message(7, &sealed).is_err());
    }

    #[test]
    fn test_message_too_long_rejected() {
        let (alice, _) = pair();
        assert!(alice.seal_message(1, &[0u8; SIZE_MESSAGE + 1]).is_err());
    }

    #[test]
    fn test_request_onion_size() {
        let (mut alice, _) = pair();
        match alice.next_request(3, b"x").unwrap() {
            Envelope::ConvoRequest { round, onion } => {
                assert_eq!(round, 3);
                assert_eq!(
                    onion.len(),
                    onion::sealed_size(chorus_types::SIZE_CONVO_EXCHANGE, 3)
                );
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_handle_error_prunes_route() {
        let (mut alice, _) = pair();
        alice.next_request(4, b"x").unwrap();
        assert_eq!(alice.route().len(), 3);

        alice.handle_error(4, "S2");
        assert_eq!(alice.route(), &["S1".to_string(), "S3".to_string()]);

        // The pending round is gone with it.
        assert!(matches!(
            alice.handle_response(4, &[0u8; 16]),
            Err(ChorusError::RoundNotFound(4))
        ));

        // The next onion is one layer smaller.
        match alice.next_request(5, b"x").unwrap() {
            Envelope::ConvoRequest { onion, .. } => {
                assert_eq!(
                    onion.len(),
                    onion::sealed_size(chorus_types::SIZE_CONVO_EXCHANGE, 2)
                );
            }
            other => panic!("unexpected envelope: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_round_response_rejected() {
        let (mut alice, _) = pair();
        assert!(matches!(
            alice.handle_response(9, &[0u8; 16]),
            Err(ChorusError::RoundNotFound(9))
        ));
    }
}
