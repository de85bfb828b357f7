use crate::box_ops::precompute;
use chorus_types::{BoxPrivateKey, BoxPublicKey, DeadDrop, SIZE_DEAD_DROP};
use hmac::{Hmac, Mac};
use rand::{CryptoRng, Rng};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Rendezvous id for a conversation pair in a given round: HMAC-SHA256 of
/// the big-endian round number keyed by the precomputed shared key,
/// truncated to 16 bytes. Both peers derive the same id.
pub fn derive_dead_drop(
    my_private: &BoxPrivateKey,
    peer_public: &BoxPublicKey,
    round: u32,
) -> DeadDrop {
    let shared = precompute(peer_public, my_private);
    let mut mac =
        HmacSha256::new_from_slice(shared.as_bytes()).expect("HMAC can take key of any size");
    mac.update(&round.to_be_bytes());
    let digest = mac.finalize().into_bytes();

    let mut id = [0u8; SIZE_DEAD_DROP];
    id.copy_from_slice(&digest[..SIZE_DEAD_DROP]);
    DeadDrop::from_bytes(id)
}

/// Fresh random dead drop, used each round by solo conversations and for
/// cover traffic.
pub fn random_dead_drop<R: Rng + CryptoRng>(rng: &mut R) -> DeadDrop {
    let mut id = [0u8; SIZE_DEAD_DROP];
    rng.fill_bytes(&mut id);
    DeadDrop::from_bytes(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::box_ops::generate_keypair;

    #[test]
    fn test_peers_derive_same_id() {
        let mut rng = rand::thread_rng();
        let (alice_pub, alice_priv) = generate_keypair(&mut rng);
        let (bob_pub, bob_priv) = generate_keypair(&mut rng);

        let a = derive_dead_drop(&alice_priv, &bob_pub, 100);
        let b = derive_dead_drop(&bob_priv, &alice_pub, 100);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rounds_give_distinct_ids() {
        let mut rng = rand::thread_rng();
        let (_, alice_priv) = generate_keypair(&mut rng);
        let (bob_pub, _) = generate_keypair(&mut rng);

        let r1 = derive_dead_drop(&alice_priv, &bob_pub, 1);
        let r2 = derive_dead_drop(&alice_priv, &bob_pub, 2);
        assert_ne!(r1, r2);
    }

    #[test]
    fn test_pairs_give_distinct_ids() {
        let mut rng = rand::thread_rng();
        let (_, alice_priv) = generate_keypair(&mut rng);
        let (bob_pub, _) = generate_keypair(&mut rng);
        let (carol_pub, _) = generate_keypair(&mut rng);

        let ab = derive_dead_drop(&alice_priv, &bob_pub, 5);
        let ac = derive_dead_drop(&alice_priv, &carol_pub, 5);
        assert_ne!(ab, ac);
    }

    #[test]
    fn test_random_dead_drops_differ() {
        let mut rng = rand::thread_rng();
        assert_ne!(random_dead_drop(&mut rng), random_dead_drop(&mut rng));
    }
}
