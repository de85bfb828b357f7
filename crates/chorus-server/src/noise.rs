use chorus_crypto::{onion, random_dead_drop, Nonce};
use chorus_types::{BoxPublicKey, ChorusResult, ConvoExchange, SIZE_ENCRYPTED_MESSAGE};
use rand::RngCore;

/// Cover traffic indistinguishable from real exchanges. Counts are drawn
/// before the real batch size is known; generation happens concurrently with
/// Open/Add and is joined inside Close.

fn fake_onion(
    dead_drop: chorus_types::DeadDrop,
    nonce: &Nonce,
    next_keys: &[BoxPublicKey],
    rng: &mut (impl RngCore + rand::CryptoRng),
) -> ChorusResult<Vec<u8>> {
    let mut message = [0u8; SIZE_ENCRYPTED_MESSAGE];
    rng.fill_bytes(&mut message);
    let exchange = ConvoExchange::new(dead_drop, message);
    let (onion, _) = onion::seal(&exchange.to_bytes(), nonce, next_keys)?;
    Ok(onion)
}

/// Single-shot noise: each onion targets a fresh random dead drop, so the
/// tail sees an unanswered exchange.
pub fn fake_singles(
    count: usize,
    nonce: &Nonce,
    next_keys: &[BoxPublicKey],
) -> ChorusResult<Vec<Vec<u8>>> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|_| {
            let dead_drop = random_dead_drop(&mut rng);
            fake_onion(dead_drop, nonce, next_keys, &mut rng)
        })
        .collect()
}

/// Paired noise: every two consecutive onions share a freshly generated dead
/// drop, so the tail sees a completed exchange. `count` must be even.
pub fn fake_doubles(
    count: usize,
    nonce: &Nonce,
    next_keys: &[BoxPublicKey],
) -> ChorusResult<Vec<Vec<u8>>> {
    debug_assert_eq!(count % 2, 0, "fake doubles come in pairs");
    let mut rng = rand::thread_rng();
    let mut onions = Vec::with_capacity(count);
    for _ in 0..count / 2 {
        let dead_drop = random_dead_drop(&mut rng);
        onions.push(fake_onion(dead_drop, nonce, next_keys, &mut rng)?);
        onions.push(fake_onion(dead_drop, nonce, next_keys, &mut rng)?);
    }
    Ok(onions)
}
