use crate::box_ops::{generate_keypair, precompute, seal_after_precompute, open_after_precompute};
use crate::nonce::Nonce;
use chorus_types::{BoxPublicKey, ChorusResult, SharedKey, BOX_KEY_SIZE, ONION_LAYER_OVERHEAD};
use rand::rngs::OsRng;

/// Size of an onion wrapping `inner` bytes through `layers` recipients.
pub fn sealed_size(inner: usize, layers: usize) -> usize {
    inner + layers * ONION_LAYER_OVERHEAD
}

/// Layered seal of `message` through the recipients in route order:
/// `recipients[0]` peels the outermost layer. Every layer is
/// `ephemeral_pk[32] || box ciphertext` under a fresh ephemeral key and the
/// given nonce. The returned shared keys, one per recipient in the same
/// order, open the reply layers on the way back.
pub fn seal(
    message: &[u8],
    nonce: &Nonce,
    recipients: &[BoxPublicKey],
) -> ChorusResult<(Vec<u8>, Vec<SharedKey>)> {
    let mut onion = message.to_vec();
    let mut shared_keys = Vec::with_capacity(recipients.len());

    for recipient in recipients.iter().rev() {
        let (ephemeral_pub, ephemeral_priv) = generate_keypair(&mut OsRng);
        let shared = precompute(recipient, &ephemeral_priv);
        let ciphertext = seal_after_precompute(&shared, nonce, &onion)?;

        let mut layer = Vec::with_capacity(BOX_KEY_SIZE + ciphertext.len());
        layer.extend_from_slice(ephemeral_pub.as_bytes());
        layer.extend_from_slice(&ciphertext);
        onion = layer;
        shared_keys.push(shared);
    }

    shared_keys.reverse();
    Ok((onion, shared_keys))
}

/// Unwrap a reply onion through the per-layer shared keys returned by
/// [`seal`]: `shared_keys[0]` opens the outermost reply layer.
pub fn open_reply(
    onion: &[u8],
    nonce: &Nonce,
    shared_keys: &[SharedKey],
) -> ChorusResult<Vec<u8>> {
    let mut message = onion.to_vec();
    for key in shared_keys {
        message = open_after_precompute(key, nonce, &message)?;
    }
    Ok(message)
}
