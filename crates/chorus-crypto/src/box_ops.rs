use crate::nonce::Nonce;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use chorus_types::{BoxPrivateKey, BoxPublicKey, ChorusError, ChorusResult, SharedKey};
use rand_core::{CryptoRng, RngCore};
use x25519_dalek::{PublicKey, StaticSecret};

const BOX_KDF_CONTEXT: &str = "CHORUS-v1-box-shared";

pub fn generate_keypair<R: RngCore + CryptoRng>(rng: &mut R) -> (BoxPublicKey, BoxPrivateKey) {
    let secret = StaticSecret::random_from_rng(rng);
    let public = PublicKey::from(&secret);
    (
        BoxPublicKey::from_bytes(*public.as_bytes()),
        BoxPrivateKey::from_bytes(secret.to_bytes()),
    )
}

pub fn public_key(private: &BoxPrivateKey) -> BoxPublicKey {
    let secret = StaticSecret::from(*private.as_bytes());
    BoxPublicKey::from_bytes(*PublicKey::from(&secret).as_bytes())
}

/// Precompute the box key shared by `public` and `private`. Symmetric: both
/// sides of the key agreement derive the same key.
pub fn precompute(public: &BoxPublicKey, private: &BoxPrivateKey) -> SharedKey {
    let secret = StaticSecret::from(*private.as_bytes());
    let their = PublicKey::from(*public.as_bytes());
    let dh = secret.diffie_hellman(&their);

    let mut hasher = blake3::Hasher::new_derive_key(BOX_KDF_CONTEXT);
    hasher.update(dh.as_bytes());
    SharedKey::from_bytes(*hasher.finalize().as_bytes())
}

pub fn seal_after_precompute(
    key: &SharedKey,
    nonce: &Nonce,
    plaintext: &[u8],
) -> ChorusResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| ChorusError::Crypto(e.to_string()))?;
    cipher
        .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
        .map_err(|e| ChorusError::Crypto(e.to_string()))
}

pub fn open_after_precompute(
    key: &SharedKey,
    nonce: &Nonce,
    ciphertext: &[u8],
) -> ChorusResult<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| ChorusError::Crypto(e.to_string()))?;
    cipher
        .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
        .map_err(|e| ChorusError::Crypto(format!("Decryption failed: {}", e)))
}

/// Seal between two long-term identities, for the end-to-end conversation
/// layer.
pub fn seal(
    plaintext: &[u8],
    nonce: &Nonce,
    their_public: &BoxPublicKey,
    my_private: &BoxPrivateKey,
) -> ChorusResult<Vec<u8>> {
    let key = precompute(their_public, my_private);
    seal_after_precompute(&key, nonce, plaintext)
}

pub fn open(
    ciphertext: &[u8],
    nonce: &Nonce,
    their_public: &BoxPublicKey,
    my_private: &BoxPrivateKey,
) -> ChorusResult<Vec<u8>> {
    let key = precompute(their_public, my_private);
    open_after_precompute(&key, nonce, ciphertext)
}
