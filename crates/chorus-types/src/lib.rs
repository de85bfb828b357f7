#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod error;
pub mod exchange;
pub mod keys;
pub mod pki;
pub mod wire;

pub use error::*;
pub use exchange::*;
pub use keys::*;
pub use pki::*;
pub use wire::*;

/// Size of an X25519 public key and of the ephemeral key prefix on every
/// onion layer.
pub const BOX_KEY_SIZE: usize = 32;

/// Authenticator overhead added by one box seal (Poly1305 tag).
pub const BOX_OVERHEAD: usize = 16;

/// Bytes added per onion layer: ephemeral public key plus authenticator.
pub const ONION_LAYER_OVERHEAD: usize = BOX_KEY_SIZE + BOX_OVERHEAD;

pub const NONCE_SIZE: usize = 24;

/// Plaintext conversation message size.
pub const SIZE_MESSAGE: usize = 240;

/// Conversation message after the end-to-end seal.
pub const SIZE_ENCRYPTED_MESSAGE: usize = SIZE_MESSAGE + BOX_OVERHEAD;

pub const SIZE_DEAD_DROP: usize = 16;

/// Innermost payload at the tail server: dead drop id followed by the
/// encrypted message.
pub const SIZE_CONVO_EXCHANGE: usize = SIZE_DEAD_DROP + SIZE_ENCRYPTED_MESSAGE;

pub const DEFAULT_SERVER_PORT: u16 = 2718;

/// Onions per Add/Get span when driving the downstream server.
pub const ADD_SPAN: usize = 4000;

/// Capacity of the access-count channel consumed by the histogram sink.
pub const ACCESS_COUNT_BUFFER: usize = 8;
