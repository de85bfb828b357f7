#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod box_ops;
pub mod deaddrop;
pub mod laplace;
pub mod nonce;
pub mod onion;
pub mod shuffle;

pub use box_ops::*;
pub use deaddrop::*;
pub use laplace::*;
pub use nonce::*;
pub use onion::*;
pub use shuffle::*;

pub fn random_bytes<const N: usize>() -> [u8; N] {
    use rand::RngCore;
    let mut bytes = [0u8; N];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn random_vec(len: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
