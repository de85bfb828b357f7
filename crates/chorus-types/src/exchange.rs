use crate::{ChorusError, ChorusResult, SIZE_CONVO_EXCHANGE, SIZE_DEAD_DROP, SIZE_ENCRYPTED_MESSAGE};
use std::fmt;

/// 16-byte rendezvous identifier. Two clients that derive the same id in
/// the same round are paired by the tail server.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeadDrop(pub [u8; SIZE_DEAD_DROP]);

impl DeadDrop {
    pub fn from_bytes(bytes: [u8; SIZE_DEAD_DROP]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIZE_DEAD_DROP] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for DeadDrop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeadDrop({})", &self.to_hex()[..8])
    }
}

/// Innermost onion payload: `dead_drop[16] || encrypted_message[256]`.
#[derive(Clone)]
pub struct ConvoExchange {
    pub dead_drop: DeadDrop,
    pub encrypted_message: [u8; SIZE_ENCRYPTED_MESSAGE],
}

impl ConvoExchange {
    pub fn new(dead_drop: DeadDrop, encrypted_message: [u8; SIZE_ENCRYPTED_MESSAGE]) -> Self {
        Self {
            dead_drop,
            encrypted_message,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(SIZE_CONVO_EXCHANGE);
        buf.extend_from_slice(&self.dead_drop.0);
        buf.extend_from_slice(&self.encrypted_message);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> ChorusResult<Self> {
        if bytes.len() != SIZE_CONVO_EXCHANGE {
            return Err(ChorusError::Serialization(format!(
                "convo exchange: expected {} bytes, got {}",
                SIZE_CONVO_EXCHANGE,
                bytes.len()
            )));
        }
        let mut dead_drop = [0u8; SIZE_DEAD_DROP];
        dead_drop.copy_from_slice(&bytes[..SIZE_DEAD_DROP]);
        let mut encrypted_message = [0u8; SIZE_ENCRYPTED_MESSAGE];
        encrypted_message.copy_from_slice(&bytes[SIZE_DEAD_DROP..]);
        Ok(Self {
            dead_drop: DeadDrop(dead_drop),
            encrypted_message,
        })
    }
}

impl Default for ConvoExchange {
    fn default() -> Self {
        Self {
            dead_drop: DeadDrop::default(),
            encrypted_message: [0u8; SIZE_ENCRYPTED_MESSAGE],
        }
    }
}

impl fmt::Debug for ConvoExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvoExchange")
            .field("dead_drop", &self.dead_drop)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_layout() {
        let mut msg = [0u8; SIZE_ENCRYPTED_MESSAGE];
        msg[0] = 0xaa;
        msg[SIZE_ENCRYPTED_MESSAGE - 1] = 0xbb;
        let ex = ConvoExchange::new(DeadDrop([0x7f; SIZE_DEAD_DROP]), msg);

        let bytes = ex.to_bytes();
        assert_eq!(bytes.len(), SIZE_CONVO_EXCHANGE);
        assert_eq!(&bytes[..SIZE_DEAD_DROP], &[0x7f; SIZE_DEAD_DROP]);
        assert_eq!(bytes[SIZE_DEAD_DROP], 0xaa);
        assert_eq!(bytes[SIZE_CONVO_EXCHANGE - 1], 0xbb);

        let back = ConvoExchange::from_bytes(&bytes).unwrap();
        assert_eq!(back.dead_drop, ex.dead_drop);
        assert_eq!(back.encrypted_message, ex.encrypted_message);
    }

    #[test]
    fn test_exchange_wrong_size_rejected() {
        assert!(ConvoExchange::from_bytes(&[0u8; SIZE_CONVO_EXCHANGE - 1]).is_err());
        assert!(ConvoExchange::from_bytes(&[0u8; SIZE_CONVO_EXCHANGE + 1]).is_err());
    }
}
