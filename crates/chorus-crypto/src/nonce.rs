use chorus_types::NONCE_SIZE;

pub const DIRECTION_FORWARD: u8 = 0;
pub const DIRECTION_BACKWARD: u8 = 1;

/// 24-byte box nonce: bytes 0-3 hold the round id big-endian, byte 23 holds
/// a direction or role tag, the rest stay zero.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Nonce([u8; NONCE_SIZE]);

impl Nonce {
    pub fn tagged(round: u32, tag: u8) -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        bytes[..4].copy_from_slice(&round.to_be_bytes());
        bytes[NONCE_SIZE - 1] = tag;
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// Nonce for onion layers travelling toward the tail server.
pub fn forward_nonce(round: u32) -> Nonce {
    Nonce::tagged(round, DIRECTION_FORWARD)
}

/// Nonce for reply layers travelling back toward the client.
pub fn backward_nonce(round: u32) -> Nonce {
    Nonce::tagged(round, DIRECTION_BACKWARD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nonce_layout() {
        let nonce = forward_nonce(0x01020304);
        let bytes = nonce.as_bytes();
        assert_eq!(&bytes[..4], &[1, 2, 3, 4]);
        assert!(bytes[4..23].iter().all(|&b| b == 0));
        assert_eq!(bytes[23], DIRECTION_FORWARD);
    }

    #[test]
    fn test_directions_differ() {
        assert_ne!(forward_nonce(9), backward_nonce(9));
        assert_eq!(backward_nonce(9).as_bytes()[23], DIRECTION_BACKWARD);
    }

    #[test]
    fn test_rounds_differ() {
        assert_ne!(forward_nonce(1), forward_nonce(2));
    }
}
