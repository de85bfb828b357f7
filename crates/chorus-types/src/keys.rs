use crate::{ChorusError, ChorusResult, BOX_KEY_SIZE};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Long-term or ephemeral X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoxPublicKey(pub [u8; BOX_KEY_SIZE]);

impl BoxPublicKey {
    pub fn from_bytes(bytes: [u8; BOX_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> ChorusResult<Self> {
        if bytes.len() != BOX_KEY_SIZE {
            return Err(ChorusError::InvalidKey("Invalid public key length".into()));
        }
        let mut arr = [0u8; BOX_KEY_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; BOX_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> ChorusResult<Self> {
        let bytes = hex::decode(s).map_err(|e| ChorusError::InvalidKey(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for BoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxPublicKey({}...)", &self.to_hex()[..8])
    }
}

impl fmt::Display for BoxPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for BoxPublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BoxPublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Long-term X25519 private key. Zeroed on drop and never printed.
#[derive(Clone)]
pub struct BoxPrivateKey(pub [u8; BOX_KEY_SIZE]);

impl BoxPrivateKey {
    pub fn from_bytes(bytes: [u8; BOX_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BOX_KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> ChorusResult<Self> {
        let bytes = hex::decode(s).map_err(|e| ChorusError::InvalidKey(e.to_string()))?;
        if bytes.len() != BOX_KEY_SIZE {
            return Err(ChorusError::InvalidKey("Invalid private key length".into()));
        }
        let mut arr = [0u8; BOX_KEY_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for BoxPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BoxPrivateKey([REDACTED])")
    }
}

impl Drop for BoxPrivateKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl Serialize for BoxPrivateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BoxPrivateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(D::Error::custom)
    }
}

/// Precomputed box key shared between one onion layer's ephemeral key and a
/// server's long-term key. The same key opens the forward layer and seals
/// the reply. Zeroed on drop.
#[derive(Clone)]
pub struct SharedKey(pub [u8; BOX_KEY_SIZE]);

impl SharedKey {
    pub fn from_bytes(bytes: [u8; BOX_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; BOX_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedKey([REDACTED])")
    }
}

impl Drop for SharedKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_hex_round_trip() {
        let key = BoxPublicKey::from_bytes([0x5a; 32]);
        let parsed = BoxPublicKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn test_public_key_json_is_hex_string() {
        let key = BoxPublicKey::from_bytes([0xab; 32]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(32)));

        let back: BoxPublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn test_bad_key_length_rejected() {
        assert!(BoxPublicKey::from_hex("abcd").is_err());
        assert!(BoxPrivateKey::from_hex("").is_err());
    }

    #[test]
    fn test_private_key_debug_redacted() {
        let key = BoxPrivateKey::from_bytes([0x11; 32]);
        assert!(!format!("{:?}", key).contains("11"));
    }
}
