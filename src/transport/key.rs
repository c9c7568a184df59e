//! Shared Connect Key
//!
//! Both ends derive a SHA-256 digest from the configured key; the client
//! presents it (hex) during the handshake and the server accepts only an
//! exact match.

use sha2::{Sha256, Digest};

/// Handshake header carrying the hex key digest.
pub const CONNECT_KEY_HEADER: &str = "x-roomlink-key";

const DOMAIN: &[u8] = b"ROOMLINK_CONNECT_KEY_V1";

/// Digest of a shared connect key.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectKey {
    digest: [u8; 32],
}

impl ConnectKey {
    /// Derive from the plain shared key.
    pub fn new(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN);
        hasher.update(secret.as_bytes());
        Self { digest: hasher.finalize().into() }
    }

    /// Value sent in the handshake header.
    pub fn to_header_value(&self) -> String {
        hex::encode(self.digest)
    }

    /// Check a presented header value.
    pub fn accepts(&self, header_value: &str) -> bool {
        let Ok(bytes) = hex::decode(header_value.trim()) else {
            return false;
        };
        // Constant-time compare.
        bytes.len() == self.digest.len()
            && bytes
                .iter()
                .zip(self.digest.iter())
                .fold(0u8, |acc, (a, b)| acc | (a ^ b))
                == 0
    }

    /// Short fingerprint for logs.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }
}

impl std::fmt::Debug for ConnectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConnectKey({})", self.fingerprint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_secret_accepted() {
        let server = ConnectKey::new("LiteKey");
        let client = ConnectKey::new("LiteKey");
        assert_eq!(server, client);
        assert!(server.accepts(&client.to_header_value()));
    }

    #[test]
    fn test_different_secret_rejected() {
        let server = ConnectKey::new("LiteKey");
        let client = ConnectKey::new("OtherKey");
        assert!(!server.accepts(&client.to_header_value()));
    }

    #[test]
    fn test_garbage_rejected() {
        let server = ConnectKey::new("k");
        assert!(!server.accepts(""));
        assert!(!server.accepts("not hex"));
        assert!(!server.accepts("abcd"));
        assert!(!server.accepts("LiteKey"));
    }

    #[test]
    fn test_header_is_hex_digest() {
        let value = ConnectKey::new("k").to_header_value();
        assert_eq!(value.len(), 64);
        assert!(value.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
