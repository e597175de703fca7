//! Opaque tokens and content hashing

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Number of random bytes in an opaque token (hex-encoded to twice this length)
const TOKEN_BYTES: usize = 32;

/// Length of the hex prefix used as a push-subscription key
const ENDPOINT_KEY_LEN: usize = 16;

/// Generate an unguessable opaque token (invitations, calendar feeds)
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// SHA-256 of the given bytes, hex-encoded
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Stable key for a push endpoint
///
/// The same physical device re-registering with the same endpoint always maps
/// to the same key, so re-registration overwrites instead of duplicating.
pub fn endpoint_key(endpoint: &str) -> String {
    let mut key = content_hash(endpoint.as_bytes());
    key.truncate(ENDPOINT_KEY_LEN);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique_and_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), TOKEN_BYTES * 2);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_hash_known_value() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_endpoint_key_is_stable_per_endpoint() {
        let a = endpoint_key("https://push.example.com/device-a");
        let again = endpoint_key("https://push.example.com/device-a");
        let b = endpoint_key("https://push.example.com/device-b");
        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(a.len(), ENDPOINT_KEY_LEN);
    }
}
