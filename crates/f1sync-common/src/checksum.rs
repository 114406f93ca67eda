//! SHA-256 helpers for landing-zone blobs

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of an in-memory buffer
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hex() {
        assert_eq!(
            sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_empty_array_digest_is_stable() {
        assert_eq!(sha256_hex(b"[]"), sha256_hex(b"[]"));
        assert_ne!(sha256_hex(b"[]"), sha256_hex(b"[{}]"));
    }
}
