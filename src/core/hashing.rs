//! Content key derivation.

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 of a URL (64 chars)
pub fn content_key(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(hasher.finalize())
}
