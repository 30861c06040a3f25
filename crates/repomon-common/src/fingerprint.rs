use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Truncated digest used for cache keys (16 hex chars, 64 bits).
pub fn short_hash(data: &[u8]) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(16);
    digest
}
