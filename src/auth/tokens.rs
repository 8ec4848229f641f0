use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const RESET_TOKEN_BYTES: usize = 32;

/// Fresh opaque reset token: 32 random bytes, hex encoded.
pub fn generate_reset_token() -> String {
    let mut buf = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Deterministic one-way digest of a reset token, as stored on the user row.
pub fn hashed_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
