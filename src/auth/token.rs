//! Opaque token minting and at-rest hashing.
//!
//! Tokens are 32 bytes from the OS CSPRNG, base64url-encoded without padding.
//! Collisions are treated as store-enforced: with 256 bits of entropy the
//! unique constraint on the hash never fires in practice.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const TOKEN_BYTES: usize = 32;

/// Mint a new opaque bearer token.
///
/// The raw value is handed to the caller exactly once; only [`digest`] output
/// is ever persisted.
pub fn opaque() -> Result<String> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to draw token entropy")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a token for storage and lookup, so raw bearer values never touch the
/// store.
#[must_use]
pub fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    Base64UrlUnpadded::encode_string(&hasher.finalize())
}

/// Compute an expiry timestamp from a TTL.
#[must_use]
pub fn expiry_from(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + ttl
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opaque_tokens_are_fixed_length_and_distinct() {
        let first = opaque().ok();
        let second = opaque().ok();
        assert_ne!(first, second);
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(first.map(|token| token.len()), Some(43));
    }

    #[test]
    fn opaque_decodes_to_token_bytes() {
        let decoded_len = opaque()
            .ok()
            .and_then(|token| Base64UrlUnpadded::decode_vec(&token).ok())
            .map(|bytes| bytes.len());
        assert_eq!(decoded_len, Some(TOKEN_BYTES));
    }

    #[test]
    fn digest_is_stable_and_discriminating() {
        let first = digest("token");
        let second = digest("token");
        let different = digest("other");
        assert_eq!(first, second);
        assert_ne!(first, different);
    }

    #[test]
    fn expiry_from_adds_ttl() {
        let now = Utc::now();
        let expiry = expiry_from(now, Duration::seconds(900));
        assert_eq!((expiry - now).num_seconds(), 900);
    }
}
