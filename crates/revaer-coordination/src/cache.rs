//! Small Redis-backed key/value cache used for dedup and completion markers.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};

use crate::error::CoordinationResult;

/// Keys longer than this are hashed down to keep Redis key sizes bounded.
const MAX_RAW_KEY_LEN: usize = 100;
/// Number of base64 characters of the SHA-256 digest kept when a key is sanitized.
const SANITIZED_SUFFIX_LEN: usize = 20;

/// Normalize a cache key for wire use: separators are unified to `/`, and keys longer than
/// [`MAX_RAW_KEY_LEN`] are replaced by their SHA-256 digest, base64-encoded and truncated to
/// [`SANITIZED_SUFFIX_LEN`] characters, so every downstream Redis key stays short and stable.
#[must_use]
pub fn sanitize_key(raw: &str) -> String {
    let normalized = raw.replace('\\', "/");
    if normalized.len() <= MAX_RAW_KEY_LEN {
        return normalized;
    }
    let digest = Sha256::digest(normalized.as_bytes());
    let encoded = STANDARD.encode(digest);
    encoded.chars().take(SANITIZED_SUFFIX_LEN).collect()
}

/// Thin wrapper over a Redis connection manager exposing the cache operations the job pipeline
/// needs: dedup markers, completion markers, and short-lived progress snapshots.
#[derive(Clone)]
pub struct Cache {
    redis: ConnectionManager,
}

impl Cache {
    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Fetch a value by key, sanitizing the key first.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn get(&self, key: &str) -> CoordinationResult<Option<String>> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(sanitize_key(key)).await?;
        Ok(value)
    }

    /// Set a value with a millisecond TTL, sanitizing the key first.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn set_px(&self, key: &str, value: &str, ttl_ms: u64) -> CoordinationResult<()> {
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(sanitize_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Delete a key, sanitizing it first.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis command fails.
    pub async fn del(&self, key: &str) -> CoordinationResult<()> {
        let mut conn = self.redis.clone();
        let _: () = conn.del(sanitize_key(key)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_keys_pass_through_with_normalized_separators() {
        assert_eq!(sanitize_key("gdrive:completed:42:a/b"), "gdrive:completed:42:a/b");
        assert_eq!(sanitize_key(r"gdrive:completed:42:a\b"), "gdrive:completed:42:a/b");
    }

    #[test]
    fn long_keys_are_hashed_to_a_bounded_length() {
        let long_key = "x".repeat(200);
        let sanitized = sanitize_key(&long_key);
        assert_eq!(sanitized.len(), SANITIZED_SUFFIX_LEN);
        assert_ne!(sanitized, long_key);
    }

    #[test]
    fn hashing_is_deterministic() {
        let long_key = "a/very/long/path/".repeat(10);
        assert_eq!(sanitize_key(&long_key), sanitize_key(&long_key));
    }
}
