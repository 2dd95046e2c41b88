//! Distributed lock/lease used to enforce at-most-one executor per job.

use redis::aio::ConnectionManager;
use redis::{Script, Value};

use crate::cache::sanitize_key;
use crate::error::{CoordinationError, CoordinationResult};

/// Lua script releasing a lock only if the caller still owns it, so a holder whose lease
/// expired and was re-acquired by someone else cannot delete the new owner's lock.
const RELEASE_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
";

/// Lua script extending a lock's TTL only if the caller still owns it.
const REFRESH_SCRIPT: &str = r"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
else
    return 0
end
";

/// A held lock. Dropping this without calling [`Lock::release`] leaves the lease to expire on
/// its own TTL; callers that hold a job's lock across an executor's lifetime should release
/// explicitly on both success and failure paths.
pub struct Lock {
    key: String,
    token: String,
}

impl Lock {
    /// The sanitized Redis key backing this lock.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The random token proving ownership, compared by the release/refresh Lua scripts.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }
}

/// Redis-backed distributed lock manager.
#[derive(Clone)]
pub struct LockManager {
    redis: ConnectionManager,
}

impl LockManager {
    /// Wrap an existing connection manager.
    #[must_use]
    pub const fn new(redis: ConnectionManager) -> Self {
        Self { redis }
    }

    /// Attempt to acquire `key` for `ttl_ms` milliseconds, returning the held lock on success.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::LockContended`] if another holder already owns the key, or
    /// a Redis error if the command fails.
    pub async fn acquire(&self, key: &str, ttl_ms: u64) -> CoordinationResult<Lock> {
        let sanitized = sanitize_key(key);
        let token = uuid_like_token();
        let mut conn = self.redis.clone();
        let result: Value = redis::cmd("SET")
            .arg(&sanitized)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        match result {
            Value::Nil => Err(CoordinationError::LockContended { key: sanitized }),
            _ => Ok(Lock {
                key: sanitized,
                token,
            }),
        }
    }

    /// Release a held lock. A no-op (returns `Ok`) if the lock has already expired or was
    /// reacquired by another holder.
    ///
    /// # Errors
    ///
    /// Returns a Redis error if the script invocation fails.
    pub async fn release(&self, lock: &Lock) -> CoordinationResult<()> {
        let mut conn = self.redis.clone();
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(&lock.key)
            .arg(&lock.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Extend a held lock's TTL, used by the executor heartbeat loop to keep the lease alive.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinationError::LockTokenMismatch`] if the lock was lost (expired and
    /// reacquired elsewhere) before the refresh ran, or a Redis error if the script fails.
    pub async fn refresh(&self, lock: &Lock, ttl_ms: u64) -> CoordinationResult<()> {
        let mut conn = self.redis.clone();
        let extended: i64 = Script::new(REFRESH_SCRIPT)
            .key(&lock.key)
            .arg(&lock.token)
            .arg(ttl_ms)
            .invoke_async(&mut conn)
            .await?;
        if extended == 0 {
            return Err(CoordinationError::LockTokenMismatch {
                key: lock.key.clone(),
            });
        }
        Ok(())
    }
}

fn uuid_like_token() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let pid = std::process::id();
    format!("{pid:x}-{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_exposes_key_and_token() {
        let lock = Lock {
            key: "gdrive:lock:42".into(),
            token: "abc".into(),
        };
        assert_eq!(lock.key(), "gdrive:lock:42");
        assert_eq!(lock.token(), "abc");
    }

    #[test]
    fn tokens_are_unique_across_calls() {
        let a = uuid_like_token();
        let b = uuid_like_token();
        assert_ne!(a, b);
    }
}
