//! Error types for the coordination fabric.

use thiserror::Error;

/// Errors raised by stream dispatch, locking, and caching.
#[derive(Debug, Error)]
pub enum CoordinationError {
    /// The underlying Redis connection or command failed.
    #[error("redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),
    /// A job payload could not be encoded or decoded.
    #[error("failed to (de)serialize job payload: {0}")]
    Codec(#[from] serde_json::Error),
    /// A lock could not be acquired because another holder already owns it.
    #[error("lock already held for key {key}")]
    LockContended {
        /// The lock key that was contended.
        key: String,
    },
    /// A lock token did not match the stored owner, so release/refresh was refused.
    #[error("lock token mismatch for key {key}")]
    LockTokenMismatch {
        /// The lock key whose token did not match.
        key: String,
    },
}

/// Result alias for coordination fabric operations.
pub type CoordinationResult<T> = Result<T, CoordinationError>;
