//! Error types for job pipeline services.

use thiserror::Error;

/// Primary error type for job pipeline operations.
///
/// Variants group by the error taxonomy the whole workspace shares: every
/// provider-specific error enum (Drive, S3) wraps one of these kinds rather
/// than re-declaring the same shape.
#[derive(Debug, Error)]
pub enum JobError {
    /// Missing/invalid credentials, wrong provider type, invalid selection.
    /// Non-retryable at the job level.
    #[error("validation failed: {reason}")]
    Validation {
        /// Human-readable description of what failed validation.
        reason: String,
    },
    /// Download path missing, bucket missing, job not found.
    #[error("not found: {reason}")]
    NotFound {
        /// Human-readable description of what was not found.
        reason: String,
    },
    /// Token refresh failed, or the provider returned 401/403.
    #[error("authorization failed: {reason}")]
    Authorization {
        /// Human-readable description of the authorization failure.
        reason: String,
    },
    /// Network errors, 5xx responses, stream read errors, lock-refresh failure. Retryable.
    #[error("transient failure: {reason}")]
    Transient {
        /// Human-readable description of the transient condition.
        reason: String,
    },
    /// Unexpected status code mid-upload, or a read-size mismatch against the expected part size.
    #[error("protocol consistency violation: {reason}")]
    ProtocolConsistency {
        /// Human-readable description of the inconsistency.
        reason: String,
    },
    /// A partial read came back shorter than expected; the run must abort.
    #[error("integrity violation: {reason}")]
    IntegrityViolation {
        /// Human-readable description of the violation.
        reason: String,
    },
    /// Operation is not supported by the underlying engine.
    #[error("operation not supported: {operation}")]
    Unsupported {
        /// Operation identifier.
        operation: &'static str,
    },
}

impl JobError {
    /// Whether the background engine should retry the job after this error.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::ProtocolConsistency { .. })
    }
}

/// Convenience alias for job pipeline results.
pub type JobResult<T> = Result<T, JobError>;
