//! Error type for the Google Drive upload executor.

use revaer_coordination::CoordinationError;
use revaer_data::DataError;
use revaer_jobs_core::JobError;
use thiserror::Error;

/// Errors raised while driving a job's Google Drive upload.
#[derive(Debug, Error)]
pub enum GDriveError {
    /// Shared job-pipeline error taxonomy (validation, not-found, auth, transient, ...).
    #[error(transparent)]
    Job(#[from] JobError),
    /// A database read or write failed.
    #[error(transparent)]
    Data(#[from] DataError),
    /// The distributed lock or cache could not be reached.
    #[error(transparent)]
    Coordination(#[from] CoordinationError),
    /// A local filesystem operation failed while walking `downloadPath`.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// An HTTP request to the Drive API or OAuth endpoint failed.
    #[error(transparent)]
    Fetch(#[from] reqwest::Error),
    /// A Drive API response could not be decoded as JSON.
    #[error(transparent)]
    Codec(#[from] serde_json::Error),
    /// The storage profile's credentials were not a Google Drive credential set.
    #[error("storage profile {profile_id} does not hold google drive credentials")]
    WrongProviderType {
        /// Storage profile id.
        profile_id: i64,
    },
    /// The storage profile has no refresh token to exchange for an access token.
    #[error("storage profile {profile_id} has no refresh token")]
    NoRefreshToken {
        /// Storage profile id.
        profile_id: i64,
    },
    /// The OAuth token endpoint rejected the refresh request.
    #[error("refreshing the access token for profile {profile_id} failed: {reason}")]
    RefreshFailed {
        /// Storage profile id.
        profile_id: i64,
        /// Human-readable failure reason.
        reason: String,
    },
    /// The resumable session's upload URI was rejected by Drive as expired or invalid.
    #[error("resumable upload session expired")]
    SessionExpired,
    /// Drive returned an unexpected status code mid-upload.
    #[error("drive returned unexpected status {status} for {operation}")]
    UnexpectedStatus {
        /// HTTP status code.
        status: u16,
        /// Operation that received the unexpected status.
        operation: &'static str,
    },
}

impl GDriveError {
    /// Whether this error should be treated as a retryable executor failure rather than a
    /// non-retryable one (e.g. a provider-type mismatch should never retry).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_) | Self::Coordination(_) | Self::SessionExpired | Self::UnexpectedStatus { .. }
        ) || matches!(self, Self::Job(inner) if inner.is_retryable())
    }
}

/// Convenience alias for Google Drive executor results.
pub type GDriveResult<T> = Result<T, GDriveError>;
