//! Error type for the S3-compatible upload executor.

use revaer_coordination::CoordinationError;
use revaer_data::DataError;
use revaer_jobs_core::JobError;
use thiserror::Error;

/// Errors raised while driving a job's S3 upload.
#[derive(Debug, Error)]
pub enum S3Error {
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
    /// An HTTP request to the S3-compatible endpoint failed.
    #[error(transparent)]
    Fetch(#[from] reqwest::Error),
    /// The storage profile's credentials were not an S3 credential set.
    #[error("storage profile {profile_id} does not hold s3 credentials")]
    WrongProviderType {
        /// Storage profile id.
        profile_id: i64,
    },
    /// The bucket verification request came back 403.
    #[error("access denied listing bucket {bucket}")]
    AccessDenied {
        /// Bucket name.
        bucket: String,
    },
    /// The bucket verification request came back 404.
    #[error("bucket {bucket} not found")]
    BucketNotFound {
        /// Bucket name.
        bucket: String,
    },
    /// The S3-compatible endpoint returned an unexpected status or a response body that could
    /// not be parsed.
    #[error("s3 endpoint returned unexpected status {status} for {operation}: {detail}")]
    S3Error {
        /// HTTP status code.
        status: u16,
        /// Operation that received the unexpected status.
        operation: &'static str,
        /// Response body excerpt or parse failure detail.
        detail: String,
    },
}

impl S3Error {
    /// Whether this error should be treated as a retryable executor failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::Coordination(_) | Self::S3Error { .. })
            || matches!(self, Self::Job(inner) if inner.is_retryable())
    }
}

/// Convenience alias for S3 executor results.
pub type S3Result<T> = Result<T, S3Error>;
