//! Error types for the download worker.

use thiserror::Error;

/// Errors raised while resolving, materializing, or monitoring a job's download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A domain-level job operation failed (unknown job, unsupported engine op, ...).
    #[error(transparent)]
    Job(#[from] revaer_jobs_core::JobError),
    /// A data-access operation failed.
    #[error(transparent)]
    Data(#[from] revaer_data::DataError),
    /// A coordination-fabric operation (dispatch, lock) failed.
    #[error(transparent)]
    Coordination(#[from] revaer_coordination::CoordinationError),
    /// Reading or writing fast-resume/manifest state on disk failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    /// Fetching a request file's torrent descriptor over HTTP failed.
    #[error("failed to fetch torrent descriptor: {0}")]
    Fetch(#[from] reqwest::Error),
    /// A manifest or fast-resume payload could not be (de)serialized.
    #[error("failed to (de)serialize download state: {0}")]
    Codec(#[from] serde_json::Error),
    /// The job referenced by a job id does not exist.
    #[error("job {job_id} not found")]
    JobNotFound {
        /// Missing job id.
        job_id: i64,
    },
    /// The engine reported an unrecoverable error or stopped before completing.
    #[error("torrent engine reported failure for job {job_id}: {detail}")]
    EngineFailed {
        /// Job id the failure applies to.
        job_id: i64,
        /// Engine-reported detail, if any.
        detail: String,
    },
    /// The engine did not settle into a recognized state within the settle-wait window.
    #[error("torrent engine did not settle for job {job_id} within the timeout")]
    SettleTimeout {
        /// Job id that failed to settle.
        job_id: i64,
    },
}

/// Result alias for download worker operations.
pub type DownloadResult<T> = Result<T, DownloadError>;
