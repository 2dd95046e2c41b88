//! Error type for the health monitor.

use revaer_data::DataError;
use revaer_jobs_core::JobError;
use thiserror::Error;

/// Errors raised while sweeping for and recovering stale jobs.
#[derive(Debug, Error)]
pub enum HealthError {
    /// The background-execution engine or a job-domain invariant rejected an operation.
    #[error(transparent)]
    Job(#[from] JobError),
    /// A database read or write failed.
    #[error(transparent)]
    Data(#[from] DataError),
}

/// Convenience alias for health monitor results.
pub type HealthResult<T> = Result<T, HealthError>;
