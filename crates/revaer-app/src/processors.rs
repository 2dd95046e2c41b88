//! Stream job processors: consume a dispatched upload trigger and drive the matching executor,
//! recording the retry-or-terminal outcome on failure the same way the download worker does.

use std::sync::Arc;

use async_trait::async_trait;
use revaer_coordination::JobProcessor;
use revaer_data::{DataStore, record_transition};
use revaer_download::UploadTrigger;
use revaer_jobs_core::{JobSource, JobStatus, JobStatusHistoryEntry};
use revaer_upload_gdrive::{GDriveExecutor, execute_upload as execute_gdrive_upload, gdrive_upload_failure_status};
use revaer_upload_s3::{S3Executor, execute_upload as execute_s3_upload, s3_upload_failure_status};
use tracing::warn;

/// Runs a completed download's Google Drive upload leg.
pub struct GDriveJobProcessor {
    store: DataStore,
    executor: Arc<GDriveExecutor>,
}

impl GDriveJobProcessor {
    /// Build a processor bound to a store and executor, for use with `StreamWorker`.
    #[must_use]
    pub const fn new(store: DataStore, executor: Arc<GDriveExecutor>) -> Self {
        Self { store, executor }
    }
}

#[async_trait]
impl JobProcessor<UploadTrigger> for GDriveJobProcessor {
    async fn process(&self, job: &UploadTrigger) -> bool {
        run_gdrive_upload(&self.store, &self.executor, job.job_id).await
    }
}

/// Runs a completed download's S3-compatible upload leg.
pub struct S3JobProcessor {
    store: DataStore,
    executor: Arc<S3Executor>,
}

impl S3JobProcessor {
    /// Build a processor bound to a store and executor, for use with `StreamWorker`.
    #[must_use]
    pub const fn new(store: DataStore, executor: Arc<S3Executor>) -> Self {
        Self { store, executor }
    }
}

#[async_trait]
impl JobProcessor<UploadTrigger> for S3JobProcessor {
    async fn process(&self, job: &UploadTrigger) -> bool {
        run_s3_upload(&self.store, &self.executor, job.job_id).await
    }
}

/// Run the Google Drive upload executor for `job_id`, recording a retry-or-terminal transition
/// on failure. Returns `true` once the job has reached a settled outcome (success, a failure
/// already durably recorded, or a redelivery of a dispatch already in flight), matching
/// `JobProcessor::process`'s acknowledge contract.
pub async fn run_gdrive_upload(store: &DataStore, executor: &GDriveExecutor, job_id: i64) -> bool {
    match acquire_upload_guard(store, job_id).await {
        Some(UploadGuard::AlreadyDispatched) => return true,
        Some(UploadGuard::Acquired) => {}
        None => return false,
    }
    let outcome = execute_gdrive_upload(executor, job_id).await;
    release_upload_guard(store, job_id).await;
    match outcome {
        Err(err) => record_upload_failure(store, job_id, gdrive_upload_failure_status, &err.to_string()).await,
        Ok(()) => true,
    }
}

/// Run the S3 upload executor for `job_id`, recording a retry-or-terminal transition on failure.
pub async fn run_s3_upload(store: &DataStore, executor: &S3Executor, job_id: i64) -> bool {
    match acquire_upload_guard(store, job_id).await {
        Some(UploadGuard::AlreadyDispatched) => return true,
        Some(UploadGuard::Acquired) => {}
        None => return false,
    }
    let outcome = execute_s3_upload(executor, job_id).await;
    release_upload_guard(store, job_id).await;
    match outcome {
        Err(err) => record_upload_failure(store, job_id, s3_upload_failure_status, &err.to_string()).await,
        Ok(()) => true,
    }
}

/// Outcome of checking and taking the dispatcher's idempotency guard for a job's upload leg.
enum UploadGuard {
    /// `hangfireUploadJobId` was already set; this delivery is a stream redelivery of a
    /// dispatch already in flight (or recovered separately) and must be acknowledged without
    /// running the executor again.
    AlreadyDispatched,
    /// No handle was recorded; one has now been persisted and the executor may run.
    Acquired,
}

/// Load the job, check `hangfireUploadJobId`, and persist a dispatch handle before the executor
/// runs. Returns `None` if the job can't be reloaded or the handle can't be persisted, in which
/// case the stream entry is left unacknowledged for a later redelivery to retry.
async fn acquire_upload_guard(store: &DataStore, job_id: i64) -> Option<UploadGuard> {
    let Ok(Some(job)) = store.jobs().fetch(job_id).await else {
        warn!(job_id, "upload dispatch could not reload the job to check the idempotency guard");
        return None;
    };
    if job.hangfire_upload_job_id.is_some() {
        return Some(UploadGuard::AlreadyDispatched);
    }
    let handle = format!("stream-upload:{job_id}");
    if let Err(err) = store.jobs().set_hangfire_upload_job_id(job_id, Some(handle.as_str())).await {
        warn!(job_id, error = %err, "failed to persist upload dispatch handle; leaving entry for retry");
        return None;
    }
    Some(UploadGuard::Acquired)
}

/// Clear the dispatch handle once the executor has settled, so a later run (steady-state or
/// health-monitor recovery) is not blocked by this one.
async fn release_upload_guard(store: &DataStore, job_id: i64) {
    if let Err(err) = store.jobs().set_hangfire_upload_job_id(job_id, None).await {
        warn!(job_id, error = %err, "failed to clear upload dispatch handle after run");
    }
}

async fn record_upload_failure(
    store: &DataStore,
    job_id: i64,
    failure_status: impl Fn(JobStatus, &[JobStatusHistoryEntry]) -> JobStatus,
    message: &str,
) -> bool {
    let Ok(Some(job)) = store.jobs().fetch(job_id).await else {
        warn!(job_id, "upload failed but the job could not be reloaded to record the outcome");
        return false;
    };
    let Ok(history) = store.history().list_for_job(job_id).await else {
        warn!(job_id, "upload failed but history could not be loaded to score the retry budget");
        return false;
    };
    let next_status = failure_status(job.status, &history);
    let Ok(mut tx) = store.transaction().await else {
        return false;
    };
    if record_transition(&mut tx, job_id, job.status, next_status, JobSource::Worker, Some(message)).await.is_err() {
        return false;
    }
    tx.commit().await.is_ok()
}
