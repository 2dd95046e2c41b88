//! `ExecuteS3Upload(jobId, ctx)`: the shared upload envelope (lock, phase transition, heartbeat)
//! wrapping multipart upload progress tracking, resume, and per-job cleanup on failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use revaer_coordination::{Cache, CoordinationError, LockManager};
use revaer_data::{DataError, DataStore, record_transition};
use revaer_jobs_core::{
    JobError, JobSource, JobStatus, JobStatusHistoryEntry, PartETag, ProviderType, S3UploadProgress,
    StorageCredentials, UploadPartStatus, is_engine_metadata,
};
use revaer_telemetry::Metrics;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};
use walkdir::WalkDir;

use crate::error::{S3Error, S3Result};
use crate::s3_client::{S3Client, S3Config};

/// Lease length for the per-job upload lock.
const LOCK_TTL_MS: u64 = 2 * 60 * 60 * 1000;
/// Heartbeat/lock-refresh period, run on its own `DataStore` checkout.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Minimum percent delta before the progress reporter writes to the database.
const PROGRESS_PERCENT_STEP: f64 = 5.0;
/// Maximum number of `UPLOAD_RETRY` excursions before an upload failure is treated as terminal.
const MAX_UPLOAD_ATTEMPTS: usize = 3;
/// Signing region used for S3-compatible endpoints that do not expose a meaningful region of
/// their own.
const DEFAULT_SIGNING_REGION: &str = "us-east-1";

/// Collaborators the S3 executor needs to run a job's upload end to end.
pub struct S3Executor {
    store: DataStore,
    locks: LockManager,
    http_client: Client,
    upload_torrent_files: bool,
    metrics: Option<Metrics>,
}

impl S3Executor {
    /// Construct an executor wired to the job pipeline's collaborators.
    #[must_use]
    pub const fn new(store: DataStore, locks: LockManager, http_client: Client, upload_torrent_files: bool) -> Self {
        Self { store, locks, http_client, upload_torrent_files, metrics: None }
    }

    /// Attach a metrics registry so upload throughput and concurrency are reported.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Run the S3 upload executor's algorithm for a single job. Exits quietly (returns `Ok(())`
/// without doing any work) if the per-job lock is already held by another executor.
///
/// # Errors
///
/// Returns an error if the job or its storage profile cannot be loaded, the profile is not a
/// usable S3 profile, the download path has no uploadable files, or the upload itself fails.
/// Callers should route the error through [`s3_upload_failure_status`] to select the job's
/// retry-or-terminal status.
pub async fn execute_upload(ctx: &S3Executor, job_id: i64) -> S3Result<()> {
    if let Some(metrics) = &ctx.metrics {
        metrics.inc_active_uploads();
    }
    let result = execute_upload_inner(ctx, job_id).instrument(revaer_telemetry::run_span("upload_s3", job_id)).await;
    if let Some(metrics) = &ctx.metrics {
        metrics.dec_active_uploads();
    }
    result
}

async fn execute_upload_inner(ctx: &S3Executor, job_id: i64) -> S3Result<()> {
    let lock_key = format!("{}:lock:{job_id}", ProviderType::S3.key_prefix());
    let lock = match ctx.locks.acquire(&lock_key, LOCK_TTL_MS).await {
        Ok(lock) => Arc::new(lock),
        Err(CoordinationError::LockContended { .. }) => return Ok(()),
        Err(err) => return Err(err.into()),
    };

    let cancel = CancellationToken::new();
    let heartbeat = spawn_heartbeat(ctx.store.clone(), ctx.locks.clone(), Arc::clone(&lock), job_id, cancel.clone());

    let outcome = run_upload(ctx, job_id, &cancel).await;

    cancel.cancel();
    let _ = heartbeat.await;

    if outcome.is_err() {
        cleanup_after_failure(ctx, job_id).await;
    }

    if let Err(err) = ctx.locks.release(&lock).await {
        warn!(job_id, error = %err, "failed to release s3 upload lock");
    }

    if outcome.is_ok() {
        let mut tx = ctx.store.transaction().await?;
        record_transition(&mut tx, job_id, JobStatus::Uploading, JobStatus::Completed, JobSource::Worker, None).await?;
        tx.commit().await.map_err(DataError::from)?;
    }

    outcome
}

/// Spawn the heartbeat/lock-refresh loop on its own `DataStore` clone (a distinct pool checkout
/// from the main upload path), cancelling the linked token if the lease is lost.
fn spawn_heartbeat(
    store: DataStore,
    locks: LockManager,
    lock: Arc<revaer_coordination::Lock>,
    job_id: i64,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(HEARTBEAT_INTERVAL) => {}
            }
            if let Err(err) = store.jobs().touch_heartbeat(job_id).await {
                warn!(job_id, error = %err, "failed to refresh upload heartbeat");
            }
            if let Err(err) = locks.refresh(&lock, LOCK_TTL_MS).await {
                warn!(job_id, error = %err, "lost s3 upload lock lease; cancelling run");
                cancel.cancel();
                return;
            }
        }
    })
}

async fn run_upload(ctx: &S3Executor, job_id: i64, cancel: &CancellationToken) -> S3Result<()> {
    let Some(job) = ctx.store.jobs().fetch(job_id).await? else {
        return Err(JobError::NotFound { reason: format!("job {job_id}") }.into());
    };
    if job.is_terminal() {
        return Ok(());
    }
    if !job.status.is_upload_phase() {
        return Ok(());
    }

    let Some(profile) = ctx.store.storage_profiles().fetch(job.storage_profile_id).await? else {
        return Err(JobError::NotFound { reason: format!("storage profile {}", job.storage_profile_id) }.into());
    };
    if profile.provider_type != ProviderType::S3 {
        return Err(S3Error::WrongProviderType { profile_id: profile.id });
    }
    if !profile.is_usable() {
        return Err(JobError::Authorization {
            reason: format!("storage profile {} is inactive or needs reauthorization", profile.id),
        }
        .into());
    }
    let StorageCredentials::S3 { access_key_id, secret_access_key, endpoint, bucket } = &profile.credentials else {
        return Err(S3Error::WrongProviderType { profile_id: profile.id });
    };

    let Some(download_path) = job.download_path.as_deref() else {
        return Err(JobError::NotFound { reason: "job has no download_path".to_string() }.into());
    };
    let root = Path::new(download_path);
    let files = collect_uploadable_files(root, ctx.upload_torrent_files)?;
    if files.is_empty() {
        return Err(JobError::Validation { reason: format!("no uploadable files under {download_path}") }.into());
    }

    if job.status != JobStatus::Uploading {
        let mut tx = ctx.store.transaction().await?;
        record_transition(&mut tx, job_id, job.status, JobStatus::Uploading, JobSource::Worker, None).await?;
        tx.commit().await.map_err(DataError::from)?;
    }

    let client = S3Client::new(
        ctx.http_client.clone(),
        S3Config {
            endpoint: endpoint.clone(),
            bucket: bucket.clone(),
            region: DEFAULT_SIGNING_REGION.to_string(),
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
        },
    );

    if let Err(err) = client.verify_bucket_access().await {
        if matches!(err, S3Error::AccessDenied { .. }) {
            let _ = ctx.store.storage_profiles().mark_needs_reauth(profile.id).await;
        }
        return Err(err);
    }

    let mut total_bytes: u64 = 0;
    for file in &files {
        total_bytes += tokio::fs::metadata(file).await?.len();
    }
    let mut reporter = ProgressReporter::new(&ctx.store, job_id, total_bytes, ctx.metrics.clone());

    for file in &files {
        if cancel.is_cancelled() {
            return Err(JobError::Transient { reason: "upload lock lease was lost mid-run".to_string() }.into());
        }
        let relative_path = relative_path_string(root, file);
        let key = format!("torrents/{job_id}/{relative_path}");
        upload_one_file(ctx, &client, job_id, file, &key, &mut reporter).await?;
    }

    Ok(())
}

async fn upload_one_file(
    ctx: &S3Executor,
    client: &S3Client,
    job_id: i64,
    file_path: &Path,
    key: &str,
    reporter: &mut ProgressReporter<'_>,
) -> S3Result<()> {
    let total_size = tokio::fs::metadata(file_path).await?.len();
    let base = reporter.completed_bytes();

    if client.head_object(key).await? {
        reporter.report(base + total_size, true).await?;
        return Ok(());
    }

    let mut progress = resume_or_start_progress(ctx, client, job_id, file_path, key, total_size).await?;

    let mut file = tokio::fs::File::open(file_path).await?;
    let part_size = progress.part_size;

    for part_number in progress.missing_part_numbers() {
        let offset = u64::from(part_number - 1) * part_size;
        let this_part = part_size.min(total_size - offset);
        #[expect(clippy::cast_possible_truncation, reason = "part sizes are bounded by S3UploadProgress::PART_SIZE_BYTES")]
        let mut buf = vec![0_u8; this_part as usize];
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        file.read_exact(&mut buf).await?;

        let upload_id = progress.upload_id.as_deref().ok_or_else(|| {
            S3Error::Job(JobError::ProtocolConsistency {
                reason: "s3 progress row has no upload_id".to_string(),
            })
        })?;
        let etag = client.upload_part(key, upload_id, part_number, buf).await?;
        progress.part_etags.push(PartETag { part_number, etag });
        progress.parts_completed = u32::try_from(progress.part_etags.len()).unwrap_or(progress.total_parts);
        progress.bytes_uploaded = (progress.bytes_uploaded + this_part).min(total_size);
        ctx.store.s3_progress().upsert(&progress).await?;

        reporter.report(base + progress.bytes_uploaded, false).await?;
        if part_number % 10 == 0 || progress.parts_completed == progress.total_parts {
            info!(job_id, key, part_number, total_parts = progress.total_parts, "uploaded s3 part");
        }
    }

    let upload_id = progress
        .upload_id
        .clone()
        .ok_or_else(|| S3Error::Job(JobError::ProtocolConsistency { reason: "s3 progress row has no upload_id".to_string() }))?;
    client.complete_multipart_upload(key, &upload_id, &progress.part_etags).await?;
    ctx.store.s3_progress().delete(job_id, key).await?;
    reporter.report(base + total_size, true).await?;
    Ok(())
}

/// Load an existing in-progress row for this key and reconcile it against what S3 itself reports
/// for the upload (authoritative on any conflict), or start a fresh multipart upload.
async fn resume_or_start_progress(
    ctx: &S3Executor,
    client: &S3Client,
    job_id: i64,
    file_path: &Path,
    key: &str,
    total_size: u64,
) -> S3Result<S3UploadProgress> {
    if let Some(mut existing) = ctx.store.s3_progress().fetch(job_id, key).await? {
        if let Some(upload_id) = existing.upload_id.clone() {
            match client.list_parts(key, &upload_id).await {
                Ok(remote_parts) => {
                    existing.part_etags = remote_parts;
                    existing.parts_completed = u32::try_from(existing.part_etags.len()).unwrap_or(existing.total_parts);
                    existing.bytes_uploaded = existing
                        .part_etags
                        .iter()
                        .map(|_| existing.part_size)
                        .sum::<u64>()
                        .min(existing.total_bytes);
                    ctx.store.s3_progress().upsert(&existing).await?;
                    return Ok(existing);
                }
                Err(err) => {
                    warn!(job_id, key, error = %err, "failed to reconcile multipart upload parts; starting fresh");
                }
            }
        }
    }

    let upload_id = client.create_multipart_upload(key).await?;
    let progress = S3UploadProgress {
        job_id,
        local_file_path: file_path.to_string_lossy().to_string(),
        s3_key: key.to_string(),
        upload_id: Some(upload_id),
        part_size: S3UploadProgress::PART_SIZE_BYTES,
        total_parts: S3UploadProgress::total_parts_for(total_size),
        parts_completed: 0,
        bytes_uploaded: 0,
        total_bytes: total_size,
        part_etags: Vec::new(),
        status: UploadPartStatus::InProgress,
        started_at: Some(Utc::now()),
        completed_at: None,
    };
    ctx.store.s3_progress().upsert(&progress).await?;
    Ok(progress)
}

/// Best-effort cleanup on a failed run: abort every in-progress multipart upload this job had
/// open, so the bucket does not accumulate abandoned parts.
async fn cleanup_after_failure(ctx: &S3Executor, job_id: i64) {
    let Ok(in_progress) = ctx.store.s3_progress().list_in_progress_for_job(job_id).await else {
        return;
    };
    if in_progress.is_empty() {
        return;
    }
    let Ok(Some(job)) = ctx.store.jobs().fetch(job_id).await else {
        return;
    };
    let Ok(Some(profile)) = ctx.store.storage_profiles().fetch(job.storage_profile_id).await else {
        return;
    };
    let StorageCredentials::S3 { access_key_id, secret_access_key, endpoint, bucket } = &profile.credentials else {
        return;
    };
    let client = S3Client::new(
        ctx.http_client.clone(),
        S3Config {
            endpoint: endpoint.clone(),
            bucket: bucket.clone(),
            region: DEFAULT_SIGNING_REGION.to_string(),
            access_key_id: access_key_id.clone(),
            secret_access_key: secret_access_key.clone(),
        },
    );
    for progress in in_progress {
        let Some(upload_id) = progress.upload_id else { continue };
        if let Err(err) = client.abort_multipart_upload(&progress.s3_key, &upload_id).await {
            warn!(job_id, key = %progress.s3_key, error = %err, "failed to abort multipart upload during cleanup");
        }
    }
}

/// Determine the retry-or-terminal failure status for an upload-phase failure, mirroring the
/// Google Drive executor's use of the history-count pattern over `UPLOAD_RETRY` excursions.
#[must_use]
pub fn s3_upload_failure_status(current: JobStatus, history: &[JobStatusHistoryEntry]) -> JobStatus {
    let attempts = history.iter().filter(|entry| entry.to_status == JobStatus::UploadRetry).count();
    current.mark_failed(attempts < MAX_UPLOAD_ATTEMPTS)
}

fn collect_uploadable_files(root: &Path, upload_torrent_files: bool) -> S3Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_str().unwrap_or_default();
        if is_engine_metadata(name, upload_torrent_files) {
            continue;
        }
        files.push(entry.into_path());
    }
    info!(count = files.len(), "collected uploadable files");
    Ok(files)
}

fn relative_path_string(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// Throttled progress reporter: writes to the database only on a meaningful percent change, per
/// the reporting contract shared with the Google Drive executor.
struct ProgressReporter<'a> {
    store: &'a DataStore,
    job_id: i64,
    total_bytes: u64,
    completed_bytes: u64,
    last_db_percent: f64,
    metrics: Option<Metrics>,
}

impl<'a> ProgressReporter<'a> {
    fn new(store: &'a DataStore, job_id: i64, total_bytes: u64, metrics: Option<Metrics>) -> Self {
        Self { store, job_id, total_bytes, completed_bytes: 0, last_db_percent: 0.0, metrics }
    }

    const fn completed_bytes(&self) -> u64 {
        self.completed_bytes
    }

    async fn report(&mut self, completed_bytes: u64, file_just_completed: bool) -> S3Result<()> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_bytes_uploaded("s3", completed_bytes.saturating_sub(self.completed_bytes));
        }
        self.completed_bytes = completed_bytes;
        let percent = percent_of(completed_bytes, self.total_bytes);
        if percent - self.last_db_percent >= PROGRESS_PERCENT_STEP || (file_just_completed && percent > self.last_db_percent) {
            #[expect(clippy::cast_possible_wrap, reason = "byte totals stay well under i64::MAX")]
            let bytes = completed_bytes as i64;
            self.store.jobs().update_upload_progress(self.job_id, bytes).await?;
            self.last_db_percent = percent;
        }
        Ok(())
    }
}

fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 100.0;
    }
    #[expect(clippy::cast_precision_loss, reason = "progress ratios do not need full u64 precision")]
    {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_entry(to_status: JobStatus) -> JobStatusHistoryEntry {
        JobStatusHistoryEntry {
            job_id: 1,
            from_status: JobStatus::Uploading,
            to_status,
            source: JobSource::Worker,
            error_message: None,
            metadata_json: None,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn retries_remain_under_the_attempt_cap() {
        let history = vec![history_entry(JobStatus::UploadRetry)];
        assert_eq!(s3_upload_failure_status(JobStatus::Uploading, &history), JobStatus::UploadRetry);
    }

    #[test]
    fn retries_exhausted_past_the_attempt_cap() {
        let history: Vec<_> = std::iter::repeat_with(|| history_entry(JobStatus::UploadRetry))
            .take(MAX_UPLOAD_ATTEMPTS)
            .collect();
        assert_eq!(s3_upload_failure_status(JobStatus::Uploading, &history), JobStatus::UploadFailed);
    }

    #[test]
    fn relative_path_joins_components_with_forward_slashes() {
        let root = Path::new("/downloads/42");
        let path = Path::new("/downloads/42/season1/episode1.mkv");
        assert_eq!(relative_path_string(root, path), "season1/episode1.mkv");
    }

    #[test]
    fn percent_of_handles_zero_total() {
        assert!((percent_of(0, 0) - 100.0).abs() < f64::EPSILON);
        assert!((percent_of(50, 200) - 25.0).abs() < f64::EPSILON);
    }
}
