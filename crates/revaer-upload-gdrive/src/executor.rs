//! `ExecuteGoogleDriveUpload(jobId, ctx)`: the shared upload envelope (lock, phase transition,
//! heartbeat) wrapping Drive-specific folder hierarchy, two-level dedup, and chunked upload.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Client;
use revaer_coordination::{Cache, CoordinationError, LockManager};
use revaer_data::{DataError, DataStore, record_transition};
use revaer_jobs_core::{JobSource, JobStatus, JobStatusHistoryEntry, ProviderType, is_engine_metadata};
use revaer_telemetry::Metrics;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info, warn};
use walkdir::WalkDir;

use crate::auth::TokenRefresher;
use crate::drive_client::DriveClient;
use crate::error::{GDriveError, GDriveResult};
use crate::resumable::{DEFAULT_CHUNK_SIZE, ResumableUploadSession, UploadChunkResult};

/// Lease length for the per-job upload lock.
const LOCK_TTL_MS: u64 = 2 * 60 * 60 * 1000;
/// Heartbeat/lock-refresh period, run on its own `DataStore` checkout.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
/// Minimum percent delta before the progress reporter writes to the database.
const PROGRESS_PERCENT_STEP: f64 = 5.0;
/// How long a root-folder id is cached for, comfortably longer than any single upload run.
const ROOT_FOLDER_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// How long a resume-session URI is cached for.
const RESUME_CACHE_TTL_MS: u64 = 24 * 60 * 60 * 1000;
/// How long a completed-file marker is cached for.
const COMPLETED_CACHE_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;
/// Maximum number of `UPLOAD_RETRY` excursions before an upload failure is treated as terminal.
const MAX_UPLOAD_ATTEMPTS: usize = 3;

/// Collaborators the Google Drive executor needs to run a job's upload end to end.
pub struct GDriveExecutor {
    store: DataStore,
    locks: LockManager,
    cache: Cache,
    http_client: Client,
    token_refresher: TokenRefresher,
    upload_torrent_files: bool,
    metrics: Option<Metrics>,
}

impl GDriveExecutor {
    /// Construct an executor wired to the job pipeline's collaborators.
    #[must_use]
    pub fn new(store: DataStore, locks: LockManager, cache: Cache, http_client: Client, upload_torrent_files: bool) -> Self {
        let token_refresher = TokenRefresher::new(http_client.clone());
        Self { store, locks, cache, http_client, token_refresher, upload_torrent_files, metrics: None }
    }

    /// Attach a metrics registry so upload throughput and concurrency are reported.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Run the Google Drive upload executor's algorithm for a single job. Exits quietly (returns
/// `Ok(())` without doing any work) if the per-job lock is already held by another executor.
///
/// # Errors
///
/// Returns an error if the job or its storage profile cannot be loaded, the profile is not a
/// usable Google Drive profile, the download path has no uploadable files, or the upload itself
/// fails. Callers should route the error through [`gdrive_upload_failure_status`] to select the
/// job's retry-or-terminal status.
pub async fn execute_upload(ctx: &GDriveExecutor, job_id: i64) -> GDriveResult<()> {
    if let Some(metrics) = &ctx.metrics {
        metrics.inc_active_uploads();
    }
    let result = execute_upload_inner(ctx, job_id).instrument(revaer_telemetry::run_span("upload_googledrive", job_id)).await;
    if let Some(metrics) = &ctx.metrics {
        metrics.dec_active_uploads();
    }
    result
}

async fn execute_upload_inner(ctx: &GDriveExecutor, job_id: i64) -> GDriveResult<()> {
    let lock_key = format!("{}:lock:{job_id}", ProviderType::GoogleDrive.key_prefix());
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
    if let Err(err) = ctx.locks.release(&lock).await {
        warn!(job_id, error = %err, "failed to release google drive upload lock");
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
                warn!(job_id, error = %err, "lost google drive upload lock lease; cancelling run");
                cancel.cancel();
                return;
            }
        }
    })
}

async fn run_upload(ctx: &GDriveExecutor, job_id: i64, cancel: &CancellationToken) -> GDriveResult<()> {
    let Some(job) = ctx.store.jobs().fetch(job_id).await? else {
        return Err(revaer_jobs_core::JobError::NotFound { reason: format!("job {job_id}") }.into());
    };
    if job.is_terminal() {
        return Ok(());
    }
    if !job.status.is_upload_phase() {
        return Ok(());
    }

    let Some(profile) = ctx.store.storage_profiles().fetch(job.storage_profile_id).await? else {
        return Err(revaer_jobs_core::JobError::NotFound { reason: format!("storage profile {}", job.storage_profile_id) }.into());
    };
    if profile.provider_type != ProviderType::GoogleDrive {
        return Err(GDriveError::WrongProviderType { profile_id: profile.id });
    }
    if !profile.is_usable() {
        return Err(revaer_jobs_core::JobError::Authorization {
            reason: format!("storage profile {} is inactive or needs reauthorization", profile.id),
        }
        .into());
    }

    let Some(download_path) = job.download_path.as_deref() else {
        return Err(revaer_jobs_core::JobError::NotFound { reason: "job has no download_path".to_string() }.into());
    };
    let root = Path::new(download_path);
    let files = collect_uploadable_files(root, ctx.upload_torrent_files)?;
    if files.is_empty() {
        return Err(revaer_jobs_core::JobError::Validation {
            reason: format!("no uploadable files under {download_path}"),
        }
        .into());
    }

    if job.status != JobStatus::Uploading {
        let mut tx = ctx.store.transaction().await?;
        record_transition(&mut tx, job_id, job.status, JobStatus::Uploading, JobSource::Worker, None).await?;
        tx.commit().await.map_err(DataError::from)?;
    }

    let access_token = match ctx.token_refresher.refresh(&ctx.store, profile.id, &profile.credentials).await {
        Ok(token) => token,
        Err(err) => {
            let _ = ctx.store.storage_profiles().mark_needs_reauth(profile.id).await;
            return Err(err);
        }
    };
    let drive = DriveClient::new(ctx.http_client.clone(), access_token);

    let root_folder_id = ensure_root_folder(&ctx.cache, &drive, job_id).await?;
    let folder_cache = build_folder_hierarchy(&drive, &root_folder_id, root, &files).await?;

    let mut total_bytes: u64 = 0;
    for file in &files {
        total_bytes += tokio::fs::metadata(file).await?.len();
    }
    let mut reporter = ProgressReporter::new(&ctx.store, job_id, total_bytes, ctx.metrics.clone());

    for file in &files {
        if cancel.is_cancelled() {
            return Err(revaer_jobs_core::JobError::Transient {
                reason: "upload lock lease was lost mid-run".to_string(),
            }
            .into());
        }
        let relative_path = relative_path_string(root, file);
        let parent = parent_dir_string(&relative_path);
        let folder_id = folder_cache.get(&parent).cloned().unwrap_or_else(|| root_folder_id.clone());
        upload_one_file(ctx, &drive, job_id, file, &relative_path, &folder_id, &mut reporter).await?;
    }

    Ok(())
}

async fn ensure_root_folder(cache: &Cache, drive: &DriveClient, job_id: i64) -> GDriveResult<String> {
    let key = format!("gdrive:rootfolder:{job_id}");
    if let Some(id) = cache.get(&key).await? {
        return Ok(id);
    }
    let name = format!("Torrent_{job_id}_{}", Utc::now().format("%Y%m%d_%H%M%S"));
    let id = drive.create_folder(&name, None).await?;
    cache.set_px(&key, &id, ROOT_FOLDER_CACHE_TTL_MS).await?;
    Ok(id)
}

async fn build_folder_hierarchy(
    drive: &DriveClient,
    root_folder_id: &str,
    root: &Path,
    files: &[PathBuf],
) -> GDriveResult<HashMap<String, String>> {
    let mut folder_cache = HashMap::new();
    folder_cache.insert(String::new(), root_folder_id.to_string());

    let components: Vec<Vec<String>> = files.iter().map(|file| relative_components(root, file)).collect();
    let mut dirs: BTreeSet<String> = BTreeSet::new();
    for comps in &components {
        for depth in 1..comps.len() {
            dirs.insert(comps[..depth].join("/"));
        }
    }
    let mut ordered: Vec<String> = dirs.into_iter().collect();
    ordered.sort_by_key(|dir| dir.matches('/').count());

    for dir in ordered {
        let (parent, name) = match dir.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), dir.clone()),
        };
        let parent_id = folder_cache.get(&parent).cloned().unwrap_or_else(|| root_folder_id.to_string());
        let folder_id = find_or_create_folder(drive, &parent_id, &name).await?;
        folder_cache.insert(dir, folder_id);
    }

    Ok(folder_cache)
}

async fn find_or_create_folder(drive: &DriveClient, parent_id: &str, name: &str) -> GDriveResult<String> {
    if let Some(existing) = drive.find_folder(name, Some(parent_id)).await? {
        return Ok(existing);
    }
    match drive.create_folder(name, Some(parent_id)).await {
        Ok(id) => Ok(id),
        Err(err) => {
            warn!(parent_id, name, error = %err, "failed to create drive subfolder; falling back to parent");
            Ok(parent_id.to_string())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn upload_one_file(
    ctx: &GDriveExecutor,
    drive: &DriveClient,
    job_id: i64,
    file_path: &Path,
    relative_path: &str,
    folder_id: &str,
    reporter: &mut ProgressReporter<'_>,
) -> GDriveResult<()> {
    let total_size = tokio::fs::metadata(file_path).await?.len();
    let base = reporter.completed_bytes();
    let completed_key = format!("gdrive:completed:{job_id}:{relative_path}");
    let resume_key = format!("gdrive:resume:{job_id}:{relative_path}");

    if ctx.cache.get(&completed_key).await?.is_some() {
        reporter.report(base + total_size, true).await?;
        return Ok(());
    }

    let file_name = file_path.file_name().and_then(|n| n.to_str()).unwrap_or(relative_path);
    if let Some(existing_id) = drive.find_file(file_name, folder_id).await? {
        ctx.cache.set_px(&completed_key, &existing_id, COMPLETED_CACHE_TTL_MS).await?;
        reporter.report(base + total_size, true).await?;
        return Ok(());
    }

    let (mut session, mut offset) = resume_or_start_session(
        ctx,
        drive,
        &resume_key,
        file_name,
        folder_id,
        total_size,
    )
    .await?;

    if offset >= total_size {
        return finalize_upload(ctx, &session, &completed_key, &resume_key, base, total_size, reporter).await;
    }

    let mut file = tokio::fs::File::open(file_path).await?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;

    loop {
        let remaining = total_size - offset;
        if remaining == 0 {
            break;
        }
        let this_chunk = remaining.min(DEFAULT_CHUNK_SIZE);
        #[expect(clippy::cast_possible_truncation, reason = "chunk sizes are bounded by DEFAULT_CHUNK_SIZE")]
        let mut buf = vec![0_u8; this_chunk as usize];
        file.read_exact(&mut buf).await?;

        match session.upload_chunk(Bytes::from(buf), offset).await {
            Ok(UploadChunkResult::InProgress { bytes_received }) => {
                offset = bytes_received;
                reporter.report(base + offset, false).await?;
            }
            Ok(UploadChunkResult::Complete(drive_file)) => {
                ctx.cache.del(&resume_key).await?;
                ctx.cache.set_px(&completed_key, &drive_file.id, COMPLETED_CACHE_TTL_MS).await?;
                reporter.report(base + total_size, true).await?;
                return Ok(());
            }
            Err(err) => {
                if let Ok(status) = session.query_status().await {
                    reporter.report(base + status.bytes_received, false).await?;
                }
                return Err(err);
            }
        }
    }

    finalize_upload(ctx, &session, &completed_key, &resume_key, base, total_size, reporter).await
}

async fn resume_or_start_session(
    ctx: &GDriveExecutor,
    drive: &DriveClient,
    resume_key: &str,
    file_name: &str,
    folder_id: &str,
    total_size: u64,
) -> GDriveResult<(ResumableUploadSession, u64)> {
    if let Some(cached_uri) = ctx.cache.get(resume_key).await? {
        match ResumableUploadSession::new(ctx.http_client.clone(), cached_uri, total_size, DEFAULT_CHUNK_SIZE) {
            Ok(session) => match session.query_status().await {
                Ok(status) => return Ok((session, status.bytes_received)),
                Err(GDriveError::SessionExpired) => {
                    ctx.cache.del(resume_key).await?;
                }
                Err(err) => return Err(err),
            },
            Err(_) => ctx.cache.del(resume_key).await?,
        }
    }

    let session = drive
        .initiate_resumable_session(file_name, folder_id, "application/octet-stream", total_size, DEFAULT_CHUNK_SIZE)
        .await?;
    ctx.cache.set_px(resume_key, session.upload_uri(), RESUME_CACHE_TTL_MS).await?;
    Ok((session, 0))
}

async fn finalize_upload(
    ctx: &GDriveExecutor,
    session: &ResumableUploadSession,
    completed_key: &str,
    resume_key: &str,
    base: u64,
    total_size: u64,
    reporter: &mut ProgressReporter<'_>,
) -> GDriveResult<()> {
    match session.finalize().await? {
        Some(drive_file) => {
            ctx.cache.del(resume_key).await?;
            ctx.cache.set_px(completed_key, &drive_file.id, COMPLETED_CACHE_TTL_MS).await?;
            reporter.report(base + total_size, true).await?;
            Ok(())
        }
        None => Err(revaer_jobs_core::JobError::ProtocolConsistency {
            reason: "drive did not finalize the session after all bytes were sent".to_string(),
        }
        .into()),
    }
}

/// Determine the retry-or-terminal failure status for an upload-phase failure, mirroring the
/// download worker's use of the history-count pattern over `UPLOAD_RETRY` excursions.
#[must_use]
pub fn gdrive_upload_failure_status(current: JobStatus, history: &[JobStatusHistoryEntry]) -> JobStatus {
    let attempts = history.iter().filter(|entry| entry.to_status == JobStatus::UploadRetry).count();
    current.mark_failed(attempts < MAX_UPLOAD_ATTEMPTS)
}

fn collect_uploadable_files(root: &Path, upload_torrent_files: bool) -> GDriveResult<Vec<PathBuf>> {
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

fn relative_components(root: &Path, path: &Path) -> Vec<String> {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| c.as_os_str().to_str().map(str::to_string))
        .collect()
}

fn relative_path_string(root: &Path, path: &Path) -> String {
    relative_components(root, path).join("/")
}

fn parent_dir_string(relative_path: &str) -> String {
    relative_path.rsplit_once('/').map_or_else(String::new, |(parent, _)| parent.to_string())
}

/// Throttled progress reporter: writes to the database only on a meaningful percent change, per
/// the reporting contract shared with the download worker's monitor loop.
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

    async fn report(&mut self, completed_bytes: u64, file_just_completed: bool) -> GDriveResult<()> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_bytes_uploaded("googledrive", completed_bytes.saturating_sub(self.completed_bytes));
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
        assert_eq!(gdrive_upload_failure_status(JobStatus::Uploading, &history), JobStatus::UploadRetry);
    }

    #[test]
    fn retries_exhausted_past_the_attempt_cap() {
        let history: Vec<_> = std::iter::repeat_with(|| history_entry(JobStatus::UploadRetry))
            .take(MAX_UPLOAD_ATTEMPTS)
            .collect();
        assert_eq!(gdrive_upload_failure_status(JobStatus::Uploading, &history), JobStatus::UploadFailed);
    }

    #[test]
    fn relative_components_split_on_path_separators() {
        let root = Path::new("/downloads/42");
        let path = Path::new("/downloads/42/season1/episode1.mkv");
        assert_eq!(relative_components(root, path), vec!["season1".to_string(), "episode1.mkv".to_string()]);
    }

    #[test]
    fn parent_dir_of_top_level_file_is_empty() {
        assert_eq!(parent_dir_string("movie.mkv"), "");
        assert_eq!(parent_dir_string("season1/episode1.mkv"), "season1");
    }

    #[test]
    fn percent_of_handles_zero_total() {
        assert!((percent_of(0, 0) - 100.0).abs() < f64::EPSILON);
        assert!((percent_of(50, 200) - 25.0).abs() < f64::EPSILON);
    }
}
