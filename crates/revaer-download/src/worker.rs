//! `ExecuteDownload(jobId, ctx)`: resolves a job's torrent descriptor, drives the engine to
//! completion, and hands off to the upload stream on success.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use revaer_coordination::StreamDispatcher;
use revaer_data::{DataStore, record_transition};
use revaer_jobs_core::{AddTorrent, EngineState, EngineStatus, JobSource, JobStatus, JobStatusHistoryEntry, TorrentEngine};
use revaer_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tracing::{Instrument, info};

use crate::error::{DownloadError, DownloadResult};
use crate::resolver::{self, RequestFileResolver};

/// Maximum number of `TORRENT_DOWNLOAD_RETRY` excursions a job may take before a download
/// failure is treated as terminal.
const MAX_DOWNLOAD_ATTEMPTS: usize = 3;
/// Poll period for the steady-state monitor loop.
const MONITOR_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// How often the monitor loop persists progress to the database.
const PROGRESS_WRITE_INTERVAL: Duration = Duration::from_secs(5);
/// How often the monitor loop asks the engine to persist fast-resume state.
const SAVE_STATE_INTERVAL: Duration = Duration::from_secs(30);

/// Message published on a provider's upload stream once a download completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTrigger {
    /// Job that is ready for upload.
    pub job_id: i64,
    /// Directory the download worker materialized content into.
    pub download_path: String,
    /// Destination storage profile.
    pub storage_profile_id: i64,
    /// Owning user.
    pub user_id: i64,
    /// When the trigger was created.
    pub created_at: DateTime<Utc>,
}

/// Collaborators the download worker needs to execute a job end to end.
pub struct DownloadContext {
    store: DataStore,
    engine: Arc<dyn TorrentEngine>,
    resolver: Arc<dyn RequestFileResolver>,
    gdrive_dispatcher: StreamDispatcher<UploadTrigger>,
    s3_dispatcher: StreamDispatcher<UploadTrigger>,
    base_dir: PathBuf,
    metrics: Option<Metrics>,
}

impl DownloadContext {
    /// Construct a download context wired to the job pipeline's collaborators.
    pub fn new(
        store: DataStore,
        engine: Arc<dyn TorrentEngine>,
        resolver: Arc<dyn RequestFileResolver>,
        gdrive_dispatcher: StreamDispatcher<UploadTrigger>,
        s3_dispatcher: StreamDispatcher<UploadTrigger>,
        base_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            engine,
            resolver,
            gdrive_dispatcher,
            s3_dispatcher,
            base_dir: base_dir.into(),
            metrics: None,
        }
    }

    /// Attach a metrics registry so the monitor loop reports download throughput and concurrency.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

/// Run the download worker's algorithm for a single job. Idempotent: a job already past the
/// download phase (or terminal) returns immediately without side effects.
///
/// # Errors
///
/// Returns an error if the job cannot be loaded, the descriptor cannot be materialized, the
/// engine reports a fatal failure, or a database write fails. Callers should route the error
/// through the job's failure transition (selecting retry vs terminal per its phase) rather than
/// propagate it further.
pub async fn execute_download(ctx: &DownloadContext, job_id: i64) -> DownloadResult<()> {
    if let Some(metrics) = &ctx.metrics {
        metrics.inc_active_downloads();
    }
    let result = execute_download_inner(ctx, job_id).instrument(revaer_telemetry::run_span("download", job_id)).await;
    if let Some(metrics) = &ctx.metrics {
        metrics.dec_active_downloads();
    }
    result
}

async fn execute_download_inner(ctx: &DownloadContext, job_id: i64) -> DownloadResult<()> {
    let Some(job) = ctx.store.jobs().fetch(job_id).await? else {
        return Err(DownloadError::JobNotFound { job_id });
    };
    if job.is_terminal() {
        return Ok(());
    }
    if !job.status.is_download_phase() {
        return Ok(());
    }

    let download_path = resolve_download_dir(&ctx.base_dir, job_id, job.download_path.as_deref())?;
    let resolved = ctx.resolver.resolve(job.request_file_id).await?;
    let source = resolver::materialize(&resolved).await?;

    ctx.engine
        .add_torrent(AddTorrent {
            job_id,
            source,
            download_dir: download_path.display().to_string(),
            selected_file_paths: job.selected_file_paths.clone(),
        })
        .await?;

    let initial = ctx.engine.status(job_id).await?;
    #[expect(clippy::cast_possible_wrap, reason = "byte totals stay well under i64::MAX")]
    let total_bytes = initial.progress.bytes_total as i64;

    if job.status != JobStatus::Downloading {
        let mut tx = ctx.store.transaction().await?;
        record_transition(&mut tx, job_id, job.status, JobStatus::Downloading, JobSource::Worker, None).await?;
        tx.commit().await.map_err(revaer_data::DataError::from)?;
    }
    ctx.store
        .jobs()
        .set_download_started(job_id, total_bytes, &download_path.display().to_string(), "Starting download")
        .await?;

    let settled = settle(ctx, job_id).await?;
    if !is_already_complete(&settled) {
        monitor(ctx, job_id).await?;
    }

    finish_success(ctx, job_id, job.user_id, job.storage_profile_id, &download_path).await
}

/// Check the engine's state immediately after admission, failing fast on `Stopped`.
///
/// `EngineState` admits no transitional "still initializing" variant, so admission settles
/// synchronously; a real engine backed by an external process would instead need to poll here.
async fn settle(ctx: &DownloadContext, job_id: i64) -> DownloadResult<EngineStatus> {
    let status = ctx.engine.status(job_id).await?;
    match status.state {
        EngineState::Stopped => Err(DownloadError::EngineFailed {
            job_id,
            detail: "engine stopped before the download started".to_string(),
        }),
        EngineState::Downloading | EngineState::Seeding | EngineState::Error => Ok(status),
    }
}

fn is_already_complete(status: &EngineStatus) -> bool {
    matches!(status.state, EngineState::Seeding) && status.progress.fraction() >= 1.0
}

/// Steady-state monitor loop: polls the engine, periodically persists progress, and periodically
/// asks the engine to save fast-resume state, until the torrent completes or fails.
async fn monitor(ctx: &DownloadContext, job_id: i64) -> DownloadResult<()> {
    let mut last_progress_write = Instant::now();
    let mut last_save = Instant::now();
    let mut last_logged_mb: u64 = 0;
    let mut last_metered_bytes: u64 = 0;

    loop {
        let status = ctx.engine.status(job_id).await?;

        match status.state {
            EngineState::Error => {
                return Err(DownloadError::EngineFailed {
                    job_id,
                    detail: "engine reported an error mid-download".to_string(),
                });
            }
            EngineState::Stopped => {
                return Err(DownloadError::EngineFailed {
                    job_id,
                    detail: "engine stopped before completion".to_string(),
                });
            }
            EngineState::Downloading | EngineState::Seeding => {}
        }

        let downloaded_mb = status.progress.bytes_downloaded / (1024 * 1024);
        if downloaded_mb >= last_logged_mb + 100 || (status.progress.fraction() >= 1.0 && last_logged_mb == 0) {
            info!(job_id, bytes_downloaded = status.progress.bytes_downloaded, "download progress");
            last_logged_mb = downloaded_mb;
        }

        if last_progress_write.elapsed() >= PROGRESS_WRITE_INTERVAL {
            let state_label = progress_label(&status);
            #[expect(clippy::cast_possible_wrap, reason = "byte totals stay well under i64::MAX")]
            let bytes_downloaded = status.progress.bytes_downloaded as i64;
            ctx.store.jobs().update_download_progress(job_id, bytes_downloaded, &state_label).await?;
            if let Some(metrics) = &ctx.metrics {
                metrics.inc_bytes_downloaded(status.progress.bytes_downloaded.saturating_sub(last_metered_bytes));
            }
            last_metered_bytes = status.progress.bytes_downloaded;
            last_progress_write = Instant::now();
        }

        if last_save.elapsed() >= SAVE_STATE_INTERVAL {
            ctx.engine.save_state(job_id).await?;
            last_save = Instant::now();
        }

        if status.progress.fraction() >= 1.0 || matches!(status.state, EngineState::Seeding) {
            ctx.engine.save_state(job_id).await?;
            ctx.store
                .jobs()
                .update_download_progress(job_id, status.progress.bytes_downloaded.try_into().unwrap_or(i64::MAX), "Download complete")
                .await?;
            if let Some(metrics) = &ctx.metrics {
                metrics.inc_bytes_downloaded(status.progress.bytes_downloaded.saturating_sub(last_metered_bytes));
            }
            return Ok(());
        }

        tokio::time::sleep(MONITOR_POLL_INTERVAL).await;
    }
}

fn progress_label(status: &EngineStatus) -> String {
    #[expect(clippy::cast_possible_truncation, reason = "percentage display only")]
    let percent = (status.progress.fraction() * 100.0) as u32;
    match status.state {
        EngineState::Seeding => "Download complete".to_string(),
        _ => format!("Downloading: {percent}%"),
    }
}

async fn finish_success(
    ctx: &DownloadContext,
    job_id: i64,
    user_id: i64,
    storage_profile_id: i64,
    download_path: &Path,
) -> DownloadResult<()> {
    let mut tx = ctx.store.transaction().await?;
    record_transition(&mut tx, job_id, JobStatus::Downloading, JobStatus::PendingUpload, JobSource::Worker, None)
        .await?;
    tx.commit().await.map_err(revaer_data::DataError::from)?;

    let provider = ctx
        .store
        .storage_profiles()
        .fetch(storage_profile_id)
        .await?
        .map(|profile| profile.provider_type);
    let trigger = UploadTrigger {
        job_id,
        download_path: download_path.display().to_string(),
        storage_profile_id,
        user_id,
        created_at: Utc::now(),
    };

    let dispatcher = match provider {
        Some(revaer_jobs_core::ProviderType::GoogleDrive) | None => &ctx.gdrive_dispatcher,
        Some(revaer_jobs_core::ProviderType::S3) => &ctx.s3_dispatcher,
    };
    dispatcher.dispatch(&trigger).await?;
    Ok(())
}

/// Determine the retry-or-terminal failure status for a download-phase failure, consulting the
/// job's history to decide whether the retry budget is exhausted.
#[must_use]
pub fn download_failure_status(current: JobStatus, history: &[JobStatusHistoryEntry]) -> JobStatus {
    let attempts = history.iter().filter(|entry| entry.to_status == JobStatus::TorrentDownloadRetry).count();
    current.mark_failed(attempts < MAX_DOWNLOAD_ATTEMPTS)
}

fn resolve_download_dir(base_dir: &Path, job_id: i64, existing: Option<&str>) -> DownloadResult<PathBuf> {
    if let Some(existing) = existing {
        let path = PathBuf::from(existing);
        if path.exists() {
            return Ok(path);
        }
    }
    let path = base_dir.join(job_id.to_string());
    std::fs::create_dir_all(&path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_entry(to_status: JobStatus) -> JobStatusHistoryEntry {
        JobStatusHistoryEntry {
            job_id: 1,
            from_status: JobStatus::Downloading,
            to_status,
            source: JobSource::Worker,
            error_message: None,
            metadata_json: None,
            changed_at: Utc::now(),
        }
    }

    #[test]
    fn retries_remain_under_the_attempt_cap() {
        let history = vec![history_entry(JobStatus::TorrentDownloadRetry)];
        assert_eq!(download_failure_status(JobStatus::Downloading, &history), JobStatus::TorrentDownloadRetry);
    }

    #[test]
    fn retries_exhausted_past_the_attempt_cap() {
        let history: Vec<_> = std::iter::repeat_with(|| history_entry(JobStatus::TorrentDownloadRetry))
            .take(MAX_DOWNLOAD_ATTEMPTS)
            .collect();
        assert_eq!(download_failure_status(JobStatus::Downloading, &history), JobStatus::TorrentFailed);
    }
}
