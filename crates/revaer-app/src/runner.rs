//! Real `BackgroundExecutionEngine` that drives actual download and upload-recovery work,
//! rather than merely tracking state like the in-memory fake used in tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use revaer_data::{DataStore, record_transition};
use revaer_download::{DownloadContext, execute_download, download_failure_status};
use revaer_jobs_core::{
    BackgroundExecutionEngine, ExecutionDescription, ExecutionState, JobResult, JobSource,
    ProviderType,
};
use revaer_upload_gdrive::GDriveExecutor;
use revaer_upload_s3::S3Executor;
use tracing::warn;

use crate::processors::{run_gdrive_upload, run_s3_upload};

/// Which phase of the pipeline a background-execution target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Download,
    Upload,
}

fn parse_target(target: &str) -> Option<(Phase, i64)> {
    let (prefix, id) = target.split_once(':')?;
    let job_id = id.parse().ok()?;
    match prefix {
        "download" => Some((Phase::Download, job_id)),
        "upload" => Some((Phase::Upload, job_id)),
        _ => None,
    }
}

/// Drives download and upload-recovery work by spawning it directly rather than dispatching
/// through the Redis streams, which only carry the steady-state download-to-upload hand-off.
pub struct JobBackgroundEngine {
    store: DataStore,
    download: Arc<DownloadContext>,
    gdrive: Arc<GDriveExecutor>,
    s3: Arc<S3Executor>,
    records: Arc<Mutex<HashMap<String, ExecutionDescription>>>,
    next_handle: Mutex<u64>,
}

impl JobBackgroundEngine {
    /// Build an engine wired to the collaborators needed to actually run download and upload
    /// recovery work.
    #[must_use]
    pub fn new(
        store: DataStore,
        download: Arc<DownloadContext>,
        gdrive: Arc<GDriveExecutor>,
        s3: Arc<S3Executor>,
    ) -> Self {
        Self {
            store,
            download,
            gdrive,
            s3,
            records: Arc::new(Mutex::new(HashMap::new())),
            next_handle: Mutex::new(0),
        }
    }
}

#[async_trait]
impl BackgroundExecutionEngine for JobBackgroundEngine {
    async fn enqueue(&self, target: &str, _args: &str) -> JobResult<String> {
        let mut next = self.next_handle.lock().unwrap_or_else(|poison| poison.into_inner());
        *next += 1;
        let handle = format!("{target}-{next}");
        drop(next);

        {
            let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
            records.insert(handle.clone(), ExecutionDescription { state: ExecutionState::Enqueued, history: Vec::new() });
        }

        let Some((phase, job_id)) = parse_target(target) else {
            warn!(target, "background engine received an unrecognized target");
            return Ok(handle);
        };

        let records = Arc::clone(&self.records);
        let store = self.store.clone();
        let download = Arc::clone(&self.download);
        let gdrive = Arc::clone(&self.gdrive);
        let s3 = Arc::clone(&self.s3);
        let spawned_handle = handle.clone();

        tokio::spawn(async move {
            set_record_state(&records, &spawned_handle, ExecutionState::Processing);
            let succeeded = match phase {
                Phase::Download => run_download(&store, &download, job_id).await,
                Phase::Upload => run_upload_recovery(&store, &gdrive, &s3, job_id).await,
            };
            set_record_state(
                &records,
                &spawned_handle,
                if succeeded { ExecutionState::Succeeded } else { ExecutionState::Failed },
            );
        });

        Ok(handle)
    }

    async fn delete(&self, handle: &str) -> JobResult<()> {
        let mut records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        records.remove(handle);
        Ok(())
    }

    async fn describe(&self, handle: &str) -> JobResult<Option<ExecutionDescription>> {
        let records = self.records.lock().unwrap_or_else(|poison| poison.into_inner());
        Ok(records.get(handle).cloned())
    }
}

fn set_record_state(records: &Mutex<HashMap<String, ExecutionDescription>>, handle: &str, state: ExecutionState) {
    let mut records = records.lock().unwrap_or_else(|poison| poison.into_inner());
    if let Some(entry) = records.get_mut(handle) {
        entry.history.push(entry.state);
        entry.state = state;
    }
}

/// Run the download worker for `job_id`, recording a retry-or-terminal transition on failure.
async fn run_download(store: &DataStore, ctx: &DownloadContext, job_id: i64) -> bool {
    if let Err(err) = execute_download(ctx, job_id).await {
        return record_download_failure(store, job_id, &err.to_string()).await;
    }
    true
}

async fn record_download_failure(store: &DataStore, job_id: i64, message: &str) -> bool {
    let Ok(Some(job)) = store.jobs().fetch(job_id).await else {
        warn!(job_id, "download failed but the job could not be reloaded to record the outcome");
        return false;
    };
    let Ok(history) = store.history().list_for_job(job_id).await else {
        warn!(job_id, "download failed but history could not be loaded to score the retry budget");
        return false;
    };
    let next_status = download_failure_status(job.status, &history);
    let Ok(mut tx) = store.transaction().await else {
        return false;
    };
    if record_transition(&mut tx, job_id, job.status, next_status, JobSource::Worker, Some(message)).await.is_err() {
        return false;
    }
    tx.commit().await.is_ok()
}

/// Re-dispatch a stuck upload-phase job straight to its provider's executor, bypassing the
/// stream: the health monitor already knows the job id and needs no fresh trigger envelope.
async fn run_upload_recovery(store: &DataStore, gdrive: &GDriveExecutor, s3: &S3Executor, job_id: i64) -> bool {
    let Ok(Some(job)) = store.jobs().fetch(job_id).await else {
        warn!(job_id, "upload recovery could not reload the job");
        return false;
    };
    let provider = match store.storage_profiles().provider_for(job.storage_profile_id).await {
        Ok(provider) => provider,
        Err(err) => {
            warn!(job_id, error = %err, "upload recovery could not resolve the storage provider");
            return false;
        }
    };
    match provider.unwrap_or(ProviderType::GoogleDrive) {
        ProviderType::GoogleDrive => run_gdrive_upload(store, gdrive, job_id).await,
        ProviderType::S3 => run_s3_upload(store, s3, job_id).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_prefixes() {
        assert_eq!(parse_target("download:42"), Some((Phase::Download, 42)));
        assert_eq!(parse_target("upload:7"), Some((Phase::Upload, 7)));
    }

    #[test]
    fn rejects_unknown_prefixes_and_malformed_ids() {
        assert_eq!(parse_target("recover:1"), None);
        assert_eq!(parse_target("download:not-a-number"), None);
        assert_eq!(parse_target("download"), None);
    }
}
