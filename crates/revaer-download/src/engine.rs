//! The in-memory simulated torrent engine shipped in this workspace.
//!
//! Real BitTorrent wire-protocol internals are out of scope; `SimulatedEngine` deterministically
//! advances piece-hash progress on a timer and materializes real (zero-filled) file content on
//! disk, so the download worker and upload executors downstream have genuine files to work with.
//! `TorrentEngine` remains the documented seam for swapping in a real implementation.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use async_trait::async_trait;
use revaer_jobs_core::{
    AddTorrent, EngineFile, EngineProgress, EngineState, EngineStatus, FilePriority,
    FileSelectionUpdate, JobError, JobResult, RemoveTorrent, TorrentEngine, TorrentSource,
    path_is_selected,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::store::{FastResumeState, FastResumeStore};

/// How long a simulated download takes to reach 100% from the moment it is added.
const SIM_DOWNLOAD_SECS: f64 = 6.0;
/// Synthetic file size range used when a magnet source carries no embedded manifest.
const MIN_SYNTHETIC_SIZE: u64 = 16 * 1024 * 1024;
const MAX_SYNTHETIC_SIZE: u64 = 256 * 1024 * 1024;

/// One file in a (synthetic) torrent manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    /// Relative path within the torrent payload.
    pub path: String,
    /// Total size in bytes.
    pub size_bytes: u64,
}

/// Decode a manifest from a torrent source.
///
/// `Metainfo` bytes are this workspace's own JSON-encoded `Vec<ManifestFile>`, produced by
/// whatever upstream system resolves a request file into a descriptor (§ request-file
/// resolution); a real engine would instead parse bencoded metainfo. `Magnet` sources carry no
/// file list, so one is derived deterministically from the magnet URI's SHA-256 digest.
fn manifest_from_source(source: &TorrentSource) -> JobResult<Vec<ManifestFile>> {
    match source {
        TorrentSource::Metainfo { bytes } => serde_json::from_slice(bytes).map_err(|err| JobError::Validation {
            reason: format!("invalid torrent manifest: {err}"),
        }),
        TorrentSource::Magnet { uri } => {
            let digest = Sha256::digest(uri.as_bytes());
            let seed = u64::from_be_bytes(digest[0..8].try_into().unwrap_or_default());
            let span = MAX_SYNTHETIC_SIZE - MIN_SYNTHETIC_SIZE;
            let size_bytes = MIN_SYNTHETIC_SIZE + seed % span;
            let name = hex::encode(&digest[..8]);
            Ok(vec![ManifestFile { path: format!("{name}.bin"), size_bytes }])
        }
    }
}

struct JobState {
    download_dir: PathBuf,
    files: Vec<ManifestFile>,
    priorities: Vec<FilePriority>,
    bytes_completed: Vec<u64>,
    state: EngineState,
    added_at: Instant,
    total_selected_bytes: u64,
}

impl JobState {
    fn snapshot(&self) -> FastResumeState {
        FastResumeState {
            files: self.files.clone(),
            bytes_completed: self.bytes_completed.clone(),
            updated_at: chrono::Utc::now(),
        }
    }

    fn engine_files(&self) -> Vec<EngineFile> {
        self.files
            .iter()
            .zip(self.priorities.iter())
            .zip(self.bytes_completed.iter())
            .enumerate()
            .map(|(index, ((file, priority), completed))| EngineFile {
                index: u32::try_from(index).unwrap_or(u32::MAX),
                path: file.path.clone(),
                size_bytes: file.size_bytes,
                bytes_completed: *completed,
                priority: *priority,
            })
            .collect()
    }

    fn advance(&mut self) -> std::io::Result<()> {
        if matches!(self.state, EngineState::Error | EngineState::Stopped) {
            return Ok(());
        }
        let elapsed = self.added_at.elapsed().as_secs_f64();
        let fraction = (elapsed / SIM_DOWNLOAD_SECS).min(1.0);
        for (index, file) in self.files.iter().enumerate() {
            if self.priorities[index] != FilePriority::Normal {
                continue;
            }
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss, reason = "fraction is in [0,1]")]
            let target = (file.size_bytes as f64 * fraction).round() as u64;
            let target = target.min(file.size_bytes);
            let delta = target.saturating_sub(self.bytes_completed[index]);
            if delta > 0 {
                let path = self.download_dir.join(&file.path);
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let mut handle = OpenOptions::new().create(true).append(true).open(path)?;
                #[expect(clippy::cast_possible_truncation, reason = "delta bounded by file size on disk")]
                handle.write_all(&vec![0_u8; delta as usize])?;
                self.bytes_completed[index] = target;
            }
        }
        self.state = if fraction >= 1.0 { EngineState::Seeding } else { EngineState::Downloading };
        Ok(())
    }
}

/// In-memory engine that simulates torrent download progress without any real network activity.
#[derive(Default)]
pub struct SimulatedEngine {
    jobs: Mutex<HashMap<i64, JobState>>,
}

impl SimulatedEngine {
    /// Construct an engine with no admitted torrents.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn io_err(job_id: i64, err: std::io::Error) -> JobError {
        JobError::Transient { reason: format!("job {job_id} i/o failure: {err}") }
    }
}

#[async_trait]
impl TorrentEngine for SimulatedEngine {
    async fn add_torrent(&self, request: AddTorrent) -> JobResult<()> {
        let files = manifest_from_source(&request.source)?;
        let priorities: Vec<FilePriority> = files
            .iter()
            .map(|file| {
                if path_is_selected(request.selected_file_paths.as_deref(), &file.path) {
                    FilePriority::Normal
                } else {
                    FilePriority::DoNotDownload
                }
            })
            .collect();

        let resume_store = FastResumeStore::new(&request.download_dir);
        let bytes_completed = resume_store
            .load(request.job_id)
            .ok()
            .flatten()
            .filter(|snapshot| snapshot.files == files)
            .map(|snapshot| snapshot.bytes_completed)
            .unwrap_or_else(|| vec![0; files.len()]);

        let total_selected_bytes = files
            .iter()
            .zip(priorities.iter())
            .filter(|(_, priority)| **priority == FilePriority::Normal)
            .map(|(file, _)| file.size_bytes)
            .sum();

        let mut jobs = self.jobs.lock().await;
        jobs.insert(
            request.job_id,
            JobState {
                download_dir: PathBuf::from(request.download_dir),
                files,
                priorities,
                bytes_completed,
                state: EngineState::Downloading,
                added_at: Instant::now(),
                total_selected_bytes,
            },
        );
        Ok(())
    }

    async fn remove_torrent(&self, job_id: i64, options: RemoveTorrent) -> JobResult<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.remove(&job_id) {
            if options.with_data {
                let _ = std::fs::remove_dir_all(&job.download_dir);
            }
        }
        Ok(())
    }

    async fn update_selection(&self, job_id: i64, update: FileSelectionUpdate) -> JobResult<()> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| JobError::NotFound { reason: format!("job {job_id}") })?;
        job.priorities = job
            .files
            .iter()
            .map(|file| {
                if path_is_selected(update.selected_file_paths.as_deref(), &file.path) {
                    FilePriority::Normal
                } else {
                    FilePriority::DoNotDownload
                }
            })
            .collect();
        job.total_selected_bytes = job
            .files
            .iter()
            .zip(job.priorities.iter())
            .filter(|(_, priority)| **priority == FilePriority::Normal)
            .map(|(file, _)| file.size_bytes)
            .sum();
        Ok(())
    }

    async fn status(&self, job_id: i64) -> JobResult<EngineStatus> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| JobError::NotFound { reason: format!("job {job_id}") })?;
        job.advance().map_err(|err| Self::io_err(job_id, err))?;
        Ok(EngineStatus {
            state: job.state,
            progress: EngineProgress { bytes_downloaded: job.bytes_completed.iter().sum(), bytes_total: job.total_selected_bytes },
            files: Some(job.engine_files()),
        })
    }

    async fn save_state(&self, job_id: i64) -> JobResult<()> {
        let jobs = self.jobs.lock().await;
        let job = jobs.get(&job_id).ok_or_else(|| JobError::NotFound { reason: format!("job {job_id}") })?;
        let resume_store = FastResumeStore::new(&job.download_dir);
        resume_store
            .save(job_id, job.snapshot())
            .map_err(|err| JobError::Transient { reason: format!("failed to persist fast-resume for job {job_id}: {err}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn magnet_source_derives_a_deterministic_single_file_manifest() -> JobResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let engine = SimulatedEngine::new();
        engine
            .add_torrent(AddTorrent {
                job_id: 1,
                source: TorrentSource::Magnet { uri: "magnet:?xt=urn:btih:demo".into() },
                download_dir: temp.path().display().to_string(),
                selected_file_paths: None,
            })
            .await?;
        let status = engine.status(1).await?;
        assert_eq!(status.files.as_ref().map(Vec::len), Some(1));
        Ok(())
    }

    #[tokio::test]
    async fn metainfo_manifest_respects_file_selection() -> JobResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let manifest = vec![
            ManifestFile { path: "a.bin".into(), size_bytes: 1000 },
            ManifestFile { path: "sub/b.bin".into(), size_bytes: 2000 },
        ];
        let engine = SimulatedEngine::new();
        engine
            .add_torrent(AddTorrent {
                job_id: 2,
                source: TorrentSource::Metainfo { bytes: serde_json::to_vec(&manifest).unwrap() },
                download_dir: temp.path().display().to_string(),
                selected_file_paths: Some(vec!["sub".into()]),
            })
            .await?;
        let status = engine.status(2).await?;
        assert_eq!(status.progress.bytes_total, 2000);
        let files = status.files.expect("files");
        assert_eq!(files[0].priority, FilePriority::DoNotDownload);
        assert_eq!(files[1].priority, FilePriority::Normal);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_job_status_errors() {
        let engine = SimulatedEngine::new();
        assert!(engine.status(999).await.is_err());
    }

    #[tokio::test]
    async fn progress_eventually_completes() -> JobResult<()> {
        let temp = TempDir::new().expect("tempdir");
        let manifest = vec![ManifestFile { path: "a.bin".into(), size_bytes: 10 }];
        let engine = SimulatedEngine::new();
        engine
            .add_torrent(AddTorrent {
                job_id: 3,
                source: TorrentSource::Metainfo { bytes: serde_json::to_vec(&manifest).unwrap() },
                download_dir: temp.path().display().to_string(),
                selected_file_paths: None,
            })
            .await?;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let status = engine.status(3).await?;
        assert!(status.progress.bytes_downloaded <= 10);
        Ok(())
    }
}
