//! Opaque torrent engine trait and the types that cross its boundary.
//!
//! `TorrentEngine` is the documented seam for swapping in a real BitTorrent
//! implementation; this workspace ships only an in-memory `SimulatedEngine`
//! (see `revaer-download`) behind it.

use async_trait::async_trait;

use crate::error::{JobError, JobResult};

/// Source describing how a torrent should be added to the engine.
#[derive(Debug, Clone)]
pub enum TorrentSource {
    /// A magnet URI that should be fetched.
    Magnet {
        /// Magnet URI to resolve and add.
        uri: String,
    },
    /// Raw `.torrent` metainfo bytes.
    Metainfo {
        /// Bencoded metainfo payload.
        bytes: Vec<u8>,
    },
}

/// Request to admit a job's torrent into the engine.
#[derive(Debug, Clone)]
pub struct AddTorrent {
    /// Job this admission is for.
    pub job_id: i64,
    /// How the torrent should be retrieved.
    pub source: TorrentSource,
    /// Directory content should be materialized into.
    pub download_dir: String,
    /// Selected relative paths/prefixes; `None` means "all files".
    pub selected_file_paths: Option<Vec<String>>,
}

/// Options controlling how the engine removes a torrent.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveTorrent {
    /// Whether to remove on-disk data alongside the torrent metadata.
    pub with_data: bool,
}

/// File selection update applied after admission (e.g. on job recovery).
#[derive(Debug, Clone, Default)]
pub struct FileSelectionUpdate {
    /// Selected relative paths/prefixes; `None` means "all files".
    pub selected_file_paths: Option<Vec<String>>,
}

/// Per-file priority recognized by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePriority {
    /// File is selected for download.
    Normal,
    /// File is not selected; the engine should skip it entirely.
    DoNotDownload,
}

/// A single file exposed by a torrent once metadata has been discovered.
#[derive(Debug, Clone)]
pub struct EngineFile {
    /// Index of the file within the torrent metainfo.
    pub index: u32,
    /// Relative path of the file within the torrent payload.
    pub path: String,
    /// Total size of the file in bytes.
    pub size_bytes: u64,
    /// Bytes downloaded so far for this file.
    pub bytes_completed: u64,
    /// Current priority level.
    pub priority: FilePriority,
}

/// Coarse engine-reported lifecycle state for a torrent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Metadata is still being resolved or pieces are being hashed/fetched.
    Downloading,
    /// All selected pieces are present; the engine is seeding.
    Seeding,
    /// The engine reported an unrecoverable error for this torrent.
    Error,
    /// The engine stopped the torrent without completing.
    Stopped,
}

/// Progress snapshot for a single torrent.
#[derive(Debug, Clone, Default)]
pub struct EngineProgress {
    /// Total bytes downloaded so far.
    pub bytes_downloaded: u64,
    /// Total bytes expected for completion (selection-aware).
    pub bytes_total: u64,
}

impl EngineProgress {
    /// Fraction of `bytes_total` downloaded so far, in `[0.0, 1.0]`.
    #[must_use]
    pub fn fraction(&self) -> f64 {
        if self.bytes_total == 0 {
            0.0
        } else {
            to_f64(self.bytes_downloaded) / to_f64(self.bytes_total)
        }
    }
}

const fn to_f64(value: u64) -> f64 {
    #[expect(clippy::cast_precision_loss, reason = "progress ratios do not need full u64 precision")]
    {
        value as f64
    }
}

/// Point-in-time status the engine can report for a torrent.
#[derive(Debug, Clone)]
pub struct EngineStatus {
    /// Current lifecycle state.
    pub state: EngineState,
    /// Progress snapshot.
    pub progress: EngineProgress,
    /// File listing, once metadata is available.
    pub files: Option<Vec<EngineFile>>,
}

/// Primary engine trait implemented by torrent adapters.
///
/// Every method beyond `add_torrent`/`remove_torrent` defaults to
/// [`JobError::Unsupported`] so a minimal adapter only needs to implement the
/// operations it actually backs.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Admit a new torrent into the underlying engine.
    async fn add_torrent(&self, request: AddTorrent) -> JobResult<()>;

    /// Remove a torrent from the engine, optionally deleting its data.
    async fn remove_torrent(&self, job_id: i64, options: RemoveTorrent) -> JobResult<()>;

    /// Pause a torrent; default implementation reports lack of support.
    async fn pause_torrent(&self, _job_id: i64) -> JobResult<()> {
        Err(JobError::Unsupported { operation: "pause_torrent" })
    }

    /// Resume a torrent; default implementation reports lack of support.
    async fn resume_torrent(&self, _job_id: i64) -> JobResult<()> {
        Err(JobError::Unsupported { operation: "resume_torrent" })
    }

    /// Adjust file selection for an already-admitted torrent.
    async fn update_selection(&self, _job_id: i64, _update: FileSelectionUpdate) -> JobResult<()> {
        Err(JobError::Unsupported { operation: "update_selection" })
    }

    /// Retrieve the current status for a torrent.
    async fn status(&self, job_id: i64) -> JobResult<EngineStatus>;

    /// Persist fast-resume state (and any DHT cache) for a torrent.
    async fn save_state(&self, _job_id: i64) -> JobResult<()> {
        Err(JobError::Unsupported { operation: "save_state" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubEngine;

    #[async_trait]
    impl TorrentEngine for StubEngine {
        async fn add_torrent(&self, _request: AddTorrent) -> JobResult<()> {
            Ok(())
        }

        async fn remove_torrent(&self, _job_id: i64, _options: RemoveTorrent) -> JobResult<()> {
            Ok(())
        }

        async fn status(&self, _job_id: i64) -> JobResult<EngineStatus> {
            Ok(EngineStatus {
                state: EngineState::Downloading,
                progress: EngineProgress::default(),
                files: None,
            })
        }
    }

    #[tokio::test]
    async fn default_methods_report_unsupported() {
        let engine = StubEngine;
        assert!(engine.pause_torrent(1).await.is_err());
        assert!(engine.resume_torrent(1).await.is_err());
        assert!(engine.save_state(1).await.is_err());
        let err = engine
            .update_selection(1, FileSelectionUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, JobError::Unsupported { operation: "update_selection" }));
    }

    #[test]
    fn progress_fraction_handles_zero_total() {
        let empty = EngineProgress::default();
        assert!(empty.fraction().abs() < f64::EPSILON);
        let half = EngineProgress {
            bytes_downloaded: 5,
            bytes_total: 10,
        };
        assert!((half.fraction() - 0.5).abs() < f64::EPSILON);
    }
}
