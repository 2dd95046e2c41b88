//! Fast-resume persistence: a per-job JSON snapshot of manifest progress, so a restarted worker
//! can recover where the last run left off instead of starting the download over.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::ManifestFile;
use crate::error::DownloadResult;

const FASTRESUME_SUFFIX: &str = ".fastresume.json";

/// Persisted snapshot of a job's simulated-engine progress.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FastResumeState {
    /// File manifest as it stood at the last save.
    #[serde(default)]
    pub files: Vec<ManifestFile>,
    /// Bytes completed per manifest file, indexed the same as `files`.
    #[serde(default)]
    pub bytes_completed: Vec<u64>,
    /// When this snapshot was written.
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

/// Service responsible for persisting and loading fast-resume snapshots under a job's download
/// directory.
#[derive(Clone, Debug)]
pub struct FastResumeStore {
    base_dir: PathBuf,
}

impl FastResumeStore {
    /// Construct a store rooted at the provided directory (typically a job's `downloadPath`).
    #[must_use]
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    /// Ensure the underlying directory exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure_initialized(&self) -> DownloadResult<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    /// Load the fast-resume snapshot for `job_id`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if a snapshot exists but cannot be read or decoded.
    pub fn load(&self, job_id: i64) -> DownloadResult<Option<FastResumeState>> {
        let path = self.path_for(job_id);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Persist a fast-resume snapshot for `job_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be encoded or written.
    pub fn save(&self, job_id: i64, mut state: FastResumeState) -> DownloadResult<()> {
        self.ensure_initialized()?;
        state.updated_at = Utc::now();
        let json = serde_json::to_string_pretty(&state)?;
        fs::write(self.path_for(job_id), json)?;
        Ok(())
    }

    /// Remove a job's fast-resume snapshot, e.g. once the download completes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, job_id: i64) -> DownloadResult<()> {
        let path = self.path_for(job_id);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }

    fn path_for(&self, job_id: i64) -> PathBuf {
        self.base_dir.join(format!("{job_id}{FASTRESUME_SUFFIX}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_snapshot_loads_as_none() -> DownloadResult<()> {
        let temp = TempDir::new()?;
        let store = FastResumeStore::new(temp.path());
        assert!(store.load(1)?.is_none());
        Ok(())
    }

    #[test]
    fn save_then_load_round_trips() -> DownloadResult<()> {
        let temp = TempDir::new()?;
        let store = FastResumeStore::new(temp.path());
        let state = FastResumeState {
            files: vec![ManifestFile { path: "a.bin".into(), size_bytes: 100 }],
            bytes_completed: vec![42],
            updated_at: Utc::now(),
        };
        store.save(7, state)?;
        let loaded = store.load(7)?.expect("snapshot missing");
        assert_eq!(loaded.bytes_completed, vec![42]);
        assert_eq!(loaded.files[0].path, "a.bin");

        store.remove(7)?;
        assert!(store.load(7)?.is_none());
        Ok(())
    }
}
