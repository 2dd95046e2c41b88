//! Job lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a job.
///
/// ```text
/// QUEUED → DOWNLOADING → PENDING_UPLOAD → UPLOADING → COMPLETED
///               ↓                ↑              ↓
///    TORRENT_DOWNLOAD_RETRY    (re-emit)    UPLOAD_RETRY
///               ↓                              ↓
///       TORRENT_FAILED                    UPLOAD_FAILED
///  (any state) → CANCELLED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Queued for download, not yet claimed by a worker.
    Queued,
    /// Download worker is actively fetching content.
    Downloading,
    /// Download failed but retries remain; eligible for re-dispatch.
    TorrentDownloadRetry,
    /// Download failed with no retries remaining. Terminal.
    TorrentFailed,
    /// Download complete; waiting for an upload dispatcher to claim it.
    PendingUpload,
    /// Upload executor is actively transferring content.
    Uploading,
    /// Upload failed but retries remain; eligible for re-dispatch.
    UploadRetry,
    /// Upload failed with no retries remaining. Terminal.
    UploadFailed,
    /// Job finished successfully. Terminal.
    Completed,
    /// Job was cancelled by the user. Terminal.
    Cancelled,
    /// Catch-all terminal failure not tied to a specific phase.
    Failed,
}

impl JobStatus {
    /// Whether this status is terminal: no further transition may leave it.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::TorrentFailed
                | Self::UploadFailed
                | Self::Completed
                | Self::Cancelled
                | Self::Failed
        )
    }

    /// Select the retry-or-terminal status that follows a failure in the current phase.
    ///
    /// `DOWNLOADING`/`QUEUED` fail towards the torrent-retry family; `UPLOADING` (and its own
    /// retry state) fail towards the upload-retry family. Any other phase degrades to the
    /// generic terminal `FAILED`.
    #[must_use]
    pub const fn mark_failed(self, has_retries: bool) -> Self {
        match self {
            Self::Downloading | Self::Queued | Self::TorrentDownloadRetry => {
                if has_retries {
                    Self::TorrentDownloadRetry
                } else {
                    Self::TorrentFailed
                }
            }
            Self::Uploading | Self::UploadRetry | Self::PendingUpload => {
                if has_retries {
                    Self::UploadRetry
                } else {
                    Self::UploadFailed
                }
            }
            _ => Self::Failed,
        }
    }

    /// Whether this status belongs to the download phase (own or retry).
    #[must_use]
    pub const fn is_download_phase(self) -> bool {
        matches!(self, Self::Queued | Self::Downloading | Self::TorrentDownloadRetry)
    }

    /// Whether this status belongs to the upload phase (own or retry).
    #[must_use]
    pub const fn is_upload_phase(self) -> bool {
        matches!(self, Self::PendingUpload | Self::Uploading | Self::UploadRetry)
    }
}

/// Who performed a status transition, recorded in `JobStatusHistory`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobSource {
    /// A download or upload worker performed the transition.
    Worker,
    /// The health monitor performed a recovery transition.
    HealthMonitor,
    /// A user-initiated action (e.g. cancellation) performed the transition.
    User,
    /// The status-transition service itself performed the transition.
    System,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses_are_monotone() {
        for status in [
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::TorrentFailed,
            JobStatus::UploadFailed,
            JobStatus::Failed,
        ] {
            assert!(status.is_terminal());
        }
        assert!(!JobStatus::Downloading.is_terminal());
        assert!(!JobStatus::PendingUpload.is_terminal());
    }

    #[test]
    fn mark_failed_selects_phase_appropriate_status() {
        assert_eq!(
            JobStatus::Downloading.mark_failed(true),
            JobStatus::TorrentDownloadRetry
        );
        assert_eq!(
            JobStatus::Downloading.mark_failed(false),
            JobStatus::TorrentFailed
        );
        assert_eq!(JobStatus::Uploading.mark_failed(true), JobStatus::UploadRetry);
        assert_eq!(JobStatus::Uploading.mark_failed(false), JobStatus::UploadFailed);
        assert_eq!(JobStatus::Queued.mark_failed(false), JobStatus::TorrentFailed);
    }

    #[test]
    fn mark_failed_on_unrelated_phase_degrades_to_generic_failure() {
        assert_eq!(JobStatus::Completed.mark_failed(true), JobStatus::Failed);
    }
}
