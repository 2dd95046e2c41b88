//! Event payload types carried across the job pipeline.

use chrono::{DateTime, Utc};

/// Identifier assigned to each event emitted by the platform.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Upload provider a job's storage profile targets.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    /// Google Drive.
    GoogleDrive,
    /// S3-compatible object storage.
    S3,
}

/// Typed domain events surfaced across the job pipeline.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A job was accepted and queued for download.
    JobQueued {
        /// Identifier of the job that was queued.
        job_id: i64,
    },
    /// The download worker began driving the torrent engine for a job.
    DownloadStarted {
        /// Identifier of the job whose download started.
        job_id: i64,
        /// Directory the engine will materialize files into.
        download_path: String,
    },
    /// Periodic progress update emitted while a job downloads.
    DownloadProgress {
        /// Identifier of the job being tracked.
        job_id: i64,
        /// Aggregate bytes downloaded so far.
        bytes_downloaded: u64,
        /// Total bytes expected for the selected file set.
        bytes_total: u64,
    },
    /// A job finished downloading and was handed off to an upload stream.
    DownloadCompleted {
        /// Identifier of the job that finished downloading.
        job_id: i64,
        /// Directory containing the downloaded content.
        download_path: String,
        /// Provider the completed job was handed off to.
        provider: Provider,
    },
    /// A job's download failed.
    DownloadFailed {
        /// Identifier of the job whose download failed.
        job_id: i64,
        /// Human-readable error detail.
        message: String,
    },
    /// An upload executor began transferring a job's files.
    UploadStarted {
        /// Identifier of the job whose upload started.
        job_id: i64,
        /// Provider performing the upload.
        provider: Provider,
    },
    /// Periodic progress update emitted while a job uploads.
    UploadProgress {
        /// Identifier of the job being tracked.
        job_id: i64,
        /// Aggregate bytes uploaded so far.
        bytes_uploaded: u64,
        /// Total bytes expected across all selected files.
        bytes_total: u64,
    },
    /// A job finished uploading to its target provider.
    UploadCompleted {
        /// Identifier of the job that completed.
        job_id: i64,
        /// Provider the job was uploaded to.
        provider: Provider,
    },
    /// A job's upload failed.
    UploadFailed {
        /// Identifier of the job whose upload failed.
        job_id: i64,
        /// Provider the job was being uploaded to.
        provider: Provider,
        /// Human-readable error detail.
        message: String,
    },
    /// A job was cancelled by a user or operator.
    JobCancelled {
        /// Identifier of the cancelled job.
        job_id: i64,
    },
    /// The health monitor forced a job back into its queue after detecting staleness.
    JobRecovered {
        /// Identifier of the recovered job.
        job_id: i64,
        /// Reason recovery was triggered.
        reason: String,
    },
    /// Configuration update was applied.
    SettingsChanged {
        /// Description of the applied configuration change.
        description: String,
    },
    /// System health status changed (degraded or restored components).
    HealthChanged {
        /// Components currently considered degraded.
        degraded: Vec<String>,
    },
}

impl Event {
    /// Machine-friendly discriminator for log filtering and SSE consumers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::JobQueued { .. } => "job_queued",
            Self::DownloadStarted { .. } => "download_started",
            Self::DownloadProgress { .. } => "download_progress",
            Self::DownloadCompleted { .. } => "download_completed",
            Self::DownloadFailed { .. } => "download_failed",
            Self::UploadStarted { .. } => "upload_started",
            Self::UploadProgress { .. } => "upload_progress",
            Self::UploadCompleted { .. } => "upload_completed",
            Self::UploadFailed { .. } => "upload_failed",
            Self::JobCancelled { .. } => "job_cancelled",
            Self::JobRecovered { .. } => "job_recovered",
            Self::SettingsChanged { .. } => "settings_changed",
            Self::HealthChanged { .. } => "health_changed",
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_maps_download_variants() {
        assert_event_kind(&Event::JobQueued { job_id: 1 }, "job_queued");
        assert_event_kind(
            &Event::DownloadStarted {
                job_id: 1,
                download_path: "/downloads/1".into(),
            },
            "download_started",
        );
        assert_event_kind(
            &Event::DownloadProgress {
                job_id: 1,
                bytes_downloaded: 10,
                bytes_total: 100,
            },
            "download_progress",
        );
        assert_event_kind(
            &Event::DownloadCompleted {
                job_id: 1,
                download_path: "/downloads/1".into(),
                provider: Provider::S3,
            },
            "download_completed",
        );
        assert_event_kind(
            &Event::DownloadFailed {
                job_id: 1,
                message: "engine error".into(),
            },
            "download_failed",
        );
    }

    #[test]
    fn event_kind_maps_upload_and_system_variants() {
        assert_event_kind(
            &Event::UploadStarted {
                job_id: 2,
                provider: Provider::GoogleDrive,
            },
            "upload_started",
        );
        assert_event_kind(
            &Event::UploadProgress {
                job_id: 2,
                bytes_uploaded: 1,
                bytes_total: 2,
            },
            "upload_progress",
        );
        assert_event_kind(
            &Event::UploadCompleted {
                job_id: 2,
                provider: Provider::GoogleDrive,
            },
            "upload_completed",
        );
        assert_event_kind(
            &Event::UploadFailed {
                job_id: 2,
                provider: Provider::GoogleDrive,
                message: "token expired".into(),
            },
            "upload_failed",
        );
        assert_event_kind(&Event::JobCancelled { job_id: 2 }, "job_cancelled");
        assert_event_kind(
            &Event::JobRecovered {
                job_id: 2,
                reason: "stale heartbeat".into(),
            },
            "job_recovered",
        );
        assert_event_kind(
            &Event::SettingsChanged {
                description: "desc".into(),
            },
            "settings_changed",
        );
        assert_event_kind(
            &Event::HealthChanged {
                degraded: vec!["x".into()],
            },
            "health_changed",
        );
    }

    #[test]
    fn envelope_carries_fields() {
        let event = Event::SettingsChanged {
            description: "desc".into(),
        };
        let envelope = EventEnvelope {
            id: 42,
            timestamp: Utc::now(),
            event: event.clone(),
        };
        assert_eq!(envelope.id, 42);
        assert_eq!(envelope.event, event);
    }

    fn assert_event_kind(event: &Event, expected: &str) {
        assert_eq!(event.kind(), expected);
    }
}
