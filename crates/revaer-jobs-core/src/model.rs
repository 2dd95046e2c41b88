//! Core job domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{JobSource, JobStatus};

/// Distinguishes workload classes a job represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// A torrent-to-cloud archival job (download then upload).
    TorrentArchive,
}

/// Root aggregate tracking a single download-to-upload pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserJob {
    /// Unique integer identity.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Destination storage profile.
    pub storage_profile_id: i64,
    /// Source request file (magnet/metainfo descriptor owner).
    pub request_file_id: i64,
    /// Workload class.
    pub job_type: JobType,
    /// Current lifecycle phase.
    pub status: JobStatus,
    /// Total bytes downloaded so far.
    pub bytes_downloaded: i64,
    /// Total bytes expected (selection-aware).
    pub total_bytes: i64,
    /// Total bytes uploaded so far.
    pub bytes_uploaded: i64,
    /// Human-readable progress description (e.g. "Downloading: 42%").
    pub current_state: Option<String>,
    /// Short human-readable failure reason, set on failure transitions.
    pub error_message: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When a worker first began processing the job.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Last time an active worker reported liveness.
    pub last_heartbeat: Option<DateTime<Utc>>,
    /// Conservative estimate for when a retry status will next be attempted.
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Opaque handle into the background-execution engine for the download phase.
    pub hangfire_job_id: Option<String>,
    /// Opaque handle into the background-execution engine for the upload phase.
    pub hangfire_upload_job_id: Option<String>,
    /// Ordered list of selected relative paths/prefixes; `None` means "all files".
    pub selected_file_paths: Option<Vec<String>>,
    /// Absolute directory under block storage the download worker materialized content into.
    pub download_path: Option<String>,
}

impl UserJob {
    /// Whether this job is currently in a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Append-only record of a single status transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusHistoryEntry {
    /// Job the transition applies to.
    pub job_id: i64,
    /// Status the job transitioned out of.
    pub from_status: JobStatus,
    /// Status the job transitioned into.
    pub to_status: JobStatus,
    /// Actor that performed the transition.
    pub source: JobSource,
    /// Optional short error description accompanying a failure transition.
    pub error_message: Option<String>,
    /// Optional structured metadata accompanying the transition.
    pub metadata_json: Option<serde_json::Value>,
    /// When the transition was recorded.
    pub changed_at: DateTime<Utc>,
}

/// Upload destination provider kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// Google Drive.
    GoogleDrive,
    /// An S3-compatible object store.
    S3,
}

impl ProviderType {
    /// Redis stream key this provider's jobs are published to.
    #[must_use]
    pub const fn stream_key(self) -> &'static str {
        match self {
            Self::GoogleDrive => "uploads:googledrive:stream",
            Self::S3 => "uploads:awss3:stream",
        }
    }

    /// Redis consumer group name for this provider's stream.
    #[must_use]
    pub const fn consumer_group(self) -> &'static str {
        match self {
            Self::GoogleDrive => "googledrive-workers",
            Self::S3 => "s3-workers",
        }
    }

    /// Prefix used for this provider's lock and cache keys.
    #[must_use]
    pub const fn key_prefix(self) -> &'static str {
        match self {
            Self::GoogleDrive => "gdrive",
            Self::S3 => "s3",
        }
    }
}

/// Per-provider credentials, opaque to everything except the matching executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum StorageCredentials {
    /// OAuth-based Google Drive credentials.
    GoogleDrive {
        /// OAuth2 client id.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: String,
        /// Long-lived refresh token.
        refresh_token: String,
        /// Cached short-lived access token, if one has been issued.
        access_token: Option<String>,
        /// Expiry of `access_token`, if present.
        expires_at: Option<DateTime<Utc>>,
    },
    /// Static S3-compatible credentials.
    S3 {
        /// Access key id.
        access_key_id: String,
        /// Secret access key.
        secret_access_key: String,
        /// Path-style endpoint (e.g. a Backblaze B2 S3-compatible endpoint).
        endpoint: String,
        /// Destination bucket.
        bucket: String,
    },
}

/// A user's configured upload destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserStorageProfile {
    /// Unique integer identity.
    pub id: i64,
    /// Owning user.
    pub user_id: i64,
    /// Provider this profile targets.
    pub provider_type: ProviderType,
    /// Opaque, provider-specific credentials.
    pub credentials: StorageCredentials,
    /// Whether the profile is currently usable.
    pub is_active: bool,
    /// Whether the profile requires the user to re-authenticate.
    pub needs_reauth: bool,
}

impl UserStorageProfile {
    /// Whether an upload executor may be invoked with this profile.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.is_active && !self.needs_reauth
    }
}

/// Lifecycle of a single file's S3 multipart upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPartStatus {
    /// Upload is still in progress.
    InProgress,
    /// Upload completed successfully.
    Completed,
    /// Upload failed.
    Failed,
}

/// One completed part of an S3 multipart upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartETag {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag returned by the server for this part.
    pub etag: String,
}

/// Durable progress tracker for a single file's S3 multipart upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3UploadProgress {
    /// Job this progress row belongs to.
    pub job_id: i64,
    /// Absolute local path of the file being uploaded.
    pub local_file_path: String,
    /// Destination S3 key.
    pub s3_key: String,
    /// Multipart upload id, once initiated.
    pub upload_id: Option<String>,
    /// Size of each part in bytes (10 MiB per the upload protocol).
    pub part_size: u64,
    /// Total number of parts the file is split into.
    pub total_parts: u32,
    /// Number of parts completed so far.
    pub parts_completed: u32,
    /// Bytes uploaded so far.
    pub bytes_uploaded: u64,
    /// Total bytes expected.
    pub total_bytes: u64,
    /// Completed parts, in the order they were confirmed.
    pub part_etags: Vec<PartETag>,
    /// Current status.
    pub status: UploadPartStatus,
    /// When the upload began.
    pub started_at: Option<DateTime<Utc>>,
    /// When the upload completed.
    pub completed_at: Option<DateTime<Utc>>,
}

impl S3UploadProgress {
    /// Part size used for all multipart uploads: 10 MiB.
    pub const PART_SIZE_BYTES: u64 = 10 * 1024 * 1024;

    /// Compute the total part count for a file of the given size.
    #[must_use]
    pub fn total_parts_for(size_bytes: u64) -> u32 {
        if size_bytes == 0 {
            return 1;
        }
        u32::try_from(size_bytes.div_ceil(Self::PART_SIZE_BYTES)).unwrap_or(u32::MAX)
    }

    /// Part numbers not yet present among `part_etags`, in ascending order.
    #[must_use]
    pub fn missing_part_numbers(&self) -> Vec<u32> {
        let present: std::collections::HashSet<u32> =
            self.part_etags.iter().map(|p| p.part_number).collect();
        (1..=self.total_parts).filter(|n| !present.contains(n)).collect()
    }
}

/// File names/suffixes considered torrent-engine metadata rather than user content.
///
/// Bundled `.torrent` files are excluded only when `upload_torrent_files` is `false`; the base
/// set below is always excluded.
const ENGINE_METADATA_SUFFIXES: &[&str] = &["fastresume", ".fresume", ".dht"];
const ENGINE_METADATA_EXACT: &[&str] = &["dht_nodes.cache"];

/// Whether `file_name` is torrent-engine metadata that must be excluded from uploads.
#[must_use]
pub fn is_engine_metadata(file_name: &str, upload_torrent_files: bool) -> bool {
    let lower = file_name.to_ascii_lowercase();
    if ENGINE_METADATA_EXACT.iter().any(|exact| lower == *exact) {
        return true;
    }
    if ENGINE_METADATA_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix)) {
        return true;
    }
    !upload_torrent_files && lower.ends_with(".torrent")
}

/// Normalize a path separator style to forward slashes for comparison.
fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Whether `candidate` is selected per `selected_file_paths` semantics: a file is selected iff its
/// path equals a selected entry or is a descendant of one, compared case-insensitively with
/// separators normalized to `/`. `None` means "all files" (everything is selected).
#[must_use]
pub fn path_is_selected(selected: Option<&[String]>, candidate: &str) -> bool {
    let Some(selected) = selected else {
        return true;
    };
    let candidate = normalize_separators(candidate).to_ascii_lowercase();
    selected.iter().any(|entry| {
        let entry = normalize_separators(entry).to_ascii_lowercase();
        candidate == entry || candidate.starts_with(&format!("{entry}/"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_matches_exact_and_descendant_paths() {
        let selected = vec!["sub/dir".to_string()];
        assert!(path_is_selected(Some(&selected), "sub/dir"));
        assert!(path_is_selected(Some(&selected), "sub/dir/file.txt"));
        assert!(path_is_selected(Some(&selected), "SUB\\DIR\\file.txt"));
        assert!(!path_is_selected(Some(&selected), "other/file.txt"));
    }

    #[test]
    fn none_selection_matches_everything() {
        assert!(path_is_selected(None, "anything/at/all.bin"));
    }

    #[test]
    fn engine_metadata_detects_fixed_set() {
        assert!(is_engine_metadata("dht_nodes.cache", true));
        assert!(is_engine_metadata("session.fastresume", true));
        assert!(is_engine_metadata("piece.fresume", true));
        assert!(is_engine_metadata("routers.dht", true));
        assert!(!is_engine_metadata("movie.mkv", true));
    }

    #[test]
    fn torrent_files_excluded_only_when_flag_disabled() {
        assert!(!is_engine_metadata("show.torrent", true));
        assert!(is_engine_metadata("show.torrent", false));
    }

    #[test]
    fn total_parts_rounds_up() {
        assert_eq!(S3UploadProgress::total_parts_for(25 * 1024 * 1024), 3);
        assert_eq!(S3UploadProgress::total_parts_for(0), 1);
    }

    #[test]
    fn missing_part_numbers_excludes_present_entries() {
        let progress = S3UploadProgress {
            job_id: 1,
            local_file_path: "/tmp/file.bin".into(),
            s3_key: "torrents/1/file.bin".into(),
            upload_id: Some("upload-1".into()),
            part_size: S3UploadProgress::PART_SIZE_BYTES,
            total_parts: 3,
            parts_completed: 1,
            bytes_uploaded: S3UploadProgress::PART_SIZE_BYTES,
            total_bytes: 25 * 1024 * 1024,
            part_etags: vec![PartETag {
                part_number: 1,
                etag: "etag-1".into(),
            }],
            status: UploadPartStatus::InProgress,
            started_at: None,
            completed_at: None,
        };
        assert_eq!(progress.missing_part_numbers(), vec![2, 3]);
    }
}
