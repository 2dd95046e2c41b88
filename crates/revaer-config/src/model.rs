//! Typed configuration model for the job pipeline.
//!
//! # Design
//! - Pure data carrier populated once at startup by `loader::load`.
//! - Keeps parsing/validation out of the call sites that consume config.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Fully resolved application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Root directory the download worker materializes torrent content into.
    pub torrent_download_path: PathBuf,
    /// Redis connection string used by the coordination fabric.
    pub redis_connection_string: String,
    /// Postgres connection string used by `revaer-data`.
    pub database_url: String,
    /// Backblaze B2 (S3-compatible) credentials used by the default upload profile.
    pub backblaze: BackblazeConfig,
    /// Health monitor polling cadence.
    pub job_health_check_interval: Duration,
    /// Age beyond which a job's last heartbeat is considered stale.
    pub job_health_stale_threshold: Duration,
    /// Address the health/readiness HTTP endpoint binds to.
    pub health_bind_addr: SocketAddr,
    /// Telemetry/OpenTelemetry export configuration.
    pub telemetry: TelemetryConfig,
    /// Maximum number of torrents the download worker drives concurrently.
    pub max_concurrent_downloads: usize,
    /// Maximum number of uploads any single executor drives concurrently.
    pub max_concurrent_uploads: usize,
    /// Whether `.torrent`/engine metadata files are included in uploads.
    pub job_upload_torrent_files: bool,
    /// Base URL of the upstream service that owns request-file records.
    pub request_file_service_base_url: String,
}

/// Backblaze B2 credentials, consumed through the S3-compatible API surface.
#[derive(Debug, Clone)]
pub struct BackblazeConfig {
    /// B2 application key ID (used as the S3 access key).
    pub key_id: String,
    /// B2 application key (used as the S3 secret key).
    pub app_key: String,
    /// Destination bucket name.
    pub bucket: String,
}

/// Telemetry export configuration read from the environment.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Whether an OpenTelemetry OTLP exporter layer should be installed.
    pub otel_enabled: bool,
    /// Service name reported to the OTLP collector.
    pub otel_service_name: String,
    /// OTLP exporter endpoint.
    pub otel_exporter: Option<String>,
}
