//! Environment-driven configuration loader.
//!
//! The job pipeline reads its configuration once at startup from environment
//! variables (see `model::AppConfig` for the resolved shape). There is no
//! runtime-mutable settings store; operators change behavior by restarting
//! the affected worker with new environment values.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::{AppConfig, BackblazeConfig, TelemetryConfig};
use crate::validate::{parse_bool, parse_seconds, parse_socket_addr, parse_usize};

const DEFAULT_HEALTH_BIND_ADDR: &str = "0.0.0.0:9700";
const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: &str = "30";
const DEFAULT_HEALTH_STALE_THRESHOLD_SECS: &str = "300";
const DEFAULT_MAX_CONCURRENT_DOWNLOADS: &str = "4";
const DEFAULT_MAX_CONCURRENT_UPLOADS: &str = "4";
const DEFAULT_OTEL_SERVICE_NAME: &str = "revaer";
const DEFAULT_REQUEST_FILE_SERVICE_BASE_URL: &str = "http://localhost:8080";

/// Load and validate the application configuration from the process environment.
///
/// # Errors
///
/// Returns an error if a required variable is missing or a present variable
/// fails to parse.
pub fn load() -> Result<AppConfig, ConfigError> {
    load_from(|name| env::var(name).ok())
}

/// Load configuration using a caller-supplied lookup function.
///
/// Exposed separately from [`load`] so tests can exercise the parsing and
/// validation logic without mutating the real process environment.
///
/// # Errors
///
/// Returns an error if a required variable is missing or a present variable
/// fails to parse.
pub fn load_from(lookup: impl Fn(&'static str) -> Option<String>) -> Result<AppConfig, ConfigError> {
    let torrent_download_path = required(&lookup, "TORRENT_DOWNLOAD_PATH").map(PathBuf::from)?;
    let redis_connection_string = required(&lookup, "REDIS_CONNECTION_STRING")?;
    let database_url = required(&lookup, "DATABASE_URL")?;

    let backblaze = BackblazeConfig {
        key_id: required(&lookup, "BACKBLAZE_KEY_ID")?,
        app_key: required(&lookup, "BACKBLAZE_APP_KEY")?,
        bucket: required(&lookup, "BACKBLAZE_BUCKET")?,
    };

    let job_health_check_interval = parse_seconds(
        "JOB_HEALTH_CHECK_INTERVAL",
        &optional(&lookup, "JOB_HEALTH_CHECK_INTERVAL", DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
    )?;
    let job_health_stale_threshold = parse_seconds(
        "JOB_HEALTH_STALE_THRESHOLD",
        &optional(&lookup, "JOB_HEALTH_STALE_THRESHOLD", DEFAULT_HEALTH_STALE_THRESHOLD_SECS),
    )?;

    let health_bind_addr: SocketAddr = parse_socket_addr(
        "REVAER_HEALTH_BIND_ADDR",
        &optional(&lookup, "REVAER_HEALTH_BIND_ADDR", DEFAULT_HEALTH_BIND_ADDR),
    )?;

    let otel_enabled = parse_bool(
        "REVAER_ENABLE_OTEL",
        &optional(&lookup, "REVAER_ENABLE_OTEL", "false"),
        false,
    )?;
    let telemetry = TelemetryConfig {
        otel_enabled,
        otel_service_name: optional(&lookup, "REVAER_OTEL_SERVICE_NAME", DEFAULT_OTEL_SERVICE_NAME),
        otel_exporter: lookup("REVAER_OTEL_EXPORTER"),
    };

    let max_concurrent_downloads = parse_usize(
        "REVAER_MAX_CONCURRENT_DOWNLOADS",
        &optional(&lookup, "REVAER_MAX_CONCURRENT_DOWNLOADS", DEFAULT_MAX_CONCURRENT_DOWNLOADS),
    )?;
    let max_concurrent_uploads = parse_usize(
        "REVAER_MAX_CONCURRENT_UPLOADS",
        &optional(&lookup, "REVAER_MAX_CONCURRENT_UPLOADS", DEFAULT_MAX_CONCURRENT_UPLOADS),
    )?;

    let job_upload_torrent_files = parse_bool(
        "JOB_UPLOAD_TORRENT_FILES",
        &optional(&lookup, "JOB_UPLOAD_TORRENT_FILES", ""),
        true,
    )?;

    let request_file_service_base_url = optional(
        &lookup,
        "REQUEST_FILE_SERVICE_BASE_URL",
        DEFAULT_REQUEST_FILE_SERVICE_BASE_URL,
    );

    Ok(AppConfig {
        torrent_download_path,
        redis_connection_string,
        database_url,
        backblaze,
        job_health_check_interval,
        job_health_stale_threshold,
        health_bind_addr,
        telemetry,
        max_concurrent_downloads,
        max_concurrent_uploads,
        job_upload_torrent_files,
        request_file_service_base_url,
    })
}

fn required(
    lookup: impl Fn(&'static str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    lookup(name).filter(|v| !v.is_empty()).ok_or(ConfigError::MissingVar { name })
}

fn optional(
    lookup: impl Fn(&'static str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> String {
    lookup(name).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_map(pairs: &[(&str, &str)]) -> HashMap<&'static str, String> {
        pairs
            .iter()
            .map(|(k, v)| (*k, (*v).to_string()))
            .collect()
    }

    fn required_vars() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TORRENT_DOWNLOAD_PATH", "/data/downloads"),
            ("REDIS_CONNECTION_STRING", "redis://localhost:6379"),
            ("DATABASE_URL", "postgres://localhost/revaer"),
            ("BACKBLAZE_KEY_ID", "key"),
            ("BACKBLAZE_APP_KEY", "secret"),
            ("BACKBLAZE_BUCKET", "bucket"),
        ]
    }

    #[test]
    fn loads_with_defaults_when_optional_vars_absent() {
        let map = env_map(&required_vars());
        let config = load_from(|name| map.get(name).cloned()).expect("config should load");
        assert_eq!(config.torrent_download_path, PathBuf::from("/data/downloads"));
        assert_eq!(config.job_health_check_interval, Duration::from_secs(30));
        assert_eq!(config.max_concurrent_downloads, 4);
        assert!(config.job_upload_torrent_files);
        assert!(!config.telemetry.otel_enabled);
        assert_eq!(config.request_file_service_base_url, "http://localhost:8080");
    }

    #[test]
    fn rejects_missing_required_var() {
        let mut pairs = required_vars();
        pairs.retain(|(k, _)| *k != "DATABASE_URL");
        let map = env_map(&pairs);
        let err = load_from(|name| map.get(name).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar { name: "DATABASE_URL" }));
    }

    #[test]
    fn honors_overridden_concurrency_limits() {
        let mut pairs = required_vars();
        pairs.push(("REVAER_MAX_CONCURRENT_DOWNLOADS", "16"));
        pairs.push(("JOB_UPLOAD_TORRENT_FILES", "false"));
        let map = env_map(&pairs);
        let config = load_from(|name| map.get(name).cloned()).expect("config should load");
        assert_eq!(config.max_concurrent_downloads, 16);
        assert!(!config.job_upload_torrent_files);
    }
}
