//! Output renderers and formatting helpers for CLI commands.

use revaer_jobs_core::{JobStatus, UserJob};

use crate::cli::{CliError, CliResult, OutputFormat};

pub(crate) fn render_job_detail(job: &UserJob, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(job)
                .map_err(|err| CliError::failure(anyhow::anyhow!("failed to format JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => {
            println!("id: {}", job.id);
            println!("status: {}", status_to_str(job.status));
            println!("user: {}  storage profile: {}  request file: {}", job.user_id, job.storage_profile_id, job.request_file_id);
            if let Some(state) = &job.current_state {
                println!("state: {state}");
            }
            if let Some(message) = &job.error_message {
                println!("error: {message}");
            }
            println!(
                "progress: {} downloaded / {} total, {} uploaded",
                format_bytes(job.bytes_downloaded),
                format_bytes(job.total_bytes),
                format_bytes(job.bytes_uploaded)
            );
            println!("created: {}", job.created_at);
            if let Some(started) = job.started_at {
                println!("started: {started}");
            }
            if let Some(completed) = job.completed_at {
                println!("completed: {completed}");
            }
            if let Some(heartbeat) = job.last_heartbeat {
                println!("last heartbeat: {heartbeat}");
            }
        }
    }
    Ok(())
}

pub(crate) fn render_job_list(jobs: &[UserJob], format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => {
            let text = serde_json::to_string_pretty(jobs)
                .map_err(|err| CliError::failure(anyhow::anyhow!("failed to format JSON: {err}")))?;
            println!("{text}");
        }
        OutputFormat::Table => {
            println!("{:>8} {:<24} {:>12} {:>12} STATE", "ID", "STATUS", "DOWNLOADED", "TOTAL");
            for job in jobs {
                let state = job.current_state.as_deref().unwrap_or("");
                println!(
                    "{:>8} {:<24} {:>12} {:>12} {}",
                    job.id,
                    status_to_str(job.status),
                    format_bytes(job.bytes_downloaded),
                    format_bytes(job.total_bytes),
                    state
                );
            }
        }
    }
    Ok(())
}

#[must_use]
pub(crate) const fn status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Downloading => "downloading",
        JobStatus::TorrentDownloadRetry => "torrent_download_retry",
        JobStatus::TorrentFailed => "torrent_failed",
        JobStatus::PendingUpload => "pending_upload",
        JobStatus::Uploading => "uploading",
        JobStatus::UploadRetry => "upload_retry",
        JobStatus::UploadFailed => "upload_failed",
        JobStatus::Completed => "completed",
        JobStatus::Cancelled => "cancelled",
        JobStatus::Failed => "failed",
    }
}

#[must_use]
pub(crate) fn format_bytes(bytes: i64) -> String {
    const KIB: f64 = 1024.0;
    const MIB: f64 = KIB * 1024.0;
    const GIB: f64 = MIB * 1024.0;
    let value = bytes_to_f64(u64::try_from(bytes).unwrap_or(0));
    if value >= GIB {
        format!("{:.2} GiB", value / GIB)
    } else if value >= MIB {
        format!("{:.2} MiB", value / MIB)
    } else if value >= KIB {
        format!("{:.2} KiB", value / KIB)
    } else {
        format!("{bytes} B")
    }
}

fn bytes_to_f64(value: u64) -> f64 {
    let high = u32::try_from(value >> 32).unwrap_or(u32::MAX);
    let low = u32::try_from(value & 0xFFFF_FFFF).unwrap_or(u32::MAX);
    f64::from(high) * 4_294_967_296.0 + f64::from(low)
}
