//! Repositories for `UserJob` and `JobStatusHistory` rows.

use chrono::{DateTime, Utc};
use revaer_jobs_core::{JobSource, JobStatus, JobType, JobStatusHistoryEntry, UserJob};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};

use crate::error::{DataError, Result, query_failed};

fn job_status_to_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "QUEUED",
        JobStatus::Downloading => "DOWNLOADING",
        JobStatus::TorrentDownloadRetry => "TORRENT_DOWNLOAD_RETRY",
        JobStatus::TorrentFailed => "TORRENT_FAILED",
        JobStatus::PendingUpload => "PENDING_UPLOAD",
        JobStatus::Uploading => "UPLOADING",
        JobStatus::UploadRetry => "UPLOAD_RETRY",
        JobStatus::UploadFailed => "UPLOAD_FAILED",
        JobStatus::Completed => "COMPLETED",
        JobStatus::Cancelled => "CANCELLED",
        JobStatus::Failed => "FAILED",
    }
}

fn job_status_from_str(label: &str) -> Result<JobStatus> {
    Ok(match label {
        "QUEUED" => JobStatus::Queued,
        "DOWNLOADING" => JobStatus::Downloading,
        "TORRENT_DOWNLOAD_RETRY" => JobStatus::TorrentDownloadRetry,
        "TORRENT_FAILED" => JobStatus::TorrentFailed,
        "PENDING_UPLOAD" => JobStatus::PendingUpload,
        "UPLOADING" => JobStatus::Uploading,
        "UPLOAD_RETRY" => JobStatus::UploadRetry,
        "UPLOAD_FAILED" => JobStatus::UploadFailed,
        "COMPLETED" => JobStatus::Completed,
        "CANCELLED" => JobStatus::Cancelled,
        "FAILED" => JobStatus::Failed,
        other => {
            return Err(DataError::QueryFailed {
                operation: "decode job_status",
                source: sqlx::Error::Decode(format!("unknown job status '{other}'").into()),
            });
        }
    })
}

fn job_source_to_str(source: JobSource) -> &'static str {
    match source {
        JobSource::Worker => "Worker",
        JobSource::HealthMonitor => "HealthMonitor",
        JobSource::User => "User",
        JobSource::System => "System",
    }
}

fn job_source_from_str(label: &str) -> Result<JobSource> {
    Ok(match label {
        "Worker" => JobSource::Worker,
        "HealthMonitor" => JobSource::HealthMonitor,
        "User" => JobSource::User,
        "System" => JobSource::System,
        other => {
            return Err(DataError::QueryFailed {
                operation: "decode job_source",
                source: sqlx::Error::Decode(format!("unknown job source '{other}'").into()),
            });
        }
    })
}

fn job_type_to_str(job_type: JobType) -> &'static str {
    match job_type {
        JobType::TorrentArchive => "torrent_archive",
    }
}

fn job_type_from_str(label: &str) -> Result<JobType> {
    Ok(match label {
        "torrent_archive" => JobType::TorrentArchive,
        other => {
            return Err(DataError::QueryFailed {
                operation: "decode job_type",
                source: sqlx::Error::Decode(format!("unknown job type '{other}'").into()),
            });
        }
    })
}

#[derive(Debug, Clone, FromRow)]
struct UserJobRow {
    id: i64,
    user_id: i64,
    storage_profile_id: i64,
    request_file_id: i64,
    job_type: String,
    status: String,
    bytes_downloaded: i64,
    total_bytes: i64,
    bytes_uploaded: i64,
    current_state: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_heartbeat: Option<DateTime<Utc>>,
    next_retry_at: Option<DateTime<Utc>>,
    hangfire_job_id: Option<String>,
    hangfire_upload_job_id: Option<String>,
    selected_file_paths: Option<Vec<String>>,
    download_path: Option<String>,
}

impl TryFrom<UserJobRow> for UserJob {
    type Error = DataError;

    fn try_from(row: UserJobRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            storage_profile_id: row.storage_profile_id,
            request_file_id: row.request_file_id,
            job_type: job_type_from_str(&row.job_type)?,
            status: job_status_from_str(&row.status)?,
            bytes_downloaded: row.bytes_downloaded,
            total_bytes: row.total_bytes,
            bytes_uploaded: row.bytes_uploaded,
            current_state: row.current_state,
            error_message: row.error_message,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_heartbeat: row.last_heartbeat,
            next_retry_at: row.next_retry_at,
            hangfire_job_id: row.hangfire_job_id,
            hangfire_upload_job_id: row.hangfire_upload_job_id,
            selected_file_paths: row.selected_file_paths,
            download_path: row.download_path,
        })
    }
}

/// Repository for `UserJob` rows.
pub struct JobsRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> JobsRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a newly admitted job and return its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn insert(
        &self,
        user_id: i64,
        storage_profile_id: i64,
        request_file_id: i64,
        job_type: JobType,
        selected_file_paths: Option<&[String]>,
    ) -> Result<i64> {
        let row = sqlx::query(
            r"
            INSERT INTO revaer_jobs.user_jobs
                (user_id, storage_profile_id, request_file_id, job_type, status,
                 bytes_downloaded, total_bytes, bytes_uploaded, created_at, selected_file_paths)
            VALUES ($1, $2, $3, $4, 'QUEUED', 0, 0, 0, now(), $5)
            RETURNING id
            ",
        )
        .bind(user_id)
        .bind(storage_profile_id)
        .bind(request_file_id)
        .bind(job_type_to_str(job_type))
        .bind(selected_file_paths)
        .fetch_one(self.pool)
        .await
        .map_err(query_failed("insert user_job"))?;
        Ok(row.try_get("id").map_err(query_failed("decode inserted job id"))?)
    }

    /// Fetch a single job by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch(&self, job_id: i64) -> Result<Option<UserJob>> {
        let row = sqlx::query_as::<_, UserJobRow>(
            "SELECT * FROM revaer_jobs.user_jobs WHERE id = $1",
        )
        .bind(job_id)
        .fetch_optional(self.pool)
        .await
        .map_err(query_failed("fetch user_job"))?;
        row.map(UserJob::try_from).transpose()
    }

    /// Jobs whose phase is in `statuses` and whose liveness signal is stale, per §4.6: either
    /// `last_heartbeat` is older than `stale_before`, or it is null and `started_at` is older
    /// than `stale_before`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_stale(
        &self,
        statuses: &[JobStatus],
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<UserJob>> {
        let labels: Vec<&'static str> = statuses.iter().copied().map(job_status_to_str).collect();
        let rows = sqlx::query_as::<_, UserJobRow>(
            r"
            SELECT * FROM revaer_jobs.user_jobs
            WHERE status = ANY($1)
              AND (
                last_heartbeat < $2
                OR (last_heartbeat IS NULL AND started_at < $2)
              )
            ",
        )
        .bind(&labels)
        .bind(stale_before)
        .fetch_all(self.pool)
        .await
        .map_err(query_failed("list stale user_jobs"))?;
        rows.into_iter().map(UserJob::try_from).collect()
    }

    /// Jobs still waiting for their download leg to be dispatched, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_queued(&self) -> Result<Vec<UserJob>> {
        let rows = sqlx::query_as::<_, UserJobRow>(
            r"
            SELECT * FROM revaer_jobs.user_jobs
            WHERE status = 'QUEUED'
            ORDER BY created_at ASC
            ",
        )
        .fetch_all(self.pool)
        .await
        .map_err(query_failed("list queued user_jobs"))?;
        rows.into_iter().map(UserJob::try_from).collect()
    }

    /// Jobs in a given status, most recently created first, capped at `limit`. Used by the
    /// admin CLI to inspect the queue; `status` of `None` returns jobs across every status.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_by_status(&self, status: Option<JobStatus>, limit: i64) -> Result<Vec<UserJob>> {
        let rows = match status {
            Some(status) => {
                sqlx::query_as::<_, UserJobRow>(
                    r"
                    SELECT * FROM revaer_jobs.user_jobs
                    WHERE status = $1
                    ORDER BY created_at DESC
                    LIMIT $2
                    ",
                )
                .bind(job_status_to_str(status))
                .bind(limit)
                .fetch_all(self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, UserJobRow>(
                    r"
                    SELECT * FROM revaer_jobs.user_jobs
                    ORDER BY created_at DESC
                    LIMIT $1
                    ",
                )
                .bind(limit)
                .fetch_all(self.pool)
                .await
            }
        }
        .map_err(query_failed("list user_jobs by status"))?;
        rows.into_iter().map(UserJob::try_from).collect()
    }

    /// Update download-phase bookkeeping: total size, download path, and human-readable state.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_download_started(
        &self,
        job_id: i64,
        total_bytes: i64,
        download_path: &str,
        current_state: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE revaer_jobs.user_jobs
            SET total_bytes = $2,
                download_path = $3,
                current_state = $4,
                started_at = COALESCE(started_at, now())
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(total_bytes)
        .bind(download_path)
        .bind(current_state)
        .execute(self.pool)
        .await
        .map_err(query_failed("set download started"))?;
        Ok(())
    }

    /// Update download progress and liveness in one write, used by the download worker's
    /// monitor loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_download_progress(
        &self,
        job_id: i64,
        bytes_downloaded: i64,
        current_state: &str,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE revaer_jobs.user_jobs
            SET bytes_downloaded = $2, current_state = $3, last_heartbeat = now()
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(bytes_downloaded)
        .bind(current_state)
        .execute(self.pool)
        .await
        .map_err(query_failed("update download progress"))?;
        Ok(())
    }

    /// Update upload progress and liveness in one write, used by the upload executors.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_upload_progress(&self, job_id: i64, bytes_uploaded: i64) -> Result<()> {
        sqlx::query(
            r"
            UPDATE revaer_jobs.user_jobs
            SET bytes_uploaded = $2, last_heartbeat = now()
            WHERE id = $1
            ",
        )
        .bind(job_id)
        .bind(bytes_uploaded)
        .execute(self.pool)
        .await
        .map_err(query_failed("update upload progress"))?;
        Ok(())
    }

    /// Refresh only the liveness heartbeat. Intended to be called from a separate `DataStore`
    /// (and thus a separate pool checkout) than the main execution path, per §5.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn touch_heartbeat(&self, job_id: i64) -> Result<()> {
        sqlx::query("UPDATE revaer_jobs.user_jobs SET last_heartbeat = now() WHERE id = $1")
            .bind(job_id)
            .execute(self.pool)
            .await
            .map_err(query_failed("touch heartbeat"))?;
        Ok(())
    }

    /// Record the background-execution handle for a job's download phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_hangfire_job_id(&self, job_id: i64, handle: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE revaer_jobs.user_jobs SET hangfire_job_id = $2 WHERE id = $1")
            .bind(job_id)
            .bind(handle)
            .execute(self.pool)
            .await
            .map_err(query_failed("set hangfire_job_id"))?;
        Ok(())
    }

    /// Record the background-execution handle for a job's upload phase. Used for the dispatcher
    /// idempotency guard (§4.3): a non-empty value means the upload has already been enqueued.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn set_hangfire_upload_job_id(&self, job_id: i64, handle: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE revaer_jobs.user_jobs SET hangfire_upload_job_id = $2 WHERE id = $1")
            .bind(job_id)
            .bind(handle)
            .execute(self.pool)
            .await
            .map_err(query_failed("set hangfire_upload_job_id"))?;
        Ok(())
    }
}

/// Repository for `JobStatusHistory` rows.
pub struct HistoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> HistoryRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List all history entries for a job, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_for_job(&self, job_id: i64) -> Result<Vec<JobStatusHistoryEntry>> {
        let rows = sqlx::query(
            r"
            SELECT job_id, from_status, to_status, source, error_message, metadata_json, changed_at
            FROM revaer_jobs.job_status_history
            WHERE job_id = $1
            ORDER BY changed_at ASC, id ASC
            ",
        )
        .bind(job_id)
        .fetch_all(self.pool)
        .await
        .map_err(query_failed("list job status history"))?;

        rows.into_iter()
            .map(|row| {
                Ok(JobStatusHistoryEntry {
                    job_id: row.try_get("job_id").map_err(query_failed("decode job_id"))?,
                    from_status: job_status_from_str(
                        row.try_get::<String, _>("from_status")
                            .map_err(query_failed("decode from_status"))?
                            .as_str(),
                    )?,
                    to_status: job_status_from_str(
                        row.try_get::<String, _>("to_status")
                            .map_err(query_failed("decode to_status"))?
                            .as_str(),
                    )?,
                    source: job_source_from_str(
                        row.try_get::<String, _>("source")
                            .map_err(query_failed("decode source"))?
                            .as_str(),
                    )?,
                    error_message: row
                        .try_get("error_message")
                        .map_err(query_failed("decode error_message"))?,
                    metadata_json: row
                        .try_get("metadata_json")
                        .map_err(query_failed("decode metadata_json"))?,
                    changed_at: row
                        .try_get("changed_at")
                        .map_err(query_failed("decode changed_at"))?,
                })
            })
            .collect()
    }
}

/// Apply a status transition and its audit-history entry in a single transaction, per §8's
/// transition-audit invariant: the two writes must be atomic.
///
/// # Errors
///
/// Returns an error if either write fails; the caller's transaction is left for the caller to
/// roll back or commit.
pub async fn record_transition(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i64,
    from_status: JobStatus,
    to_status: JobStatus,
    source: JobSource,
    error_message: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r"
        UPDATE revaer_jobs.user_jobs
        SET status = $2,
            error_message = $3,
            completed_at = CASE WHEN $4 THEN now() ELSE completed_at END
        WHERE id = $1
        ",
    )
    .bind(job_id)
    .bind(job_status_to_str(to_status))
    .bind(error_message)
    .bind(to_status.is_terminal())
    .execute(&mut **tx)
    .await
    .map_err(query_failed("update job status"))?;

    sqlx::query(
        r"
        INSERT INTO revaer_jobs.job_status_history
            (job_id, from_status, to_status, source, error_message, changed_at)
        VALUES ($1, $2, $3, $4, $5, now())
        ",
    )
    .bind(job_id)
    .bind(job_status_to_str(from_status))
    .bind(job_status_to_str(to_status))
    .bind(job_source_to_str(source))
    .bind(error_message)
    .execute(&mut **tx)
    .await
    .map_err(query_failed("insert job status history"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Queued,
            JobStatus::Downloading,
            JobStatus::TorrentDownloadRetry,
            JobStatus::TorrentFailed,
            JobStatus::PendingUpload,
            JobStatus::Uploading,
            JobStatus::UploadRetry,
            JobStatus::UploadFailed,
            JobStatus::Completed,
            JobStatus::Cancelled,
            JobStatus::Failed,
        ] {
            let label = job_status_to_str(status);
            assert_eq!(job_status_from_str(label).unwrap(), status);
        }
    }

    #[test]
    fn source_round_trips_through_strings() {
        for source in [
            JobSource::Worker,
            JobSource::HealthMonitor,
            JobSource::User,
            JobSource::System,
        ] {
            let label = job_source_to_str(source);
            assert_eq!(job_source_from_str(label).unwrap(), source);
        }
    }

    #[test]
    fn unknown_status_label_errors() {
        assert!(job_status_from_str("NOT_A_STATUS").is_err());
    }
}
