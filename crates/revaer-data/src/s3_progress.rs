//! Repository for `S3UploadProgress` rows, the durable record behind multipart upload resume.

use chrono::{DateTime, Utc};
use revaer_jobs_core::{PartETag, S3UploadProgress, UploadPartStatus};
use sqlx::{FromRow, PgPool};

use crate::error::{Result, query_failed};

fn status_to_str(status: UploadPartStatus) -> &'static str {
    match status {
        UploadPartStatus::InProgress => "in_progress",
        UploadPartStatus::Completed => "completed",
        UploadPartStatus::Failed => "failed",
    }
}

fn status_from_str(label: &str) -> Result<UploadPartStatus> {
    Ok(match label {
        "in_progress" => UploadPartStatus::InProgress,
        "completed" => UploadPartStatus::Completed,
        "failed" => UploadPartStatus::Failed,
        other => {
            return Err(crate::error::DataError::QueryFailed {
                operation: "decode upload part status",
                source: sqlx::Error::Decode(format!("unknown upload part status '{other}'").into()),
            });
        }
    })
}

#[derive(Debug, Clone, FromRow)]
struct S3UploadProgressRow {
    job_id: i64,
    local_file_path: String,
    s3_key: String,
    upload_id: Option<String>,
    part_size: i64,
    total_parts: i32,
    parts_completed: i32,
    bytes_uploaded: i64,
    total_bytes: i64,
    part_etags_json: serde_json::Value,
    status: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<S3UploadProgressRow> for S3UploadProgress {
    type Error = crate::error::DataError;

    fn try_from(row: S3UploadProgressRow) -> Result<Self> {
        let part_etags: Vec<PartETag> = serde_json::from_value(row.part_etags_json)
            .map_err(|source| crate::error::DataError::QueryFailed {
                operation: "decode part_etags_json",
                source: sqlx::Error::Decode(Box::new(source)),
            })?;
        Ok(Self {
            job_id: row.job_id,
            local_file_path: row.local_file_path,
            s3_key: row.s3_key,
            upload_id: row.upload_id,
            part_size: u64::try_from(row.part_size).unwrap_or_default(),
            total_parts: u32::try_from(row.total_parts).unwrap_or_default(),
            parts_completed: u32::try_from(row.parts_completed).unwrap_or_default(),
            bytes_uploaded: u64::try_from(row.bytes_uploaded).unwrap_or_default(),
            total_bytes: u64::try_from(row.total_bytes).unwrap_or_default(),
            part_etags,
            status: status_from_str(&row.status)?,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}

/// Repository for `S3UploadProgress` rows.
pub struct S3ProgressRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> S3ProgressRepository<'a> {
    pub(crate) const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Fetch the progress row for a job/key pair, if one exists. Used at upload start to decide
    /// whether this is a fresh upload or a resume.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the row cannot be decoded.
    pub async fn fetch(&self, job_id: i64, s3_key: &str) -> Result<Option<S3UploadProgress>> {
        let row = sqlx::query_as::<_, S3UploadProgressRow>(
            r"
            SELECT job_id, local_file_path, s3_key, upload_id, part_size, total_parts,
                   parts_completed, bytes_uploaded, total_bytes, part_etags_json, status,
                   started_at, completed_at
            FROM revaer_jobs.s3_upload_progress
            WHERE job_id = $1 AND s3_key = $2
            ",
        )
        .bind(job_id)
        .bind(s3_key)
        .fetch_optional(self.pool)
        .await
        .map_err(query_failed("fetch s3 upload progress"))?;
        row.map(S3UploadProgress::try_from).transpose()
    }

    /// All non-terminal progress rows for a job, used to resume a partially completed
    /// multi-file upload after a worker restart.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn list_in_progress_for_job(&self, job_id: i64) -> Result<Vec<S3UploadProgress>> {
        let rows = sqlx::query_as::<_, S3UploadProgressRow>(
            r"
            SELECT job_id, local_file_path, s3_key, upload_id, part_size, total_parts,
                   parts_completed, bytes_uploaded, total_bytes, part_etags_json, status,
                   started_at, completed_at
            FROM revaer_jobs.s3_upload_progress
            WHERE job_id = $1 AND status = 'in_progress'
            ",
        )
        .bind(job_id)
        .fetch_all(self.pool)
        .await
        .map_err(query_failed("list in-progress s3 upload progress"))?;
        rows.into_iter().map(S3UploadProgress::try_from).collect()
    }

    /// Create or update a progress row, keyed on `(job_id, s3_key)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn upsert(&self, progress: &S3UploadProgress) -> Result<()> {
        let part_etags_json = serde_json::to_value(&progress.part_etags).map_err(|source| {
            crate::error::DataError::QueryFailed {
                operation: "encode part_etags_json",
                source: sqlx::Error::Encode(Box::new(source)),
            }
        })?;
        sqlx::query(
            r"
            INSERT INTO revaer_jobs.s3_upload_progress
                (job_id, local_file_path, s3_key, upload_id, part_size, total_parts,
                 parts_completed, bytes_uploaded, total_bytes, part_etags_json, status,
                 started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (job_id, s3_key) DO UPDATE SET
                upload_id = EXCLUDED.upload_id,
                parts_completed = EXCLUDED.parts_completed,
                bytes_uploaded = EXCLUDED.bytes_uploaded,
                part_etags_json = EXCLUDED.part_etags_json,
                status = EXCLUDED.status,
                completed_at = EXCLUDED.completed_at
            ",
        )
        .bind(progress.job_id)
        .bind(&progress.local_file_path)
        .bind(&progress.s3_key)
        .bind(&progress.upload_id)
        .bind(i64::try_from(progress.part_size).unwrap_or(i64::MAX))
        .bind(i32::try_from(progress.total_parts).unwrap_or(i32::MAX))
        .bind(i32::try_from(progress.parts_completed).unwrap_or(i32::MAX))
        .bind(i64::try_from(progress.bytes_uploaded).unwrap_or(i64::MAX))
        .bind(i64::try_from(progress.total_bytes).unwrap_or(i64::MAX))
        .bind(part_etags_json)
        .bind(status_to_str(progress.status))
        .bind(progress.started_at)
        .bind(progress.completed_at)
        .execute(self.pool)
        .await
        .map_err(query_failed("upsert s3 upload progress"))?;
        Ok(())
    }

    /// Delete a completed or abandoned progress row, e.g. after `AbortMultipartUpload` cleanup.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub async fn delete(&self, job_id: i64, s3_key: &str) -> Result<()> {
        sqlx::query("DELETE FROM revaer_jobs.s3_upload_progress WHERE job_id = $1 AND s3_key = $2")
            .bind(job_id)
            .bind(s3_key)
            .execute(self.pool)
            .await
            .map_err(query_failed("delete s3 upload progress"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            UploadPartStatus::InProgress,
            UploadPartStatus::Completed,
            UploadPartStatus::Failed,
        ] {
            let label = status_to_str(status);
            assert_eq!(status_from_str(label).unwrap(), status);
        }
    }

    #[test]
    fn unknown_status_label_errors() {
        assert!(status_from_str("pending").is_err());
    }
}
