//! Drive's resumable-upload protocol: session initiation, chunked `PUT`s, and status queries.

use bytes::Bytes;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{GDriveError, GDriveResult};

/// Smallest chunk size Drive accepts; every chunk but the last must be a multiple of this.
pub const MIN_CHUNK_SIZE: u64 = 256 * 1024;
/// Chunk size used by the executor's upload loop.
pub(crate) const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// A file record as returned by the Drive API once an upload finalizes.
#[derive(Debug, Clone, Deserialize)]
pub struct DriveFile {
    /// Drive-assigned file id.
    pub id: String,
}

/// Outcome of submitting one chunk to a resumable session.
#[derive(Debug, Clone)]
pub enum UploadChunkResult {
    /// Drive accepted the bytes so far but more remain; `bytes_received` is the confirmed cursor.
    InProgress {
        /// Number of bytes Drive has confirmed receiving, 0-indexed exclusive.
        bytes_received: u64,
    },
    /// The file is fully uploaded.
    Complete(DriveFile),
}

/// Drive's view of a session's progress, as reported by a status query.
#[derive(Debug, Clone, Copy)]
pub struct UploadStatus {
    /// Bytes Drive has confirmed receiving.
    pub bytes_received: u64,
    /// Total expected size.
    pub total_size: u64,
}

impl UploadStatus {
    /// Whether the session is fully uploaded per Drive's own bookkeeping.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.bytes_received >= self.total_size
    }
}

/// A single Drive resumable-upload session bound to one `uploadUri`.
pub struct ResumableUploadSession {
    upload_uri: String,
    total_size: u64,
    chunk_size: u64,
    http_client: Client,
}

impl ResumableUploadSession {
    /// Wrap an existing session URI (as returned in a `Location` header, or restored from the
    /// `gdrive:resume:*` cache).
    ///
    /// # Errors
    ///
    /// Returns [`GDriveError::Job`] if `chunk_size` is smaller than [`MIN_CHUNK_SIZE`] or is not a
    /// multiple of it.
    pub fn new(http_client: Client, upload_uri: impl Into<String>, total_size: u64, chunk_size: u64) -> GDriveResult<Self> {
        if chunk_size < MIN_CHUNK_SIZE || chunk_size % MIN_CHUNK_SIZE != 0 {
            return Err(revaer_jobs_core::JobError::Validation {
                reason: format!("chunk size {chunk_size} must be a multiple of {MIN_CHUNK_SIZE}"),
            }
            .into());
        }
        Ok(Self {
            upload_uri: upload_uri.into(),
            total_size,
            chunk_size,
            http_client,
        })
    }

    /// The resume URI backing this session, persisted into `gdrive:resume:*`.
    #[must_use]
    pub fn upload_uri(&self) -> &str {
        &self.upload_uri
    }

    /// Submit one chunk at `offset`, where `chunk` ends at `offset + chunk.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`GDriveError::SessionExpired`] on a 404, a validation error on 400/401/403, and a
    /// retryable [`GDriveError::UnexpectedStatus`] on anything else unexpected.
    pub async fn upload_chunk(&mut self, chunk: Bytes, offset: u64) -> GDriveResult<UploadChunkResult> {
        let end = offset + chunk.len() as u64 - 1;
        let response = self
            .http_client
            .put(&self.upload_uri)
            .header("Content-Range", format!("bytes {offset}-{end}/{}", self.total_size))
            .body(chunk)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let file: DriveFile = response.json().await?;
                self.total_size = end + 1;
                Ok(UploadChunkResult::Complete(file))
            }
            StatusCode::PERMANENT_REDIRECT => {
                let bytes_received = parse_range_header(response.headers().get("Range").and_then(|v| v.to_str().ok()))
                    .unwrap_or(end + 1);
                Ok(UploadChunkResult::InProgress { bytes_received })
            }
            StatusCode::NOT_FOUND => Err(GDriveError::SessionExpired),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(revaer_jobs_core::JobError::Authorization {
                    reason: format!("drive rejected chunk upload with status {}", response.status()),
                }
                .into())
            }
            status => Err(GDriveError::UnexpectedStatus { status: status.as_u16(), operation: "upload_chunk" }),
        }
    }

    /// Query the session's current status with an empty `PUT`, per the protocol for resuming an
    /// interrupted upload.
    ///
    /// # Errors
    ///
    /// Returns [`GDriveError::SessionExpired`] on a 404, and a retryable
    /// [`GDriveError::UnexpectedStatus`] on any other unexpected status.
    pub async fn query_status(&self) -> GDriveResult<UploadStatus> {
        let response = self
            .http_client
            .put(&self.upload_uri)
            .header("Content-Range", format!("bytes */{}", self.total_size))
            .body(Vec::new())
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(UploadStatus { bytes_received: self.total_size, total_size: self.total_size }),
            StatusCode::PERMANENT_REDIRECT => {
                let bytes_received = parse_range_header(response.headers().get("Range").and_then(|v| v.to_str().ok())).unwrap_or(0);
                Ok(UploadStatus { bytes_received, total_size: self.total_size })
            }
            StatusCode::NOT_FOUND => Err(GDriveError::SessionExpired),
            status => Err(GDriveError::UnexpectedStatus { status: status.as_u16(), operation: "query_status" }),
        }
    }

    /// Ask Drive to finalize the session with an empty `PUT` and return the uploaded file's id,
    /// used both to resolve a cached session that turned out to already be complete and to
    /// close out a session whose last chunk reply claimed completion via a 308.
    ///
    /// # Errors
    ///
    /// Returns [`GDriveError::SessionExpired`] on a 404, and a retryable
    /// [`GDriveError::UnexpectedStatus`] on any other unexpected status.
    pub async fn finalize(&self) -> GDriveResult<Option<DriveFile>> {
        let response = self
            .http_client
            .put(&self.upload_uri)
            .header("Content-Range", format!("bytes */{}", self.total_size))
            .body(Vec::new())
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(Some(response.json().await?)),
            StatusCode::PERMANENT_REDIRECT => Ok(None),
            StatusCode::NOT_FOUND => Err(GDriveError::SessionExpired),
            status => Err(GDriveError::UnexpectedStatus { status: status.as_u16(), operation: "finalize" }),
        }
    }

    /// Abandon the session, best-effort; callers should clear the `gdrive:resume:*` cache entry
    /// regardless of whether this succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the request itself cannot be sent.
    pub async fn cancel(&self) -> GDriveResult<()> {
        let response = self.http_client.delete(&self.upload_uri).send().await?;
        match response.status().as_u16() {
            204 | 499 => Ok(()),
            status => Err(GDriveError::UnexpectedStatus { status, operation: "cancel" }),
        }
    }
}

/// Parse a `Range: bytes=0-{n}` response header into the confirmed byte count `n + 1`.
fn parse_range_header(header: Option<&str>) -> Option<u64> {
    let value = header?.strip_prefix("bytes=0-")?;
    value.parse::<u64>().ok().map(|n| n + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_size_below_minimum_is_rejected() {
        let client = Client::new();
        let err = ResumableUploadSession::new(client, "https://example.invalid/upload", 100, MIN_CHUNK_SIZE - 1);
        assert!(err.is_err());
    }

    #[test]
    fn chunk_size_not_a_multiple_is_rejected() {
        let client = Client::new();
        let err = ResumableUploadSession::new(client, "https://example.invalid/upload", 100, MIN_CHUNK_SIZE + 1);
        assert!(err.is_err());
    }

    #[test]
    fn chunk_size_exact_multiple_is_accepted() {
        let client = Client::new();
        let session = ResumableUploadSession::new(client, "https://example.invalid/upload", 100, DEFAULT_CHUNK_SIZE);
        assert!(session.is_ok());
    }

    #[test]
    fn range_header_parses_confirmed_byte_count() {
        assert_eq!(parse_range_header(Some("bytes=0-1048575")), Some(1_048_576));
        assert_eq!(parse_range_header(None), None);
        assert_eq!(parse_range_header(Some("garbage")), None);
    }

    #[test]
    fn upload_status_reports_completion() {
        let status = UploadStatus { bytes_received: 100, total_size: 100 };
        assert!(status.is_complete());
        let partial = UploadStatus { bytes_received: 40, total_size: 100 };
        assert!(!partial.is_complete());
    }
}
