//! Thin wrapper over the Drive v3 `files` resource: folder/file lookup and resumable-session
//! initiation. Every call takes a bearer access token obtained from [`crate::auth::TokenRefresher`].

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::error::{GDriveError, GDriveResult};
use crate::resumable::ResumableUploadSession;

const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

#[derive(Debug, Deserialize)]
struct FileListEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FileListResponse {
    files: Vec<FileListEntry>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Drive API calls the executor needs, bound to one bearer token.
pub struct DriveClient {
    http_client: Client,
    access_token: String,
}

impl DriveClient {
    /// Build a client bound to a fresh access token.
    #[must_use]
    pub fn new(http_client: Client, access_token: impl Into<String>) -> Self {
        Self { http_client, access_token: access_token.into() }
    }

    /// Find a folder by exact name under `parent` (or at drive root if `parent` is `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn find_folder(&self, name: &str, parent: Option<&str>) -> GDriveResult<Option<String>> {
        self.find_by_query(&folder_query(name, parent)).await
    }

    /// Create a folder named `name` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn create_folder(&self, name: &str, parent: Option<&str>) -> GDriveResult<String> {
        let parents = parent.map(|p| vec![p.to_string()]);
        let body = json!({ "name": name, "mimeType": FOLDER_MIME_TYPE, "parents": parents });
        let response = self
            .http_client
            .post(FILES_ENDPOINT)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GDriveError::UnexpectedStatus { status: response.status().as_u16(), operation: "create_folder" });
        }
        let created: CreatedFile = response.json().await?;
        Ok(created.id)
    }

    /// Find an existing (non-folder) file by exact name under `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub async fn find_file(&self, name: &str, parent: &str) -> GDriveResult<Option<String>> {
        self.find_by_query(&file_query(name, parent)).await
    }

    async fn find_by_query(&self, query: &str) -> GDriveResult<Option<String>> {
        let response = self
            .http_client
            .get(FILES_ENDPOINT)
            .bearer_auth(&self.access_token)
            .query(&[("q", query), ("fields", "files(id)"), ("pageSize", "1")])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GDriveError::UnexpectedStatus { status: response.status().as_u16(), operation: "find_by_query" });
        }
        let listed: FileListResponse = response.json().await?;
        Ok(listed.files.into_iter().next().map(|entry| entry.id))
    }

    /// Initiate a resumable upload session for a new file named `name` under `parent`, returning
    /// the session bound to the `Location` header Drive replies with.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails, Drive omits the `Location` header, or the session
    /// cannot be constructed.
    pub async fn initiate_resumable_session(
        &self,
        name: &str,
        parent: &str,
        content_type: &str,
        content_length: u64,
        chunk_size: u64,
    ) -> GDriveResult<ResumableUploadSession> {
        let body = json!({ "name": name, "parents": [parent] });
        let response = self
            .http_client
            .post(format!("{UPLOAD_ENDPOINT}?uploadType=resumable"))
            .bearer_auth(&self.access_token)
            .header("X-Upload-Content-Type", content_type)
            .header("X-Upload-Content-Length", content_length.to_string())
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(GDriveError::UnexpectedStatus { status: response.status().as_u16(), operation: "initiate_resumable_session" });
        }
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or(GDriveError::UnexpectedStatus { status: 0, operation: "initiate_resumable_session (missing Location)" })?
            .to_string();
        ResumableUploadSession::new(self.http_client.clone(), location, content_length, chunk_size)
    }
}

fn folder_query(name: &str, parent: Option<&str>) -> String {
    let escaped = escape_query_value(name);
    match parent {
        Some(parent) => format!("name='{escaped}' and mimeType='{FOLDER_MIME_TYPE}' and trashed=false and '{parent}' in parents"),
        None => format!("name='{escaped}' and mimeType='{FOLDER_MIME_TYPE}' and trashed=false"),
    }
}

fn file_query(name: &str, parent: &str) -> String {
    let escaped = escape_query_value(name);
    format!("name='{escaped}' and mimeType!='{FOLDER_MIME_TYPE}' and trashed=false and '{parent}' in parents")
}

/// Escape a value interpolated into a Drive query string: single quotes and backslashes are the
/// only characters Drive's query grammar requires escaping.
fn escape_query_value(value: &str) -> String {
    value.replace('\\', r"\\").replace('\'', r"\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_query_scopes_to_parent_when_given() {
        let query = folder_query("Movies", Some("root123"));
        assert!(query.contains("name='Movies'"));
        assert!(query.contains("'root123' in parents"));
    }

    #[test]
    fn folder_query_omits_parent_clause_at_root() {
        let query = folder_query("Movies", None);
        assert!(!query.contains("in parents"));
    }

    #[test]
    fn query_values_escape_quotes() {
        let escaped = escape_query_value("Bob's Movie");
        assert_eq!(escaped, r"Bob\'s Movie");
    }
}
