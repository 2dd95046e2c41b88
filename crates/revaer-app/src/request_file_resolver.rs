//! HTTP client resolving request files against the upstream service that owns them.

use async_trait::async_trait;
use revaer_download::{DownloadError, DownloadResult, RequestFileResolver, ResolvedRequestFile};
use serde::Deserialize;

/// Resolves request files by calling a configured upstream service over HTTP.
///
/// The request-file service's storage and admission workflow live outside this workspace; all
/// this client needs from it is a direct URL for a given id.
pub struct HttpRequestFileResolver {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRequestFileResolver {
    /// Build a resolver that calls `{base_url}/request-files/{id}` for each lookup.
    #[must_use]
    pub fn new(http_client: reqwest::Client, base_url: String) -> Self {
        Self { http_client, base_url: base_url.trim_end_matches('/').to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct RequestFileResponse {
    direct_url: String,
}

#[async_trait]
impl RequestFileResolver for HttpRequestFileResolver {
    async fn resolve(&self, request_file_id: i64) -> DownloadResult<ResolvedRequestFile> {
        let url = format!("{}/request-files/{request_file_id}", self.base_url);
        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(DownloadError::from)?
            .error_for_status()
            .map_err(DownloadError::from)?;
        let body: RequestFileResponse = response.json().await.map_err(DownloadError::from)?;
        Ok(ResolvedRequestFile { direct_url: body.direct_url })
    }
}
