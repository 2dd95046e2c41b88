//! Resolves a job's opaque `requestFileId` into a torrent descriptor.
//!
//! The request file itself lives in a system this workspace does not own; all it exposes here is
//! a `directUrl` the download worker can materialize into a [`TorrentSource`].

use async_trait::async_trait;
use revaer_jobs_core::TorrentSource;

use crate::error::DownloadResult;

/// The subset of a request file the download worker needs.
#[derive(Debug, Clone)]
pub struct ResolvedRequestFile {
    /// Either a local filesystem path or an HTTP(S) URL to the torrent descriptor.
    pub direct_url: String,
}

/// Looks up a request file by id. The only collaborator the download worker needs from whatever
/// system owns request files.
#[async_trait]
pub trait RequestFileResolver: Send + Sync {
    /// Fetch the request file's direct-url reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the request file cannot be found.
    async fn resolve(&self, request_file_id: i64) -> DownloadResult<ResolvedRequestFile>;
}

/// Materialize a resolved request file's `direct_url` into a torrent descriptor: a local path
/// that exists is read straight off disk, otherwise it is fetched over HTTP.
///
/// # Errors
///
/// Returns an error if the local file cannot be read or the HTTP fetch fails.
pub async fn materialize(resolved: &ResolvedRequestFile) -> DownloadResult<TorrentSource> {
    let local_path = std::path::Path::new(&resolved.direct_url);
    if local_path.is_file() {
        let bytes = tokio::fs::read(local_path).await?;
        return Ok(TorrentSource::Metainfo { bytes });
    }
    if resolved.direct_url.starts_with("magnet:") {
        return Ok(TorrentSource::Magnet { uri: resolved.direct_url.clone() });
    }
    let response = reqwest::get(&resolved.direct_url).await?.error_for_status()?;
    let bytes = response.bytes().await?.to_vec();
    Ok(TorrentSource::Metainfo { bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn magnet_direct_url_materializes_as_magnet_source() -> DownloadResult<()> {
        let resolved = ResolvedRequestFile { direct_url: "magnet:?xt=urn:btih:demo".into() };
        let source = materialize(&resolved).await?;
        assert!(matches!(source, TorrentSource::Magnet { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn local_file_direct_url_materializes_as_metainfo() -> DownloadResult<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("descriptor.json");
        tokio::fs::write(&path, b"[]").await?;
        let resolved = ResolvedRequestFile { direct_url: path.display().to_string() };
        let source = materialize(&resolved).await?;
        assert!(matches!(source, TorrentSource::Metainfo { bytes } if bytes == b"[]"));
        Ok(())
    }
}
