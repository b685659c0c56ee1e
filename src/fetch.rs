// Retrieval of raw clip bytes
// http(s) goes through reqwest, everything else is read from disk

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::config::PlayerConfig;
use crate::error::{AudioError, Result};

/// Network/file fetch primitive
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}

/// Fetches `http://` and `https://` URLs over the network, `file://` URLs and bare paths from disk
pub struct DefaultFetcher {
    client: reqwest::Client,
    asset_root: Option<PathBuf>,
}

impl DefaultFetcher {
    pub fn new(timeout: Duration, asset_root: Option<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AudioError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, asset_root })
    }

    pub fn from_config(config: &PlayerConfig) -> Result<Self> {
        Self::new(config.fetch_timeout(), config.asset_root.clone())
    }

    fn is_remote(url: &str) -> bool {
        let lower = url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Map a `file://` URL or plain path onto the filesystem
    fn local_path(&self, url: &str) -> PathBuf {
        let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
        match &self.asset_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }

    async fn fetch_remote(&self, url: &str) -> Result<Bytes> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AudioError::fetch(url, e))?
            .error_for_status()
            .map_err(|e| AudioError::fetch(url, e))?;

        response.bytes().await.map_err(|e| AudioError::fetch(url, e))
    }
}

#[async_trait]
impl Fetch for DefaultFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes> {
        let data = if Self::is_remote(url) {
            self.fetch_remote(url).await?
        } else {
            let path = self.local_path(url);
            tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| AudioError::fetch(url, e))?
        };

        debug!(url, bytes = data.len(), "Fetched clip");
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(root: Option<PathBuf>) -> DefaultFetcher {
        DefaultFetcher::new(Duration::from_secs(1), root).unwrap()
    }

    #[test]
    fn test_scheme_detection() {
        assert!(DefaultFetcher::is_remote("http://example.com/click.wav"));
        assert!(DefaultFetcher::is_remote("HTTPS://example.com/click.wav"));
        assert!(!DefaultFetcher::is_remote("file:///tmp/click.wav"));
        assert!(!DefaultFetcher::is_remote("sounds/click.wav"));
    }

    #[test]
    fn test_relative_paths_use_asset_root() {
        let f = fetcher(Some(PathBuf::from("/srv/sounds")));
        assert_eq!(f.local_path("click.wav"), PathBuf::from("/srv/sounds/click.wav"));
        assert_eq!(f.local_path("file:///abs/click.wav"), PathBuf::from("/abs/click.wav"));
        assert_eq!(fetcher(None).local_path("click.wav"), PathBuf::from("click.wav"));
    }

    #[tokio::test]
    async fn test_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("click.wav"), b"RIFF").unwrap();

        let data = fetcher(Some(dir.path().to_path_buf()))
            .fetch("click.wav")
            .await
            .unwrap();
        assert_eq!(&data[..], b"RIFF");
    }

    #[tokio::test]
    async fn test_missing_file_is_fetch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = fetcher(Some(dir.path().to_path_buf()))
            .fetch("nope.wav")
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::FetchFailure { .. }));
    }
}
