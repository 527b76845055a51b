//! Source-file downloader collaborator.
//!
//! The pipeline consumes `fetch(url, destination)`; it never interprets
//! responses itself. The default implementation streams over reqwest.

use std::path::Path;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::ConversionError;

/// HTTP downloader interface consumed by the processor.
#[async_trait]
pub trait Downloader: Send + Sync + std::fmt::Debug {
    /// Fetch `url` into `dest`, erroring on HTTP failure or an unwritable
    /// destination.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), ConversionError>;
}

/// reqwest-backed downloader.
#[derive(Debug, Default)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    /// Create a downloader with default client settings.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), ConversionError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConversionError::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?
            .error_for_status()
            .map_err(|e| ConversionError::Download {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let mut file = tokio::fs::File::create(dest).await?;
        while let Some(chunk) = response.chunk().await.map_err(|e| ConversionError::Download {
            url: url.to_string(),
            message: e.to_string(),
        })? {
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        debug!(url = %url, dest = %dest.display(), "Source file fetched");
        Ok(())
    }
}
