//! Streaming transfer of the remote database.

use crate::config::{user_agent, SyncConfig};
use crate::frontend::{Progress, ProgressSink};
use crate::{CardpeekError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::io::Write;
use tracing::debug;

/// Copies the content at a URL into a writer.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Stream `url` into `out`, reporting progress for every chunk.
    ///
    /// Returns the number of bytes written. On error `out` may hold a partial
    /// copy; the caller is responsible for discarding it.
    async fn fetch(
        &self,
        url: &str,
        out: &mut (dyn Write + Send),
        progress: &mut dyn ProgressSink,
    ) -> Result<u64>;
}

/// HTTP(S) transfer backed by reqwest.
pub struct HttpTransfer {
    client: Client,
}

impl HttpTransfer {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(SyncConfig::REQUEST_TIMEOUT)
            .connect_timeout(SyncConfig::CONNECT_TIMEOUT)
            .user_agent(user_agent())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transfer for HttpTransfer {
    async fn fetch(
        &self,
        url: &str,
        out: &mut (dyn Write + Send),
        progress: &mut dyn ProgressSink,
    ) -> Result<u64> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        // Any non-success status is a failed transfer, not a document to keep.
        if !status.is_success() {
            return Err(CardpeekError::DownloadFailed {
                url: url.to_string(),
                message: format!("server returned {}", status),
            });
        }

        let total_bytes = response.content_length();
        debug!("Downloading {} ({:?} bytes)", url, total_bytes);

        let mut bytes_downloaded: u64 = 0;
        let mut stream = response.bytes_stream();
        progress.update(Progress::from_counts(0, total_bytes));

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| CardpeekError::Network {
                message: format!("Error reading download stream: {}", e),
                source: Some(e),
            })?;

            out.write_all(&chunk).map_err(|e| CardpeekError::Io {
                message: format!("Failed to write download: {}", e),
                path: None,
                source: Some(e),
            })?;

            bytes_downloaded += chunk.len() as u64;
            progress.update(Progress::from_counts(bytes_downloaded, total_bytes));
        }

        Ok(bytes_downloaded)
    }
}
