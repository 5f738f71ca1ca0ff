use crate::app::ports::HttpClientPort;
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::types::DownloadedFile;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout_seconds: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()?;
        Ok(Self { client })
    }

    async fn checked_get(&self, url: &str) -> Result<reqwest::Response> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Network {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl HttpClientPort for ReqwestHttp {
    #[instrument(skip(self))]
    async fn get_text(&self, url: &str) -> Result<String> {
        let resp = self.checked_get(url).await?;
        let body = resp.text().await?;
        metrics::listing_fetched();
        debug!("Fetched listing ({} bytes)", body.len());
        Ok(body)
    }

    #[instrument(skip(self, dest), fields(dest = %dest.display()))]
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedFile> {
        let mut resp = self.checked_get(url).await?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut hasher = Sha256::new();
        let mut bytes: u64 = 0;

        while let Some(chunk) = resp.chunk().await? {
            hasher.update(&chunk);
            bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        metrics::archive_downloaded(bytes);
        Ok(DownloadedFile {
            url: url.to_string(),
            path: dest.to_path_buf(),
            bytes,
            sha256: hex::encode(hasher.finalize()),
            fetched_at: Utc::now(),
        })
    }
}
