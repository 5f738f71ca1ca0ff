use crate::error::Result;
use crate::types::DownloadedFile;
use async_trait::async_trait;
use std::path::Path;

/// Remote access used by the scanner, fetcher and registry lookup.
#[async_trait]
pub trait HttpClientPort: Send + Sync {
    /// Fetch a listing page as text. Non-success status is a `Network` error.
    async fn get_text(&self, url: &str) -> Result<String>;

    /// Stream `url` into `dest`, creating or truncating it.
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedFile>;
}
