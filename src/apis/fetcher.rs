use crate::app::ports::HttpClientPort;
use crate::error::{PipelineError, Result};
use crate::types::DownloadedFile;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Record of a fetch run, written next to the downloaded archives.
///
/// File paths are stored relative to the directory the archives were
/// downloaded into, so the data directory can be moved or reached from
/// another working directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchManifest {
    pub files: Vec<DownloadedFile>,
}

impl FetchManifest {
    /// Archive locations resolved against `dir`.
    pub fn paths(&self, dir: &Path) -> Vec<PathBuf> {
        self.files.iter().map(|f| dir.join(&f.path)).collect()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Local file name for a remote URL: its last path segment.
pub fn file_name_for(url: &str) -> Result<String> {
    let parsed = Url::parse(url).map_err(|e| PipelineError::Discovery(format!("invalid URL '{url}': {e}")))?;
    match parsed.path_segments().and_then(|mut segments| segments.next_back()) {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(PipelineError::Discovery(format!("cannot derive a file name from {url}"))),
    }
}

/// Download `urls` into `dest_dir` sequentially, preserving input order.
/// The first failure aborts the batch.
#[instrument(skip(http, urls), fields(count = urls.len()))]
pub async fn fetch_all(http: &dyn HttpClientPort, urls: &[String], dest_dir: &Path) -> Result<FetchManifest> {
    fs::create_dir_all(dest_dir)?;
    let mut manifest = FetchManifest::default();

    for url in urls {
        let name = file_name_for(url)?;
        let dest = dest_dir.join(&name);
        let mut downloaded = http.download(url, &dest).await?;
        info!(
            url = %url,
            bytes = downloaded.bytes,
            sha256 = %downloaded.sha256,
            "Downloaded {}",
            dest.display()
        );
        downloaded.path = PathBuf::from(name);
        manifest.files.push(downloaded);
    }
    Ok(manifest)
}
