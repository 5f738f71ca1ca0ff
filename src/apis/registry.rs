use crate::apis::listing::{self, Link};
use crate::app::ports::HttpClientPort;
use crate::constants::REGISTRY_EXTENSION;
use crate::error::{PipelineError, Result};
use crate::types::DownloadedFile;
use std::fs;
use std::path::Path;
use tracing::{info, instrument};

/// The registry file to use: the last matching link in listing order.
pub fn pick_registry_link(links: &[Link]) -> Option<&Link> {
    links
        .iter()
        .rev()
        .find(|l| l.href.to_lowercase().ends_with(REGISTRY_EXTENSION))
}

/// Locate the registry folder under `root_url` and download its current
/// file to `dest`.
#[instrument(skip(http, dest))]
pub async fn download_registry(
    http: &dyn HttpClientPort,
    root_url: &str,
    folder: &str,
    dest: &Path,
) -> Result<DownloadedFile> {
    let folder_url = listing::locate_folder(http, root_url, folder).await?;
    let links = listing::fetch_links(http, &folder_url).await?;
    let link = pick_registry_link(&links).ok_or_else(|| {
        PipelineError::Discovery(format!("no {REGISTRY_EXTENSION} file found in {folder_url}"))
    })?;
    let url = listing::resolve(&folder_url, &link.href)?;

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let downloaded = http.download(&url, dest).await?;
    info!(url = %url, bytes = downloaded.bytes, "Registry downloaded");
    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(href: &str) -> Link {
        Link {
            href: href.to_string(),
            text: href.to_string(),
        }
    }

    #[test]
    fn picks_last_csv_in_listing_order() {
        let links = vec![link("Relatorio_cadop_2024.csv"), link("leiame.pdf"), link("Relatorio_cadop.CSV"), link("../")];
        assert_eq!(pick_registry_link(&links).unwrap().href, "Relatorio_cadop.CSV");
    }

    #[test]
    fn no_csv_means_no_registry() {
        let links = vec![link("leiame.pdf")];
        assert!(pick_registry_link(&links).is_none());
    }
}
