use crate::app::ports::HttpClientPort;
use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use reqwest::Url;
use scraper::{Html, Selector};
use tracing::{debug, instrument};

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));

/// An anchor from a directory listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub href: String,
    pub text: String,
}

impl Link {
    /// Last path segment of the href, without a trailing slash.
    pub fn file_name(&self) -> &str {
        let trimmed = self.href.trim_end_matches('/');
        trimmed.rsplit('/').next().unwrap_or(trimmed)
    }
}

/// All anchors with an `href`, in document order.
pub fn extract_links(html: &str) -> Vec<Link> {
    let document = Html::parse_document(html);

    document
        .select(&ANCHOR)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim();
            if href.is_empty() {
                return None;
            }
            Some(Link {
                href: href.to_string(),
                text: a.text().collect::<String>().trim().to_string(),
            })
        })
        .collect()
}

/// Resolve `href` against the listing it came from.
pub fn resolve(base: &str, href: &str) -> Result<String> {
    let base = Url::parse(&as_directory(base))
        .map_err(|e| PipelineError::Discovery(format!("invalid listing URL '{base}': {e}")))?;
    let joined = base
        .join(href)
        .map_err(|e| PipelineError::Discovery(format!("invalid link '{href}': {e}")))?;
    Ok(joined.to_string())
}

/// Listing URLs are directories; without the trailing slash relative links
/// would resolve against the parent.
pub fn as_directory(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{url}/")
    }
}

pub async fn fetch_links(http: &dyn HttpClientPort, url: &str) -> Result<Vec<Link>> {
    let html = http.get_text(url).await?;
    let links = extract_links(&html);
    debug!("{} links on {}", links.len(), url);
    Ok(links)
}

/// Find the sub-folder of `root_url` whose link mentions `folder`.
#[instrument(skip(http))]
pub async fn locate_folder(http: &dyn HttpClientPort, root_url: &str, folder: &str) -> Result<String> {
    let links = fetch_links(http, root_url).await?;
    let link = links
        .iter()
        .find(|l| l.href.contains(folder) || l.text.contains(folder))
        .ok_or_else(|| PipelineError::Discovery(format!("no link to '{folder}' under {root_url}")))?;
    Ok(as_directory(&resolve(root_url, &link.href)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body><pre>
        <a href="?C=N;O=D">Name</a>
        <a href="/FTP/">Parent Directory</a>
        <a href="demonstracoes_contabeis/">demonstracoes_contabeis/</a>
        <a href="operadoras_de_plano_de_saude_ativas/"> operadoras_de_plano_de_saude_ativas/ </a>
        <a>no href</a>
        </pre></body></html>
    "#;

    #[test]
    fn extracts_anchors_in_order() {
        let links = extract_links(LISTING);
        assert_eq!(links.len(), 4);
        assert_eq!(links[2].href, "demonstracoes_contabeis/");
        assert_eq!(links[3].text, "operadoras_de_plano_de_saude_ativas/");
    }

    #[test]
    fn resolves_relative_and_absolute_links() {
        let base = "https://example.org/FTP/PDA";
        assert_eq!(
            resolve(base, "demonstracoes_contabeis/").unwrap(),
            "https://example.org/FTP/PDA/demonstracoes_contabeis/"
        );
        assert_eq!(resolve(base, "/FTP/").unwrap(), "https://example.org/FTP/");
        assert_eq!(
            resolve(base, "https://other.org/a.zip").unwrap(),
            "https://other.org/a.zip"
        );
    }

    #[test]
    fn file_name_is_last_segment() {
        let link = Link {
            href: "2023/1T2023.zip".to_string(),
            text: String::new(),
        };
        assert_eq!(link.file_name(), "1T2023.zip");
        let dir = Link {
            href: "2023/".to_string(),
            text: String::new(),
        };
        assert_eq!(dir.file_name(), "2023");
    }
}
