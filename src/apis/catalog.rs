//! Remote catalog scanner.
//!
//! Walks `<root>/<folder>/<year>/` listings and attributes each archive to a
//! reporting quarter using the two naming schemes the portal has used:
//! the legacy infix (`2011_2_trimestre.zip`, `2009-3tri.zip`) and the modern
//! prefix (`1T2025.zip`).

use crate::apis::listing::{self, Link};
use crate::app::ports::HttpClientPort;
use crate::constants::{ARCHIVE_EXTENSION, RECENT_QUARTERS};
use crate::error::Result;
use crate::types::{CatalogEntry, Period, Quarter};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument};

static LEGACY_QUARTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([1-4])\s*[_-]?\s*tri").expect("legacy quarter regex"));
static MODERN_QUARTER: Lazy<Regex> = Lazy::new(|| Regex::new(r"([1-4])\s*t\s*\d{4}").expect("modern quarter regex"));

/// Quarter encoded in an archive name, legacy scheme first.
pub fn classify_archive(name: &str) -> Option<Quarter> {
    let lower = name.to_lowercase();
    let caps = LEGACY_QUARTER
        .captures(&lower)
        .or_else(|| MODERN_QUARTER.captures(&lower))?;
    caps.get(1)?.as_str().parse().ok().and_then(Quarter::new)
}

/// Year sub-folders of the disclosure folder, ascending.
pub fn year_folders(links: &[Link]) -> Vec<(i32, &Link)> {
    let mut years: Vec<(i32, &Link)> = links
        .iter()
        .filter_map(|link| {
            let name = link.file_name();
            if name.len() == 4 && name.chars().all(|c| c.is_ascii_digit()) {
                name.parse().ok().map(|year| (year, link))
            } else {
                None
            }
        })
        .collect();
    years.sort_by_key(|(year, _)| *year);
    years
}

/// Keep every entry whose period is among the `count` most recent distinct
/// periods. Output is ordered by period, ties in input order.
pub fn select_recent(mut entries: Vec<CatalogEntry>, count: usize) -> Vec<CatalogEntry> {
    entries.sort_by_key(CatalogEntry::period);

    let mut periods: Vec<Period> = Vec::new();
    for entry in &entries {
        let period = entry.period();
        if !periods.contains(&period) {
            periods.push(period);
        }
    }
    let keep = &periods[periods.len().saturating_sub(count)..];

    entries
        .into_iter()
        .filter(|e| keep.contains(&e.period()))
        .collect()
}

async fn archives_for_year(http: &dyn HttpClientPort, year_url: &str, year: i32) -> Result<Vec<CatalogEntry>> {
    let links = listing::fetch_links(http, year_url).await?;
    let mut entries = Vec::new();

    for link in &links {
        if !link.href.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
            continue;
        }
        match classify_archive(link.file_name()) {
            Some(quarter) => entries.push(CatalogEntry {
                year,
                quarter,
                remote_url: listing::resolve(year_url, &link.href)?,
            }),
            None => debug!("Skipping non-quarterly archive {}", link.href),
        }
    }
    Ok(entries)
}

/// Discover the archives of the most recent reporting quarters.
///
/// An empty result means nothing matched; callers treat it as fatal.
#[instrument(skip(http))]
pub async fn scan_catalog(http: &dyn HttpClientPort, root_url: &str, folder: &str) -> Result<Vec<CatalogEntry>> {
    let folder_url = listing::locate_folder(http, root_url, folder).await?;
    let folder_links = listing::fetch_links(http, &folder_url).await?;
    let years = year_folders(&folder_links);
    info!("Found {} year folders under {}", years.len(), folder_url);

    let mut all = Vec::new();
    for (year, link) in years {
        let year_url = listing::as_directory(&listing::resolve(&folder_url, &link.href)?);
        all.extend(archives_for_year(http, &year_url, year).await?);
    }

    let selected = select_recent(all, RECENT_QUARTERS);
    info!("Selected {} archives from the {} most recent quarters", selected.len(), RECENT_QUARTERS);
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(year: i32, quarter: u8, url: &str) -> CatalogEntry {
        CatalogEntry {
            year,
            quarter: Quarter::new(quarter).unwrap(),
            remote_url: url.to_string(),
        }
    }

    #[test]
    fn classifies_legacy_names() {
        assert_eq!(classify_archive("2009_1_trimestre.zip").map(Quarter::get), Some(1));
        assert_eq!(classify_archive("2011-2-tri.zip").map(Quarter::get), Some(2));
        assert_eq!(classify_archive("3tri_2010.zip").map(Quarter::get), Some(3));
        assert_eq!(classify_archive("2023_4_TRIMESTRE.ZIP").map(Quarter::get), Some(4));
    }

    #[test]
    fn classifies_modern_names() {
        assert_eq!(classify_archive("1T2025.zip").map(Quarter::get), Some(1));
        assert_eq!(classify_archive("20130416_2t2012.zip").map(Quarter::get), Some(2));
    }

    #[test]
    fn unrelated_archives_are_unclassified() {
        assert_eq!(classify_archive("dicionario_de_dados.zip"), None);
        assert_eq!(classify_archive("5T2025.zip"), None);
    }

    #[test]
    fn year_folders_are_four_digit_and_sorted() {
        let links: Vec<Link> = ["2021/", "../", "2019/", "leiame.txt", "12345/", "/FTP/PDA/demonstracoes_contabeis/2020/"]
            .iter()
            .map(|h| Link {
                href: h.to_string(),
                text: h.to_string(),
            })
            .collect();
        let years: Vec<i32> = year_folders(&links).into_iter().map(|(y, _)| y).collect();
        assert_eq!(years, vec![2019, 2020, 2021]);
    }

    #[test]
    fn selects_last_three_distinct_periods() {
        let mut entries = Vec::new();
        for year in 2020..=2023 {
            for q in 1..=4 {
                entries.push(entry(year, q, &format!("{q}T{year}.zip")));
            }
        }
        let selected = select_recent(entries, 3);
        let urls: Vec<&str> = selected.iter().map(|e| e.remote_url.as_str()).collect();
        assert_eq!(urls, vec!["2T2023.zip", "3T2023.zip", "4T2023.zip"]);
    }

    #[test]
    fn keeps_every_file_of_a_selected_quarter() {
        let entries = vec![
            entry(2023, 4, "b.zip"),
            entry(2023, 1, "old.zip"),
            entry(2023, 3, "c.zip"),
            entry(2023, 4, "a.zip"),
            entry(2023, 2, "d.zip"),
        ];
        let selected = select_recent(entries, 3);
        let urls: Vec<&str> = selected.iter().map(|e| e.remote_url.as_str()).collect();
        assert_eq!(urls, vec!["d.zip", "c.zip", "b.zip", "a.zip"]);
    }

    #[test]
    fn empty_catalog_selects_nothing() {
        assert!(select_recent(Vec::new(), 3).is_empty());
    }
}
