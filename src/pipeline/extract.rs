//! Archive extraction and consolidation of disclosure files.

use crate::constants::{CONSOLIDATED_COLUMNS, SRC_AMOUNT, SRC_REGISTRY_ID};
use crate::error::Result;
use crate::metrics;
use crate::pipeline::table::{self, cell, format_optional, parse_number, FileKind, Table};
use crate::types::DisclosureRow;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};
use zip::ZipArchive;

static LEGACY_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<year>\d{4}).*?(?P<quarter>[1-4])\s*[_-]?\s*tri").expect("legacy period regex"));
static MODERN_PERIOD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<quarter>[1-4])\s*t\s*(?P<year>\d{4})").expect("modern period regex"));

/// Why a file did not contribute rows.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Unreadable(String),
    MissingColumns(Vec<&'static str>),
}

impl SkipReason {
    pub fn label(&self) -> &'static str {
        match self {
            SkipReason::Unreadable(_) => "unreadable",
            SkipReason::MissingColumns(_) => "missing_columns",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
}

#[derive(Debug, Default)]
pub struct ExtractionReport {
    pub rows: Vec<DisclosureRow>,
    pub files_used: Vec<PathBuf>,
    pub skipped: Vec<SkippedFile>,
}

/// Unpack every archive into `dest`. Members whose path would escape `dest`
/// are skipped. Returns the number of files written.
#[instrument(skip(archives), fields(count = archives.len()))]
pub fn unpack_archives(archives: &[PathBuf], dest: &Path) -> Result<usize> {
    fs::create_dir_all(dest)?;
    let mut written = 0;

    for archive_path in archives {
        let mut archive = ZipArchive::new(File::open(archive_path)?)?;
        for i in 0..archive.len() {
            let mut member = archive.by_index(i)?;
            let Some(relative) = member.enclosed_name() else {
                warn!(archive = %archive_path.display(), member = member.name(), "Rejected member outside extraction dir");
                metrics::archive_member_rejected();
                continue;
            };
            let out = dest.join(relative);
            if member.is_dir() {
                fs::create_dir_all(&out)?;
                continue;
            }
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut target = File::create(&out)?;
            io::copy(&mut member, &mut target)?;
            written += 1;
        }
        debug!("Unpacked {}", archive_path.display());
    }
    Ok(written)
}

/// Tabular files under `dir` (recursively), sorted by path.
pub fn list_tabular_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if FileKind::of(&path).is_some() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Year and quarter encoded in a file name (extension ignored).
pub fn period_from_file_name(path: &Path) -> (Option<i32>, Option<u8>) {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s.to_lowercase(),
        None => return (None, None),
    };
    for pattern in [&*LEGACY_PERIOD, &*MODERN_PERIOD] {
        if let Some(caps) = pattern.captures(&stem) {
            let year = caps["year"].parse().ok();
            let quarter = caps["quarter"].parse().ok();
            return (year, quarter);
        }
    }
    (None, None)
}

/// Reduce one normalized source table to disclosure rows, or say which
/// required columns are missing.
pub fn disclosure_rows(
    table: &Table,
    year: Option<i32>,
    quarter: Option<u8>,
) -> std::result::Result<Vec<DisclosureRow>, Vec<&'static str>> {
    let id_col = table.column(SRC_REGISTRY_ID);
    let amount_col = table.column(SRC_AMOUNT);
    let (id_col, amount_col) = match (id_col, amount_col) {
        (Some(i), Some(a)) => (i, a),
        _ => {
            let missing = [(SRC_REGISTRY_ID, id_col), (SRC_AMOUNT, amount_col)]
                .into_iter()
                .filter(|(_, idx)| idx.is_none())
                .map(|(name, _)| name)
                .collect();
            return Err(missing);
        }
    };

    Ok(table
        .rows
        .iter()
        .map(|row| DisclosureRow {
            registry_id: cell(row, id_col).trim().to_string(),
            year,
            quarter,
            amount: parse_number(cell(row, amount_col)),
        })
        .collect())
}

/// Read every file and consolidate the usable ones. Unreadable files and
/// files without the expected columns are skipped and reported.
#[instrument(skip(files), fields(count = files.len()))]
pub fn consolidate(files: &[PathBuf]) -> ExtractionReport {
    let mut report = ExtractionReport::default();

    for path in files {
        let outcome = table::read_tabular(path).map_err(|e| SkipReason::Unreadable(e.to_string())).and_then(|mut t| {
            t.normalize_headers();
            let (year, quarter) = period_from_file_name(path);
            disclosure_rows(&t, year, quarter).map_err(SkipReason::MissingColumns)
        });

        match outcome {
            Ok(rows) => {
                debug!(file = %path.display(), rows = rows.len(), "Consolidated");
                report.rows.extend(rows);
                report.files_used.push(path.clone());
            }
            Err(reason) => {
                warn!(file = %path.display(), reason = reason.label(), detail = ?reason, "Skipping file");
                metrics::file_skipped(reason.label());
                report.skipped.push(SkippedFile {
                    path: path.clone(),
                    reason,
                });
            }
        }
    }

    metrics::rows("extract", report.rows.len());
    info!(
        "Consolidated {} rows from {} files ({} skipped)",
        report.rows.len(),
        report.files_used.len(),
        report.skipped.len()
    );
    report
}

pub fn consolidated_table(rows: &[DisclosureRow]) -> Table {
    let mut table = Table::new(CONSOLIDATED_COLUMNS);
    for row in rows {
        table.push_row(vec![
            row.registry_id.clone(),
            format_optional(row.year),
            format_optional(row.quarter),
            format_optional(row.amount),
        ]);
    }
    table
}

/// Unpack, read and consolidate, writing the consolidated CSV.
pub fn extract_and_consolidate(archives: &[PathBuf], extract_dir: &Path, output: &Path) -> Result<ExtractionReport> {
    unpack_archives(archives, extract_dir)?;
    let files = list_tabular_files(extract_dir)?;
    info!("{} tabular files extracted", files.len());
    let report = consolidate(&files);
    table::write_csv(output, &consolidated_table(&report.rows))?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_from_legacy_name() {
        assert_eq!(period_from_file_name(Path::new("2009_1_trimestre.csv")), (Some(2009), Some(1)));
        assert_eq!(period_from_file_name(Path::new("2011-2-tri.txt")), (Some(2011), Some(2)));
    }

    #[test]
    fn period_from_modern_name() {
        assert_eq!(period_from_file_name(Path::new("1T2025.zip")), (Some(2025), Some(1)));
        assert_eq!(period_from_file_name(Path::new("dir/3t2024.csv")), (Some(2024), Some(3)));
    }

    #[test]
    fn period_missing_from_unrelated_name() {
        assert_eq!(period_from_file_name(Path::new("relatorio.csv")), (None, None));
    }

    #[test]
    fn rows_keep_unparseable_amounts_as_null() {
        let mut table = Table::new(["reg_ans", "cd_conta_contabil", "vl_saldo_final"]);
        table.push_row(vec![" 123 ".into(), "41".into(), "10,5".into()]);
        table.push_row(vec!["456".into(), "41".into(), "n/a".into()]);
        let rows = disclosure_rows(&table, Some(2024), Some(3)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].registry_id, "123");
        assert_eq!(rows[0].amount, Some(10.5));
        assert_eq!(rows[1].amount, None);
        assert_eq!(rows[1].quarter, Some(3));
    }

    #[test]
    fn missing_columns_are_named() {
        let table = Table::new(["reg_ans", "descricao"]);
        assert_eq!(disclosure_rows(&table, None, None).unwrap_err(), vec![SRC_AMOUNT]);
    }

    #[test]
    fn spreadsheet_sources_are_consolidated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2T2024.xlsx");
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "REG_ANS").unwrap();
        sheet.write_string(0, 1, "VL_SALDO_FINAL").unwrap();
        sheet.write_string(1, 0, "123").unwrap();
        sheet.write_number(1, 1, 10.5).unwrap();
        workbook.save(&path).unwrap();

        let files = list_tabular_files(dir.path()).unwrap();
        let report = consolidate(&files);
        assert!(report.skipped.is_empty());
        assert_eq!(
            report.rows,
            vec![DisclosureRow {
                registry_id: "123".into(),
                year: Some(2024),
                quarter: Some(2),
                amount: Some(10.5),
            }]
        );
    }

    #[test]
    fn consolidated_table_writes_nulls_as_empty() {
        let table = consolidated_table(&[DisclosureRow {
            registry_id: "1".into(),
            year: None,
            quarter: None,
            amount: Some(2.5),
        }]);
        assert_eq!(table.headers, CONSOLIDATED_COLUMNS);
        assert_eq!(table.rows[0], vec!["1", "", "", "2.5"]);
    }
}
