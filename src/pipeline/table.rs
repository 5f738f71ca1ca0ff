//! Uniform in-memory table and the readers that produce it.
//!
//! Delimited text is read by trying an ordered list of (encoding, delimiter)
//! candidates; the first that decodes and parses wins and the last failure is
//! reported when none does. Spreadsheets go through calamine.

use crate::error::{PipelineError, Result};
use crate::metrics;
use calamine::{open_workbook_auto, Reader};
use csv::{ReaderBuilder, WriterBuilder};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static NON_ALNUM_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("column regex"));

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Index of a column that must exist; `table` names the input in the error.
    pub fn require(&self, name: &str, table: &str) -> Result<usize> {
        self.column(name).ok_or_else(|| PipelineError::schema(table, name))
    }

    pub fn normalize_headers(&mut self) {
        for header in &mut self.headers {
            *header = normalize_column_name(header);
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }
}

/// `cell` of `row`, or "" when the row is short.
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Lowercase, strip accents, collapse every non-alphanumeric run into `_`.
pub fn normalize_column_name(raw: &str) -> String {
    let lowered = raw.trim().trim_matches('"').to_lowercase();
    let stripped: String = lowered.nfkd().filter(|c| !is_combining_mark(*c)).collect();
    NON_ALNUM_RUN.replace_all(&stripped, "_").trim_matches('_').to_string()
}

/// Numeric coercion for amounts. Unparseable values are `None`.
///
/// A single decimal comma (`1234,56`) is accepted since the portal publishes
/// both conventions.
pub fn parse_number(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = s.parse::<f64>().ok().or_else(|| {
        if !s.contains('.') && s.matches(',').count() == 1 {
            s.replace(',', ".").parse::<f64>().ok()
        } else {
            None
        }
    })?;
    (!parsed.is_nan()).then_some(parsed)
}

pub fn format_number(value: f64) -> String {
    format!("{value}")
}

pub fn format_optional<T: fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    /// Read through windows-1252, the superset browsers and encoding_rs
    /// use for the latin-1 label.
    Latin1,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> Option<String> {
        match self {
            TextEncoding::Utf8 => {
                let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
                encoding_rs::UTF_8
                    .decode_without_bom_handling_and_without_replacement(body)
                    .map(|text| text.into_owned())
            }
            TextEncoding::Latin1 => {
                let (text, _) = encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes);
                Some(text.into_owned())
            }
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCandidate {
    pub encoding: TextEncoding,
    pub delimiter: u8,
}

impl fmt::Display for ReadCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/'{}'", self.encoding, self.delimiter as char)
    }
}

pub const READ_CANDIDATES: [ReadCandidate; 4] = [
    ReadCandidate { encoding: TextEncoding::Utf8, delimiter: b';' },
    ReadCandidate { encoding: TextEncoding::Utf8, delimiter: b',' },
    ReadCandidate { encoding: TextEncoding::Latin1, delimiter: b';' },
    ReadCandidate { encoding: TextEncoding::Latin1, delimiter: b',' },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

impl FileKind {
    pub fn of(path: &Path) -> Option<FileKind> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" | "txt" => Some(FileKind::Delimited),
            "xls" | "xlsx" => Some(FileKind::Spreadsheet),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Delimited => "delimited",
            FileKind::Spreadsheet => "spreadsheet",
        }
    }
}

/// Parse already-decoded text. Short rows are padded, long rows are an error.
pub fn parse_delimited(text: &str, delimiter: u8) -> std::result::Result<Table, String> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(|e| e.to_string())?.clone();
    let mut table = Table::new(headers.iter());
    let width = table.headers.len();

    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| e.to_string())?;
        if record.len() > width {
            return Err(format!("expected {} fields in line {}, saw {}", width, i + 2, record.len()));
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        table.push_row(row);
    }
    Ok(table)
}

fn try_candidate(bytes: &[u8], candidate: ReadCandidate) -> std::result::Result<Table, String> {
    let text = candidate
        .encoding
        .decode(bytes)
        .ok_or_else(|| format!("not valid {}", candidate.encoding))?;
    let table = parse_delimited(&text, candidate.delimiter)?;

    if table.headers.is_empty() {
        return Err("no header row".to_string());
    }
    // A lone column whose name carries another candidate delimiter was split
    // on the wrong character.
    if table.headers.len() == 1 {
        let header = &table.headers[0];
        if let Some(other) = READ_CANDIDATES
            .iter()
            .map(|c| c.delimiter)
            .find(|d| *d != candidate.delimiter && header.contains(*d as char))
        {
            return Err(format!("single column header contains '{}'", other as char));
        }
    }
    Ok(table)
}

/// Read a delimited text file with the first candidate that works.
pub fn read_delimited(path: &Path) -> Result<Table> {
    let bytes = fs::read(path)?;
    let mut last_error = String::from("no candidates tried");

    for candidate in READ_CANDIDATES {
        match try_candidate(&bytes, candidate) {
            Ok(table) => {
                debug!(file = %path.display(), candidate = %candidate, columns = table.headers.len(), "Parsed");
                return Ok(table);
            }
            Err(reason) => {
                debug!(file = %path.display(), candidate = %candidate, reason = %reason, "Candidate rejected");
                last_error = format!("{candidate}: {reason}");
            }
        }
    }
    Err(PipelineError::format(path, last_error))
}

/// First worksheet, first row as header.
pub fn read_spreadsheet(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PipelineError::format(path, "workbook has no sheets"))??;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(first) => first.iter().map(|c| c.to_string()).collect(),
        None => return Err(PipelineError::format(path, "empty worksheet")),
    };
    let mut table = Table::new(headers);
    let width = table.headers.len();
    for row in rows {
        let mut values: Vec<String> = row.iter().map(|c| c.to_string()).collect();
        values.resize(width, String::new());
        table.push_row(values);
    }
    Ok(table)
}

/// Dispatch on the file extension.
pub fn read_tabular(path: &Path) -> Result<Table> {
    let kind = FileKind::of(path).ok_or_else(|| PipelineError::format(path, "unsupported extension"))?;
    let table = match kind {
        FileKind::Delimited => read_delimited(path)?,
        FileKind::Spreadsheet => read_spreadsheet(path)?,
    };
    metrics::file_read(kind.label());
    Ok(table)
}

/// Read a stage output (UTF-8, comma separated). An empty file is an empty
/// table with no columns.
pub fn read_stage_csv(path: &Path) -> Result<Table> {
    let bytes = fs::read(path)?;
    let text = TextEncoding::Utf8
        .decode(&bytes)
        .ok_or_else(|| PipelineError::format(path, "stage output is not valid utf-8"))?;
    parse_delimited(&text, b',').map_err(|reason| PipelineError::format(path, reason))
}

/// Write `table` as UTF-8 CSV, creating parent directories.
pub fn write_csv(path: &Path, table: &Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = WriterBuilder::new().from_path(path)?;
    if !table.headers.is_empty() {
        writer.write_record(&table.headers)?;
    }
    for row in &table.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}
