use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Expected remote structure (folder link, registry file) was not found.
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Request to {url} failed with status {status}")]
    Network { url: String, status: u16 },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A single tabular file could not be read under any candidate.
    #[error("Unreadable file {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("Missing required column '{column}' in {table}")]
    Schema { table: String, column: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP server error: {0}")]
    Server(#[from] hyper::Error),
}

impl PipelineError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipelineError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn schema(table: impl Into<String>, column: impl Into<String>) -> Self {
        PipelineError::Schema {
            table: table.into(),
            column: column.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
