#![allow(dead_code)]

use ans_pipeline::app::ports::HttpClientPort;
use ans_pipeline::error::{PipelineError, Result};
use ans_pipeline::types::DownloadedFile;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

pub const ROOT: &str = "http://ans.test/FTP/PDA/";

/// Serves canned listing pages and file bodies; anything else is a 404.
#[derive(Default)]
pub struct FakeHttp {
    pages: HashMap<String, String>,
    files: HashMap<String, Vec<u8>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, hrefs: &[&str]) -> Self {
        self.pages.insert(url.to_string(), listing(hrefs));
        self
    }

    pub fn file(mut self, url: &str, body: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), body);
        self
    }
}

fn not_found(url: &str) -> PipelineError {
    PipelineError::Network {
        url: url.to_string(),
        status: 404,
    }
}

#[async_trait]
impl HttpClientPort for FakeHttp {
    async fn get_text(&self, url: &str) -> Result<String> {
        self.pages.get(url).cloned().ok_or_else(|| not_found(url))
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadedFile> {
        let body = self.files.get(url).ok_or_else(|| not_found(url))?;
        std::fs::write(dest, body)?;
        Ok(DownloadedFile {
            url: url.to_string(),
            path: dest.to_path_buf(),
            bytes: body.len() as u64,
            sha256: hex::encode(Sha256::digest(body)),
            fetched_at: Utc::now(),
        })
    }
}

/// An Apache-style directory listing.
pub fn listing(hrefs: &[&str]) -> String {
    let mut html = String::from("<html><body><h1>Index</h1><pre><a href=\"../\">Parent Directory</a>\n");
    for href in hrefs {
        html.push_str(&format!("<a href=\"{href}\">{href}</a>  2024-05-01 10:00  1.2M\n"));
    }
    html.push_str("</pre></body></html>");
    html
}

/// An in-memory zip with the given members.
pub fn zip_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in members {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(body).unwrap();
    }
    writer.finish().unwrap().into_inner()
}
