//! Sequential stage runner. Every stage reads the files the previous one
//! wrote under the data directory, so a run can resume at any stage.

use crate::apis::fetcher::{self, FetchManifest};
use crate::apis::{catalog, registry};
use crate::app::ports::HttpClientPort;
use crate::config::{DataPaths, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::metrics;
use crate::pipeline::extract::{self, ExtractionReport};
use crate::pipeline::table::Table;
use crate::pipeline::{aggregate, enrich, package, validate};
use crate::types::{Aggregate, CatalogEntry};
use clap::ValueEnum;
use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, info_span, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Stage {
    Fetch,
    Extract,
    Enrich,
    Validate,
    Aggregate,
    Package,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Fetch,
        Stage::Extract,
        Stage::Enrich,
        Stage::Validate,
        Stage::Aggregate,
        Stage::Package,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Extract => "extract",
            Stage::Enrich => "enrich",
            Stage::Validate => "validate",
            Stage::Aggregate => "aggregate",
            Stage::Package => "package",
        }
    }

    /// This stage and every later one, in order.
    pub fn and_later(self) -> impl Iterator<Item = Stage> {
        Self::ALL.into_iter().filter(move |s| *s >= self)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Counts gathered while running; stages that did not run stay `None`.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub archives: Option<usize>,
    pub consolidated_rows: Option<usize>,
    pub skipped_files: Option<usize>,
    pub enriched_rows: Option<usize>,
    pub validated_rows: Option<usize>,
    pub groups: Option<usize>,
    pub bundle: Option<PathBuf>,
}

pub struct Orchestrator<'a> {
    http: &'a dyn HttpClientPort,
    config: &'a PipelineConfig,
    paths: DataPaths,
}

impl<'a> Orchestrator<'a> {
    pub fn new(http: &'a dyn HttpClientPort, config: &'a PipelineConfig) -> Self {
        Self {
            http,
            config,
            paths: config.paths(),
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Run `from` and every stage after it.
    pub async fn run_from(&self, from: Stage) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        for stage in from.and_later() {
            self.run_stage(stage, &mut summary)
                .instrument(info_span!("stage", name = stage.name()))
                .await?;
        }
        Ok(summary)
    }

    /// Run a single stage against the files already on disk.
    pub async fn run_stage(&self, stage: Stage, summary: &mut RunSummary) -> Result<()> {
        let started = Instant::now();
        info!("Starting stage {}", stage);
        match stage {
            Stage::Fetch => summary.archives = Some(self.fetch().await?.files.len()),
            Stage::Extract => {
                let report = self.extract()?;
                summary.consolidated_rows = Some(report.rows.len());
                summary.skipped_files = Some(report.skipped.len());
            }
            Stage::Enrich => summary.enriched_rows = Some(self.enrich()?.len()),
            Stage::Validate => summary.validated_rows = Some(self.validate()?.len()),
            Stage::Aggregate => summary.groups = Some(self.aggregate()?.len()),
            Stage::Package => summary.bundle = Some(self.package()?),
        }
        let secs = started.elapsed().as_secs_f64();
        metrics::stage_duration(stage.name(), secs);
        info!("Stage {} finished in {:.2}s", stage, secs);
        Ok(())
    }

    /// Catalog entries for the most recent quarters. Nothing found is fatal.
    pub async fn scan(&self) -> Result<Vec<CatalogEntry>> {
        let source = &self.config.source;
        let entries = catalog::scan_catalog(self.http, &source.root_url, &source.disclosure_folder).await?;
        if entries.is_empty() {
            return Err(PipelineError::Discovery(format!(
                "no quarterly archives found under {}{}",
                source.root_url, source.disclosure_folder
            )));
        }
        Ok(entries)
    }

    /// Download the selected archives and the operator registry, then write
    /// the run manifest.
    pub async fn fetch(&self) -> Result<FetchManifest> {
        let entries = self.scan().await?;
        let urls: Vec<String> = entries.into_iter().map(|e| e.remote_url).collect();
        let manifest = fetcher::fetch_all(self.http, &urls, &self.paths.raw).await?;
        manifest.save(&self.paths.manifest())?;

        let source = &self.config.source;
        registry::download_registry(self.http, &source.root_url, &source.registry_folder, &self.paths.registry())
            .await?;
        Ok(manifest)
    }

    /// Unpack the archives listed in the manifest into a fresh extraction
    /// directory and write the consolidated table.
    pub fn extract(&self) -> Result<ExtractionReport> {
        let manifest = FetchManifest::load(&self.paths.manifest())?;
        if self.paths.extracted.exists() {
            fs::remove_dir_all(&self.paths.extracted)?;
        }
        let report =
            extract::extract_and_consolidate(&manifest.paths(&self.paths.raw), &self.paths.extracted, &self.paths.consolidated())?;
        if report.rows.is_empty() {
            return Err(PipelineError::Discovery(format!(
                "no disclosure rows in {} extracted files ({} skipped)",
                report.files_used.len() + report.skipped.len(),
                report.skipped.len()
            )));
        }
        Ok(report)
    }

    pub fn enrich(&self) -> Result<Table> {
        enrich::enrich_files(&self.paths.consolidated(), &self.paths.registry(), &self.paths.enriched())
    }

    pub fn validate(&self) -> Result<Table> {
        validate::validate_file(&self.paths.enriched(), &self.paths.validated())
    }

    pub fn aggregate(&self) -> Result<Vec<Aggregate>> {
        aggregate::aggregate_file(&self.paths.validated(), &self.paths.aggregated())
    }

    pub fn package(&self) -> Result<PathBuf> {
        package::package_consolidated(&self.paths)?;
        package::package_bundle(&self.paths, &self.config.storage.bundle_name)
    }
}
