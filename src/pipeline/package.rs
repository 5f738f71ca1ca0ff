//! Zip packaging of the final outputs.

use crate::config::DataPaths;
use crate::error::{PipelineError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Write `files` into a new deflated archive at `dest`, each stored under its
/// file name.
pub fn zip_files(files: &[PathBuf], dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = ZipWriter::new(File::create(dest)?);
    for path in files {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::format(path, "file name is not valid utf-8"))?;
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        writer.start_file(name, options)?;
        io::copy(&mut File::open(path)?, &mut writer)?;
    }
    writer.finish()?;
    Ok(())
}

/// Zip the consolidated CSV next to the final outputs.
#[instrument(skip(paths))]
pub fn package_consolidated(paths: &DataPaths) -> Result<PathBuf> {
    let dest = paths.consolidated_zip();
    zip_files(&[paths.consolidated()], &dest)?;
    info!("Packaged {}", dest.display());
    Ok(dest)
}

/// Bundle the consolidated zip and the aggregated CSV, whichever exist.
#[instrument(skip(paths))]
pub fn package_bundle(paths: &DataPaths, bundle_name: &str) -> Result<PathBuf> {
    let candidates = [paths.consolidated_zip(), paths.aggregated()];
    let (present, missing): (Vec<PathBuf>, Vec<PathBuf>) = candidates.into_iter().partition(|p| p.is_file());
    for path in &missing {
        warn!(file = %path.display(), "Not found, left out of the bundle");
    }
    if present.is_empty() {
        return Err(PipelineError::Discovery("nothing to bundle".to_string()));
    }
    let dest = paths.final_dir.join(bundle_name);
    zip_files(&present, &dest)?;
    info!("Bundle written to {} ({} files)", dest.display(), present.len());
    Ok(dest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn member_names(path: &Path) -> Vec<String> {
        let archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn consolidated_csv_is_zipped_with_its_content() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        fs::create_dir_all(&paths.processed).unwrap();
        fs::write(paths.consolidated(), "RegistroANS,Ano,Trimestre,ValorDespesas\n1,2024,1,2.5\n").unwrap();

        let zip_path = package_consolidated(&paths).unwrap();
        let mut archive = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let mut content = String::new();
        archive.by_name("consolidado_despesas.csv").unwrap().read_to_string(&mut content).unwrap();
        assert!(content.ends_with("1,2024,1,2.5\n"));
    }

    #[test]
    fn bundle_takes_whatever_exists() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        fs::create_dir_all(&paths.final_dir).unwrap();
        fs::write(paths.aggregated(), "RazaoSocial,UF\n").unwrap();

        let bundle = package_bundle(&paths, "bundle.zip").unwrap();
        assert_eq!(member_names(&bundle), vec!["despesas_agregadas.csv"]);
    }

    #[test]
    fn empty_bundle_is_an_error() {
        let dir = TempDir::new().unwrap();
        let paths = DataPaths::new(dir.path());
        assert!(matches!(package_bundle(&paths, "bundle.zip"), Err(PipelineError::Discovery(_))));
    }
}
