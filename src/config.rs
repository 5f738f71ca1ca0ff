use crate::constants;
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub storage: StorageConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub root_url: String,
    pub disclosure_folder: String,
    pub registry_folder: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub bundle_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            storage: StorageConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            root_url: constants::DEFAULT_ROOT_URL.to_string(),
            disclosure_folder: constants::DISCLOSURE_FOLDER.to_string(),
            registry_folder: constants::REGISTRY_FOLDER.to_string(),
            timeout_seconds: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_dir: PathBuf::from("logs"),
            bundle_name: constants::DEFAULT_BUNDLE_FILE.to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

impl PipelineConfig {
    /// Load from `path` (or `config.toml` when present), then apply `ANS_*`
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_PATH))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("ANS_ROOT_URL") {
            self.source.root_url = v;
        }
        if let Some(v) = lookup("ANS_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANS_LOG_DIR") {
            self.storage.log_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("ANS_HTTP_TIMEOUT_SECS") {
            self.source.timeout_seconds = v
                .trim()
                .parse()
                .map_err(|_| PipelineError::Config(format!("ANS_HTTP_TIMEOUT_SECS is not a number: {v}")))?;
        }
        if let Some(v) = lookup("ANS_API_PORT") {
            self.api.port = v
                .trim()
                .parse()
                .map_err(|_| PipelineError::Config(format!("ANS_API_PORT is not a port: {v}")))?;
        }
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.storage.data_dir)
    }
}

/// Directory layout under the data root; every stage reads and writes here.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub raw: PathBuf,
    pub extracted: PathBuf,
    pub processed: PathBuf,
    pub final_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            raw: data_dir.join("raw"),
            extracted: data_dir.join("extracted"),
            processed: data_dir.join("processed"),
            final_dir: data_dir.join("final"),
        }
    }

    pub fn manifest(&self) -> PathBuf {
        self.raw.join(constants::MANIFEST_FILE)
    }

    pub fn consolidated(&self) -> PathBuf {
        self.processed.join(constants::CONSOLIDATED_FILE)
    }

    pub fn registry(&self) -> PathBuf {
        self.processed.join(constants::REGISTRY_FILE)
    }

    pub fn enriched(&self) -> PathBuf {
        self.processed.join(constants::ENRICHED_FILE)
    }

    pub fn validated(&self) -> PathBuf {
        self.processed.join(constants::VALIDATED_FILE)
    }

    pub fn aggregated(&self) -> PathBuf {
        self.final_dir.join(constants::AGGREGATED_FILE)
    }

    pub fn consolidated_zip(&self) -> PathBuf {
        self.final_dir.join(constants::CONSOLIDATED_ZIP_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_point_at_the_ans_portal() {
        let config = PipelineConfig::default();
        assert_eq!(config.source.root_url, constants::DEFAULT_ROOT_URL);
        assert_eq!(config.source.disclosure_folder, "demonstracoes_contabeis");
        assert_eq!(config.api.port, 8000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [storage]
            data_dir = "/tmp/ans"
            "#,
        )
        .unwrap();
        assert_eq!(config.storage.data_dir, PathBuf::from("/tmp/ans"));
        assert_eq!(config.storage.log_dir, PathBuf::from("logs"));
        assert_eq!(config.source.timeout_seconds, 300);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [("ANS_ROOT_URL", "http://localhost/"), ("ANS_API_PORT", "9000")]
            .into_iter()
            .collect();
        let mut config = PipelineConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.source.root_url, "http://localhost/");
        assert_eq!(config.api.port, 9000);
    }

    #[test]
    fn bad_port_is_a_config_error() {
        let mut config = PipelineConfig::default();
        let err = config
            .apply_env(|k| (k == "ANS_API_PORT").then(|| "abc".to_string()))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }

    #[test]
    fn data_paths_layout() {
        let paths = DataPaths::new(Path::new("data"));
        assert_eq!(paths.consolidated(), PathBuf::from("data/processed/consolidado_despesas.csv"));
        assert_eq!(paths.aggregated(), PathBuf::from("data/final/despesas_agregadas.csv"));
    }
}
