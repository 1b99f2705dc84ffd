//! Process configuration, loaded from `tessclean.toml` with built-in
//! defaults for every field.

use serde::Deserialize;
use std::path::Path;

use crate::error::PipelineError;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_working_db")]
    pub working_db: String,
    #[serde(default = "default_reference_db")]
    pub reference_db: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            working_db: default_working_db(),
            reference_db: default_reference_db(),
        }
    }
}

fn default_working_db() -> String {
    "./working.db".to_string()
}

fn default_reference_db() -> String {
    "./reference.db".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_tolerance_percent")]
    pub default_tolerance_percent: u8,
    #[serde(default = "default_batch_size_bulk")]
    pub batch_size_bulk: usize,
    #[serde(default = "default_batch_size_reference_ok")]
    pub batch_size_reference_ok: usize,
    #[serde(default = "default_batch_size_reference_reject")]
    pub batch_size_reference_reject: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_tolerance_percent: default_tolerance_percent(),
            batch_size_bulk: default_batch_size_bulk(),
            batch_size_reference_ok: default_batch_size_reference_ok(),
            batch_size_reference_reject: default_batch_size_reference_reject(),
        }
    }
}

fn default_tolerance_percent() -> u8 {
    10
}

fn default_batch_size_bulk() -> usize {
    50_000
}

fn default_batch_size_reference_ok() -> usize {
    1_000
}

fn default_batch_size_reference_reject() -> usize {
    10_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
        }
    }
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load config from a TOML file. Returns defaults if the file doesn't exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_absent() {
        let cfg = AppConfig::load("/nonexistent/tessclean.toml").unwrap();
        assert_eq!(cfg.pipeline.default_tolerance_percent, 10);
        assert_eq!(cfg.pipeline.batch_size_bulk, 50_000);
    }

    #[test]
    fn parses_partial_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tessclean.toml");
        std::fs::write(&path, "[pipeline]\ndefault_tolerance_percent = 25\n").unwrap();
        let cfg = AppConfig::load(&path).unwrap();
        assert_eq!(cfg.pipeline.default_tolerance_percent, 25);
        assert_eq!(cfg.pipeline.batch_size_bulk, 50_000);
        assert_eq!(cfg.store.working_db, "./working.db");
    }
}
