//! Configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration, usually loaded from `docmodel.yml`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `tracing_subscriber` filter directive, e.g. `docmodel_core=debug`
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default = "default_true")]
    pub with_target: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentsConfig {
    /// Root reads ask the repository whether a cached document is outdated
    #[serde(default = "default_true")]
    pub check_staleness_on_read: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            with_target: true,
        }
    }
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            check_staleness_on_read: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(contents)?;
        if config.logging.filter.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.filter must not be empty".to_string()));
        }
        Ok(config)
    }

    /// Get a nested config value using dotted path (e.g., "logging.filter")
    pub fn get(&self, key: &str) -> Option<String> {
        let parts: Vec<&str> = key.split('.').collect();
        match parts.as_slice() {
            ["logging", "filter"] => Some(self.logging.filter.clone()),
            ["logging", "with_target"] => Some(self.logging.with_target.to_string()),
            ["documents", "check_staleness_on_read"] => {
                Some(self.documents.check_staleness_on_read.to_string())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.logging.filter, "info");
        assert!(config.logging.with_target);
        assert!(config.documents.check_staleness_on_read);
        assert_eq!(EngineConfig::from_yaml_str("").unwrap(), config);
    }

    #[test]
    fn test_partial_yaml() {
        let config = EngineConfig::from_yaml_str(
            "documents:\n  check_staleness_on_read: false\n",
        )
        .unwrap();
        assert!(!config.documents.check_staleness_on_read);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.get("documents.check_staleness_on_read").as_deref(), Some("false"));
        assert_eq!(config.get("documents.unknown"), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "logging:\n  filter: \"docmodel_core=debug\"\n  with_target: false"
        )
        .unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.get("logging.filter").as_deref(), Some("docmodel_core=debug"));
        assert!(!config.logging.with_target);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            EngineConfig::from_file("/nonexistent/docmodel.yml"),
            Err(ConfigError::ReadError(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("logging: [1, 2"),
            Err(ConfigError::ParseError(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml_str("logging:\n  filter: \"\"\n"),
            Err(ConfigError::Invalid(_))
        ));
    }
}
