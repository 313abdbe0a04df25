use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use studyroom_client::ClientConfig;
use studyroom_surrealdb::StoreConfig;
use thiserror::Error;
use tracing::debug;

const CONFIG_DIR: &str = "studyroom";
const CONFIG_FILE: &str = "config.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level filter; `RUST_LOG` takes precedence
    pub level: String,

    /// Directory for daily-rolling log files. Logs go to stderr when unset.
    pub directory: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), directory: None }
    }
}

/// Application configuration, read from `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub client: ClientConfig,
    pub log: LogConfig,
}

impl AppConfig {
    /// `$XDG_CONFIG_HOME/studyroom/config.toml` or the platform equivalent
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Loads `path` if given, otherwise the default location.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                },
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let config = toml::from_str(&contents)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate().map_err(|e| ConfigError::Invalid {
            field: "store".to_string(),
            message: e.to_string(),
        })?;

        if self.client.update_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "client.update_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.log.level.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "log.level".to_string(),
                message: "cannot be empty".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use studyroom_surrealdb::StorageEngine;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_empty_file_gives_defaults() {
        let file = write_config("");
        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.store.engine, StorageEngine::Memory);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let file = write_config(
            r#"
            [store]
            engine = "surrealkv"
            path = "/tmp/studyroom.db"

            [log]
            level = "debug"
            "#,
        );

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.store.engine, StorageEngine::SurrealKv);
        assert_eq!(config.store.path.as_deref(), Some("/tmp/studyroom.db"));
        assert_eq!(config.store.namespace, "studyroom");
        assert_eq!(config.client, ClientConfig::default());
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.log.directory, None);
    }

    #[test]
    fn test_invalid_store_is_rejected() {
        let file = write_config("[store]\nengine = \"remote\"\n");
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_unknown_engine_is_a_parse_error() {
        let file = write_config("[store]\nengine = \"tikv\"\n");
        let err = AppConfig::load(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
