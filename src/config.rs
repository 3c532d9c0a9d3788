use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::{ProcessorOptions, WatcherOptions};

/// Application-level constants
pub const APP_NAME: &str = "ClaimsGed";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_DRAIN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EXTRACTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EXTENSIONS: &[&str] = &["pdf"];

pub const ENV_WATCH_DIR: &str = "CLAIMS_GED_WATCH_DIR";
pub const ENV_DB_PATH: &str = "CLAIMS_GED_DB_PATH";

/// Default `tracing` filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "claims_ged=info"
}

/// Get the application data directory
/// ~/ClaimsGed/ on all platforms; the working directory if no home is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default watched inbox
pub fn default_watch_dir() -> PathBuf {
    app_data_dir().join("inbox")
}

/// Default SQLite database location
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("ged.db")
}

/// Config file read when no explicit path is given
pub fn default_config_path() -> PathBuf {
    app_data_dir().join("config.toml")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Ingestion settings. Every field is optional in the TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub watch_dir: PathBuf,
    pub database_path: PathBuf,
    pub recursive: bool,
    pub extensions: Vec<String>,
    pub debounce_ms: u64,
    pub workers: usize,
    pub queue_capacity: usize,
    pub extraction_timeout_secs: u64,
    pub drain_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            watch_dir: default_watch_dir(),
            database_path: default_database_path(),
            recursive: true,
            extensions: DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            extraction_timeout_secs: DEFAULT_EXTRACTION_TIMEOUT_SECS,
            drain_timeout_secs: DEFAULT_DRAIN_TIMEOUT_SECS,
        }
    }
}

impl IngestConfig {
    /// Load from `path` (must exist) or from the default config file (optional),
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None => {
                let default_path = default_config_path();
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    /// Environment wins over the file. `lookup` is injectable for tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(ENV_WATCH_DIR).filter(|v| !v.trim().is_empty()) {
            self.watch_dir = PathBuf::from(dir);
        }
        if let Some(db) = lookup(ENV_DB_PATH).filter(|v| !v.trim().is_empty()) {
            self.database_path = PathBuf::from(db);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("queue_capacity must be at least 1".into()));
        }
        if self.extraction_timeout_secs == 0 || self.drain_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        Ok(())
    }

    pub fn processor_options(&self) -> ProcessorOptions {
        ProcessorOptions {
            extraction_timeout: Duration::from_secs(self.extraction_timeout_secs),
            extraction_slots: self.workers,
        }
    }

    pub fn watcher_options(&self) -> WatcherOptions {
        WatcherOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            queue_capacity: self.queue_capacity,
            workers: self.workers,
            drain_timeout: Duration::from_secs(self.drain_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_is_named_after_app() {
        assert!(app_data_dir().ends_with("ClaimsGed"));
        assert!(default_database_path().starts_with(app_data_dir()));
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = IngestConfig::default();
        assert!(config.recursive);
        assert_eq!(config.extensions, vec!["pdf"]);
        assert_eq!(config.debounce_ms, 2_000);
        assert_eq!(config.workers, 4);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.drain_timeout_secs, 30);
        assert_eq!(config.extraction_timeout_secs, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = IngestConfig::from_toml_str(
            r#"
            watch_dir = "/srv/scans"
            extensions = ["pdf", "txt"]
            workers = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.watch_dir, PathBuf::from("/srv/scans"));
        assert_eq!(config.extensions, vec!["pdf", "txt"]);
        assert_eq!(config.workers, 2);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[test]
    fn malformed_toml_is_rejected() {
        assert!(IngestConfig::from_toml_str("workers = \"many\"").is_err());
    }

    #[test]
    fn env_overrides_paths() {
        let mut config = IngestConfig::default();
        config.apply_env_overrides(|key| match key {
            ENV_WATCH_DIR => Some("/env/inbox".into()),
            ENV_DB_PATH => Some("  ".into()),
            _ => None,
        });
        assert_eq!(config.watch_dir, PathBuf::from("/env/inbox"));
        assert_eq!(config.database_path, default_database_path());
    }

    #[test]
    fn zero_workers_is_invalid() {
        let config = IngestConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn from_file_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = IngestConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn options_carry_durations() {
        let config = IngestConfig {
            debounce_ms: 250,
            drain_timeout_secs: 5,
            workers: 3,
            ..Default::default()
        };
        assert_eq!(config.watcher_options().debounce, Duration::from_millis(250));
        assert_eq!(config.watcher_options().drain_timeout, Duration::from_secs(5));
        assert_eq!(
            config.processor_options().extraction_timeout,
            Duration::from_secs(DEFAULT_EXTRACTION_TIMEOUT_SECS)
        );
        assert_eq!(config.processor_options().extraction_slots, 3);
    }
}
