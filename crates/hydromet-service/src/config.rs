//! Service configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Remote measurement service settings.
    pub source: SourceConfig,
    /// Scheduler and sync settings.
    pub sync: SyncConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        // Create parent directories if needed
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.source.validate());
        errors.extend(self.sync.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.bind.is_empty() {
            errors.push(ValidationError {
                field: "server.bind".to_string(),
                message: "bind address cannot be empty".to_string(),
            });
        } else {
            let parts: Vec<&str> = self.bind.rsplitn(2, ':').collect();
            if parts.len() != 2 {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!(
                        "invalid bind address '{}': expected format 'host:port'",
                        self.bind
                    ),
                });
            } else if parts[0].parse::<u16>().ok().filter(|p| *p != 0).is_none() {
                errors.push(ValidationError {
                    field: "server.bind".to_string(),
                    message: format!("invalid port '{}': must be a number 1-65535", parts[0]),
                });
            }
        }

        errors
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: hydromet_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "database path cannot be empty".to_string(),
            });
        }

        errors
    }
}

/// Remote measurement service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the measurement service.
    pub base_url: String,
    /// Per-request timeout in seconds.
    pub request_timeout: u64,
    /// Readings requested per page (the service caps this at 1000).
    pub page_size: u16,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:9090/data".to_string(),
            request_timeout: 30,
            page_size: 1000,
        }
    }
}

impl SourceConfig {
    /// Validate source configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.base_url.is_empty() {
            errors.push(ValidationError {
                field: "source.base_url".to_string(),
                message: "base URL cannot be empty".to_string(),
            });
        }

        if self.page_size == 0 || self.page_size > 1000 {
            errors.push(ValidationError {
                field: "source.page_size".to_string(),
                message: format!("page size {} must be within 1-1000", self.page_size),
            });
        }

        if self.request_timeout == 0 {
            errors.push(ValidationError {
                field: "source.request_timeout".to_string(),
                message: "request timeout cannot be 0".to_string(),
            });
        }

        errors
    }

    /// Per-request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }
}

/// Minimum claim timeout in seconds.
pub const MIN_CLAIM_TIMEOUT: u64 = 30;

/// Scheduler and sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between syncs of the same sensor.
    pub update_interval: u64,
    /// Seconds to idle when every concurrency slot is busy.
    pub idle_backoff: u64,
    /// Maximum sensors synchronized concurrently by this process.
    pub max_concurrent: usize,
    /// Seconds before a stuck claim is forcibly reclaimed.
    pub claim_timeout: u64,
    /// Seconds between coarse claim resets (crash recovery safety net).
    pub reset_interval: u64,
    /// Lookback in seconds for sensors with no baseline; when absent such
    /// sensors fail their sync with a no-baseline error instead.
    pub default_lookback: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            update_interval: 4 * 3600,
            idle_backoff: 10,
            max_concurrent: 5,
            claim_timeout: 300,
            reset_interval: 6 * 3600,
            default_lookback: None,
        }
    }
}

impl SyncConfig {
    /// Validate sync configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.update_interval == 0 {
            errors.push(ValidationError {
                field: "sync.update_interval".to_string(),
                message: "update interval cannot be 0".to_string(),
            });
        }

        if self.max_concurrent == 0 {
            errors.push(ValidationError {
                field: "sync.max_concurrent".to_string(),
                message: "concurrency ceiling cannot be 0".to_string(),
            });
        }

        if self.claim_timeout < MIN_CLAIM_TIMEOUT {
            errors.push(ValidationError {
                field: "sync.claim_timeout".to_string(),
                message: format!(
                    "claim timeout {} is too short (minimum {} seconds)",
                    self.claim_timeout, MIN_CLAIM_TIMEOUT
                ),
            });
        }

        if self.reset_interval < self.claim_timeout {
            errors.push(ValidationError {
                field: "sync.reset_interval".to_string(),
                message: "reset interval cannot be shorter than the claim timeout".to_string(),
            });
        }

        errors
    }

    /// Staleness threshold for selecting sensors.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval)
    }

    /// Backoff while the worker pool is full.
    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff)
    }

    /// Deadline after which an in-flight claim is reclaimed.
    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout)
    }

    /// Cadence of the coarse claim reset.
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval)
    }

    /// Window lookback for sensors without a baseline.
    pub fn default_lookback(&self) -> Option<Duration> {
        self.default_lookback.map(Duration::from_secs)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `sync.claim_timeout`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hydromet")
        .join("service.toml")
}
