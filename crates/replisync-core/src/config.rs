//! Configuration module for Replisync.
//!
//! Provides typed configuration structs that map to the optional YAML
//! configuration file, with loading, validation, defaults, and a builder
//! pattern for programmatic use. Command-line flags are layered on top of
//! this by the daemon.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::pass::CompareMode;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Replisync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
}

/// Mirroring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Root of the authoritative tree. Required, usually given on the command line.
    pub source: Option<PathBuf>,
    /// Root of the mirror tree. Required, usually given on the command line.
    pub replica: Option<PathBuf>,
    /// Minutes between the end of one pass and the start of the next.
    pub interval_minutes: u64,
    /// How to decide whether a source file needs copying.
    pub compare: CompareMode,
    /// Remove replica directories that have no counterpart in source.
    pub prune_directories: bool,
    /// When set, consecutive failures back off exponentially up to this many minutes.
    pub backoff_max_minutes: Option<u64>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file. Records are appended.
    pub file: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/replisync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("replisync")
            .join("config.yaml")
    }
}

impl SyncConfig {
    /// Delay between passes.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }

    /// Upper bound for the backoff delay, if backoff is enabled.
    pub fn backoff_cap(&self) -> Option<Duration> {
        self.backoff_max_minutes
            .map(|m| Duration::from_secs(m.saturating_mul(60)))
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source: None,
            replica: None,
            interval_minutes: 30,
            compare: CompareMode::Always,
            prune_directories: true,
            backoff_max_minutes: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: PathBuf::from("sync_log.txt"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"sync.interval_minutes"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid. Whether the source
    /// root exists is checked by the reconciler, not here.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- sync ---
        if self.sync.source.is_none() {
            errors.push(ValidationError {
                field: "sync.source".into(),
                message: "is required".into(),
            });
        }
        if self.sync.replica.is_none() {
            errors.push(ValidationError {
                field: "sync.replica".into(),
                message: "is required".into(),
            });
        }
        if self.sync.interval_minutes == 0 {
            errors.push(ValidationError {
                field: "sync.interval_minutes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if let Some(max) = self.sync.backoff_max_minutes {
            if max < self.sync.interval_minutes {
                errors.push(ValidationError {
                    field: "sync.backoff_max_minutes".into(),
                    message: format!(
                        "backoff_max_minutes ({max}) must not be less than interval_minutes ({})",
                        self.sync.interval_minutes
                    ),
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if self.logging.file.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "logging.file".into(),
                message: "must not be empty".into(),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] (or an existing config) and allows
/// selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use replisync_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_source(PathBuf::from("/data/source"))
///     .sync_replica(PathBuf::from("/backup/replica"))
///     .sync_interval_minutes(5)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Create a builder that overrides values of an already loaded config.
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // --- sync ---

    pub fn sync_source(mut self, source: PathBuf) -> Self {
        self.config.sync.source = Some(source);
        self
    }

    pub fn sync_replica(mut self, replica: PathBuf) -> Self {
        self.config.sync.replica = Some(replica);
        self
    }

    pub fn sync_interval_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.interval_minutes = minutes;
        self
    }

    pub fn sync_compare(mut self, mode: CompareMode) -> Self {
        self.config.sync.compare = mode;
        self
    }

    pub fn sync_prune_directories(mut self, prune: bool) -> Self {
        self.config.sync.prune_directories = prune;
        self
    }

    pub fn sync_backoff_max_minutes(mut self, minutes: u64) -> Self {
        self.config.sync.backoff_max_minutes = Some(minutes);
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
