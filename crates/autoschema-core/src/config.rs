// crates/autoschema-core/src/config.rs
// ============================================================================
// Module: Store Configuration
// Description: Engine-agnostic store and logging configuration sections.
// Purpose: Deserialize and validate the `[store]` and `[log]` TOML sections.
// Dependencies: serde, toml, crate::log
// ============================================================================

//! ## Overview
//! Backends embed [`StoreConfig`] and [`LogConfig`] in their own top-level
//! config and load it through [`load_toml_file`], which enforces a size limit
//! and UTF-8 before parsing. Every section validates itself; invalid values
//! fail closed with [`ConfigError::Invalid`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::log::FileLogSink;
use crate::log::NoopLogSink;
use crate::log::StderrLogSink;
use crate::log::StoreLogLevel;
use crate::log::StoreLogSink;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum configuration file size in bytes.
pub const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum configured table prefix length.
const MAX_TABLE_PREFIX_LENGTH: usize = 32;
/// Maximum number of configured table name translations.
const MAX_TABLE_NAME_TRANSLATIONS: usize = 256;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Reads and parses a TOML config file with the size limit applied.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, is too large, is not
/// UTF-8, or does not parse.
pub fn load_toml_file<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let bytes = fs::read(path).map_err(|err| ConfigError::Io(err.to_string()))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
    }
    let content = std::str::from_utf8(&bytes)
        .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
    parse_toml_str(content)
}

/// Parses TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] when the text does not deserialize.
pub fn parse_toml_str<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    if content.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid("config exceeds size limit".to_string()));
    }
    toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
}

// ============================================================================
// SECTION: Store Section
// ============================================================================

/// When buffered rows are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit once the uncommitted row count reaches `commit_interval`.
    #[default]
    Interval,
    /// Commit after every write call.
    EveryWrite,
}

/// `[store]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Target database name.
    #[serde(default = "default_database")]
    pub database: String,
    /// Rows buffered before an automatic commit.
    #[serde(default = "default_commit_interval")]
    pub commit_interval: u64,
    /// Commit policy.
    #[serde(default)]
    pub commit_policy: CommitPolicy,
    /// Prefix prepended to every table name.
    #[serde(default)]
    pub table_prefix: String,
    /// Extra table name remaps applied after the built-in ones.
    #[serde(default)]
    pub table_name_translations: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            commit_interval: default_commit_interval(),
            commit_policy: CommitPolicy::default(),
            table_prefix: String::new(),
            table_name_translations: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    /// Validates the store section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.trim().is_empty() {
            return Err(ConfigError::Invalid("store database must be non-empty".to_string()));
        }
        if self.commit_interval == 0 {
            return Err(ConfigError::Invalid(
                "store commit_interval must be greater than zero".to_string(),
            ));
        }
        if self.table_prefix.len() > MAX_TABLE_PREFIX_LENGTH {
            return Err(ConfigError::Invalid("store table_prefix is too long".to_string()));
        }
        if self.table_name_translations.len() > MAX_TABLE_NAME_TRANSLATIONS {
            return Err(ConfigError::Invalid(
                "store table_name_translations has too many entries".to_string(),
            ));
        }
        for (from, to) in &self.table_name_translations {
            if from.trim().is_empty() || to.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "store table_name_translations entries must be non-empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Default target database name.
fn default_database() -> String {
    "signals".to_string()
}

/// Default commit interval.
const fn default_commit_interval() -> u64 {
    50
}

// ============================================================================
// SECTION: Log Section
// ============================================================================

/// Log sink selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogSinkKind {
    /// Discard events.
    None,
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `path`.
    File,
}

/// `[log]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LogConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: LogSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Minimum level emitted.
    #[serde(default)]
    pub min_level: StoreLogLevel,
}

impl LogConfig {
    /// Validates the log section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the file sink has no path or a
    /// non-file sink sets one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (LogSinkKind::File, None) => {
                Err(ConfigError::Invalid("file log sink requires path".to_string()))
            }
            (LogSinkKind::None | LogSinkKind::Stderr, Some(_)) => {
                Err(ConfigError::Invalid("log path is only valid for the file sink".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Builds the configured sink.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the log file cannot be opened.
    pub fn build(&self) -> Result<Arc<dyn StoreLogSink>, ConfigError> {
        self.validate()?;
        let sink: Arc<dyn StoreLogSink> = match (self.sink, &self.path) {
            (LogSinkKind::File, Some(path)) => Arc::new(
                FileLogSink::new(path, self.min_level)
                    .map_err(|err| ConfigError::Io(err.to_string()))?,
            ),
            (LogSinkKind::Stderr, _) => Arc::new(StderrLogSink::new(self.min_level)),
            _ => Arc::new(NoopLogSink),
        };
        Ok(sink)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
