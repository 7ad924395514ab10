// crates/autoschema-store-sqlite/src/config.rs
// ============================================================================
// Module: SQLite Store Configuration
// Description: `[sqlite]` connector settings and the top-level config file.
// Purpose: Load and validate everything needed to open a SQLite-backed store.
// Dependencies: autoschema-core, serde
// ============================================================================

//! ## Overview
//! A config file has three sections: `[store]` and `[log]` from the core
//! crate, and `[sqlite]` defined here. Loading enforces the core size limit,
//! parses strictly, and validates every section before returning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use autoschema_core::ConfigError;
use autoschema_core::LogConfig;
use autoschema_core::StoreConfig;
use autoschema_core::config::load_toml_file;
use autoschema_core::config::parse_toml_str;
use serde::Deserialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Pragmas
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

// ============================================================================
// SECTION: Connector Section
// ============================================================================

/// `[sqlite]` section: where database files live and how they are opened.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteConnectorConfig {
    /// Directory holding one `<database>.sqlite3` file per database.
    pub data_dir: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteConnectorConfig {
    /// Creates a config with default pragmas for `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }

    /// Validates the data directory path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for empty, overlong, or non-directory paths.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("sqlite data_dir must be non-empty".to_string()));
        }
        validate_data_dir(&self.data_dir).map_err(ConfigError::Invalid)
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Checks data directory length limits and that it is not a file.
pub(crate) fn validate_data_dir(path: &Path) -> Result<(), String> {
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err("sqlite data_dir exceeds length limit".to_string());
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err("sqlite data_dir contains an overlong component".to_string());
        }
    }
    if path.exists() && !path.is_dir() {
        return Err("sqlite data_dir must be a directory, not a file".to_string());
    }
    Ok(())
}

// ============================================================================
// SECTION: Config File
// ============================================================================

/// Complete configuration for a `SQLite`-backed store.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Engine-agnostic store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Connector settings.
    pub sqlite: SqliteConnectorConfig,
    /// Logging settings.
    #[serde(default)]
    pub log: LogConfig,
}

impl SqliteStoreConfig {
    /// Default settings rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig::default(),
            sqlite: SqliteConnectorConfig::new(data_dir),
            log: LogConfig::default(),
        }
    }

    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config: Self = load_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the text cannot be parsed or validated.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_toml_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.sqlite.validate()?;
        self.log.validate()
    }
}
