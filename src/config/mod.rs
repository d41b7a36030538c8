//! Configuration management.
//!
//! Settings come from, in increasing precedence: built-in defaults, a TOML
//! file, `FLOODGATE_*` environment variables, and CLI flags.
//!
//! ```toml
//! store = "sqlite"
//! db_path = "/var/lib/floodgate/dedup.db"
//!
//! [observability.logging]
//! format = "json"
//! level = "info"
//!
//! [observability.metrics]
//! enabled = true
//! port = 9090
//! ```

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable selecting the store backend.
pub const ENV_STORE: &str = "FLOODGATE_STORE";
/// Environment variable setting the `SQLite` database path.
pub const ENV_DB_PATH: &str = "FLOODGATE_DB_PATH";

const DB_FILE_NAME: &str = "dedup.db";

/// Main configuration for floodgate.
#[derive(Debug, Clone)]
pub struct FloodgateConfig {
    /// Store backend.
    pub store: StoreKind,
    /// Database path, used by the `SQLite` backend.
    pub db_path: PathBuf,
    /// Logging and metrics settings, resolved by [`crate::observability`].
    pub observability: ObservabilitySettings,
}

/// Available store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// In-process `BTreeMap`; forgets everything on exit.
    Memory,
    /// `SQLite` database file.
    #[default]
    Sqlite,
}

impl StoreKind {
    /// Returns the backend name as used in config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Sqlite => "sqlite",
        }
    }
}

impl FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            other => Err(Error::InvalidInput(format!(
                "unknown store '{other}', expected 'memory' or 'sqlite'"
            ))),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observability section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ObservabilitySettings {
    /// Logging settings.
    pub logging: Option<LoggingSettings>,
    /// Metrics settings.
    pub metrics: Option<MetricsSettings>,
}

/// Logging section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// Output format: "pretty" or "json".
    pub format: Option<String>,
    /// Filter directive, e.g. "info" or "floodgate=debug".
    pub level: Option<String>,
    /// Optional log file; stderr when absent.
    pub file: Option<String>,
}

/// Metrics section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Whether to install the Prometheus exporter.
    pub enabled: Option<bool>,
    /// Listener port.
    pub port: Option<u16>,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Store backend name.
    pub store: Option<String>,
    /// Database path.
    pub db_path: Option<String>,
    /// Observability settings.
    pub observability: Option<ObservabilitySettings>,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            store: StoreKind::default(),
            db_path: default_db_path(),
            observability: ObservabilitySettings::default(),
        }
    }
}

impl FloodgateConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or names an
    /// unknown store.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: format!("{}: {e}", path.display()),
        })?;

        Self::parse_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or names an unknown store.
    pub fn parse_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(contents).map_err(|e| Error::OperationFailed {
            operation: "parse_config_file".to_string(),
            cause: e.to_string(),
        })?;

        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the platform config dir, then `~/.config/floodgate/`. Returns
    /// defaults if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join("floodgate").join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join("floodgate")
                .join("config.toml"),
        ];

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Applies `FLOODGATE_STORE` and `FLOODGATE_DB_PATH` from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `FLOODGATE_STORE` names an unknown backend.
    pub fn apply_env_overrides(self) -> Result<Self> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the store variable names an unknown backend.
    pub fn apply_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(store) = non_empty(ENV_STORE) {
            self.store = store.parse()?;
        }
        if let Some(path) = non_empty(ENV_DB_PATH) {
            self.db_path = PathBuf::from(path);
        }
        Ok(self)
    }

    /// Converts a `ConfigFile` to `FloodgateConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(store) = file.store {
            config.store = store.parse()?;
        }
        if let Some(db_path) = file.db_path {
            config.db_path = PathBuf::from(db_path);
        }
        if let Some(observability) = file.observability {
            config.observability = observability;
        }

        Ok(config)
    }

    /// Sets the store backend.
    #[must_use]
    pub const fn with_store(mut self, store: StoreKind) -> Self {
        self.store = store;
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = path.into();
        self
    }
}

/// Returns the default database path under the platform data directory.
#[must_use]
pub fn default_db_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".floodgate").join(DB_FILE_NAME),
        |dirs| dirs.data_dir().join("floodgate").join(DB_FILE_NAME),
    )
}
