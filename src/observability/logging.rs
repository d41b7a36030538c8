//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const ENV_LOG_FORMAT: &str = "FLOODGATE_LOG_FORMAT";
const ENV_LOG_LEVEL: &str = "FLOODGATE_LOG_LEVEL";
const ENV_LOG_FILE: &str = "FLOODGATE_LOG_FILE";

const DEFAULT_LEVEL: &str = "warn";
const VERBOSE_LEVEL: &str = "floodgate=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, falling back to `Pretty`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Resolved logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Filter directive, in `EnvFilter` syntax.
    pub level: String,
    /// Log file; stderr when absent.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: DEFAULT_LEVEL.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from config settings with env overrides.
    ///
    /// `verbose` raises the default level but never overrides an explicit
    /// level from the file or environment.
    #[must_use]
    pub fn from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Self {
        Self::resolve(settings, verbose, |key| std::env::var(key).ok())
    }

    fn resolve<F>(settings: Option<&LoggingSettings>, verbose: bool, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let format = lookup(ENV_LOG_FORMAT)
            .or_else(|| settings.and_then(|s| s.format.clone()))
            .map(|f| LogFormat::parse(&f))
            .unwrap_or_default();

        let level = lookup(ENV_LOG_LEVEL)
            .or_else(|| settings.and_then(|s| s.level.clone()))
            .unwrap_or_else(|| {
                if verbose {
                    VERBOSE_LEVEL.to_string()
                } else {
                    DEFAULT_LEVEL.to_string()
                }
            });

        let file = lookup(ENV_LOG_FILE)
            .or_else(|| settings.and_then(|s| s.file.clone()))
            .map(PathBuf::from);

        Self {
            format,
            level,
            file,
        }
    }

    /// Builds the subscriber filter, falling back to the default level when
    /// the directive does not parse.
    #[must_use]
    pub fn filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.level).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    }
}
