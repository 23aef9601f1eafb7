//! Configuration management.
//!
//! Two layers:
//!
//! - [`BotConfig`]: process-wide settings loaded once from a TOML file
//!   (database location, threshold floors, scan limits, reply templates,
//!   logging, metrics).
//! - [`CommunityConfig`]: per-community thresholds and flags, parsed from the
//!   community's configuration page and held by a [`ConfigRegistry`].

mod community;
mod templates;

pub use community::{CONFIG_PAGE_NAME, CommunityConfig, ConfigRegistry};
pub use templates::TemplatesConfig;

use crate::hashing::DEFAULT_MAX_MEDIA_BYTES;
use crate::observability::{LoggingConfig, MetricsConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "REPOSENTRY_CONFIG_PATH";

/// Main configuration for reposentry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    /// Path to the `SQLite` database.
    pub database_path: PathBuf,
    /// Floors for community thresholds.
    pub limits: LimitsConfig,
    /// Scan and reporting limits.
    pub scan: ScanSettings,
    /// Reply templates.
    pub templates: TemplatesConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Prometheus exporter settings.
    pub metrics: MetricsConfig,
}

/// Lowest values a community may configure.
///
/// Anything below a floor is replaced with the field's default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Floor for `sentry_threshold` and `mentioned_threshold`.
    pub minimum_threshold_allowed: u8,
    /// Floor for `autoremove_threshold`.
    pub minimum_autoremove_threshold: u8,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            minimum_threshold_allowed: 70,
            minimum_autoremove_threshold: 90,
        }
    }
}

/// Limits applied while scanning and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Matches passed to the report policy and mention replies.
    pub top_matches: usize,
    /// Largest rendered comment, in bytes.
    pub comment_size_budget: usize,
    /// Largest media payload hashed, in bytes.
    pub max_media_bytes: usize,
    /// Pause between cycles when no community is known, in seconds.
    pub idle_pause_secs: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            top_matches: 25,
            comment_size_budget: 10_000,
            max_media_bytes: DEFAULT_MAX_MEDIA_BYTES,
            idle_pause_secs: 60,
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Database path.
    pub database_path: Option<String>,
    /// Threshold floors.
    pub limits: Option<LimitsConfig>,
    /// Scan limits.
    pub scan: Option<ScanSettings>,
    /// Reply templates.
    pub templates: Option<TemplatesConfig>,
    /// Logging settings.
    pub logging: Option<LoggingConfig>,
    /// Metrics settings.
    pub metrics: Option<MetricsConfig>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            limits: LimitsConfig::default(),
            scan: ScanSettings::default(),
            templates: TemplatesConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl BotConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for [`ConfigFile`].
    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml_str(&contents)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/reposentry/` on macOS)
    /// 2. XDG config dir (`~/.config/reposentry/` for Unix compatibility)
    ///
    /// Returns default configuration if no config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let platform_config = base_dirs
            .config_dir()
            .join("reposentry")
            .join("config.toml");
        let xdg_config = base_dirs
            .home_dir()
            .join(".config")
            .join("reposentry")
            .join("config.toml");

        for candidate in [platform_config, xdg_config] {
            if !candidate.exists() {
                continue;
            }
            match Self::load_from_file(&candidate) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %candidate.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Loads configuration, honouring an explicit path first.
    ///
    /// Order: `explicit`, then [`CONFIG_PATH_ENV`], then [`Self::load_default`].
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.is_empty()
        {
            return Self::load_from_file(Path::new(&path));
        }
        Ok(Self::load_default())
    }

    /// Converts a `ConfigFile` to `BotConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(database_path) = file.database_path {
            config.database_path = PathBuf::from(database_path);
        }
        if let Some(limits) = file.limits {
            config.limits = limits;
        }
        if let Some(scan) = file.scan {
            config.scan = scan;
        }
        if let Some(templates) = file.templates {
            config.templates = templates;
        }
        if let Some(logging) = file.logging {
            config.logging = logging;
        }
        if let Some(metrics) = file.metrics {
            config.metrics = metrics;
        }

        config
    }

    /// Sets the database path.
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }
}

/// Default database location under the user's local data directory.
#[must_use]
pub fn default_database_path() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from("reposentry.db"),
        |dirs| {
            dirs.data_local_dir()
                .join("reposentry")
                .join("reposentry.db")
        },
    )
}
