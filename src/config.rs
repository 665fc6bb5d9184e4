//! Configuration parsing and structures

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::driver::{ExtractFolder, OrderBy, OrderDirection, StorageConfig};
use crate::env::substitute_env_vars;
use crate::op::DispatchOptions;
use crate::path;

// =============================================================================
// Raw Config (Deserialized from YAML)
// =============================================================================

/// Raw configuration as deserialized from YAML.
/// This is converted to `Config` via `resolve()`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Link lease and background re-listing
    #[serde(default)]
    pub cache: DispatchOptions,

    /// Values every storage inherits unless it sets its own
    #[serde(default)]
    pub defaults: StorageDefaults,

    /// Mounted storages
    pub storages: Vec<RawStorageConfig>,
}

/// Storage defaults section
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StorageDefaults {
    /// Directory cache lifetime in minutes
    pub cache_expiration: Option<u64>,
    pub no_cache: Option<bool>,
    pub local_sort: Option<bool>,
    pub check_status: Option<bool>,
    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
    pub extract_folder: Option<ExtractFolder>,
}

/// Raw storage configuration before resolution
/// Everything except `mount_path` and `driver` may be inherited from `defaults`
#[derive(Debug, Clone, Deserialize)]
pub struct RawStorageConfig {
    /// Where the storage appears in the unified namespace
    pub mount_path: String,

    /// Backend driver
    pub driver: DriverConfig,

    pub cache_expiration: Option<u64>,
    pub no_cache: Option<bool>,
    pub local_sort: Option<bool>,
    pub check_status: Option<bool>,
    pub order_by: Option<OrderBy>,
    pub order_direction: Option<OrderDirection>,
    pub extract_folder: Option<ExtractFolder>,
}

/// Driver configuration (tagged enum)
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriverConfig {
    /// Directory on the host filesystem
    Local(LocalDriverConfig),
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocalDriverConfig {
    /// Host directory served as the storage root
    pub root: PathBuf,
}

// =============================================================================
// Resolved Config (Ready for use)
// =============================================================================

/// Top-level configuration (resolved from RawConfig)
#[derive(Debug, Clone)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Dispatcher tuning
    pub cache: DispatchOptions,

    /// Storages (fully resolved)
    pub storages: Vec<StorageEntry>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One storage, ready to be mounted
#[derive(Debug, Clone)]
pub struct StorageEntry {
    pub driver: DriverConfig,
    pub storage: StorageConfig,
}

// =============================================================================
// Resolution Logic
// =============================================================================

impl RawConfig {
    /// Resolve raw config into final config by merging storage overrides with defaults
    pub fn resolve(self) -> Result<Config, ConfigError> {
        let RawConfig {
            logging,
            cache,
            defaults,
            storages,
        } = self;

        let storages = storages
            .into_iter()
            .map(|raw| Self::resolve_storage(&defaults, raw))
            .collect();

        Ok(Config {
            logging,
            cache,
            storages,
        })
    }

    fn resolve_storage(defaults: &StorageDefaults, raw: RawStorageConfig) -> StorageEntry {
        let mut storage = StorageConfig::new(path::normalize(&raw.mount_path));

        // Storage values override defaults, which override built-in values
        if let Some(minutes) = raw.cache_expiration.or(defaults.cache_expiration) {
            storage.cache_expiration = minutes;
        }
        storage.no_cache = raw.no_cache.or(defaults.no_cache).unwrap_or(false);
        storage.local_sort = raw.local_sort.or(defaults.local_sort).unwrap_or(false);
        storage.check_status = raw.check_status.or(defaults.check_status).unwrap_or(false);
        storage.order_by = raw.order_by.or(defaults.order_by);
        storage.order_direction = raw
            .order_direction
            .or(defaults.order_direction)
            .unwrap_or_default();
        storage.extract_folder = raw
            .extract_folder
            .or(defaults.extract_folder)
            .unwrap_or_default();

        StorageEntry {
            driver: raw.driver,
            storage,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, substituting `${VAR}` references
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_path_buf(), e.to_string()))?;
        let content = substitute_env_vars(&content)?;

        Self::from_str(&content)
    }

    /// Parse configuration from a YAML string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        raw.resolve()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storages.is_empty() {
            return Err(ConfigError::ValidationError(
                "At least one storage is required".to_string(),
            ));
        }

        // Check for duplicate mount paths
        let mut paths = HashSet::new();
        for entry in &self.storages {
            if !paths.insert(entry.storage.mount_path.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate mount path: {}",
                    entry.storage.mount_path
                )));
            }
        }

        // Validate driver configs
        for entry in &self.storages {
            match &entry.driver {
                DriverConfig::Local(local) => {
                    if local.root.as_os_str().is_empty() {
                        return Err(ConfigError::ValidationError(format!(
                            "Storage {}: local root cannot be empty",
                            entry.storage.mount_path
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(PathBuf, String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}
