//! Application configuration management.
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then environment variables prefixed `SEARCHIT__` (for example
//! `SEARCHIT__SERVER__PORT=8080`). Sections:
//! - `beacon`: which advertised name to pair with and how long to scan
//! - `sampler`: RSSI polling interval
//! - `proximity`: classifier thresholds
//! - `registry`: object cap and data directory
//! - `server`: HTTP bind address

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::proximity::ProximityThresholds;
use crate::registry::DEFAULT_MAX_OBJECTS;

/// Advertised name of the Search It beacon firmware.
pub const DEFAULT_BEACON_NAME: &str = "ESP32-Locator";

/// Errors raised while loading, saving, or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file does not exist.
    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The config file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load config: {0}")]
    LoadError(#[from] ::config::ConfigError),

    /// The config could not be rendered as TOML.
    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A single field is invalid.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `beacon.name`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Which beacon to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct BeaconConfig {
    /// Exact advertised name to match.
    pub name: String,
    /// Scan timeout in seconds.
    pub scan_timeout_secs: u64,
    /// Drive the built-in simulated radio instead of BlueZ.
    pub simulate: bool,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_BEACON_NAME.to_string(),
            scan_timeout_secs: 10,
            simulate: false,
        }
    }
}

impl BeaconConfig {
    /// Scan timeout as a [`Duration`].
    #[must_use]
    pub const fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}

/// RSSI polling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct SamplerConfig {
    /// Milliseconds between signal-strength reads.
    pub interval_ms: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

impl SamplerConfig {
    /// Tick interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Classifier thresholds in dBm, inclusive from the top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ProximityConfig {
    /// At or above: very near.
    pub very_near_dbm: i16,
    /// At or above: near.
    pub near_dbm: i16,
    /// At or above: far. Below: very far.
    pub far_dbm: i16,
}

impl Default for ProximityConfig {
    fn default() -> Self {
        let t = ProximityThresholds::DEFAULT;
        Self {
            very_near_dbm: t.very_near_dbm,
            near_dbm: t.near_dbm,
            far_dbm: t.far_dbm,
        }
    }
}

impl ProximityConfig {
    /// Thresholds for the classifier.
    #[must_use]
    pub const fn thresholds(&self) -> ProximityThresholds {
        ProximityThresholds {
            very_near_dbm: self.very_near_dbm,
            near_dbm: self.near_dbm,
            far_dbm: self.far_dbm,
        }
    }
}

/// Object registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of tracked objects.
    pub max_objects: usize,
    /// Where `objects.json` lives. Defaults to the platform data directory.
    #[schema(value_type = Option<String>)]
    pub data_dir: Option<PathBuf>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_objects: DEFAULT_MAX_OBJECTS,
            data_dir: None,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// JSON file logging instead of pretty stdout.
    pub production: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            production: false,
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Config {
    /// Beacon matching.
    pub beacon: BeaconConfig,
    /// RSSI polling.
    pub sampler: SamplerConfig,
    /// Proximity thresholds.
    pub proximity: ProximityConfig,
    /// Object registry.
    pub registry: RegistryConfig,
    /// HTTP server.
    pub server: ServerConfig,
}

impl Config {
    /// Load from `path`, which must exist, with environment overrides applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, or a load or
    /// validation error.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_or_default(path)
    }

    /// Load from `path` if it exists, otherwise start from the defaults.
    /// Environment overrides apply either way.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        let config: Self = ::config::Config::builder()
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("SEARCHIT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path` as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let write_err = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)
    }

    /// Check every field, reporting all violations at once.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |field: &str, message: &dyn fmt::Display| {
            errors.push(ConfigError::ValidationError {
                field: field.to_string(),
                message: message.to_string(),
            });
        };

        if self.beacon.name.trim().is_empty() {
            invalid("beacon.name", &"must not be empty");
        }
        if self.beacon.scan_timeout_secs == 0 {
            invalid("beacon.scan_timeout_secs", &"must be greater than zero");
        }
        if self.sampler.interval_ms == 0 {
            invalid("sampler.interval_ms", &"must be greater than zero");
        }

        let p = &self.proximity;
        for (field, value) in [
            ("proximity.very_near_dbm", p.very_near_dbm),
            ("proximity.near_dbm", p.near_dbm),
            ("proximity.far_dbm", p.far_dbm),
        ] {
            if !(-100..=0).contains(&value) {
                invalid(field, &format_args!("{value} is outside -100..=0"));
            }
        }
        if !p.thresholds().is_descending() {
            invalid(
                "proximity",
                &"thresholds must be strictly descending (very_near > near > far)",
            );
        }

        if self.registry.max_objects == 0 {
            invalid("registry.max_objects", &"must be at least 1");
        }
        if self.server.port == 0 {
            invalid("server.port", &"must not be 0");
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }

    /// Socket address string for the HTTP server.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Default config file location (`~/.config/searchit/config.toml` on Linux).
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "searchit")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.beacon.name, "ESP32-Locator");
        assert_eq!(config.beacon.scan_timeout(), Duration::from_secs(10));
        assert!(!config.beacon.simulate);
        assert_eq!(config.sampler.interval(), Duration::from_secs(1));
        assert_eq!(config.proximity.thresholds(), ProximityThresholds::DEFAULT);
        assert_eq!(config.registry.max_objects, 3);
    }

    #[test]
    fn test_all_violations_reported() {
        let mut config = Config::default();
        config.beacon.name = "  ".into();
        config.sampler.interval_ms = 0;
        config.proximity.near_dbm = -40;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => {
                let fields: Vec<String> = errors.iter().map(ToString::to_string).collect();
                assert_eq!(errors.len(), 3);
                assert!(fields.iter().any(|f| f.starts_with("beacon.name")));
                assert!(fields.iter().any(|f| f.starts_with("sampler.interval_ms")));
                assert!(fields.iter().any(|f| f.starts_with("proximity:")));
            }
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_violation_is_not_wrapped() {
        let mut config = Config::default();
        config.proximity.far_dbm = -120;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "proximity.far_dbm"
        ));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.beacon.scan_timeout_secs = 20;
        config.sampler.interval_ms = 500;
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.beacon.scan_timeout_secs, 20);
        assert_eq!(loaded.sampler.interval_ms, 500);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sampler]\ninterval_ms = 750\n").unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.sampler.interval_ms, 750);
        assert_eq!(loaded.beacon.name, DEFAULT_BEACON_NAME);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(Config::load(&path), Err(ConfigError::NotFound(_))));
        assert!(Config::load_or_default(&path).is_ok());
    }
}
