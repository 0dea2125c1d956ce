//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. built-in defaults,
//! 2. an optional TOML file,
//! 3. environment variables prefixed `BLESCOPE_`, with `__` between
//!    section and key (e.g. `BLESCOPE_SERVER__PORT=8080`).
//!
//! ```toml
//! [server]
//! host = "0.0.0.0"
//! port = 3000
//!
//! [scan]
//! flush_interval_ms = 1000
//! default_duration_secs = 10
//!
//! [names]
//! company_sources = ["/usr/share/blescope/company_ids.json"]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::names::NameTable;
use crate::radio::ScanMode;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "BLESCOPE";

/// Accepted flush interval range in milliseconds.
pub const FLUSH_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 100..=5000;

/// Accepted timed-scan duration range in seconds.
pub const SCAN_DURATION_RANGE_SECS: std::ops::RangeInclusive<u64> = 1..=180;

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The file exists but could not be read.
    #[error("Failed to read {}: {source}", path.display())]
    ReadError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Failed to write {}: {source}", path.display())]
    WriteError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// TOML syntax error.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Layered source could not be merged or deserialised.
    #[error("Failed to load configuration: {0}")]
    SourceError(#[from] ::config::ConfigError),

    /// TOML serialisation failed.
    #[error("Failed to serialize configuration: {0}")]
    SerializeError(#[from] toml::ser::Error),

    /// A field holds an invalid value.
    #[error("Invalid value for {field}: {message}")]
    ValidationError {
        /// Dotted field path.
        field: String,
        /// What is wrong.
        message: String,
    },

    /// Several fields are invalid.
    #[error("{} validation errors", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listener.
    pub server: ServerConfig,
    /// Scan cadence.
    pub scan: ScanConfig,
    /// External name tables.
    pub names: NamesConfig,
    /// Radio backend.
    pub radio: RadioConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
            host: "127.0.0.1".to_string(),
            port: 3000,
            production: false,
        }
    }
}

/// Scan and reconciliation cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Interval between reconciler flushes.
    pub flush_interval_ms: u64,
    /// Duration of a timed scan when none is requested.
    pub default_duration_secs: u64,
    /// Scan until stopped instead of for `default_duration_secs`.
    pub continuous: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 1000,
            default_duration_secs: 10,
            continuous: false,
        }
    }
}

impl ScanConfig {
    /// Flush interval as a [`Duration`].
    #[must_use]
    pub const fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Scan mode for a request.
    ///
    /// `None` uses the configured default; `Some(0)` is continuous; other
    /// values are clamped to [`SCAN_DURATION_RANGE_SECS`].
    #[must_use]
    pub fn scan_mode(&self, requested_secs: Option<u64>) -> ScanMode {
        match requested_secs {
            Some(0) => ScanMode::Continuous,
            Some(secs) => ScanMode::from_secs(clamp_scan_duration(secs)),
            None if self.continuous => ScanMode::Continuous,
            None => ScanMode::from_secs(clamp_scan_duration(self.default_duration_secs)),
        }
    }
}

/// Clamp a timed-scan duration to the accepted range.
#[must_use]
pub fn clamp_scan_duration(secs: u64) -> u64 {
    secs.clamp(*SCAN_DURATION_RANGE_SECS.start(), *SCAN_DURATION_RANGE_SECS.end())
}

/// External name-table sources: file paths or `http(s)://` URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamesConfig {
    /// Company ID tables.
    pub company_sources: Vec<String>,
    /// Service UUID tables.
    pub service_sources: Vec<String>,
    /// Characteristic UUID tables.
    pub characteristic_sources: Vec<String>,
}

impl NamesConfig {
    /// All sources tagged with their table.
    #[must_use]
    pub fn sources(&self) -> Vec<(NameTable, String)> {
        let tag = |table: NameTable, list: &[String]| {
            list.iter()
                .map(move |s| (table, s.clone()))
                .collect::<Vec<_>>()
        };
        let mut out = tag(NameTable::Companies, &self.company_sources);
        out.extend(tag(NameTable::Services, &self.service_sources));
        out.extend(tag(NameTable::Characteristics, &self.characteristic_sources));
        out
    }
}

/// Radio backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Adapter name, e.g. `hci0`; `None` picks the default adapter.
    pub adapter: Option<String>,
    /// JSON-lines capture replayed by the mock radio.
    pub replay_file: Option<PathBuf>,
    /// Mock radio announcement interval.
    pub replay_interval_ms: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            replay_file: None,
            replay_interval_ms: 250,
        }
    }
}

impl Config {
    /// Load configuration from `path` layered over defaults and environment.
    ///
    /// A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be parsed, the environment holds
    /// unparsable values, or validation fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let mut env = ::config::Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .list_separator(",");
        for key in [
            "names.company_sources",
            "names.service_sources",
            "names.characteristic_sources",
        ] {
            env = env.with_list_parse_key(key);
        }

        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Self::default())?)
            .add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(env)
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load configuration from a TOML file only, without defaults layering.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing file, otherwise read,
    /// parse or validation errors.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
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

    /// Check every field, collecting all violations.
    ///
    /// # Errors
    ///
    /// Returns the single violation, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if self.server.host.trim().is_empty() {
            errors.push(invalid("server.host", "must not be empty"));
        }
        if self.server.port == 0 {
            errors.push(invalid("server.port", "must not be 0"));
        }
        if !FLUSH_INTERVAL_RANGE_MS.contains(&self.scan.flush_interval_ms) {
            errors.push(invalid(
                "scan.flush_interval_ms",
                format!(
                    "{} is outside {}..={}",
                    self.scan.flush_interval_ms,
                    FLUSH_INTERVAL_RANGE_MS.start(),
                    FLUSH_INTERVAL_RANGE_MS.end()
                ),
            ));
        }
        if !SCAN_DURATION_RANGE_SECS.contains(&self.scan.default_duration_secs) {
            errors.push(invalid(
                "scan.default_duration_secs",
                format!(
                    "{} is outside {}..={}",
                    self.scan.default_duration_secs,
                    SCAN_DURATION_RANGE_SECS.start(),
                    SCAN_DURATION_RANGE_SECS.end()
                ),
            ));
        }
        if self.radio.replay_interval_ms < 10 {
            errors.push(invalid("radio.replay_interval_ms", "must be at least 10"));
        }
        for (table, source) in self.names.sources() {
            if source.trim().is_empty() {
                errors.push(invalid(&format!("names.{table}"), "empty source entry"));
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

/// Default configuration file location.
///
/// `/etc/blescope/config.toml` on Linux, the platform config directory elsewhere.
#[must_use]
pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        PathBuf::from("/etc/blescope/config.toml")
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "blescope").map_or_else(
            || PathBuf::from("blescope.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.scan.flush_interval(), Duration::from_millis(1000));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.scan.default_duration_secs, 10);
    }

    #[test]
    fn test_partial_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 8080\n\n[scan]\nflush_interval_ms = 500\n").unwrap();

        let config = Config::load_or_default(&path).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.scan.flush_interval_ms, 500);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[radio]\nreplay_interval_ms = 100\n").unwrap();

        std::env::set_var("BLESCOPE_RADIO__REPLAY_INTERVAL_MS", "333");
        let config = Config::load_or_default(&path);
        std::env::remove_var("BLESCOPE_RADIO__REPLAY_INTERVAL_MS");

        assert_eq!(config.unwrap().radio.replay_interval_ms, 333);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.server.port = 0;
        config.scan.flush_interval_ms = 10;
        config.scan.default_duration_secs = 500;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }

        let mut config = Config::default();
        config.scan.flush_interval_ms = 6000;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { ref field, .. }) if field == "scan.flush_interval_ms"
        ));
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\ndefault_duration_secs = 0\n").unwrap();
        assert!(Config::load_or_default(&path).is_err());
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.names.company_sources = vec!["https://example.com/ids.json".into()];
        config.radio.adapter = Some("hci1".into());
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        assert!(matches!(
            Config::load("/nonexistent/blescope.toml"),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn test_scan_mode() {
        let scan = ScanConfig::default();
        assert_eq!(scan.scan_mode(None), ScanMode::Timed(Duration::from_secs(10)));
        assert_eq!(scan.scan_mode(Some(0)), ScanMode::Continuous);
        assert_eq!(scan.scan_mode(Some(999)), ScanMode::Timed(Duration::from_secs(180)));

        let continuous = ScanConfig {
            continuous: true,
            ..ScanConfig::default()
        };
        assert_eq!(continuous.scan_mode(None), ScanMode::Continuous);
    }

    #[test]
    fn test_names_sources() {
        let names = NamesConfig {
            company_sources: vec!["a.json".into()],
            service_sources: vec![],
            characteristic_sources: vec!["c.txt".into()],
        };
        let sources = names.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].0, NameTable::Companies);
        assert_eq!(sources[1].0, NameTable::Characteristics);
    }
}
