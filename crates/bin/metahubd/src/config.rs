//! Configuration loading: TOML file with environment variable overrides.
//!
//! Looks for `metahub.toml` in the working directory, or the file named by
//! `METAHUB_CONFIG`. Every field has a sensible default so the file is
//! optional. Environment variables take precedence over file values.
//!
//! Only the `[writable]` section is re-read at runtime (on `SIGHUP`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use metahub_adapter_mqtt::MqttConfig;
use metahub_app::settings::Writable;

/// Default location of the configuration file.
pub const DEFAULT_PATH: &str = "metahub.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings.
    pub server: ServerConfig,
    /// Database settings.
    pub database: DatabaseConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Request handling limits.
    pub service: ServiceConfig,
    /// Message bus used for validation requests and system events.
    pub messaging: MessagingConfig,
    /// Change propagation workers.
    pub propagation: PropagationConfig,
    /// Hot-reloadable guard settings.
    pub writable: Writable,
}

/// HTTP listener configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// TCP port.
    pub port: u16,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// How long to wait for remote device services (e.g. `"5s"`, `"500ms"`).
    pub request_timeout: String,
    /// Cap applied to every list `limit`.
    pub max_result_count: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Without a bus, device writes needing validation fail as unavailable
    /// and system events are skipped.
    pub enabled: bool,
    #[serde(flatten)]
    pub mqtt: MqttConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    /// Pending change notices before new ones are dropped.
    pub queue_capacity: usize,
    pub workers: usize,
}

impl Config {
    /// Location of the configuration file: `METAHUB_CONFIG` or
    /// [`DEFAULT_PATH`].
    #[must_use]
    pub fn path() -> PathBuf {
        std::env::var_os("METAHUB_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_PATH), PathBuf::from)
    }

    /// Load configuration from `path` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Re-read only the `[writable]` section of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn reload_writable(path: &Path) -> Result<Writable, ConfigError> {
        Ok(Self::from_file(path)?.writable)
    }

    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(val) = var("METAHUB_HOST") {
            self.server.host = val;
        }
        if let Some(port) = var("METAHUB_PORT").and_then(|val| val.parse().ok()) {
            self.server.port = port;
        }
        if let Some(val) = var("METAHUB_BIND") {
            if let Some((host, port)) = val.rsplit_once(':') {
                self.server.host = host.to_string();
                if let Ok(port) = port.parse() {
                    self.server.port = port;
                }
            }
        }
        if let Some(val) = var("METAHUB_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = var("METAHUB_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("RUST_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = var("METAHUB_MQTT_HOST") {
            self.messaging.mqtt.broker_host = val;
            self.messaging.enabled = true;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation("port must be non-zero".to_string()));
        }
        if self.service.max_result_count == 0 {
            return Err(ConfigError::Validation(
                "max_result_count must be non-zero".to_string(),
            ));
        }
        self.service.request_timeout()?;
        Ok(())
    }

    /// Return the `host:port` bind address.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Return the database URL in `sqlx`-compatible format.
    #[must_use]
    pub fn database_url(&self) -> &str {
        &self.database.url
    }
}

impl ServiceConfig {
    /// Parsed [`ServiceConfig::request_timeout`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] when the value is not a duration.
    pub fn request_timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.request_timeout).map_err(|err| {
            ConfigError::Validation(format!(
                "request_timeout '{}' is not a duration: {err}",
                self.request_timeout
            ))
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 59881,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:metahub.db?mode=rwc".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "metahubd=info,metahub=info,tower_http=debug".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout: "5s".to_string(),
            max_result_count: 1024,
        }
    }
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            workers: 2,
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}
