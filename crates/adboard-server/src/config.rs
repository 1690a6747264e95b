//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "adboard_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_db_path() -> String {
    "adboard.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    adboard_db::DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    adboard_db::DbRuntimeSettings::default().pool_max_size
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    /// Pool tunables derived from this section.
    pub fn runtime_settings(&self) -> adboard_db::DbRuntimeSettings {
        adboard_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `ADBOARD_HOST` overrides `server.host`
/// - `ADBOARD_PORT` overrides `server.port`
/// - `ADBOARD_DB_PATH` overrides `database.path`
/// - `ADBOARD_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `ADBOARD_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `ADBOARD_LOG_LEVEL` overrides `logging.level`
/// - `ADBOARD_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `ADBOARD_*` overrides using `lookup` to read variables.
///
/// Values that fail to parse are ignored.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("ADBOARD_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("ADBOARD_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("ADBOARD_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(timeout) = lookup("ADBOARD_DB_BUSY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.busy_timeout_ms = parsed;
        }
    }
    if let Some(size) = lookup("ADBOARD_DB_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }
    if let Some(level) = lookup("ADBOARD_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ADBOARD_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = Config::default();
        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.path, "adboard.db");
        assert_eq!(config.database.pool_max_size, 8);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let config = load_config(path.to_str()).unwrap();
        assert_eq!(config.server.port, default_port());
    }

    #[test]
    fn file_values_override_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[database]\npath = \"/tmp/ads.db\"\n\n[logging]\njson = true"
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, default_host());
        assert_eq!(config.database.path, "/tmp/ads.db");
        assert_eq!(config.database.busy_timeout_ms, 5_000);
        assert!(config.logging.json);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        let result = load_config(file.path().to_str());
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_apply_and_bad_values_are_ignored() {
        let vars: HashMap<&str, &str> = [
            ("ADBOARD_HOST", "0.0.0.0"),
            ("ADBOARD_PORT", "not-a-port"),
            ("ADBOARD_DB_PATH", "other.db"),
            ("ADBOARD_DB_POOL_MAX_SIZE", "2"),
            ("ADBOARD_LOG_JSON", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        apply_env_overrides(&mut config, |key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.host, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.database.path, "other.db");
        assert_eq!(config.database.pool_max_size, 2);
        assert!(config.logging.json);
    }
}
