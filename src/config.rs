//! Configuration module for the dispatchd server.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over built-in defaults.

use crate::connection::ConnectionOptions;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;

/// Default limit on concurrently served connections
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Largest accepted `max_line_length`
pub const MAX_LINE_LENGTH_LIMIT: usize = 1024 * 1024;

/// Command-line arguments for the server
#[derive(Parser, Debug, Default)]
#[command(name = "dispatchd")]
#[command(version)]
#[command(about = "A line-oriented command dispatch server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host to bind to (default: 127.0.0.1)
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port to listen on (default: 4040)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of concurrent connections (default: 100)
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Longest accepted request line in bytes (default: 1024)
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Seconds a connection may stay silent before it is closed, 0 disables (default: 300)
    #[arg(long = "idle-timeout")]
    pub idle_timeout_secs: Option<u64>,

    /// Line sent to every client when it connects
    #[arg(long)]
    pub greeting: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Line sent to every client when it connects
    pub greeting: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
            greeting: None,
        }
    }
}

/// Per-connection configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Longest accepted request line in bytes
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Idle timeout in seconds, 0 disables it
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
            idle_timeout_secs: default_idle_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

fn default_max_line_length() -> usize {
    crate::protocol::DEFAULT_MAX_LINE_LENGTH
}

fn default_idle_timeout_secs() -> u64 {
    crate::connection::DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
    pub max_line_length: usize,
    pub idle_timeout_secs: u64,
    pub greeting: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve configuration from already parsed CLI arguments.
    ///
    /// Reads the TOML file named by `--config`, if any.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = match cli.config.as_deref() {
            Some(path) => read_toml(path)?,
            None => TomlConfig::default(),
        };

        let config = Self::merge(cli, toml_config);
        config.validate()?;
        Ok(config)
    }

    /// Merge CLI args over TOML values (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli.port.unwrap_or(toml_config.server.port),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            max_line_length: cli
                .max_line_length
                .unwrap_or(toml_config.connection.max_line_length),
            idle_timeout_secs: cli
                .idle_timeout_secs
                .unwrap_or(toml_config.connection.idle_timeout_secs),
            greeting: cli.greeting.or(toml_config.server.greeting),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    /// Rejects values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.max_connections > Semaphore::MAX_PERMITS {
            return Err(ConfigError::Invalid(format!(
                "max_connections must be at most {}",
                Semaphore::MAX_PERMITS
            )));
        }
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid(
                "max_line_length must be at least 1".to_string(),
            ));
        }
        if self.max_line_length > MAX_LINE_LENGTH_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "max_line_length must be at most {}",
                MAX_LINE_LENGTH_LIMIT
            )));
        }
        if let Some(greeting) = &self.greeting {
            if greeting.contains('\n') {
                return Err(ConfigError::Invalid(
                    "greeting must be a single line".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Idle timeout, or `None` when disabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }

    /// The per-connection settings derived from this configuration.
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            max_line_length: self.max_line_length,
            idle_timeout: self.idle_timeout(),
            greeting: self.greeting.clone(),
        }
    }
}

fn read_toml(path: &Path) -> Result<TomlConfig, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{}': {source}", .path.display())]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("dispatchd").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bind_address(), "127.0.0.1:4040");
        assert_eq!(config.max_connections, 100);
        assert_eq!(config.max_line_length, 1024);
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(config.greeting, None);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            host = "0.0.0.0"
            port = 5050
            max_connections = 8
            greeting = "hello"

            [connection]
            max_line_length = 256
            idle_timeout_secs = 0

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::merge(CliArgs::default(), toml_config);

        assert_eq!(config.bind_address(), "0.0.0.0:5050");
        assert_eq!(config.max_connections, 8);
        assert_eq!(config.max_line_length, 256);
        assert_eq!(config.idle_timeout(), None);
        assert_eq!(config.greeting.as_deref(), Some("hello"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let toml_config: TomlConfig = toml::from_str("[server]\nport = 9000\n").unwrap();
        assert_eq!(toml_config.server.host, "127.0.0.1");
        assert_eq!(toml_config.server.port, 9000);
        assert_eq!(toml_config.connection.max_line_length, 1024);
    }

    #[test]
    fn test_unknown_toml_field_rejected() {
        assert!(toml::from_str::<TomlConfig>("[server]\nprot = 9000\n").is_err());
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig =
            toml::from_str("[server]\nport = 9000\nhost = \"0.0.0.0\"\n").unwrap();
        let args = cli(&["--port", "7000", "--idle-timeout", "5", "-m", "3"]);

        let config = Config::merge(args, toml_config);
        assert_eq!(config.bind_address(), "0.0.0.0:7000");
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
        assert_eq!(config.max_connections, 3);
    }

    #[test]
    fn test_connection_options() {
        let args = cli(&["--max-line-length", "64", "--greeting", "hi"]);
        let options = Config::from_cli(args).unwrap().connection_options();

        assert_eq!(options.max_line_length, 64);
        assert_eq!(options.greeting.as_deref(), Some("hi"));
        assert_eq!(options.idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            Config::from_cli(cli(&["--max-connections", "0"])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_cli(cli(&["--max-line-length", "0"])),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_cli(cli(&["--greeting", "hello\nworld"])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_limits_upper_bounds() {
        let huge = usize::MAX.to_string();

        assert!(matches!(
            Config::from_cli(cli(&["-m", huge.as_str()])),
            Err(ConfigError::Invalid(_))
        ));
        let at_max = Semaphore::MAX_PERMITS.to_string();
        assert!(Config::from_cli(cli(&["-m", at_max.as_str()])).is_ok());

        assert!(matches!(
            Config::from_cli(cli(&["--max-line-length", huge.as_str()])),
            Err(ConfigError::Invalid(_))
        ));
        let at_limit = MAX_LINE_LENGTH_LIMIT.to_string();
        assert!(Config::from_cli(cli(&["--max-line-length", at_limit.as_str()])).is_ok());
        let over_limit = (MAX_LINE_LENGTH_LIMIT + 1).to_string();
        assert!(matches!(
            Config::from_cli(cli(&["--max-line-length", over_limit.as_str()])),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!("dispatchd-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nport = 6060\n[logging]\nlevel = \"warn\"\n").unwrap();

        let config = Config::from_cli(cli(&["--config", path.to_str().unwrap()])).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.port, 6060);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_cli(cli(&["--config", "/nonexistent/dispatchd.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead { .. }));
        assert!(err.to_string().contains("/nonexistent/dispatchd.toml"));
    }
}
