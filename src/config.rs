//! Configuration module for set-storm.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::load::LoadConfig;
use crate::payload::PayloadMode;
use crate::worker::{Target, Timeouts};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the load generator
#[derive(Parser, Debug, Default)]
#[command(name = "set-storm")]
#[command(author = "set-storm authors")]
#[command(version = "0.1.0")]
#[command(about = "Fire concurrent SET commands at a key-value server", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host of the server under test
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port of the server under test
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of simultaneous connections to open
    #[arg(short = 'n', long)]
    pub concurrency: Option<usize>,

    /// Number of runtime worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Upper bound on connections open at the same time (unbounded if unset)
    #[arg(long)]
    pub max_in_flight: Option<usize>,

    /// Connect timeout in milliseconds (0 = transport default)
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Response timeout in milliseconds (0 = transport default)
    #[arg(long)]
    pub read_timeout_ms: Option<u64>,

    /// How keys and values are generated
    #[arg(long, value_enum)]
    pub payload: Option<PayloadMode>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub load: LoadSection,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server under test
#[derive(Debug, Deserialize)]
pub struct TargetConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Shape of a single run
#[derive(Debug, Deserialize)]
pub struct LoadSection {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    pub max_in_flight: Option<usize>,
    #[serde(default)]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub read_timeout_ms: u64,
    #[serde(default)]
    pub payload: PayloadMode,
}

impl Default for LoadSection {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_in_flight: None,
            connect_timeout_ms: 0,
            read_timeout_ms: 0,
            payload: PayloadMode::default(),
        }
    }
}

/// Tokio runtime settings
#[derive(Debug, Deserialize, Default)]
pub struct RuntimeConfig {
    pub workers: Option<usize>,
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
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
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9090
}

fn default_concurrency() -> usize {
    100
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub concurrency: usize,
    pub workers: Option<usize>,
    pub max_in_flight: Option<usize>,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub payload: PayloadMode,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::from_sources(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn from_sources(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let config = Config {
            host: cli.host.unwrap_or(toml_config.target.host),
            port: cli.port.unwrap_or(toml_config.target.port),
            concurrency: cli.concurrency.unwrap_or(toml_config.load.concurrency),
            workers: cli.workers.or(toml_config.runtime.workers),
            max_in_flight: cli.max_in_flight.or(toml_config.load.max_in_flight),
            connect_timeout_ms: cli
                .connect_timeout_ms
                .unwrap_or(toml_config.load.connect_timeout_ms),
            read_timeout_ms: cli
                .read_timeout_ms
                .unwrap_or(toml_config.load.read_timeout_ms),
            payload: cli.payload.unwrap_or(toml_config.load.payload),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1"));
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::Invalid("max_in_flight must be at least 1"));
        }
        if self.workers == Some(0) {
            return Err(ConfigError::Invalid("workers must be at least 1"));
        }
        Ok(())
    }

    pub fn target(&self) -> Target {
        Target::new(self.host.clone(), self.port)
    }

    /// Everything the driver needs for one run.
    pub fn load_config(&self) -> LoadConfig {
        let mut load = LoadConfig::new(self.target(), self.concurrency);
        load.max_in_flight = self.max_in_flight;
        load.payload = self.payload;
        load.timeouts = Timeouts {
            connect: millis(self.connect_timeout_ms),
            read: millis(self.read_timeout_ms),
        };
        load
    }
}

/// Zero means "no explicit timeout".
fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::from_sources(CliArgs::default(), TomlConfig::default()).unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.concurrency, 100);
        assert_eq!(config.max_in_flight, None);
        assert_eq!(config.payload, PayloadMode::Random);
        assert_eq!(config.log_level, "info");

        let load = config.load_config();
        assert!(load.timeouts.connect.is_none());
        assert!(load.timeouts.read.is_none());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [target]
            host = "10.0.0.5"
            port = 7000

            [load]
            concurrency = 250
            max_in_flight = 50
            connect_timeout_ms = 5000
            read_timeout_ms = 10000
            payload = "sequential"

            [runtime]
            workers = 4

            [logging]
            level = "debug"
        "#;

        let toml_config: TomlConfig = toml::from_str(toml_str).unwrap();
        let config = Config::from_sources(CliArgs::default(), toml_config).unwrap();
        assert_eq!(config.target().to_string(), "10.0.0.5:7000");
        assert_eq!(config.concurrency, 250);
        assert_eq!(config.max_in_flight, Some(50));
        assert_eq!(config.workers, Some(4));
        assert_eq!(config.payload, PayloadMode::Sequential);
        assert_eq!(config.log_level, "debug");

        let load = config.load_config();
        assert_eq!(load.timeouts.connect, Some(Duration::from_secs(5)));
        assert_eq!(load.timeouts.read, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [target]
            port = 7000

            [load]
            concurrency = 250
            "#,
        )
        .unwrap();

        let cli = CliArgs::parse_from(["set-storm", "--port", "9999", "-n", "3", "--log-level", "warn"]);
        let config = Config::from_sources(cli, toml_config).unwrap();
        assert_eq!(config.port, 9999);
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let cli = CliArgs::parse_from(["set-storm", "--concurrency", "0"]);
        let err = Config::from_sources(cli, TomlConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_in_flight_rejected() {
        let cli = CliArgs::parse_from(["set-storm", "--max-in-flight", "0"]);
        assert!(Config::from_sources(cli, TomlConfig::default()).is_err());
    }
}
