//! Configuration module for mult-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.
//!
//! The classic positional form `mult-server PORT WORKERS MAX_CONNECTIONS`
//! is accepted as well and wins over the equivalent flags.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "mult-server")]
#[command(author = "mult-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A bounded worker-pool TCP server that multiplies integers", long_about = None)]
pub struct CliArgs {
    /// Port to listen on (positional form)
    #[arg(value_name = "PORT")]
    pub port_arg: Option<u16>,

    /// Number of worker threads (positional form)
    #[arg(value_name = "NUM_THREADS")]
    pub workers_arg: Option<usize>,

    /// Capacity of the pending connection queue (positional form)
    #[arg(value_name = "MAX_NUM_CONNECTIONS")]
    pub max_connections_arg: Option<usize>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Host or address to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Capacity of the pending connection queue
    #[arg(short = 'q', long)]
    pub max_connections: Option<usize>,

    /// Listen backlog handed to the kernel
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Per-connection read/write timeout in milliseconds (0 = none)
    #[arg(long)]
    pub io_timeout_ms: Option<u64>,

    /// Factor applied to every request
    #[arg(long)]
    pub multiplier: Option<i64>,

    /// Largest request accepted in a single read, in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error) [default: info]
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Capacity of the pending connection queue
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Per-connection I/O timeout in milliseconds (0 = none)
    #[serde(default)]
    pub io_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: None,
            max_connections: default_max_connections(),
            backlog: default_backlog(),
            io_timeout_ms: 0,
        }
    }
}

/// Wire protocol configuration
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            multiplier: default_multiplier(),
            max_message_size: default_max_message_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
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
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_connections() -> usize {
    64
}

fn default_backlog() -> u32 {
    25
}

fn default_multiplier() -> i64 {
    10
}

fn default_max_message_size() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub max_connections: usize,
    pub backlog: u32,
    pub io_timeout_ms: u64,
    pub multiplier: i64,
    pub max_message_size: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from the process arguments and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Merge parsed CLI arguments with the TOML file they point at, then
    /// validate the result.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let config = Config {
            host: cli.host.unwrap_or(toml_config.server.host),
            port: cli
                .port_arg
                .or(cli.port)
                .unwrap_or(toml_config.server.port),
            workers: cli
                .workers_arg
                .or(cli.workers)
                .or(toml_config.server.workers)
                .unwrap_or_else(num_cpus),
            max_connections: cli
                .max_connections_arg
                .or(cli.max_connections)
                .unwrap_or(toml_config.server.max_connections),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            io_timeout_ms: cli
                .io_timeout_ms
                .unwrap_or(toml_config.server.io_timeout_ms),
            multiplier: cli.multiplier.unwrap_or(toml_config.protocol.multiplier),
            max_message_size: cli
                .max_message_size
                .unwrap_or(toml_config.protocol.max_message_size),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::invalid("port", "must be between 1 and 65535"));
        }
        if self.workers == 0 {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::invalid("max_connections", "must be at least 1"));
        }
        if self.backlog == 0 || self.backlog > i32::MAX as u32 {
            return Err(ConfigError::invalid("backlog", "must be a positive int"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::invalid("max_message_size", "must be at least 1"));
        }
        if self.multiplier == 0 {
            return Err(ConfigError::invalid("multiplier", "must be non-zero"));
        }
        Ok(())
    }

    /// Read/write timeout applied to every serviced connection.
    pub fn io_timeout(&self) -> Option<Duration> {
        match self.io_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        ConfigError::Invalid { field, reason }
    }
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
            ConfigError::Invalid { field, reason } => {
                write!(f, "Invalid configuration: {field} {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
