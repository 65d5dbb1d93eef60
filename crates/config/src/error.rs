//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during configuration loading and validation
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read configuration file
    #[error("Failed to read config file at {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write configuration file
    #[error("Failed to write config file at {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration
    #[error("Failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Failed to render TOML configuration
    #[error("Failed to serialize TOML config: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Invalid timeout configuration
    #[error("Invalid timeout: {name} must be positive, got {value}ms")]
    InvalidTimeout { name: &'static str, value: u64 },

    /// Exponential delay base above its cap
    #[error("Invalid revolt delay: exponential_delay_base_ms ({base}) exceeds exponential_delay_max_ms ({max})")]
    InvalidDelayRange { base: u64, max: u64 },

    /// Invalid cache capacity
    #[error("Invalid packet cache capacity: must be at least 1, got {0}")]
    InvalidCapacity(usize),

    /// Invalid validator public key
    #[error("Invalid validator key {key}: {reason}")]
    InvalidValidatorKey { key: String, reason: String },

    /// Validator listed twice
    #[error("Duplicate validator: {0}")]
    DuplicateValidator(String),

    /// The configured node key is not part of the validator set
    #[error("Node key {0} is not in the validator set")]
    NodeNotValidator(String),

    /// Invalid devnet settings
    #[error("Invalid devnet configuration: {0}")]
    InvalidDevnet(String),

    /// Invalid log level
    #[error("Invalid log level: {0}. Valid values: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    /// Invalid log format
    #[error("Invalid log format: {0}. Valid values: text, json, compact")]
    InvalidLogFormat(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
