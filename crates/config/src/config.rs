//! Main configuration module for EBFT nodes
//!
//! Everything a validator needs is defined in one `ebft.toml` file. Sections
//! left out of the file take their defaults.

use crate::error::{ConfigError, ConfigResult};
use ebft_types::NodeRid;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Main configuration struct containing all EBFT node settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Validator set and local identity
    pub chain: ChainConfig,

    /// Revolt deadlines
    pub revolt: RevoltConfig,

    /// Heartbeat gate
    pub heartbeat: HeartbeatConfig,

    /// Round-progress loop timing
    pub sync: SyncConfig,

    /// Inbound packet cache
    pub packet_cache: PacketCacheConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// In-process devnet
    pub devnet: DevnetConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    ///
    /// The parsed and validated configuration, or an error if loading fails.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        info!("Loading configuration from {:?}", path);

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content)?;

        debug!("Configuration parsed successfully, validating...");
        config.validate()?;

        info!(
            validators = config.chain.validators.len(),
            revolt_timeout_ms = config.revolt.timeout_ms,
            heartbeat = config.heartbeat.enabled,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// Useful for testing or when configuration is provided as a string.
    pub fn from_str(content: &str) -> ConfigResult<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Checks that all values are within acceptable ranges and that
    /// the configuration is internally consistent.
    pub fn validate(&self) -> ConfigResult<()> {
        self.chain.validate()?;
        self.revolt.validate()?;
        self.heartbeat.validate()?;
        self.sync.validate()?;
        self.packet_cache.validate()?;
        self.logging.validate()?;
        self.devnet.validate()?;

        debug!("Configuration validation passed");
        Ok(())
    }

    /// Render the configuration as TOML.
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|e| ConfigError::FileWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}

// =============================================================================
// Chain Configuration
// =============================================================================

/// Validator set and local identity.
///
/// The order of `validators` fixes every validator's index for the lifetime
/// of the configuration; the primary of round `r` is `validators[r % n]`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ChainConfig {
    /// Hex-encoded validator public keys, in index order
    pub validators: Vec<String>,

    /// Hex-encoded public key of this node
    pub node_pubkey: Option<String>,
}

impl ChainConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let rids = self.validator_rids()?;

        let mut seen = HashSet::new();
        for rid in &rids {
            if !seen.insert(rid) {
                return Err(ConfigError::DuplicateValidator(rid.to_hex()));
            }
        }

        if self.node_pubkey.is_some() {
            self.node_index()?;
        }

        Ok(())
    }

    /// Parsed validator identities, in index order.
    pub fn validator_rids(&self) -> ConfigResult<Vec<NodeRid>> {
        self.validators.iter().map(|key| parse_key(key)).collect()
    }

    /// Index of `node_pubkey` in the validator set, if a node key is configured.
    pub fn node_index(&self) -> ConfigResult<Option<usize>> {
        let Some(key) = &self.node_pubkey else {
            return Ok(None);
        };
        let me = parse_key(key)?;
        let rids = self.validator_rids()?;
        rids.iter()
            .position(|rid| *rid == me)
            .map(Some)
            .ok_or_else(|| ConfigError::NodeNotValidator(me.to_hex()))
    }
}

fn parse_key(key: &str) -> ConfigResult<NodeRid> {
    NodeRid::from_hex(key).map_err(|e| ConfigError::InvalidValidatorKey {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Revolt Configuration
// =============================================================================

/// When a validator gives up on the round's primary.
///
/// The deadline for round `r` is `timeout_ms + delay(r)`, where `delay` grows
/// by a factor of 1.2 per round from `exponential_delay_base_ms` and is capped
/// at `exponential_delay_max_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RevoltConfig {
    /// Base time to wait for the primary (milliseconds)
    pub timeout_ms: u64,

    /// Scale of the per-round exponential delay (milliseconds)
    pub exponential_delay_base_ms: u64,

    /// Cap on the exponential delay (milliseconds)
    pub exponential_delay_max_ms: u64,

    /// Revolt early when the primary's status has been silent this long
    /// (milliseconds). Disabled when absent.
    pub fast_revolt_status_timeout_ms: Option<u64>,
}

impl RevoltConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "revolt.timeout_ms",
                value: 0,
            });
        }

        if self.exponential_delay_base_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "revolt.exponential_delay_base_ms",
                value: 0,
            });
        }

        if self.exponential_delay_base_ms > self.exponential_delay_max_ms {
            return Err(ConfigError::InvalidDelayRange {
                base: self.exponential_delay_base_ms,
                max: self.exponential_delay_max_ms,
            });
        }

        if self.fast_revolt_status_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidTimeout {
                name: "revolt.fast_revolt_status_timeout_ms",
                value: 0,
            });
        }

        Ok(())
    }
}

impl Default for RevoltConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            exponential_delay_base_ms: 1_000,
            exponential_delay_max_ms: 600_000,
            fast_revolt_status_timeout_ms: None,
        }
    }
}

// =============================================================================
// Heartbeat Configuration
// =============================================================================

/// Heartbeat gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Gate block production on heartbeats
    pub enabled: bool,

    /// Maximum age of the last block relative to the last heartbeat
    /// (milliseconds)
    pub timeout_ms: u64,
}

impl HeartbeatConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.enabled && self.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "heartbeat.timeout_ms",
                value: 0,
            });
        }
        Ok(())
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_ms: 60_000,
        }
    }
}

// =============================================================================
// Sync Configuration
// =============================================================================

/// Round-progress loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Sleep between loop ticks (milliseconds)
    pub tick_interval_ms: u64,

    /// Re-broadcast the local status at least this often (milliseconds)
    pub max_status_interval_ms: u64,

    /// Initial timeout before an unfinished intent is re-issued (milliseconds)
    pub intent_timeout_ms: u64,

    /// Interval of the periodic status log line (milliseconds)
    pub status_log_interval_ms: u64,
}

impl SyncConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let checks = [
            ("sync.tick_interval_ms", self.tick_interval_ms),
            ("sync.max_status_interval_ms", self.max_status_interval_ms),
            ("sync.intent_timeout_ms", self.intent_timeout_ms),
            ("sync.status_log_interval_ms", self.status_log_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ConfigError::InvalidTimeout { name, value });
            }
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 20,
            max_status_interval_ms: 1_000,
            intent_timeout_ms: 1_000,
            status_log_interval_ms: 10_000,
        }
    }
}

// =============================================================================
// Packet Cache Configuration
// =============================================================================

/// Inbound packet cache bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketCacheConfig {
    /// Maximum number of (sender, topic) entries
    pub capacity: usize,
}

impl PacketCacheConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity == 0 {
            return Err(ConfigError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }
}

impl Default for PacketCacheConfig {
    fn default() -> Self {
        Self { capacity: 1_024 }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (text, json, compact)
    pub format: String,
}

impl LoggingConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.level.clone()));
        }

        let valid_formats = ["text", "json", "compact"];
        if !valid_formats.contains(&self.format.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogFormat(self.format.clone()));
        }

        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// =============================================================================
// Devnet Configuration
// =============================================================================

/// In-process devnet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    /// Number of validators to run
    pub validators: usize,

    /// Index of a validator that never builds blocks
    pub silent_validator: Option<usize>,

    /// Interval of the heartbeat pump (milliseconds)
    pub heartbeat_interval_ms: u64,

    /// Interval of the diagnostics summary (milliseconds)
    pub report_interval_ms: u64,
}

impl DevnetConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.validators == 0 {
            return Err(ConfigError::InvalidDevnet(
                "at least one validator is required".to_string(),
            ));
        }

        if let Some(silent) = self.silent_validator {
            if silent >= self.validators {
                return Err(ConfigError::InvalidDevnet(format!(
                    "silent_validator {} out of range for {} validators",
                    silent, self.validators
                )));
            }
        }

        if self.heartbeat_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "devnet.heartbeat_interval_ms",
                value: 0,
            });
        }

        if self.report_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeout {
                name: "devnet.report_interval_ms",
                value: 0,
            });
        }

        Ok(())
    }
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            validators: 4,
            silent_validator: None,
            heartbeat_interval_ms: 1_000,
            report_interval_ms: 5_000,
        }
    }
}
