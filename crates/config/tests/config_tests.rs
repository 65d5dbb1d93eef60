//! Tests for Config module

use ebft_config::{
    ChainConfig, Config, ConfigError, DevnetConfig, HeartbeatConfig, LoggingConfig,
    PacketCacheConfig, RevoltConfig, SyncConfig,
};
use std::io::Write;

const KEY_A: &str = "0x03a1a1a1a1";
const KEY_B: &str = "0x03b2b2b2b2";
const KEY_C: &str = "0x03c3c3c3c3";

#[test]
fn test_default_config() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.revolt.timeout_ms, 10_000);
    assert_eq!(config.revolt.exponential_delay_base_ms, 1_000);
    assert_eq!(config.revolt.exponential_delay_max_ms, 600_000);
    assert_eq!(config.revolt.fast_revolt_status_timeout_ms, None);
    assert!(config.heartbeat.enabled);
    assert_eq!(config.sync.max_status_interval_ms, 1_000);
    assert_eq!(config.packet_cache.capacity, 1_024);
    assert_eq!(config.devnet.validators, 4);
}

#[test]
fn test_empty_toml_uses_defaults() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.revolt.timeout_ms, RevoltConfig::default().timeout_ms);
    assert!(config.chain.validators.is_empty());
}

#[test]
fn test_partial_section_keeps_other_defaults() {
    let config = Config::from_str(
        r#"
        [revolt]
        timeout_ms = 2500
        fast_revolt_status_timeout_ms = 4000
        "#,
    )
    .unwrap();
    assert_eq!(config.revolt.timeout_ms, 2500);
    assert_eq!(config.revolt.fast_revolt_status_timeout_ms, Some(4000));
    assert_eq!(config.revolt.exponential_delay_max_ms, 600_000);
}

#[test]
fn test_node_index_resolves_position() {
    let chain = ChainConfig {
        validators: vec![KEY_A.into(), KEY_B.into(), KEY_C.into()],
        node_pubkey: Some(KEY_B.into()),
    };
    assert!(chain.validate().is_ok());
    assert_eq!(chain.node_index().unwrap(), Some(1));
    assert_eq!(chain.validator_rids().unwrap().len(), 3);
}

#[test]
fn test_node_key_must_be_validator() {
    let chain = ChainConfig {
        validators: vec![KEY_A.into(), KEY_B.into()],
        node_pubkey: Some(KEY_C.into()),
    };
    assert!(matches!(
        chain.validate(),
        Err(ConfigError::NodeNotValidator(_))
    ));
}

#[test]
fn test_duplicate_validator_rejected() {
    let chain = ChainConfig {
        validators: vec![KEY_A.into(), KEY_A.into()],
        node_pubkey: None,
    };
    assert!(matches!(
        chain.validate(),
        Err(ConfigError::DuplicateValidator(_))
    ));
}

#[test]
fn test_invalid_validator_key() {
    let chain = ChainConfig {
        validators: vec!["0xzz".into()],
        node_pubkey: None,
    };
    assert!(matches!(
        chain.validate(),
        Err(ConfigError::InvalidValidatorKey { .. })
    ));
}

#[test]
fn test_invalid_revolt_timeout() {
    let mut config = RevoltConfig::default();
    config.timeout_ms = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTimeout {
            name: "revolt.timeout_ms",
            value: 0
        })
    ));
}

#[test]
fn test_invalid_delay_range() {
    let mut config = RevoltConfig::default();
    config.exponential_delay_base_ms = 10_000;
    config.exponential_delay_max_ms = 5_000;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidDelayRange {
            base: 10_000,
            max: 5_000
        })
    ));
}

#[test]
fn test_zero_fast_revolt_timeout_rejected() {
    let mut config = RevoltConfig::default();
    config.fast_revolt_status_timeout_ms = Some(0);
    assert!(config.validate().is_err());
}

#[test]
fn test_heartbeat_timeout_only_checked_when_enabled() {
    let mut config = HeartbeatConfig::default();
    config.timeout_ms = 0;
    assert!(config.validate().is_err());
    config.enabled = false;
    assert!(config.validate().is_ok());
}

#[test]
fn test_invalid_sync_interval() {
    let mut config = SyncConfig::default();
    config.tick_interval_ms = 0;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidTimeout {
            name: "sync.tick_interval_ms",
            ..
        })
    ));
}

#[test]
fn test_invalid_packet_cache_capacity() {
    let config = PacketCacheConfig { capacity: 0 };
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCapacity(0))
    ));
}

#[test]
fn test_invalid_log_level_and_format() {
    let mut config = LoggingConfig::default();
    config.level = "verbose".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogLevel(_))
    ));

    let mut config = LoggingConfig::default();
    config.format = "pretty".to_string();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidLogFormat(_))
    ));
}

#[test]
fn test_devnet_silent_validator_out_of_range() {
    let mut config = DevnetConfig::default();
    config.silent_validator = Some(4);
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidDevnet(_))
    ));
    config.silent_validator = Some(3);
    assert!(config.validate().is_ok());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[chain]
validators = ["{KEY_A}", "{KEY_B}"]
node_pubkey = "{KEY_A}"

[heartbeat]
enabled = false
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.chain.node_index().unwrap(), Some(0));
    assert!(!config.heartbeat.enabled);
}

#[test]
fn test_load_missing_file() {
    let result = Config::load(std::path::Path::new("/nonexistent/ebft.toml"));
    assert!(matches!(result, Err(ConfigError::FileRead { .. })));
}

#[test]
fn test_save_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ebft.toml");

    let mut config = Config::default();
    config.revolt.fast_revolt_status_timeout_ms = Some(3_000);
    config.devnet.silent_validator = Some(0);
    config.save(&path).unwrap();

    let reloaded = Config::load(&path).unwrap();
    assert_eq!(reloaded.revolt.fast_revolt_status_timeout_ms, Some(3_000));
    assert_eq!(reloaded.devnet.silent_validator, Some(0));
}
