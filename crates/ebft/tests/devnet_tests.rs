//! End-to-end tests running a whole validator network in one process.

use std::time::Duration;

use ebft::{Devnet, NodeError};
use ebft_config::Config;
use tempfile::TempDir;

fn fast_config(validators: usize, silent: Option<usize>) -> Config {
    let mut config = Config::default();
    config.devnet.validators = validators;
    config.devnet.silent_validator = silent;
    config.devnet.heartbeat_interval_ms = 50;
    config.devnet.report_interval_ms = 500;
    config.sync.tick_interval_ms = 5;
    config.sync.max_status_interval_ms = 100;
    config.sync.intent_timeout_ms = 200;
    config.sync.status_log_interval_ms = 1_000;
    config.revolt.timeout_ms = 400;
    config.revolt.exponential_delay_base_ms = 100;
    config.revolt.exponential_delay_max_ms = 2_000;
    config
}

#[test]
fn test_devnet_commits_blocks() {
    let devnet = Devnet::start(&fast_config(4, None)).unwrap();
    assert_eq!(devnet.validators().len(), 4);

    assert!(
        devnet.wait_for_blocks(3, Duration::from_secs(30)),
        "only {} blocks committed",
        devnet.committed_blocks()
    );
    assert_eq!(devnet.chain().conflicts(), 0);
    assert!(devnet.all_running());
    assert!(devnet.chain().block_at(0).is_some());

    let diagnostics = devnet.diagnostics();
    assert_eq!(diagnostics.len(), 4);
    assert!(diagnostics.iter().all(|d| d.heartbeat_ok));

    devnet.stop().unwrap();
}

#[test]
fn test_devnet_revolts_past_silent_primary() {
    let devnet = Devnet::start(&fast_config(4, Some(0))).unwrap();

    assert!(
        devnet.wait_for_blocks(2, Duration::from_secs(30)),
        "only {} blocks committed",
        devnet.committed_blocks()
    );
    assert_eq!(devnet.chain().conflicts(), 0);

    let revolts: u64 = devnet
        .diagnostics()
        .iter()
        .map(|d| d.revolts.revolts_by_node())
        .sum();
    assert!(revolts > 0);

    devnet.stop().unwrap();
}

#[test]
fn test_single_validator_devnet() {
    let devnet = Devnet::start(&fast_config(1, None)).unwrap();
    assert!(devnet.wait_for_blocks(3, Duration::from_secs(30)));
    assert_eq!(devnet.chain().conflicts(), 0);
    devnet.stop().unwrap();
}

#[test]
fn test_devnet_rejects_invalid_config() {
    let config = fast_config(3, Some(5));
    assert!(matches!(Devnet::start(&config), Err(NodeError::Config(_))));
}

#[test]
fn test_config_file_drives_devnet() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ebft.toml");
    fast_config(4, None).save(&path).unwrap();

    let loaded = Config::load(&path).unwrap();
    assert_eq!(loaded.devnet.validators, 4);
    assert_eq!(loaded.revolt.timeout_ms, 400);
    assert_eq!(loaded.sync.tick_interval_ms, 5);

    let devnet = Devnet::start(&loaded).unwrap();
    assert!(devnet.wait_for_blocks(1, Duration::from_secs(30)));
    devnet.stop().unwrap();
}
