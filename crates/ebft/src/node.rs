//! Wiring from [`Config`] to the round-progress loop.

use std::sync::Arc;
use std::time::Duration;

use ebft_config::{Config, HeartbeatConfig};
use ebft_consensus::{
    DisabledHeartbeat, HeartbeatGate, HeartbeatListener, RevoltConfig, SyncManager,
    SyncManagerConfig,
};
use ebft_core::{BlockEngine, Clock, StatusTransport};
use ebft_types::NodeRid;
use tracing::info;

use crate::error::{NodeError, NodeResult};
use crate::worker::ValidatorWorker;

/// Loop settings taken from `config`.
pub fn sync_manager_config(config: &Config) -> SyncManagerConfig {
    SyncManagerConfig {
        revolt: RevoltConfig {
            timeout_ms: config.revolt.timeout_ms,
            exponential_delay_base_ms: config.revolt.exponential_delay_base_ms,
            exponential_delay_max_ms: config.revolt.exponential_delay_max_ms,
            fast_revolt_status_timeout_ms: config.revolt.fast_revolt_status_timeout_ms,
        },
        max_status_interval_ms: config.sync.max_status_interval_ms,
        intent_timeout_ms: config.sync.intent_timeout_ms,
        status_log_interval_ms: config.sync.status_log_interval_ms,
        packet_cache_capacity: config.packet_cache.capacity,
    }
}

/// Heartbeat listener for `config`.
pub fn heartbeat_listener(config: &HeartbeatConfig) -> Arc<dyn HeartbeatListener> {
    if config.enabled {
        Arc::new(HeartbeatGate::new(config.timeout_ms))
    } else {
        Arc::new(DisabledHeartbeat)
    }
}

/// Tick interval of the worker thread.
pub fn tick_interval(config: &Config) -> Duration {
    Duration::from_millis(config.sync.tick_interval_ms)
}

/// Builds the loop for validator `my_index` and starts it on its own thread.
#[allow(clippy::too_many_arguments)]
pub fn start_validator<T, E>(
    config: &Config,
    validators: Vec<NodeRid>,
    my_index: usize,
    next_height: u64,
    transport: T,
    engine: E,
    heartbeat: Arc<dyn HeartbeatListener>,
    clock: Arc<dyn Clock>,
) -> NodeResult<ValidatorWorker>
where
    T: StatusTransport + 'static,
    E: BlockEngine + 'static,
{
    if my_index >= validators.len() {
        return Err(NodeError::NotValidator);
    }
    let name = format!("ebft-validator-{}", my_index);
    let sync = SyncManager::new(
        sync_manager_config(config),
        validators,
        my_index,
        next_height,
        transport,
        engine,
        heartbeat,
        clock,
    )?;
    info!(worker = %name, height = next_height, "Starting validator");
    ValidatorWorker::spawn(name, sync, tick_interval(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_follows_file() {
        let config = Config::from_str(
            r#"
            [revolt]
            timeout_ms = 300
            fast_revolt_status_timeout_ms = 900

            [sync]
            intent_timeout_ms = 250

            [packet_cache]
            capacity = 7
            "#,
        )
        .unwrap();

        let sync = sync_manager_config(&config);
        assert_eq!(sync.revolt.timeout_ms, 300);
        assert_eq!(sync.revolt.fast_revolt_status_timeout_ms, Some(900));
        assert_eq!(sync.intent_timeout_ms, 250);
        assert_eq!(sync.packet_cache_capacity, 7);
        assert_eq!(sync.max_status_interval_ms, 1_000);
    }

    #[test]
    fn test_disabled_heartbeat_passes() {
        let listener = heartbeat_listener(&HeartbeatConfig {
            enabled: false,
            timeout_ms: 1,
        });
        assert!(listener.check_heartbeat(1_000_000));

        let gate = heartbeat_listener(&HeartbeatConfig::default());
        assert!(!gate.check_heartbeat(1_000_000));
    }
}
