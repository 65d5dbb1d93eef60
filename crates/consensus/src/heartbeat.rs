//! Heartbeat gate.
//!
//! The block engine pushes [`HeartbeatEvent`]s from its own thread. Before the
//! round-progress loop produces new work it asks whether the last heartbeat is
//! recent enough relative to the newest block; if not, it keeps doing intake
//! and bookkeeping but does not build, load candidates or revolt.

use ebft_types::HeartbeatEvent;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

/// Receiver of heartbeats and judge of liveness.
pub trait HeartbeatListener: Send + Sync {
    /// Records a heartbeat. The latest event wins.
    fn on_heartbeat(&self, event: HeartbeatEvent);

    /// Whether work at `timestamp` (milliseconds) is covered by the last
    /// heartbeat. A negative timestamp means "no block yet" and always passes.
    fn check_heartbeat(&self, timestamp: i64) -> bool;
}

/// Logs a boolean outcome only when it changes.
#[derive(Debug, Default)]
pub struct ResultLogger {
    last: Mutex<Option<bool>>,
}

impl ResultLogger {
    /// Creates a logger that has seen nothing yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes `result` through, logging when it differs from the previous one.
    pub fn log(&self, result: bool, timestamp: i64, heartbeat: Option<i64>) -> bool {
        let mut last = self.last.lock();
        if *last != Some(result) {
            if result {
                info!(timestamp, heartbeat, "Heartbeat check passed");
            } else {
                info!(timestamp, heartbeat, "Heartbeat check failed, withholding new work");
            }
            *last = Some(result);
        }
        result
    }
}

/// Heartbeat gate backed by the last received event.
#[derive(Debug)]
pub struct HeartbeatGate {
    timeout_ms: i64,
    last: RwLock<Option<HeartbeatEvent>>,
    logger: ResultLogger,
}

impl HeartbeatGate {
    /// Creates a gate that tolerates `timeout_ms` between the block timestamp
    /// and the last heartbeat.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms: i64::try_from(timeout_ms).unwrap_or(i64::MAX),
            last: RwLock::new(None),
            logger: ResultLogger::new(),
        }
    }

    /// Last heartbeat received, if any.
    pub fn last_heartbeat(&self) -> Option<HeartbeatEvent> {
        *self.last.read()
    }
}

impl HeartbeatListener for HeartbeatGate {
    fn on_heartbeat(&self, event: HeartbeatEvent) {
        debug!(timestamp = event.timestamp, "Heartbeat received");
        *self.last.write() = Some(event);
    }

    fn check_heartbeat(&self, timestamp: i64) -> bool {
        if timestamp < 0 {
            return true;
        }
        let last = self.last_heartbeat();
        let result = match last {
            None => false,
            Some(event) => timestamp.saturating_sub(event.timestamp) <= self.timeout_ms,
        };
        self.logger.log(result, timestamp, last.map(|e| e.timestamp))
    }
}

/// Listener for nodes running without an external heartbeat source.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledHeartbeat;

impl HeartbeatListener for DisabledHeartbeat {
    fn on_heartbeat(&self, _event: HeartbeatEvent) {}

    fn check_heartbeat(&self, _timestamp: i64) -> bool {
        true
    }
}
