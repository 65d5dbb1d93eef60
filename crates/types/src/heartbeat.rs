//! Heartbeat events.

use serde::{Deserialize, Serialize};

/// A liveness timestamp (milliseconds) pushed by the block engine.
///
/// Heartbeats come from a single external source and are expected to increase,
/// but nothing here enforces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl HeartbeatEvent {
    /// Creates a heartbeat at `timestamp` milliseconds.
    pub const fn new(timestamp: i64) -> Self {
        Self { timestamp }
    }
}
