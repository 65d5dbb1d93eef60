//! Read-only view of the round-progress loop for operators and tests.

use std::sync::Arc;

use ebft_types::NodeStatus;
use parking_lot::RwLock;
use serde::Serialize;

use crate::packet_cache::CacheStats;
use crate::revolt::RevoltMetrics;
use crate::status_manager::BlockIntent;

/// Snapshot published once per tick.
#[derive(Debug, Clone, Serialize)]
pub struct NodeDiagnostics {
    /// Local node index
    pub my_index: usize,
    /// Every known status, in index order
    pub statuses: Vec<NodeStatus>,
    /// Current intent
    pub intent: BlockIntent,
    /// Primary of the local round
    pub primary: usize,
    /// Revolt counters
    pub revolts: RevoltMetrics,
    /// Revolt deadline (milliseconds)
    pub revolt_deadline: i64,
    /// Result of the last heartbeat check
    pub heartbeat_ok: bool,
    /// Packet cache counters
    pub packet_cache: CacheStats,
    /// Ticks run so far
    pub ticks: u64,
}

impl NodeDiagnostics {
    /// The local node's status.
    pub fn my_status(&self) -> Option<&NodeStatus> {
        self.statuses.get(self.my_index)
    }

    /// Height the local node works on.
    pub fn height(&self) -> u64 {
        self.my_status().map(|s| s.height).unwrap_or(0)
    }
}

/// Shared handle to the latest [`NodeDiagnostics`].
///
/// Only the loop publishes; everyone else gets a clone.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsHandle {
    inner: Arc<RwLock<Option<NodeDiagnostics>>>,
}

impl DiagnosticsHandle {
    /// Creates an empty handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest snapshot, if the loop has run at least once.
    pub fn snapshot(&self) -> Option<NodeDiagnostics> {
        self.inner.read().clone()
    }

    pub(crate) fn publish(&self, diagnostics: NodeDiagnostics) {
        *self.inner.write() = Some(diagnostics);
    }
}
