//! Periodic status broadcast.

use std::sync::Arc;

use ebft_core::{Clock, StatusTransport};
use ebft_types::NodeStatus;
use tracing::{trace, warn};

use crate::messages::{EbftMessage, MessageTopic};

/// Broadcasts the local status when it changes, and at least every
/// `max_interval_ms` otherwise.
pub struct StatusSender {
    max_interval_ms: i64,
    clock: Arc<dyn Clock>,
    last_serial: Option<u64>,
    last_sent_at: i64,
}

impl StatusSender {
    /// Creates a sender that has not broadcast anything yet.
    pub fn new(max_interval_ms: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_interval_ms: i64::try_from(max_interval_ms).unwrap_or(i64::MAX),
            clock,
            last_serial: None,
            last_sent_at: 0,
        }
    }

    /// Broadcasts `status` if it is new or the interval elapsed. Returns
    /// whether a packet went out.
    pub fn update<T: StatusTransport + ?Sized>(&mut self, status: &NodeStatus, transport: &mut T) -> bool {
        let now = self.clock.now_millis();
        let changed = self.last_serial != Some(status.serial);
        if !changed && now.saturating_sub(self.last_sent_at) < self.max_interval_ms {
            return false;
        }

        let payload = match EbftMessage::Status(status.clone()).encode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode status");
                return false;
            }
        };
        if let Err(e) = transport.broadcast(MessageTopic::Status.as_str(), payload) {
            warn!(error = %e, "Failed to broadcast status");
            return false;
        }

        trace!(
            height = status.height,
            round = status.round,
            serial = status.serial,
            changed,
            "Status broadcast"
        );
        self.last_serial = Some(status.serial);
        self.last_sent_at = now;
        true
    }
}
