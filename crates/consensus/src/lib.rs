//! # EBFT Consensus
//!
//! Status gossip intake, revolt detection and round progress for an EBFT
//! validator.
//!
//! Every validator periodically broadcasts its [`NodeStatus`](ebft_types::NodeStatus):
//! the height it works on, its round, its phase and whether it is revolting
//! against the round's primary. This crate keeps the latest status of every
//! validator, counts revolts, and moves the local node through the per-height
//! protocol.
//!
//! ## Round Flow
//!
//! ```text
//! Height h, round r, primary = r mod n:
//!
//! ┌──────────────────┐
//! │ AWAITING PROPOSAL│  primary builds a candidate, others fetch it
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    HAVE BLOCK    │  n - f statuses on the same candidate
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │     PREPARED     │  collect commit signatures
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    COMMITTED     │  height h + 1, round 0
//! └──────────────────┘
//!
//! At any point before PREPARED:
//!   primary silent past the deadline  → revolt
//!   n - f revolters at round r         → round r + 1
//! ```
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ebft_consensus::{StatusManager, quorum::required_signatures};
//! use ebft_core::ManualClock;
//! use ebft_types::NodeStatus;
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let mut manager = StatusManager::new(4, 1, 54, clock).unwrap();
//!
//! for reporter in [0, 2, 3] {
//!     let status = NodeStatus::new(54, 10).with_round(1).revolting();
//!     manager.report_revolt(reporter, &status).unwrap();
//! }
//! assert_eq!(manager.revolt_metrics().revolts_on_node(), 3);
//! assert_eq!(required_signatures(4), 3);
//! ```
//!
//! ## Fault Tolerance
//!
//! - Tolerates `f = (n - 1) / 3` faulty validators
//! - Agreement, revolt and sync decisions all need `n - f` validators

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod diagnostics;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod packet_cache;
pub mod quorum;
pub mod revolt;
pub mod status_manager;
pub mod status_sender;
pub mod status_table;
pub mod sync_manager;

pub use diagnostics::{DiagnosticsHandle, NodeDiagnostics};
pub use error::{CodecError, ConsensusError, ConsensusResult, StatusError, StatusResult};
pub use heartbeat::{DisabledHeartbeat, HeartbeatGate, HeartbeatListener, ResultLogger};
pub use messages::{EbftMessage, MessageCodec, MessageTopic};
pub use packet_cache::{packet_digest, CacheStats, PacketCache, PacketDigest, Topical};
pub use quorum::{max_faulty, primary_for_round, required_signatures};
pub use revolt::{RevoltConfig, RevoltMetrics, RevoltTracker, RoundRevoltTally};
pub use status_manager::{BlockIntent, StatusManager, ZERO_SERIAL_TIME};
pub use status_sender::StatusSender;
pub use status_table::StatusTable;
pub use sync_manager::{SyncManager, SyncManagerConfig};
