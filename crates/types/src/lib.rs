//! # EBFT Types
//!
//! Core type definitions shared by the EBFT validator crates.
//!
//! This crate provides the values exchanged between validators and the
//! components that track their progress:
//! - [`BlockRid`] - 32-byte block identifiers
//! - [`NodeRid`] - validator identities (public key bytes)
//! - [`NodeStatus`] and [`NodePhase`] - a validator's consensus progress
//! - [`Signature`] - opaque commit signatures
//! - [`HeartbeatEvent`] - liveness timestamps from the block engine
//!
//! ## Example
//!
//! ```rust
//! use ebft_types::{BlockRid, NodePhase, NodeStatus};
//!
//! let rid = BlockRid::sha256(b"block 54");
//! let status = NodeStatus::new(54, 1).with_block(rid, NodePhase::HaveBlock);
//!
//! assert_eq!(status.block_rid, Some(rid));
//! assert!(!status.revolting);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod heartbeat;
pub mod rid;
pub mod status;

pub use heartbeat::HeartbeatEvent;
pub use rid::{BlockRid, NodeRid, RID_SIZE};
pub use status::{NodePhase, NodeStatus, Signature};

/// Index of a validator within the ordered validator set.
pub type ValidatorIndex = usize;

/// Result type alias for EBFT type operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when working with EBFT types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Invalid length for a fixed-size type
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Empty node identity
    #[error("node identity must not be empty")]
    EmptyNodeRid,

    /// Unknown phase discriminant on the wire
    #[error("unknown node phase: {0}")]
    UnknownPhase(u8),
}
