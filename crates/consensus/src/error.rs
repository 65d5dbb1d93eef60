//! Error types for the consensus crate.

use ebft_types::ValidatorIndex;
use thiserror::Error;

/// Contract violations in status bookkeeping.
///
/// These indicate a bug upstream (codec or configuration), not bad luck on the
/// network; the round-progress loop stops when it sees one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    /// Validator index outside the validator set
    #[error("validator index {index} out of range for {count} validators")]
    IndexOutOfRange {
        /// Offending index
        index: ValidatorIndex,
        /// Size of the validator set
        count: usize,
    },

    /// A peer update addressed to the local node's own slot
    #[error("slot {0} belongs to the local node")]
    LocalSlot(ValidatorIndex),
}

/// Result type for status bookkeeping
pub type StatusResult<T> = Result<T, StatusError>;

/// Failures encoding or decoding gossip packets.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Packet published on a topic this node does not handle
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Payload is not a valid message
    #[error("failed to decode {topic} packet: {source}")]
    Decode {
        /// Topic the packet arrived on
        topic: &'static str,
        /// Underlying parse failure
        #[source]
        source: serde_json::Error,
    },

    /// Payload decoded to a message of another topic
    #[error("packet on topic {expected} carried a {actual} message")]
    TopicMismatch {
        /// Topic the packet arrived on
        expected: &'static str,
        /// Topic of the decoded message
        actual: &'static str,
    },

    /// Message could not be serialized
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors that stop the round-progress loop.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Status bookkeeping contract violation
    #[error("status bookkeeping failed: {0}")]
    Status(#[from] StatusError),

    /// Invalid construction parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for the round-progress loop
pub type ConsensusResult<T> = Result<T, ConsensusError>;
