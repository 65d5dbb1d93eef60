//! Validator status summaries.
//!
//! A [`NodeStatus`] is what every validator gossips about itself: the height it
//! works on, its round, the candidate block it converges on and whether it wants
//! the round changed. Statuses are plain values; ordering and staleness are
//! decided by the consumer.

use crate::{BlockRid, Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a validator in the per-block sub-protocol.
///
/// On the wire the phase is a single integer (`0..=3`); unknown values are
/// rejected while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NodePhase {
    /// Waiting for the round's primary to publish a candidate block
    #[default]
    AwaitingProposal,
    /// Holds a candidate block and has signed it
    HaveBlock,
    /// Enough validators hold the same candidate; collecting commit signatures
    Prepared,
    /// Candidate committed locally; about to move to the next height
    Committed,
}

impl NodePhase {
    /// Wire discriminant
    pub const fn index(self) -> u8 {
        match self {
            NodePhase::AwaitingProposal => 0,
            NodePhase::HaveBlock => 1,
            NodePhase::Prepared => 2,
            NodePhase::Committed => 3,
        }
    }

    /// Whether a candidate block id is attached in this phase.
    pub const fn has_block(self) -> bool {
        matches!(self, NodePhase::HaveBlock | NodePhase::Prepared)
    }
}

impl TryFrom<u8> for NodePhase {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(NodePhase::AwaitingProposal),
            1 => Ok(NodePhase::HaveBlock),
            2 => Ok(NodePhase::Prepared),
            3 => Ok(NodePhase::Committed),
            other => Err(Error::UnknownPhase(other)),
        }
    }
}

impl From<NodePhase> for u8 {
    fn from(phase: NodePhase) -> Self {
        phase.index()
    }
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodePhase::AwaitingProposal => "awaiting-proposal",
            NodePhase::HaveBlock => "have-block",
            NodePhase::Prepared => "prepared",
            NodePhase::Committed => "committed",
        };
        f.write_str(name)
    }
}

/// An opaque signature over a block id.
///
/// Verification happens before a signature reaches the consensus crates; here
/// it is carried and counted, never checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature {
    /// Public key of the signer
    #[serde(with = "hex_bytes")]
    pub subject_id: Vec<u8>,
    /// Signature bytes
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Signature {
    /// Creates a signature from signer key and signature bytes.
    pub fn new(subject_id: impl Into<Vec<u8>>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            subject_id: subject_id.into(),
            data: data.into(),
        }
    }
}

/// Snapshot of one validator's consensus progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Height the validator is working on
    pub height: u64,
    /// Local ordering counter, wall-clock derived and bumped on every change
    pub serial: u64,
    /// Sub-protocol phase
    pub phase: NodePhase,
    /// View number within the height; the primary is `round mod n`
    pub round: u64,
    /// Candidate block, absent until one is known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_rid: Option<BlockRid>,
    /// Whether the validator wants the round changed
    #[serde(default)]
    pub revolting: bool,
    /// Commit signature, attached once the validator is prepared
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
    /// Free-form diagnostic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl NodeStatus {
    /// A status at `height` with no candidate block, round zero.
    pub fn new(height: u64, serial: u64) -> Self {
        Self {
            height,
            serial,
            phase: NodePhase::AwaitingProposal,
            round: 0,
            block_rid: None,
            revolting: false,
            signature: None,
            error: None,
        }
    }

    /// Placeholder for a peer nothing has been heard from yet.
    ///
    /// Any real status compares as fresher.
    pub fn unknown() -> Self {
        Self::new(0, 0)
    }

    /// Sets the round.
    pub fn with_round(mut self, round: u64) -> Self {
        self.round = round;
        self
    }

    /// Attaches a candidate block in the given phase.
    pub fn with_block(mut self, rid: BlockRid, phase: NodePhase) -> Self {
        self.block_rid = Some(rid);
        self.phase = phase;
        self
    }

    /// Marks the status as revolting.
    pub fn revolting(mut self) -> Self {
        self.revolting = true;
        self
    }

    /// Whether this status is strictly newer than `other` for the same node.
    ///
    /// A newer serial wins; otherwise a higher height, or the same height with
    /// a higher round. Serial values restart when a peer restarts, which is why
    /// progress alone also counts.
    pub fn supersedes(&self, other: &NodeStatus) -> bool {
        self.serial > other.serial
            || self.height > other.height
            || (self.height == other.height && self.round > other.round)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}
