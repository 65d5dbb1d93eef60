//! Gossip messages and their JSON codec.
//!
//! Every packet carries one [`EbftMessage`] on the topic named by
//! [`MessageTopic`]. The payload is the JSON encoding of the message; the
//! topic travels beside it in the transport envelope.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use ebft_types::{BlockRid, NodeRid, NodeStatus, Signature};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::CodecError;
use crate::packet_cache::{PacketCache, Topical};

/// Gossip topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageTopic {
    /// Periodic validator status
    Status,
    /// Request for a commit signature
    GetBlockSignature,
    /// Reply carrying a commit signature
    BlockSignature,
}

impl MessageTopic {
    /// Wire name of the topic.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageTopic::Status => "ebft/status",
            MessageTopic::GetBlockSignature => "ebft/get-block-signature",
            MessageTopic::BlockSignature => "ebft/block-signature",
        }
    }
}

impl fmt::Display for MessageTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageTopic {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ebft/status" => Ok(MessageTopic::Status),
            "ebft/get-block-signature" => Ok(MessageTopic::GetBlockSignature),
            "ebft/block-signature" => Ok(MessageTopic::BlockSignature),
            other => Err(CodecError::UnknownTopic(other.to_string())),
        }
    }
}

/// Messages exchanged between validators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EbftMessage {
    /// The sender's current status
    Status(NodeStatus),
    /// Asks the receiver for its signature over `block_rid`
    GetBlockSignature {
        /// Block to sign
        block_rid: BlockRid,
    },
    /// The sender's signature over `block_rid`
    BlockSignature {
        /// Signed block
        block_rid: BlockRid,
        /// Commit signature
        signature: Signature,
    },
}

impl EbftMessage {
    /// Topic this message is published on.
    pub fn message_topic(&self) -> MessageTopic {
        match self {
            EbftMessage::Status(_) => MessageTopic::Status,
            EbftMessage::GetBlockSignature { .. } => MessageTopic::GetBlockSignature,
            EbftMessage::BlockSignature { .. } => MessageTopic::BlockSignature,
        }
    }

    /// JSON payload of the message.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        serde_json::to_vec(self).map(Bytes::from).map_err(CodecError::Encode)
    }

    /// Parses a payload received on `topic`.
    pub fn decode(topic: &str, raw: &[u8]) -> Result<Self, CodecError> {
        let topic: MessageTopic = topic.parse()?;
        let message: EbftMessage = serde_json::from_slice(raw).map_err(|source| CodecError::Decode {
            topic: topic.as_str(),
            source,
        })?;
        let actual = message.message_topic();
        if actual != topic {
            return Err(CodecError::TopicMismatch {
                expected: topic.as_str(),
                actual: actual.as_str(),
            });
        }
        Ok(message)
    }
}

impl Topical for EbftMessage {
    fn topic(&self) -> &'static str {
        self.message_topic().as_str()
    }
}

/// Decodes packets, reusing the cached result for repeated payloads.
pub struct MessageCodec {
    cache: PacketCache<EbftMessage>,
}

impl MessageCodec {
    /// Creates a codec with a cache of `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: PacketCache::new(capacity),
        }
    }

    /// Decodes `raw` sent by `sender` on `topic`.
    pub fn decode(&self, sender: &NodeRid, topic: &str, raw: &[u8]) -> Result<EbftMessage, CodecError> {
        if let Some(message) = self.cache.get(sender, raw, topic) {
            trace!(sender = %sender.short(), topic, "Packet cache hit");
            return Ok(message);
        }
        let message = EbftMessage::decode(topic, raw)?;
        Ok(self.cache.put(sender, raw, message))
    }

    /// The underlying packet cache.
    pub fn cache(&self) -> &PacketCache<EbftMessage> {
        &self.cache
    }
}
