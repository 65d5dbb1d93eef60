//! Status transport traits.
//!
//! The transport owns connections, framing and signature verification. By the
//! time a packet is handed to the round-progress loop, its sender has been
//! authenticated; the loop only decodes and applies it.

use bytes::Bytes;
use ebft_types::NodeRid;
use thiserror::Error;

/// Errors that can occur during network operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The peer is not connected.
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    /// The message could not be sent.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The network is not running.
    #[error("network not running")]
    NotRunning,
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// An authenticated packet received from a peer.
#[derive(Debug, Clone)]
pub struct InboundPacket {
    /// The peer that sent the packet.
    pub sender: NodeRid,
    /// The topic the packet was published on.
    pub topic: String,
    /// The packet payload.
    pub data: Bytes,
}

/// Packet delivery for the round-progress loop.
///
/// Network threads queue inbound packets; the loop drains them with
/// [`poll_packets`](StatusTransport::poll_packets) at the start of each tick.
/// No method may block.
pub trait StatusTransport: Send {
    /// Take every packet received since the last call.
    fn poll_packets(&mut self) -> Vec<InboundPacket>;

    /// Publish a packet to every connected validator.
    fn broadcast(&mut self, topic: &str, data: Bytes) -> TransportResult<()>;

    /// Send a packet to one validator.
    fn send_to(&mut self, peer: &NodeRid, topic: &str, data: Bytes) -> TransportResult<()>;
}
